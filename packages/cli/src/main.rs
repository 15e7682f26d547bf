#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `trip_flows`: tags trips with suburbs and extracts each suburb's
//! top-volume inbound and outbound stop pairs.
//!
//! Every stage is available as a subcommand. Without one, an interactive
//! menu asks which tool to run and prompts for its inputs.
//!
//! Logging goes through [`trip_flows_cli_utils::init_logger`], so `log`
//! output and progress bars share the terminal cleanly.

mod browse;
mod config;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, Input, Select};
use trip_flows_analytics::reference::ReferenceArea;
use trip_flows_analytics::{ArtifactStatus, SummaryReport, summarize_file};
use trip_flows_cli_utils::{IndicatifProgress, MultiProgress};
use trip_flows_ingest::{TaggingStats, tag_file};
use trip_flows_spatial::BoundaryStore;

use crate::config::{ConfigOverrides, PipelineConfig, parse_suburb_list};

#[derive(Parser)]
#[command(
    name = "trip_flows",
    about = "Top trip flows per suburb and direction"
)]
struct Cli {
    /// TOML configuration file (defaults to `TRIP_FLOWS_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct TaggingArgs {
    /// GeoJSON feature collection of suburb boundaries
    #[arg(long)]
    boundaries: PathBuf,
    /// Rows processed per chunk
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Feature property holding the suburb name
    #[arg(long)]
    name_property: Option<String>,
}

#[derive(Args)]
struct SummaryArgs {
    /// Directory receiving one CSV per suburb and direction
    #[arg(long)]
    output_dir: PathBuf,
    /// Suburbs to summarize, separated by `,` (or `;` when the names
    /// contain commas). Defaults to every suburb in the reference area.
    #[arg(long)]
    suburbs: Option<String>,
    /// Quantity quantile a stop pair must reach to be kept
    #[arg(long)]
    quantile: Option<f64>,
    /// Area that defines inbound and outbound trips
    #[arg(long)]
    reference_area: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Tag trip origins and destinations with their suburbs
    Tag {
        /// Raw trip CSV
        #[arg(long)]
        input: PathBuf,
        /// Where to write the tagged dataset
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        tagging: TaggingArgs,
    },
    /// Write the top trips of each suburb from a tagged dataset
    Summarize {
        /// Tagged dataset written by `tag`
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        summary: SummaryArgs,
    },
    /// Tag, then summarize
    Run {
        /// Raw trip CSV
        #[arg(long)]
        input: PathBuf,
        /// Where to write the tagged dataset (defaults to
        /// `<output-dir>/tagged_trips.csv`)
        #[arg(long)]
        tagged: Option<PathBuf>,
        #[command(flatten)]
        tagging: TaggingArgs,
        #[command(flatten)]
        summary: SummaryArgs,
    },
    /// List suburbs in the reference area
    Suburbs {
        /// GeoJSON feature collection of suburb boundaries
        #[arg(long)]
        boundaries: PathBuf,
        /// List every suburb, not just those in the reference area
        #[arg(long)]
        all: bool,
        /// Feature property holding the suburb name
        #[arg(long)]
        name_property: Option<String>,
        /// Area to filter by
        #[arg(long)]
        reference_area: Option<String>,
    },
    /// Interactively browse summarized trips
    Browse {
        /// GeoJSON feature collection of suburb boundaries
        #[arg(long)]
        boundaries: PathBuf,
        /// Directory holding the summarized CSVs
        #[arg(long)]
        output_dir: PathBuf,
    },
}

impl TaggingArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            chunk_size: self.chunk_size,
            name_property: self.name_property.clone(),
            ..ConfigOverrides::default()
        }
    }
}

impl SummaryArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            reference_area: self.reference_area.clone(),
            quantile: self.quantile,
            suburbs: self.suburbs.as_deref().map(parse_suburb_list),
            ..ConfigOverrides::default()
        }
    }
}

/// Top-level tool selection for the interactive menu.
enum Tool {
    Run,
    Tag,
    Summarize,
    Suburbs,
    Browse,
}

impl Tool {
    const ALL: &[Self] = &[
        Self::Run,
        Self::Tag,
        Self::Summarize,
        Self::Suburbs,
        Self::Browse,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Run full pipeline (tag + summarize)",
            Self::Tag => "Tag trips with suburbs",
            Self::Summarize => "Summarize tagged trips",
            Self::Suburbs => "List suburbs",
            Self::Browse => "Browse top trips",
        }
    }
}

fn tag(
    multi: &MultiProgress,
    config: &PipelineConfig,
    input: &Path,
    boundaries: &Path,
    output: &Path,
) -> Result<TaggingStats, Box<dyn std::error::Error>> {
    let store = BoundaryStore::load(boundaries, &config.name_property)?;
    log::info!("Loaded {} suburb polygons", store.len());

    let progress = IndicatifProgress::rows_bar(multi, "Tagging trips");
    let stats = tag_file(input, &store, output, config.chunk_size, &progress)?;

    println!(
        "Tagged {} of {} rows into {}",
        stats.rows_tagged,
        stats.rows_read,
        output.display()
    );
    println!(
        "  unmatched origins: {}, unmatched destinations: {}, unparseable coordinates: {}, skipped: {}",
        stats.origin_unmatched,
        stats.destination_unmatched,
        stats.malformed_coordinates,
        stats.skipped
    );

    Ok(stats)
}

fn summarize(
    multi: &MultiProgress,
    config: &PipelineConfig,
    input: &Path,
    output_dir: &Path,
) -> Result<SummaryReport, Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::suburbs_bar(multi, "Summarizing suburbs");
    let report = summarize_file(input, &config.summary_options(), output_dir, &progress)?;
    print_report(&report);
    Ok(report)
}

fn print_report(report: &SummaryReport) {
    println!("{:<36} {:<9} RESULT", "SUBURB", "DIRECTION");
    println!("{}", "-".repeat(70));
    for outcome in &report.outcomes {
        let result = match &outcome.status {
            ArtifactStatus::Written { path, rows } => {
                format!("{rows} rows -> {}", path.display())
            }
            ArtifactStatus::Omitted { reason } => format!("omitted ({reason})"),
        };
        println!(
            "{:<36} {:<9} {result}",
            outcome.suburb,
            outcome.direction.to_string()
        );
    }
    println!(
        "{} written, {} omitted",
        report.written().len(),
        report.omitted()
    );
}

/// Boundary names, optionally limited to the reference area.
fn list_suburbs(
    config: &PipelineConfig,
    boundaries: &Path,
    all: bool,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let store = BoundaryStore::load(boundaries, &config.name_property)?;
    let reference = ReferenceArea::new(&config.reference_area);

    Ok(store
        .names()
        .into_iter()
        .filter(|name| all || reference.contains(Some(*name)))
        .map(str::to_string)
        .collect())
}

fn browse(
    config: &PipelineConfig,
    boundaries: &Path,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let suburbs = match &config.suburbs {
        Some(suburbs) => suburbs.clone(),
        None => list_suburbs(config, boundaries, false)?,
    };
    browse::run(output_dir, &suburbs)
}

fn default_tagged_path(output_dir: &Path) -> PathBuf {
    output_dir.join("tagged_trips.csv")
}

fn prompt_path(prompt: &str, default: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_string());
    }
    Ok(PathBuf::from(input.interact_text()?))
}

#[allow(clippy::too_many_lines)]
fn interactive(
    multi: &MultiProgress,
    config: PipelineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Trip Flows");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    let config = if Confirm::new()
        .with_prompt(format!(
            "Use reference area {} and quantile {}?",
            config.reference_area, config.quantile
        ))
        .default(true)
        .interact()?
    {
        config
    } else {
        let reference_area: String = Input::new()
            .with_prompt("Reference area")
            .default(config.reference_area.clone())
            .interact_text()?;
        let quantile: f64 = Input::new()
            .with_prompt("Quantile")
            .default(config.quantile)
            .interact_text()?;
        config
            .with_overrides(ConfigOverrides {
                reference_area: Some(reference_area),
                quantile: Some(quantile),
                ..ConfigOverrides::default()
            })
            .validate()?
    };

    match Tool::ALL[idx] {
        Tool::Run => {
            let input = prompt_path("Raw trip CSV", None)?;
            let boundaries = prompt_path("Suburb boundaries (GeoJSON)", None)?;
            let output_dir = prompt_path("Output directory", Some("output_top1"))?;
            let tagged = default_tagged_path(&output_dir);
            tag(multi, &config, &input, &boundaries, &tagged)?;
            summarize(multi, &config, &tagged, &output_dir)?;
        }
        Tool::Tag => {
            let input = prompt_path("Raw trip CSV", None)?;
            let boundaries = prompt_path("Suburb boundaries (GeoJSON)", None)?;
            let output = prompt_path("Tagged dataset", Some("tagged_trips.csv"))?;
            tag(multi, &config, &input, &boundaries, &output)?;
        }
        Tool::Summarize => {
            let input = prompt_path("Tagged dataset", Some("tagged_trips.csv"))?;
            let output_dir = prompt_path("Output directory", Some("output_top1"))?;
            summarize(multi, &config, &input, &output_dir)?;
        }
        Tool::Suburbs => {
            let boundaries = prompt_path("Suburb boundaries (GeoJSON)", None)?;
            for name in list_suburbs(&config, &boundaries, false)? {
                println!("{name}");
            }
        }
        Tool::Browse => {
            let boundaries = prompt_path("Suburb boundaries (GeoJSON)", None)?;
            let output_dir = prompt_path("Output directory", Some("output_top1"))?;
            browse(&config, &boundaries, &output_dir)?;
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = trip_flows_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref())?;

    let Some(command) = cli.command else {
        return interactive(&multi, config.validate()?);
    };

    match command {
        Commands::Tag {
            input,
            output,
            tagging,
        } => {
            let config = config.with_overrides(tagging.overrides()).validate()?;
            tag(&multi, &config, &input, &tagging.boundaries, &output)?;
        }
        Commands::Summarize { input, summary } => {
            let config = config.with_overrides(summary.overrides()).validate()?;
            summarize(&multi, &config, &input, &summary.output_dir)?;
        }
        Commands::Run {
            input,
            tagged,
            tagging,
            summary,
        } => {
            let config = config
                .with_overrides(tagging.overrides())
                .with_overrides(summary.overrides())
                .validate()?;
            let tagged = tagged.unwrap_or_else(|| default_tagged_path(&summary.output_dir));
            tag(&multi, &config, &input, &tagging.boundaries, &tagged)?;
            summarize(&multi, &config, &tagged, &summary.output_dir)?;
        }
        Commands::Suburbs {
            boundaries,
            all,
            name_property,
            reference_area,
        } => {
            let config = config
                .with_overrides(ConfigOverrides {
                    reference_area,
                    name_property,
                    ..ConfigOverrides::default()
                })
                .validate()?;
            let names = list_suburbs(&config, &boundaries, all)?;
            for name in &names {
                println!("{name}");
            }
            log::info!("{} suburbs", names.len());
        }
        Commands::Browse {
            boundaries,
            output_dir,
        } => {
            browse(&config.validate()?, &boundaries, &output_dir)?;
        }
    }

    Ok(())
}
