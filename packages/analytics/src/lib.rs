#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Stop-pair aggregation, inbound/outbound classification and top-volume
//! selection.
//!
//! [`summarize`] drives the whole stage for a tagged dataset: for every
//! target suburb it classifies the suburb's trips against the
//! [`ReferenceArea`](reference::ReferenceArea), keeps the top percentile
//! of stop-pair groups per [`FlowDirection`] and writes one artifact per
//! suburb and direction.

pub mod aggregate;
pub mod classify;
pub mod output;
pub mod percentile;
pub mod reference;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use trip_flows_ingest::IngestError;
use trip_flows_ingest::dataset::read_tagged_dataset;
use trip_flows_ingest::progress::ProgressCallback;
use trip_flows_trip_models::{FlowDirection, TripRecord, suburb_file_stem};

use crate::classify::classify_suburb;
use crate::percentile::{DEFAULT_QUANTILE, select_top, validate_quantile};
use crate::reference::ReferenceArea;

/// Reference area used when none is configured.
pub const DEFAULT_REFERENCE_AREA: &str = "BRISBANE CITY";

/// Errors that can occur while summarizing trips.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Reading the tagged dataset or writing an artifact failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// CSV decoding of an artifact failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A file could not be opened or removed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The requested quantile is not within `[0, 1]`.
    #[error("Quantile must be between 0 and 1, got {value}")]
    InvalidQuantile {
        /// The rejected value.
        value: f64,
    },
}

/// What to summarize and how.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    pub reference_area: String,
    pub quantile: f64,
    /// Suburbs to summarize. `None` means every origin suburb inside the
    /// reference area.
    pub suburbs: Option<Vec<String>>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            reference_area: DEFAULT_REFERENCE_AREA.to_string(),
            quantile: DEFAULT_QUANTILE,
            suburbs: None,
        }
    }
}

/// Why an artifact was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OmissionReason {
    /// No trip originates in the suburb.
    EmptyUniverse,
    /// The suburb has trips, but none belong to this direction.
    NoQualifyingTrips,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    Written { path: PathBuf, rows: usize },
    Omitted { reason: OmissionReason },
}

/// Result for one (suburb, direction) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactOutcome {
    pub suburb: String,
    pub direction: FlowDirection,
    pub status: ArtifactStatus,
}

/// Outcome of a summarizing run, in suburb then direction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryReport {
    pub outcomes: Vec<ArtifactOutcome>,
}

impl SummaryReport {
    /// Paths of every artifact written.
    #[must_use]
    pub fn written(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                ArtifactStatus::Written { path, .. } => Some(path.as_path()),
                ArtifactStatus::Omitted { .. } => None,
            })
            .collect()
    }

    #[must_use]
    pub fn omitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ArtifactStatus::Omitted { .. }))
            .count()
    }
}

/// Distinct origin suburbs that lie inside the reference area, sorted.
#[must_use]
pub fn target_suburbs(records: &[TripRecord], reference: &ReferenceArea) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.origin_suburb.as_deref())
        .filter(|label| reference.contains(Some(*label)))
        .map(|label| label.trim().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Warns about suburbs whose artifacts would land in the same file.
fn warn_stem_collisions(suburbs: &[String]) {
    let mut stems: HashMap<String, &str> = HashMap::new();
    for suburb in suburbs {
        let stem = suburb_file_stem(suburb);
        if let Some(previous) = stems.insert(stem.clone(), suburb) {
            log::warn!(
                "Suburbs '{previous}' and '{suburb}' share the file stem {stem}; the later one wins"
            );
        }
    }
}

/// Summarizes `records` into per-suburb, per-direction artifacts under
/// `output_dir`.
///
/// Directions without qualifying trips get no file; any file left over
/// from an earlier run for them is removed, so the output directory always
/// reflects the latest run. A file written earlier in the same run, by a
/// suburb sharing the file stem, is never removed.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the quantile is invalid or an artifact
/// cannot be written. The quantile is checked before anything is written.
pub fn summarize(
    records: &[TripRecord],
    options: &SummaryOptions,
    output_dir: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SummaryReport, AnalyticsError> {
    let quantile = validate_quantile(options.quantile)?;
    let reference = ReferenceArea::new(&options.reference_area);

    let suburbs = options
        .suburbs
        .clone()
        .unwrap_or_else(|| target_suburbs(records, &reference));

    log::info!(
        "Summarizing {} trips for {} suburbs against {} (q = {quantile})",
        records.len(),
        suburbs.len(),
        reference.name()
    );
    warn_stem_collisions(&suburbs);

    progress.set_total(suburbs.len() as u64);
    let mut report = SummaryReport::default();
    let mut written: HashSet<PathBuf> = HashSet::new();

    for suburb in &suburbs {
        progress.set_message(suburb.clone());
        let flows = classify_suburb(records, suburb, &reference);

        for &direction in FlowDirection::ALL {
            let status = match &flows {
                None => ArtifactStatus::Omitted {
                    reason: OmissionReason::EmptyUniverse,
                },
                Some(flows) => {
                    let top = select_top(flows.for_direction(direction), quantile)?;
                    if top.is_empty() {
                        ArtifactStatus::Omitted {
                            reason: OmissionReason::NoQualifyingTrips,
                        }
                    } else {
                        let path = output::write_artifact(output_dir, suburb, direction, &top)?;
                        written.insert(path.clone());
                        ArtifactStatus::Written {
                            path,
                            rows: top.len(),
                        }
                    }
                }
            };

            if let ArtifactStatus::Omitted { reason } = status {
                log::info!("No {direction} artifact for {suburb}: {reason}");
                let path = output::artifact_path(output_dir, suburb, direction);
                if written.contains(&path) {
                    log::warn!(
                        "Keeping {} written earlier in this run for a suburb with the same file stem",
                        path.display()
                    );
                } else {
                    output::remove_stale_artifact(output_dir, suburb, direction)?;
                }
            }

            report.outcomes.push(ArtifactOutcome {
                suburb: suburb.clone(),
                direction,
                status,
            });
        }

        progress.inc(1);
    }

    progress.finish(format!(
        "Wrote {} artifacts ({} omitted)",
        report.written().len(),
        report.omitted()
    ));

    Ok(report)
}

/// Loads a tagged dataset and summarizes it.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the dataset cannot be read or
/// [`summarize`] fails.
pub fn summarize_file(
    input: &Path,
    options: &SummaryOptions,
    output_dir: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SummaryReport, AnalyticsError> {
    let start = Instant::now();
    let dataset = read_tagged_dataset(input)?;
    if dataset.skipped.total() > 0 {
        log::warn!(
            "Skipped {} unreadable rows in {}: {}",
            dataset.skipped.total(),
            input.display(),
            dataset.skipped
        );
    }

    let report = summarize(&dataset.records, options, output_dir, progress)?;
    log::info!(
        "Summarized {} in {:.1}s",
        input.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(report)
}
