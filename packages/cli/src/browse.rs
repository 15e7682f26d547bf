//! Interactive browsing of the summarized artifacts.
//!
//! The user picks a direction and a set of suburbs; the session loads the
//! matching artifacts, reports which ones are missing and prints the
//! combined top trips with a min-max normalized volume.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use dialoguer::{MultiSelect, Select};
use trip_flows_analytics::AnalyticsError;
use trip_flows_analytics::output::{artifact_path, read_artifact};
use trip_flows_trip_models::{FlowDirection, StopPairGroup};

/// Keeps the divisor positive when every quantity is equal.
const NORMALIZATION_EPSILON: f64 = 1e-6;

/// Selection state of one browsing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseSession {
    output_dir: PathBuf,
    direction: FlowDirection,
    selected: BTreeSet<String>,
}

/// One trip of the combined view.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseRow {
    pub suburb: String,
    pub group: StopPairGroup,
    /// Quantity scaled into `[0, 1)` over the whole view.
    pub volume: f64,
}

/// What the current selection resolves to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowseView {
    /// Rows ordered by descending quantity.
    pub rows: Vec<BrowseRow>,
    /// Selected suburbs with no artifact for the current direction.
    pub missing: Vec<String>,
}

impl BrowseSession {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            direction: FlowDirection::Inbound,
            selected: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn direction(&self) -> FlowDirection {
        self.direction
    }

    pub const fn set_direction(&mut self, direction: FlowDirection) {
        self.direction = direction;
    }

    /// Replaces the selection.
    pub fn select<I, S>(&mut self, suburbs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected = suburbs.into_iter().map(Into::into).collect();
    }

    #[must_use]
    pub fn is_selected(&self, suburb: &str) -> bool {
        self.selected.contains(suburb)
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    /// Loads the artifacts for the current selection and direction.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError`] if an existing artifact cannot be read.
    pub fn view(&self) -> Result<BrowseView, AnalyticsError> {
        let mut view = BrowseView::default();
        let mut loaded: Vec<(String, StopPairGroup)> = Vec::new();

        for suburb in &self.selected {
            let path = artifact_path(&self.output_dir, suburb, self.direction);
            match read_artifact(&path)? {
                Some(groups) => {
                    loaded.extend(groups.into_iter().map(|g| (suburb.clone(), g)));
                }
                None => view.missing.push(suburb.clone()),
            }
        }

        let min = loaded.iter().map(|(_, g)| g.quantity).min().unwrap_or(0);
        let max = loaded.iter().map(|(_, g)| g.quantity).max().unwrap_or(0);

        view.rows = loaded
            .into_iter()
            .map(|(suburb, group)| {
                let volume = normalize(group.quantity, min, max);
                BrowseRow {
                    suburb,
                    group,
                    volume,
                }
            })
            .collect();
        view.rows
            .sort_by(|a, b| b.group.quantity.cmp(&a.group.quantity));

        Ok(view)
    }
}

#[allow(clippy::cast_precision_loss)]
fn normalize(quantity: u64, min: u64, max: u64) -> f64 {
    (quantity - min) as f64 / ((max - min) as f64 + NORMALIZATION_EPSILON)
}

fn print_view(session: &BrowseSession, view: &BrowseView) {
    for suburb in &view.missing {
        println!(
            "No {} data for {suburb} (missing {})",
            session.direction(),
            artifact_path(&session.output_dir, suburb, session.direction()).display()
        );
    }

    if view.rows.is_empty() {
        println!("Nothing to show.");
        return;
    }

    println!(
        "{:<28} {:<14} {:<14} {:<24} {:>9} {:>7}",
        "SUBURB", "FROM", "TO", "DESTINATION SUBURB", "TRIPS", "VOLUME"
    );
    println!("{}", "-".repeat(101));
    for row in &view.rows {
        println!(
            "{:<28} {:<14} {:<14} {:<24} {:>9} {:>7.3}",
            row.suburb,
            row.group.origin_stop,
            row.group.destination_stop,
            row.group.destination_suburb.as_deref().unwrap_or("-"),
            row.group.quantity,
            row.volume
        );
    }
}

enum Action {
    Direction,
    Suburbs,
    Show,
    Quit,
}

impl Action {
    const ALL: &[Self] = &[Self::Show, Self::Suburbs, Self::Direction, Self::Quit];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Direction => "Switch direction",
            Self::Suburbs => "Choose suburbs",
            Self::Show => "Show top trips",
            Self::Quit => "Quit",
        }
    }
}

/// Runs the interactive session over `suburbs` until the user quits.
///
/// # Errors
///
/// Returns an error if a prompt fails or an artifact cannot be read.
pub fn run(output_dir: &Path, suburbs: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if suburbs.is_empty() {
        println!("No suburbs to browse.");
        return Ok(());
    }

    let mut session = BrowseSession::new(output_dir);
    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    loop {
        let prompt = format!(
            "Browsing {} trips for {} suburb(s)",
            session.direction(),
            session.selected().count()
        );
        let idx = Select::new()
            .with_prompt(prompt)
            .items(&labels)
            .default(0)
            .interact()?;

        match Action::ALL[idx] {
            Action::Direction => {
                let directions: Vec<String> =
                    FlowDirection::ALL.iter().map(ToString::to_string).collect();
                let current = FlowDirection::ALL
                    .iter()
                    .position(|d| *d == session.direction())
                    .unwrap_or(0);
                let choice = Select::new()
                    .with_prompt("Direction")
                    .items(&directions)
                    .default(current)
                    .interact()?;
                session.set_direction(FlowDirection::ALL[choice]);
            }
            Action::Suburbs => {
                let defaults: Vec<bool> = suburbs.iter().map(|s| session.is_selected(s)).collect();
                let chosen = MultiSelect::new()
                    .with_prompt("Suburbs (space=toggle, a=all, enter=confirm)")
                    .items(suburbs)
                    .defaults(&defaults)
                    .max_length(20)
                    .interact()?;
                session.select(chosen.into_iter().map(|i| suburbs[i].clone()));
            }
            Action::Show => {
                let view = session.view()?;
                print_view(&session, &view);
            }
            Action::Quit => return Ok(()),
        }
    }
}
