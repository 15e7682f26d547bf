//! Per-suburb, per-direction artifact files.

use std::fs::File;
use std::path::{Path, PathBuf};

use trip_flows_ingest::dataset::AtomicCsvWriter;
use trip_flows_trip_models::{FlowDirection, StopPairGroup, artifact_file_name};

use crate::AnalyticsError;

/// Where the artifact for `suburb` and `direction` lives under `dir`.
#[must_use]
pub fn artifact_path(dir: &Path, suburb: &str, direction: FlowDirection) -> PathBuf {
    dir.join(artifact_file_name(suburb, direction))
}

/// Writes `groups` as the artifact for `suburb` and `direction`,
/// replacing any previous file atomically. Returns the artifact path.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the file cannot be written.
pub fn write_artifact(
    dir: &Path,
    suburb: &str,
    direction: FlowDirection,
    groups: &[StopPairGroup],
) -> Result<PathBuf, AnalyticsError> {
    let path = artifact_path(dir, suburb, direction);
    let mut writer = AtomicCsvWriter::create(&path, StopPairGroup::COLUMNS)?;
    for group in groups {
        writer.write(group)?;
    }
    let rows = writer.finish()?;
    log::info!("Wrote {rows} rows to {}", path.display());
    Ok(path)
}

/// Removes a previous run's artifact so a missing file keeps meaning "no
/// qualifying trips". Returns whether a file was removed.
///
/// # Errors
///
/// Returns [`AnalyticsError::Io`] if an existing file cannot be removed.
pub fn remove_stale_artifact(
    dir: &Path,
    suburb: &str,
    direction: FlowDirection,
) -> Result<bool, AnalyticsError> {
    let path = artifact_path(dir, suburb, direction);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            log::debug!("Removed stale artifact {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AnalyticsError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Loads an artifact back into groups.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the file exists but cannot be read.
pub fn read_artifact(path: &Path) -> Result<Option<Vec<StopPairGroup>>, AnalyticsError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AnalyticsError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };

    let mut reader = csv::Reader::from_reader(file);
    let groups = reader
        .deserialize::<StopPairGroup>()
        .enumerate()
        .map(|(row, group)| {
            group.map(|mut g| {
                g.first_row = row;
                g
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(groups))
}
