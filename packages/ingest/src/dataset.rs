//! Tagged dataset persistence.
//!
//! The tagged dataset is the raw trip schema plus `origin_suburb` and
//! `destination_suburb`. It is written once per tagging run so later
//! summarizing sessions never have to repeat the spatial join.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use trip_flows_trip_models::TripRecord;

use crate::IngestError;
use crate::schema::{REQUIRED_COLUMNS, SkipCounts, SkipReason, TAGGED_COLUMNS, missing_columns};

/// CSV writer that publishes its file only on [`AtomicCsvWriter::finish`].
///
/// Rows go to `<name>.tmp` next to the destination, which is renamed over
/// the destination once everything is flushed. A writer dropped before
/// `finish` removes its temporary file, so an aborted run never leaves a
/// truncated artifact behind.
pub struct AtomicCsvWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: Option<csv::Writer<File>>,
    rows: u64,
}

impl AtomicCsvWriter {
    /// Creates the temporary file and writes `header` to it, so a file
    /// finished without any rows still carries its column names.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the parent directory or the temporary
    /// file cannot be created, or the header cannot be written.
    pub fn create(path: &Path, header: &[&str]) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let file = File::create(&tmp_path).map_err(|e| IngestError::Io {
            path: tmp_path.display().to_string(),
            source: e,
        })?;

        let mut this = Self {
            path: path.to_path_buf(),
            tmp_path,
            writer: Some(
                csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(file),
            ),
            rows: 0,
        };
        if let Some(writer) = this.writer.as_mut() {
            writer.write_record(header)?;
        }

        Ok(this)
    }

    /// Serializes one row. Fields must follow the header's column order.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Csv`] if the row cannot be written.
    pub fn write<T: Serialize>(&mut self, row: &T) -> Result<(), IngestError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.serialize(row)?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Flushes and renames the temporary file into place. Returns the
    /// number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if flushing or renaming fails.
    pub fn finish(mut self) -> Result<u64, IngestError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| IngestError::Io {
                path: self.tmp_path.display().to_string(),
                source: e,
            })?;
        }

        std::fs::rename(&self.tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&self.tmp_path);
            IngestError::Io {
                path: self.path.display().to_string(),
                source: e,
            }
        })?;

        Ok(self.rows)
    }
}

impl Drop for AtomicCsvWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

/// A tagged dataset loaded for summarizing.
#[derive(Debug, Clone, Default)]
pub struct TaggedDataset {
    /// Records in file order. Position in this vector is the row index
    /// used for first-seen metadata.
    pub records: Vec<TripRecord>,
    pub skipped: SkipCounts,
}

/// Reads a tagged dataset written by the tagger.
///
/// Rows that cannot be decoded are skipped and counted.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be opened, is not a tagged
/// dataset, or fails with an I/O error mid-read.
pub fn read_tagged_dataset(path: &Path) -> Result<TaggedDataset, IngestError> {
    let file = File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let mut missing = missing_columns(&headers, REQUIRED_COLUMNS);
    missing.extend(missing_columns(&headers, TAGGED_COLUMNS));
    if !missing.is_empty() {
        return Err(IngestError::MissingColumns {
            path: path.display().to_string(),
            columns: missing,
        });
    }

    let mut dataset = TaggedDataset::default();

    for (row_index, row) in reader.into_deserialize::<TripRecord>().enumerate() {
        match row {
            Ok(record) => dataset.records.push(record),
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                log::debug!("Skipping unreadable tagged row {row_index}: {e}");
                dataset.skipped.record(SkipReason::Unreadable);
            }
        }
    }

    log::info!(
        "Loaded {} tagged trips from {} (skipped: {})",
        dataset.records.len(),
        path.display(),
        dataset.skipped
    );

    Ok(dataset)
}
