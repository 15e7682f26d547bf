#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Trip dataset ingestion and suburb tagging.
//!
//! Reads a raw trip CSV in bounded chunks, validates each row into a typed
//! record, tags origins and destinations against a
//! [`BoundaryStore`](trip_flows_spatial::BoundaryStore), and persists the
//! tagged dataset for the summarizing stage.

pub mod dataset;
pub mod progress;
pub mod reader;
pub mod schema;
pub mod tagger;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use trip_flows_spatial::BoundaryStore;
use trip_flows_trip_models::TripRecord;

use crate::dataset::AtomicCsvWriter;
use crate::progress::ProgressCallback;
use crate::reader::ChunkedTripReader;
use crate::schema::SkipCounts;
use crate::tagger::SuburbTagger;

/// Errors that can occur while ingesting or tagging trips.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A file could not be opened, created or renamed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV decoding or encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The input header lacks columns the stage depends on.
    #[error("{path} is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        /// The offending input.
        path: String,
        /// Names of the missing columns.
        columns: Vec<String>,
    },

    /// A chunk size of zero was requested.
    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,
}

/// Outcome of a tagging run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggingStats {
    /// Data rows read from the input, valid or not.
    pub rows_read: u64,
    /// Rows written to the tagged dataset.
    pub rows_tagged: u64,
    pub skipped: SkipCounts,
    /// Trip ends kept without coordinates because their text was not a
    /// number.
    pub malformed_coordinates: u64,
    pub chunks: u64,
    pub origin_unmatched: u64,
    pub destination_unmatched: u64,
}

/// Tags a raw trip CSV and writes the tagged dataset to `output`.
///
/// The input is streamed through a [`ChunkedTripReader`], so at most one
/// chunk of `chunk_size` rows is held in memory. The output only appears
/// once every chunk has been written.
///
/// # Errors
///
/// Returns [`IngestError`] if the input cannot be opened or read, or the
/// output cannot be written.
pub fn tag_file(
    input: &Path,
    store: &BoundaryStore,
    output: &Path,
    chunk_size: usize,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<TaggingStats, IngestError> {
    let start = Instant::now();
    log::info!(
        "Tagging {} -> {} ({chunk_size} rows per chunk)",
        input.display(),
        output.display()
    );

    let tagger = SuburbTagger::new(store, chunk_size)?;
    let mut chunks = ChunkedTripReader::open(input, tagger.chunk_size())?;
    let mut writer = AtomicCsvWriter::create(output, TripRecord::COLUMNS)?;

    progress.set_message(format!("Tagging {}", input.display()));

    let stats = chunks.try_fold(TaggingStats::default(), |mut stats, chunk| {
        let chunk = chunk?;
        let rows_read = chunk.rows_read();
        stats.rows_read += rows_read;
        stats.skipped.merge(&chunk.skipped);
        stats.malformed_coordinates += chunk.malformed_coordinates;
        stats.chunks += 1;

        let tagged = tagger.tag_chunk(chunk.records);
        stats.origin_unmatched += tagged.origin_unmatched;
        stats.destination_unmatched += tagged.destination_unmatched;

        for record in &tagged.records {
            writer.write(record)?;
        }
        stats.rows_tagged += tagged.records.len() as u64;

        log::debug!(
            "Chunk {} (rows {}..): {} tagged, {} skipped",
            stats.chunks,
            chunk.first_row,
            tagged.records.len(),
            chunk.skipped.total()
        );
        progress.inc(rows_read);

        Ok::<_, IngestError>(stats)
    })?;

    writer.finish()?;

    log::info!(
        "Tagged {} of {} rows in {} chunks ({:.1}s); unmatched origins: {}, unmatched destinations: {}, skipped: {}",
        stats.rows_tagged,
        stats.rows_read,
        stats.chunks,
        start.elapsed().as_secs_f64(),
        stats.origin_unmatched,
        stats.destination_unmatched,
        stats.skipped
    );
    if stats.malformed_coordinates > 0 {
        log::warn!(
            "{} trip end(s) had unparseable coordinates and were left unmatched",
            stats.malformed_coordinates
        );
    }
    progress.finish(format!("Tagged {} trips", stats.rows_tagged));

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use geo::{LineString, MultiPolygon, Polygon};

    use super::*;
    use crate::dataset::read_tagged_dataset;
    use crate::progress::null_progress;
    use crate::schema::SkipReason;

    fn square(min_lon: f64, min_lat: f64, size: f64) -> MultiPolygon<f64> {
        let (max_lon, max_lat) = (min_lon + size, min_lat + size);
        MultiPolygon(vec![Polygon::new(
            LineString::from(vec![
                (min_lon, min_lat),
                (max_lon, min_lat),
                (max_lon, max_lat),
                (min_lon, max_lat),
                (min_lon, min_lat),
            ]),
            vec![],
        )])
    }

    #[test]
    fn tags_file_end_to_end() {
        let dir = std::env::temp_dir().join("trip_flows_tag_file");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let input = dir.join("trips.csv");
        std::fs::write(
            &input,
            "origin_stop,origin_stop_lat,origin_stop_lon,destination_stop,destination_stop_lat,destination_stop_lon,quantity,distance,month\n\
             a,-27.47,153.02,b,-27.47,153.12,3,1.0,2024-05\n\
             b,-27.47,153.12,a,-27.47,153.02,2,1.0,2024-05\n\
             c,NA,NA,a,-27.47,153.02,1,0.2,2024-05\n\
             d,-27.47,153.02,e,-27.47,153.12,none,1.0,2024-05\n\
             e,-27.47,153.07,a,-27.47,153.02,7,0.4,2024-05\n",
        )
        .unwrap();

        let store = BoundaryStore::from_polygons(vec![
            ("SPRING HILL".to_string(), square(153.00, -27.50, 0.05)),
            ("NEW FARM".to_string(), square(153.10, -27.50, 0.05)),
        ]);

        let output = dir.join("out").join("tagged.csv");
        let stats = tag_file(&input, &store, &output, 2, &null_progress()).unwrap();

        assert_eq!(stats.rows_read, 5);
        assert_eq!(stats.rows_tagged, 4);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.skipped.get(SkipReason::InvalidQuantity), 1);
        assert_eq!(stats.origin_unmatched, 2);
        assert_eq!(stats.destination_unmatched, 0);

        let dataset = read_tagged_dataset(&output).unwrap();
        let origins: Vec<Option<&str>> = dataset
            .records
            .iter()
            .map(|r| r.origin_suburb.as_deref())
            .collect();
        assert_eq!(
            origins,
            vec![Some("SPRING HILL"), Some("NEW FARM"), None, None]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn header_only_input_writes_empty_tagged_dataset() {
        let dir = std::env::temp_dir().join("trip_flows_tag_file_empty");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let input = dir.join("trips.csv");
        std::fs::write(&input, "origin_stop,destination_stop,quantity\n").unwrap();

        let store = BoundaryStore::from_polygons(vec![(
            "SPRING HILL".to_string(),
            square(153.00, -27.50, 0.05),
        )]);
        let output = dir.join("tagged.csv");
        let stats = tag_file(&input, &store, &output, 10, &null_progress()).unwrap();

        assert_eq!(stats.rows_read, 0);
        assert_eq!(stats.chunks, 0);
        let dataset = read_tagged_dataset(&output).unwrap();
        assert!(dataset.records.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unparseable_coordinates_leave_only_that_side_untagged() {
        let dir = std::env::temp_dir().join("trip_flows_tag_file_bad_coordinates");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let input = dir.join("trips.csv");
        std::fs::write(
            &input,
            "origin_stop,origin_stop_lat,origin_stop_lon,destination_stop,destination_stop_lat,destination_stop_lon,quantity\n\
             a,unknown,153.02,b,-27.47,153.12,3\n",
        )
        .unwrap();

        let store = BoundaryStore::from_polygons(vec![
            ("SPRING HILL".to_string(), square(153.00, -27.50, 0.05)),
            ("NEW FARM".to_string(), square(153.10, -27.50, 0.05)),
        ]);
        let output = dir.join("tagged.csv");
        let stats = tag_file(&input, &store, &output, 10, &null_progress()).unwrap();

        assert_eq!(stats.rows_tagged, 1);
        assert_eq!(stats.skipped.total(), 0);
        assert_eq!(stats.malformed_coordinates, 1);
        assert_eq!(stats.origin_unmatched, 1);

        let dataset = read_tagged_dataset(&output).unwrap();
        assert_eq!(dataset.records[0].origin_suburb, None);
        assert_eq!(
            dataset.records[0].destination_suburb.as_deref(),
            Some("NEW FARM")
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_input_writes_nothing() {
        let dir = std::env::temp_dir().join("trip_flows_tag_file_missing");
        let _ = std::fs::remove_dir_all(&dir);

        let store = BoundaryStore::from_polygons(vec![(
            "SPRING HILL".to_string(),
            square(153.00, -27.50, 0.05),
        )]);
        let output = dir.join("tagged.csv");
        let result = tag_file(&dir.join("nope.csv"), &store, &output, 10, &null_progress());

        assert!(matches!(result, Err(IngestError::Io { .. })));
        assert!(!output.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
