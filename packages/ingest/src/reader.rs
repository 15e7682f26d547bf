//! Chunked reader over a raw trip CSV.
//!
//! Yields validated [`TripRecord`]s in fixed-size chunks so that a dataset
//! with tens of millions of rows never has to be resident at once.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use trip_flows_trip_models::TripRecord;

use crate::IngestError;
use crate::schema::{
    REQUIRED_COLUMNS, RawTripRow, SkipCounts, SkipReason, missing_columns, validate_row,
};

/// A bounded slice of the input dataset.
#[derive(Debug, Clone, Default)]
pub struct TripChunk {
    /// Input row index (0-based, header excluded) of the first row read
    /// into this chunk.
    pub first_row: usize,
    /// Rows that passed validation, in input order.
    pub records: Vec<TripRecord>,
    /// Rows read into this chunk but excluded.
    pub skipped: SkipCounts,
    /// Trip ends of kept rows whose coordinate text was not a number.
    pub malformed_coordinates: u64,
}

impl TripChunk {
    /// Rows read from the input for this chunk, valid or not.
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.records.len() as u64 + self.skipped.total()
    }
}

/// Lazy sequence of [`TripChunk`]s read from a CSV source.
///
/// Each chunk holds up to `chunk_size` rows read from the input; rows that
/// fail validation count against the chunk but are not returned.
pub struct ChunkedTripReader<R: Read> {
    rows: csv::DeserializeRecordsIntoIter<R, RawTripRow>,
    chunk_size: usize,
    next_row: usize,
    exhausted: bool,
}

impl ChunkedTripReader<File> {
    /// Opens a raw trip CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be opened, the header
    /// cannot be read, a required column is missing, or `chunk_size` is
    /// zero.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|e| IngestError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_reader(file, chunk_size, &path.display().to_string())
    }
}

impl<R: Read> ChunkedTripReader<R> {
    /// Wraps any reader producing CSV text. `label` names the source in
    /// error messages.
    ///
    /// # Errors
    ///
    /// See [`ChunkedTripReader::open`].
    pub fn from_reader(reader: R, chunk_size: usize, label: &str) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkSize);
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let missing = missing_columns(csv_reader.headers()?, REQUIRED_COLUMNS);
        if !missing.is_empty() {
            return Err(IngestError::MissingColumns {
                path: label.to_string(),
                columns: missing,
            });
        }

        Ok(Self {
            rows: csv_reader.into_deserialize(),
            chunk_size,
            next_row: 0,
            exhausted: false,
        })
    }
}

impl<R: Read> Iterator for ChunkedTripReader<R> {
    type Item = Result<TripChunk, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let mut chunk = TripChunk {
            first_row: self.next_row,
            records: Vec::with_capacity(self.chunk_size.min(65_536)),
            skipped: SkipCounts::default(),
            malformed_coordinates: 0,
        };
        let mut read = 0;

        while read < self.chunk_size {
            let Some(row) = self.rows.next() else {
                self.exhausted = true;
                break;
            };
            let row_index = self.next_row;
            self.next_row += 1;
            read += 1;

            match row {
                Ok(raw) => match validate_row(raw) {
                    Ok(validated) => {
                        let malformed = validated.malformed_sides();
                        if malformed > 0 {
                            log::debug!("Row {row_index} has {malformed} unparseable coordinate(s)");
                            chunk.malformed_coordinates += malformed;
                        }
                        chunk.records.push(validated.record);
                    }
                    Err(reason) => {
                        log::debug!("Skipping row {row_index}: {reason}");
                        chunk.skipped.record(reason);
                    }
                },
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    self.exhausted = true;
                    return Some(Err(e.into()));
                }
                Err(e) => {
                    log::debug!("Skipping unreadable row {row_index}: {e}");
                    chunk.skipped.record(SkipReason::Unreadable);
                }
            }
        }

        if read == 0 { None } else { Some(Ok(chunk)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "origin_stop,origin_stop_type,origin_stop_lat,origin_stop_lon,destination_stop,destination_stop_type,destination_stop_lat,destination_stop_lon,quantity,distance,time\n";

    fn csv_text(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    fn read_all(text: &str, chunk_size: usize) -> Vec<TripChunk> {
        ChunkedTripReader::from_reader(text.as_bytes(), chunk_size, "test")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn splits_rows_into_fixed_size_chunks() {
        let text = csv_text(&[
            "a,Bus,-27.4,153.0,b,Bus,-27.5,153.1,1,0.5,08:00",
            "a,Bus,-27.4,153.0,c,Bus,-27.5,153.1,2,0.5,08:00",
            "b,Bus,-27.4,153.0,c,Bus,-27.5,153.1,3,0.5,08:00",
        ]);

        let chunks = read_all(&text, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].records.len(), 2);
        assert_eq!(chunks[1].records.len(), 1);
        assert_eq!(chunks[1].first_row, 2);
        assert_eq!(chunks[1].records[0].quantity, 3);
    }

    #[test]
    fn counts_malformed_rows_without_aborting() {
        let text = csv_text(&[
            "a,Bus,-27.4,153.0,b,Bus,-27.5,153.1,1,0.5,08:00",
            "a,Bus,-27.4,153.0,b,Bus,-27.5,153.1,lots,0.5,08:00",
            "NA,Bus,-27.4,153.0,b,Bus,-27.5,153.1,1,0.5,08:00",
            "a,Bus,-27.4,153.0,b,Bus,-27.5,153.1,4,,08:00",
        ]);

        let chunks = read_all(&text, 10);
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.records.len(), 2);
        assert_eq!(chunk.skipped.get(SkipReason::InvalidQuantity), 1);
        assert_eq!(chunk.skipped.get(SkipReason::MissingStop), 1);
        assert_eq!(chunk.rows_read(), 4);
    }

    #[test]
    fn keeps_rows_with_unparseable_coordinates() {
        let text = csv_text(&[
            "a,Bus,north,153.0,b,Bus,-27.5,153.1,1,0.5,08:00",
            "a,Bus,-27.4,153.0,b,Bus,-27.5,east,2,0.5,08:00",
            "a,Bus,-27.4,153.0,b,Bus,-27.5,153.1,3,0.5,08:00",
        ]);

        let chunks = read_all(&text, 10);
        let chunk = &chunks[0];
        assert_eq!(chunk.records.len(), 3);
        assert_eq!(chunk.skipped.total(), 0);
        assert_eq!(chunk.malformed_coordinates, 2);
        assert_eq!(chunk.records[0].origin_coordinate(), None);
        assert!(chunk.records[0].destination_coordinate().is_some());
        assert_eq!(chunk.records[1].destination_coordinate(), None);
    }

    #[test]
    fn accepts_padded_header_names() {
        let text = "origin_stop , destination_stop,origin_stop_lat,origin_stop_lon, quantity\n\
                    a,b,-27.4,153.0,7\n";

        let chunks = read_all(text, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].skipped.total(), 0);
        let record = &chunks[0].records[0];
        assert_eq!(record.origin_stop, "a");
        assert_eq!(record.destination_stop, "b");
        assert_eq!(record.quantity, 7);
        assert_eq!(record.origin_coordinate(), Some((-27.4, 153.0)));
    }

    #[test]
    fn empty_dataset_yields_no_chunks() {
        assert!(read_all(HEADER, 5).is_empty());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let result = ChunkedTripReader::from_reader(HEADER.as_bytes(), 0, "test");
        assert!(matches!(result, Err(IngestError::InvalidChunkSize)));
    }

    #[test]
    fn rejects_header_without_required_columns() {
        let result = ChunkedTripReader::from_reader("origin_stop,quantity\n".as_bytes(), 5, "test");
        let Err(IngestError::MissingColumns { columns, .. }) = result else {
            panic!("expected missing columns");
        };
        assert_eq!(columns, vec!["destination_stop".to_string()]);
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let path = std::env::temp_dir().join("trip_flows_reader_missing.csv");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            ChunkedTripReader::open(&path, 10),
            Err(IngestError::Io { .. })
        ));
    }
}
