//! Suburb tagging.
//!
//! Annotates each [`TripRecord`] with the suburb polygon containing its
//! origin and destination stop. Work happens one chunk at a time: origin
//! and destination labels are resolved in two independent passes over the
//! chunk and then reattached to the untouched records, so the output has
//! exactly the rows of the input, in the same order.

use trip_flows_spatial::BoundaryStore;
use trip_flows_trip_models::TripRecord;

use crate::IngestError;

/// Default number of rows tagged per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 250_000;

/// A chunk after tagging.
#[derive(Debug, Clone, Default)]
pub struct TaggedChunk {
    pub records: Vec<TripRecord>,
    /// Rows whose origin fell inside no polygon.
    pub origin_unmatched: u64,
    /// Rows whose destination fell inside no polygon.
    pub destination_unmatched: u64,
}

/// Resolves one side of every record in a chunk.
fn containment_pass(
    store: &BoundaryStore,
    records: &[TripRecord],
    coordinate: impl Fn(&TripRecord) -> Option<(f64, f64)>,
) -> Vec<Option<String>> {
    records
        .iter()
        .map(|record| {
            coordinate(record)
                .and_then(|(lat, lon)| store.containing_polygon(lat, lon))
                .map(str::to_string)
        })
        .collect()
}

/// Tags one chunk.
///
/// A missing or invalid coordinate leaves that side unmatched; it never
/// drops the row.
#[must_use]
pub fn tag_chunk(store: &BoundaryStore, mut records: Vec<TripRecord>) -> TaggedChunk {
    let origins = containment_pass(store, &records, TripRecord::origin_coordinate);
    let destinations = containment_pass(store, &records, TripRecord::destination_coordinate);

    let mut origin_unmatched = 0;
    let mut destination_unmatched = 0;

    for ((record, origin), destination) in records.iter_mut().zip(origins).zip(destinations) {
        origin_unmatched += u64::from(origin.is_none());
        destination_unmatched += u64::from(destination.is_none());
        record.origin_suburb = origin;
        record.destination_suburb = destination;
    }

    TaggedChunk {
        records,
        origin_unmatched,
        destination_unmatched,
    }
}

/// Tags trip records against a [`BoundaryStore`] in fixed-size chunks.
pub struct SuburbTagger<'a> {
    store: &'a BoundaryStore,
    chunk_size: usize,
}

impl<'a> SuburbTagger<'a> {
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidChunkSize`] if `chunk_size` is zero.
    pub fn new(store: &'a BoundaryStore, chunk_size: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkSize);
        }
        Ok(Self { store, chunk_size })
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn tag_chunk(&self, records: Vec<TripRecord>) -> TaggedChunk {
        tag_chunk(self.store, records)
    }

    /// Lazily tags `records`, pulling at most one chunk from the source at
    /// a time.
    pub fn tag<I>(&self, records: I) -> TaggedRecords<'a, I::IntoIter>
    where
        I: IntoIterator<Item = TripRecord>,
    {
        TaggedRecords {
            store: self.store,
            source: records.into_iter(),
            chunk_size: self.chunk_size,
            buffer: Vec::new().into_iter(),
        }
    }
}

/// Iterator returned by [`SuburbTagger::tag`].
pub struct TaggedRecords<'a, I> {
    store: &'a BoundaryStore,
    source: I,
    chunk_size: usize,
    buffer: std::vec::IntoIter<TripRecord>,
}

impl<I: Iterator<Item = TripRecord>> Iterator for TaggedRecords<'_, I> {
    type Item = TripRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.buffer.next() {
            return Some(record);
        }

        let chunk: Vec<TripRecord> = self.source.by_ref().take(self.chunk_size).collect();
        if chunk.is_empty() {
            return None;
        }

        self.buffer = tag_chunk(self.store, chunk).records.into_iter();
        self.buffer.next()
    }
}
