//! Spatial interval index for source-offset lookups
//!
//! Maps source byte positions to the symbol nodes whose spans contain them.
//! The index is a flat vector of [`IntervalEntry`] records kept sorted by
//! `start` (insertion order breaks ties) and serialized as a count-prefixed
//! record array inside the image.
//!
//! # Format
//!
//! ```text
//! [count: u32]
//! [entries: IntervalEntry; count]   // start, end, node_offset - 12 bytes each
//! ```
//!
//! Intervals are closed: `find_at(p)` matches every entry with
//! `start <= p <= end`. Lookup is a linear scan; the sorted order lets the
//! scan stop at the first entry past the query point.

use crate::buffer::Buffer;
use crate::error::{GraphError, Result};
use crate::schema::IntervalEntry;
use std::mem;
use zerocopy::IntoBytes;

/// Size of one serialized entry
const ENTRY_SIZE: usize = mem::size_of::<IntervalEntry>();

/// A serializable set of source intervals with point-containment lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalIndex {
    /// Sorted by `start` ascending; ties keep insertion order
    entries: Vec<IntervalEntry>,
}

impl IntervalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of intervals in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the index holds no intervals
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in sorted order
    pub fn entries(&self) -> &[IntervalEntry] {
        &self.entries
    }

    /// Insert the closed interval `[start, end]` for `node_offset`
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidArgument`] when `start > end`.
    pub fn insert(&mut self, start: u32, end: u32, node_offset: u32) -> Result<()> {
        if start > end {
            return Err(GraphError::InvalidArgument(format!(
                "interval start {} exceeds end {}",
                start, end
            )));
        }
        // Keep `start` order; equal starts stay in insertion order
        let at = self.entries.partition_point(|e| e.start <= start);
        self.entries.insert(
            at,
            IntervalEntry {
                start,
                end,
                node_offset,
            },
        );
        Ok(())
    }

    /// Every entry whose interval contains `point`, in ascending-start order
    pub fn find_at(&self, point: u32) -> Vec<IntervalEntry> {
        let mut matches = Vec::new();
        for entry in &self.entries {
            if entry.start > point {
                // Sorted by start: nothing later can contain the point
                break;
            }
            if point <= entry.end {
                matches.push(*entry);
            }
        }
        matches
    }

    /// Serialize as a count-prefixed record array
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * ENTRY_SIZE);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(entry.as_bytes());
        }
        out
    }

    /// Deserialize a standalone serialized index
    ///
    /// # Errors
    ///
    /// [`GraphError::Truncated`] when the byte length disagrees with the
    /// leading count; [`GraphError::InvalidArgument`] when an entry has
    /// `start > end` or the ordering invariant is broken.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(GraphError::Truncated {
                size: data.len(),
                required: 4,
            });
        }
        let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let required = 4 + count * ENTRY_SIZE;
        if data.len() != required {
            return Err(GraphError::Truncated {
                size: data.len(),
                required,
            });
        }
        Self::from_entry_bytes(&data[4..], count)
    }

    /// Deserialize the index section of an image
    pub(crate) fn from_buffer(buffer: &Buffer, offset: u32) -> Result<Self> {
        let span = buffer.list_span(offset, ENTRY_SIZE)?;
        Self::from_entry_bytes(span, span.len() / ENTRY_SIZE)
    }

    fn from_entry_bytes(bytes: &[u8], count: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(count);
        let mut previous_start = 0u32;
        for chunk in bytes.chunks_exact(ENTRY_SIZE) {
            let entry = IntervalEntry {
                start: u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                end: u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                node_offset: u32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]),
            };
            if entry.start > entry.end {
                return Err(GraphError::InvalidArgument(format!(
                    "interval start {} exceeds end {}",
                    entry.start, entry.end
                )));
            }
            if entry.start < previous_start {
                return Err(GraphError::InvalidArgument(
                    "interval entries are not sorted by start".to_string(),
                ));
            }
            previous_start = entry.start;
            entries.push(entry);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(entries: &[IntervalEntry]) -> Vec<u32> {
        entries.iter().map(|e| e.node_offset).collect()
    }

    #[test]
    fn point_containment() {
        let mut index = IntervalIndex::new();
        index.insert(0, 5, 100).unwrap();
        index.insert(6, 6, 200).unwrap();
        index.insert(7, 11, 300).unwrap();

        assert_eq!(offsets(&index.find_at(2)), vec![100]);
        assert_eq!(offsets(&index.find_at(6)), vec![200]);
        assert_eq!(offsets(&index.find_at(8)), vec![300]);
        assert!(index.find_at(15).is_empty());
        // Closed intervals include both ends
        assert_eq!(offsets(&index.find_at(0)), vec![100]);
        assert_eq!(offsets(&index.find_at(5)), vec![100]);
        assert_eq!(offsets(&index.find_at(11)), vec![300]);
    }

    #[test]
    fn overlapping_intervals_sort_by_start() {
        let mut index = IntervalIndex::new();
        // Inserted widest-last to exercise sorted insertion
        index.insert(3, 8, 2).unwrap();
        index.insert(0, 14, 1).unwrap();

        assert_eq!(offsets(&index.find_at(4)), vec![1, 2]);
        assert_eq!(offsets(&index.find_at(10)), vec![1]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = IntervalIndex::new();
        index.insert(0, 4, 10).unwrap();
        index.insert(0, 9, 20).unwrap();
        index.insert(0, 2, 30).unwrap();

        assert_eq!(offsets(&index.find_at(1)), vec![10, 20, 30]);
        assert_eq!(offsets(&index.find_at(7)), vec![20]);
    }

    #[test]
    fn rejects_inverted_interval() {
        let mut index = IntervalIndex::new();
        assert!(matches!(
            index.insert(5, 4, 1),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn serialization_round_trip() {
        let mut index = IntervalIndex::new();
        index.insert(0, 5, 100).unwrap();
        index.insert(6, 6, 200).unwrap();
        index.insert(7, 11, 300).unwrap();

        let bytes = index.to_bytes();
        assert_eq!(bytes.len(), 4 + 3 * ENTRY_SIZE);
        let back = IntervalIndex::from_bytes(&bytes).unwrap();
        assert_eq!(back, index);

        for point in 0..16 {
            assert_eq!(back.find_at(point), index.find_at(point));
        }
    }

    #[test]
    fn deserialization_validates_size() {
        let mut bytes = IntervalIndex::new().to_bytes();
        assert!(IntervalIndex::from_bytes(&bytes).is_ok());

        // Claim one entry but provide none
        bytes[0] = 1;
        assert!(matches!(
            IntervalIndex::from_bytes(&bytes),
            Err(GraphError::Truncated { .. })
        ));
        assert!(matches!(
            IntervalIndex::from_bytes(&[1, 0]),
            Err(GraphError::Truncated { .. })
        ));
    }

    #[test]
    fn empty_index_round_trips() {
        let index = IntervalIndex::new();
        let back = IntervalIndex::from_bytes(&index.to_bytes()).unwrap();
        assert!(back.is_empty());
        assert!(back.find_at(0).is_empty());
    }
}
