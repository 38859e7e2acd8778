//! Deep structural validation of a graph image
//!
//! Walks every record reachable from the root - symbol nodes, packed nodes,
//! CPG edges, property lists, value payloads, interned strings - plus the
//! interval index section, and verifies the format invariants: in-bounds
//! offsets, 4-byte record alignment, list count/size agreement, known kind
//! tags, NUL-terminated UTF-8 strings, and source-span containment.
//!
//! The pass stops at the first violation and reports it through the normal
//! error taxonomy. Opening a graph does not run this pass; it is for
//! distrusted images and for asserting builder output in tests.

use crate::error::{GraphError, Result};
use crate::schema::{
    CpgEdge, EdgeKind, Header, IntervalEntry, PackedNode, Property, SymbolNode, ValueHeader,
    ValueKind, HEADER_SIZE,
};
use rustc_hash::FxHashSet;
use std::mem;
use zerocopy::FromBytes;

/// Validate a complete image
///
/// Returns the first invariant violation found, or `Ok(())` for a
/// well-formed image.
pub fn check_image(data: &[u8]) -> Result<()> {
    if data.len() < HEADER_SIZE {
        return Err(GraphError::Truncated {
            size: data.len(),
            required: HEADER_SIZE,
        });
    }
    let header = read_record::<Header>(data, 0)?;
    header.validate()?;

    let source_end = header.source_offset as u64 + header.source_len as u64;
    if source_end > data.len() as u64 {
        return Err(GraphError::OutOfRange {
            offset: header.source_offset,
            length: header.source_len,
            image_len: data.len(),
        });
    }

    let mut walker = Walker {
        data,
        header,
        visited: FxHashSet::default(),
    };
    if header.root_offset != 0 {
        walker.check_node(header.root_offset)?;
    }
    if header.interval_index_offset != 0 {
        walker.check_interval_index(header.interval_index_offset)?;
    }
    Ok(())
}

fn read_record<T: FromBytes>(data: &[u8], offset: u32) -> Result<T> {
    let size = mem::size_of::<T>();
    let start = offset as usize;
    let bytes = start
        .checked_add(size)
        .and_then(|end| data.get(start..end))
        .ok_or(GraphError::OutOfRange {
            offset,
            length: size as u32,
            image_len: data.len(),
        })?;
    T::read_from_bytes(bytes).map_err(|_| GraphError::OutOfRange {
        offset,
        length: size as u32,
        image_len: data.len(),
    })
}

struct Walker<'a> {
    data: &'a [u8],
    header: Header,
    visited: FxHashSet<u32>,
}

impl Walker<'_> {
    /// Offsets into the record region must be past the header and 4-aligned
    fn check_record_offset(&self, offset: u32, what: &str) -> Result<()> {
        if (offset as usize) < HEADER_SIZE {
            return Err(GraphError::OutOfRange {
                offset,
                length: 0,
                image_len: self.data.len(),
            });
        }
        if offset % 4 != 0 {
            return Err(GraphError::InvalidArgument(format!(
                "{} at offset {} is not 4-byte aligned",
                what, offset
            )));
        }
        Ok(())
    }

    /// Read a list's count and return the offsets of its u32 elements
    fn offset_list(&self, list_offset: u32) -> Result<Vec<u32>> {
        self.check_record_offset(list_offset, "list")?;
        let count = read_record::<u32>(self.data, list_offset)?;
        let mut elements = Vec::with_capacity(count as usize);
        for index in 0..count {
            elements.push(read_record::<u32>(self.data, list_offset + 4 + index * 4)?);
        }
        Ok(elements)
    }

    fn check_node(&mut self, offset: u32) -> Result<()> {
        if !self.visited.insert(offset) {
            // Shared subtree or cycle: already checked
            return Ok(());
        }
        self.check_record_offset(offset, "symbol node")?;
        let node = read_record::<SymbolNode>(self.data, offset)?;

        let span_end = node.source_start as u64 + node.source_length as u64;
        if span_end > self.header.source_len as u64 {
            return Err(GraphError::OutOfRange {
                offset: node.source_start,
                length: node.source_length,
                image_len: self.header.source_len as usize,
            });
        }

        if node.packed_list_offset != 0 {
            for packed_offset in self.offset_list(node.packed_list_offset)? {
                if packed_offset == 0 {
                    return Err(GraphError::InvalidArgument(format!(
                        "packed list at {} holds sentinel 0",
                        node.packed_list_offset
                    )));
                }
                self.check_packed(packed_offset)?;
            }
        }
        self.check_properties(node.properties_list_offset)
    }

    fn check_packed(&mut self, offset: u32) -> Result<()> {
        self.check_record_offset(offset, "packed node")?;
        let packed = read_record::<PackedNode>(self.data, offset)?;

        if packed.child_list_offset != 0 {
            for child_offset in self.offset_list(packed.child_list_offset)? {
                // 0 is the deleted-child sentinel
                if child_offset != 0 {
                    self.check_node(child_offset)?;
                }
            }
        }
        if packed.cpg_edges_list_offset != 0 {
            for edge_offset in self.offset_list(packed.cpg_edges_list_offset)? {
                if edge_offset == 0 {
                    return Err(GraphError::InvalidArgument(format!(
                        "edge list at {} holds sentinel 0",
                        packed.cpg_edges_list_offset
                    )));
                }
                self.check_edge(edge_offset)?;
            }
        }
        Ok(())
    }

    fn check_edge(&mut self, offset: u32) -> Result<()> {
        self.check_record_offset(offset, "CPG edge")?;
        let edge = read_record::<CpgEdge>(self.data, offset)?;
        EdgeKind::try_from(edge.edge_kind)?;
        if edge.target_node_offset != 0 {
            self.check_node(edge.target_node_offset)?;
        }
        self.check_properties(edge.properties_list_offset)
    }

    fn check_properties(&self, list_offset: u32) -> Result<()> {
        if list_offset == 0 {
            return Ok(());
        }
        self.check_record_offset(list_offset, "property list")?;
        let count = read_record::<u32>(self.data, list_offset)?;
        for index in 0..count {
            let record_offset = list_offset + 4 + index * mem::size_of::<Property>() as u32;
            let property = read_record::<Property>(self.data, record_offset)?;
            self.check_string(property.key_offset)?;
            self.check_value(property.value_offset)?;
        }
        Ok(())
    }

    fn check_string(&self, offset: u32) -> Result<()> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(GraphError::OutOfRange {
                offset,
                length: 1,
                image_len: self.data.len(),
            });
        }
        let tail = &self.data[start..];
        let nul = memchr::memchr(0, tail).ok_or(GraphError::Unterminated { offset })?;
        std::str::from_utf8(&tail[..nul])
            .map(|_| ())
            .map_err(|_| GraphError::InvalidUtf8 { offset })
    }

    fn check_value(&self, offset: u32) -> Result<()> {
        self.check_record_offset(offset, "value")?;
        let value = read_record::<ValueHeader>(self.data, offset)?;
        let kind = ValueKind::try_from(value.value_kind)?;
        if let Some(expected) = kind.fixed_payload_len() {
            if value.value_byte_length as usize != expected {
                return Err(GraphError::InvalidArgument(format!(
                    "{:?} value at offset {} declares {} payload bytes, expected {}",
                    kind, offset, value.value_byte_length, expected
                )));
            }
        }
        let payload_start = offset as u64 + 8;
        let payload_end = payload_start + value.value_byte_length as u64;
        if payload_end > self.data.len() as u64 {
            return Err(GraphError::OutOfRange {
                offset,
                length: value.value_byte_length,
                image_len: self.data.len(),
            });
        }
        if kind == ValueKind::String {
            let payload =
                &self.data[payload_start as usize..payload_end as usize];
            std::str::from_utf8(payload)
                .map_err(|_| GraphError::InvalidUtf8 { offset })?;
        }
        Ok(())
    }

    fn check_interval_index(&self, offset: u32) -> Result<()> {
        self.check_record_offset(offset, "interval index")?;
        let count = read_record::<u32>(self.data, offset)?;
        let mut previous_start = 0u32;
        for index in 0..count {
            let entry_offset = offset + 4 + index * mem::size_of::<IntervalEntry>() as u32;
            let entry = read_record::<IntervalEntry>(self.data, entry_offset)?;
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
            if entry.node_offset != 0 {
                self.check_record_offset(entry.node_offset, "indexed node")?;
            }
        }
        Ok(())
    }
}
