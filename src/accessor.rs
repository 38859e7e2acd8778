//! Borrow-scoped views over graph records
//!
//! Accessors are lightweight `Copy` views that wrap a borrow of the
//! [`Buffer`] and a record copied out of the image. Fields materialize on
//! demand through bounds-checked reads; nothing is allocated on the heap and
//! no view can outlive its buffer.
//!
//! Collections wrap a list span borrowed from the image: packed-node, child,
//! and edge lists hold 32-bit record offsets; property lists hold inline
//! 8-byte [`Property`] records. Iteration order is always the builder's
//! emission order. An absent list (offset 0) and a present list with count 0
//! behave identically.

use crate::buffer::Buffer;
use crate::error::{GraphError, Result};
use crate::schema::{CpgEdge, EdgeKind, PackedNode, Property, SymbolNode};
use crate::value::Value;

/// Borrow the u32 element span of an offset list, treating offset 0 as empty
fn offset_list_span(buffer: &Buffer, offset: u32) -> Result<&[u8]> {
    if offset == 0 {
        Ok(&[])
    } else {
        buffer.list_span(offset, 4)
    }
}

/// Read the u32 element at `index` of a list span
fn span_offset_at(entries: &[u8], index: u32, image_len: usize) -> Result<u32> {
    let start = (index as usize) * 4;
    let bytes = entries
        .get(start..start + 4)
        .ok_or(GraphError::OutOfRange {
            offset: start as u32,
            length: 4,
            image_len,
        })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Linear scan of a property list for `key`, in emission order
fn scan_property<'g>(
    buffer: &'g Buffer,
    list_offset: u32,
    key: &str,
) -> Result<Option<Value<'g>>> {
    let properties = PropertyList::read(buffer, list_offset)?;
    for property in properties.iter() {
        let property = property?;
        if property.key()? == key {
            return Ok(Some(property.value()?));
        }
    }
    Ok(None)
}

/// View of one symbol node
///
/// The SPPF parent for a grammar-symbol instance: identity, source span,
/// derivations (packed nodes), and properties.
#[derive(Debug, Clone, Copy)]
pub struct SymbolNodeView<'g> {
    buffer: &'g Buffer,
    offset: u32,
    record: SymbolNode,
}

impl<'g> SymbolNodeView<'g> {
    /// Materialize the node record stored at `offset`
    pub(crate) fn read(buffer: &'g Buffer, offset: u32) -> Result<Self> {
        let record: SymbolNode = buffer.read_record(offset)?;
        Ok(Self {
            buffer,
            offset,
            record,
        })
    }

    /// Image offset of this record
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Opaque grammar-symbol identifier
    pub fn symbol_id(&self) -> u16 {
        self.record.symbol_id
    }

    /// Semantic node-type tag
    pub fn node_type(&self) -> u16 {
        self.record.node_type
    }

    /// First source byte covered by this node
    pub fn source_start(&self) -> u32 {
        self.record.source_start
    }

    /// Number of source bytes covered
    pub fn source_length(&self) -> u32 {
        self.record.source_length
    }

    /// One past the last source byte covered
    pub fn source_end(&self) -> u32 {
        self.record.source_start + self.record.source_length
    }

    /// True when this symbol has two or more derivations at its span
    pub fn is_ambiguous(&self) -> Result<bool> {
        Ok(self.packed_nodes()?.len() > 1)
    }

    /// The derivations of this symbol, in emission order
    pub fn packed_nodes(&self) -> Result<PackedNodeList<'g>> {
        Ok(PackedNodeList {
            buffer: self.buffer,
            entries: offset_list_span(self.buffer, self.record.packed_list_offset)?,
        })
    }

    /// The properties attached to this node, in emission order
    pub fn properties(&self) -> Result<PropertyList<'g>> {
        PropertyList::read(self.buffer, self.record.properties_list_offset)
    }

    /// Look up a property by key; `Ok(None)` when the key is absent
    pub fn try_property(&self, key: &str) -> Result<Option<Value<'g>>> {
        scan_property(self.buffer, self.record.properties_list_offset, key)
    }

    /// Look up a property by key, failing with [`GraphError::NotFound`]
    /// when absent
    pub fn property(&self, key: &str) -> Result<Value<'g>> {
        self.try_property(key)?
            .ok_or_else(|| GraphError::NotFound(format!("property \"{}\"", key)))
    }

    /// Borrow the source text covered by this node's span
    pub fn source_text(&self) -> Result<&'g str> {
        let header = self.buffer.header();
        let within_source = self
            .record
            .source_start
            .checked_add(self.record.source_length)
            .is_some_and(|end| end <= header.source_len);
        if !within_source {
            return Err(GraphError::OutOfRange {
                offset: self.record.source_start,
                length: self.record.source_length,
                image_len: header.source_len as usize,
            });
        }
        let absolute = header.source_offset + self.record.source_start;
        let bytes = self.buffer.slice(absolute, self.record.source_length)?;
        std::str::from_utf8(bytes).map_err(|_| GraphError::InvalidUtf8 { offset: absolute })
    }
}

/// View of one packed node (a single derivation)
#[derive(Debug, Clone, Copy)]
pub struct PackedNodeView<'g> {
    buffer: &'g Buffer,
    offset: u32,
    record: PackedNode,
}

impl<'g> PackedNodeView<'g> {
    pub(crate) fn read(buffer: &'g Buffer, offset: u32) -> Result<Self> {
        let record: PackedNode = buffer.read_record(offset)?;
        Ok(Self {
            buffer,
            offset,
            record,
        })
    }

    /// Image offset of this record
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Opaque grammar-rule identifier of this derivation
    pub fn rule_id(&self) -> u16 {
        self.record.rule_id
    }

    /// Child symbol nodes of this derivation, in emission order
    ///
    /// Entries may be the sentinel offset 0 (a deleted child); `get` reports
    /// those as [`GraphError::NotFound`], while [`SymbolNodeList::offset_at`]
    /// exposes them raw.
    pub fn children(&self) -> Result<SymbolNodeList<'g>> {
        Ok(SymbolNodeList {
            buffer: self.buffer,
            entries: offset_list_span(self.buffer, self.record.child_list_offset)?,
        })
    }

    /// CPG edges scoped to this derivation, in emission order
    pub fn edges(&self) -> Result<CpgEdgeList<'g>> {
        Ok(CpgEdgeList {
            buffer: self.buffer,
            entries: offset_list_span(self.buffer, self.record.cpg_edges_list_offset)?,
        })
    }
}

/// View of one CPG edge
#[derive(Debug, Clone, Copy)]
pub struct CpgEdgeView<'g> {
    buffer: &'g Buffer,
    offset: u32,
    record: CpgEdge,
}

impl<'g> CpgEdgeView<'g> {
    pub(crate) fn read(buffer: &'g Buffer, offset: u32) -> Result<Self> {
        let record: CpgEdge = buffer.read_record(offset)?;
        Ok(Self {
            buffer,
            offset,
            record,
        })
    }

    /// Image offset of this record
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The decoded edge kind; unknown tags are [`GraphError::InvalidArgument`]
    pub fn kind(&self) -> Result<EdgeKind> {
        EdgeKind::try_from(self.record.edge_kind)
    }

    /// The raw kind tag as stored
    pub fn raw_kind(&self) -> u16 {
        self.record.edge_kind
    }

    /// Offset of the target symbol node (0 after the target was deleted)
    pub fn target_offset(&self) -> u32 {
        self.record.target_node_offset
    }

    /// Materialize the target symbol node
    pub fn target(&self) -> Result<SymbolNodeView<'g>> {
        if self.record.target_node_offset == 0 {
            return Err(GraphError::NotFound(format!(
                "edge at offset {} has no target",
                self.offset
            )));
        }
        SymbolNodeView::read(self.buffer, self.record.target_node_offset)
    }

    /// The properties attached to this edge, in emission order
    pub fn properties(&self) -> Result<PropertyList<'g>> {
        PropertyList::read(self.buffer, self.record.properties_list_offset)
    }

    /// Look up an edge property by key; `Ok(None)` when absent
    pub fn try_property(&self, key: &str) -> Result<Option<Value<'g>>> {
        scan_property(self.buffer, self.record.properties_list_offset, key)
    }
}

/// View of one key/value property
#[derive(Debug, Clone, Copy)]
pub struct PropertyView<'g> {
    buffer: &'g Buffer,
    record: Property,
}

impl<'g> PropertyView<'g> {
    /// Borrow the interned key string
    pub fn key(&self) -> Result<&'g str> {
        self.buffer.read_cstring(self.record.key_offset)
    }

    /// Decode the value view
    pub fn value(&self) -> Result<Value<'g>> {
        Value::read(self.buffer, self.record.value_offset)
    }
}

/// Collection of packed-node offsets under one symbol node
#[derive(Debug, Clone, Copy)]
pub struct PackedNodeList<'g> {
    buffer: &'g Buffer,
    entries: &'g [u8],
}

impl<'g> PackedNodeList<'g> {
    /// Number of derivations
    pub fn len(&self) -> u32 {
        (self.entries.len() / 4) as u32
    }

    /// True when there are no derivations
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw record offset at `index`
    pub fn offset_at(&self, index: u32) -> Result<u32> {
        span_offset_at(self.entries, index, self.buffer.len())
    }

    /// Materialize the derivation at `index`
    pub fn get(&self, index: u32) -> Result<PackedNodeView<'g>> {
        PackedNodeView::read(self.buffer, self.offset_at(index)?)
    }

    /// Iterate derivations in emission order
    pub fn iter(&self) -> PackedNodeIter<'g> {
        PackedNodeIter {
            list: *self,
            index: 0,
        }
    }
}

/// Iterator over a [`PackedNodeList`]
pub struct PackedNodeIter<'g> {
    list: PackedNodeList<'g>,
    index: u32,
}

impl<'g> Iterator for PackedNodeIter<'g> {
    type Item = Result<PackedNodeView<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.list.len() {
            return None;
        }
        let item = self.list.get(self.index);
        self.index += 1;
        Some(item)
    }
}

/// Collection of child symbol-node offsets under one packed node
#[derive(Debug, Clone, Copy)]
pub struct SymbolNodeList<'g> {
    buffer: &'g Buffer,
    entries: &'g [u8],
}

impl<'g> SymbolNodeList<'g> {
    /// Number of child slots (deleted children still occupy a slot)
    pub fn len(&self) -> u32 {
        (self.entries.len() / 4) as u32
    }

    /// True when there are no child slots
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw child offset at `index`; 0 marks a deleted child
    pub fn offset_at(&self, index: u32) -> Result<u32> {
        span_offset_at(self.entries, index, self.buffer.len())
    }

    /// Materialize the child at `index`
    ///
    /// A sentinel-0 slot is reported as [`GraphError::NotFound`].
    pub fn get(&self, index: u32) -> Result<SymbolNodeView<'g>> {
        let offset = self.offset_at(index)?;
        if offset == 0 {
            return Err(GraphError::NotFound(format!(
                "child slot {} is deleted",
                index
            )));
        }
        SymbolNodeView::read(self.buffer, offset)
    }

    /// Iterate present children in emission order, skipping deleted slots
    pub fn iter(&self) -> SymbolNodeIter<'g> {
        SymbolNodeIter {
            list: *self,
            index: 0,
        }
    }
}

/// Iterator over a [`SymbolNodeList`], skipping deleted (sentinel 0) slots
pub struct SymbolNodeIter<'g> {
    list: SymbolNodeList<'g>,
    index: u32,
}

impl<'g> Iterator for SymbolNodeIter<'g> {
    type Item = Result<SymbolNodeView<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.list.len() {
            let index = self.index;
            self.index += 1;
            match self.list.offset_at(index) {
                Ok(0) => continue,
                Ok(offset) => return Some(SymbolNodeView::read(self.list.buffer, offset)),
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Collection of CPG-edge offsets under one packed node
#[derive(Debug, Clone, Copy)]
pub struct CpgEdgeList<'g> {
    buffer: &'g Buffer,
    entries: &'g [u8],
}

impl<'g> CpgEdgeList<'g> {
    /// Number of edges
    pub fn len(&self) -> u32 {
        (self.entries.len() / 4) as u32
    }

    /// True when there are no edges
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw record offset at `index`
    pub fn offset_at(&self, index: u32) -> Result<u32> {
        span_offset_at(self.entries, index, self.buffer.len())
    }

    /// Materialize the edge at `index`
    pub fn get(&self, index: u32) -> Result<CpgEdgeView<'g>> {
        CpgEdgeView::read(self.buffer, self.offset_at(index)?)
    }

    /// Iterate edges in emission order
    pub fn iter(&self) -> CpgEdgeIter<'g> {
        CpgEdgeIter {
            list: *self,
            index: 0,
        }
    }

    /// Iterate only the edges of `kind`, preserving relative order
    pub fn of_kind(&self, kind: EdgeKind) -> FilteredEdgeIter<'g> {
        FilteredEdgeIter {
            inner: self.iter(),
            kind,
        }
    }
}

/// Iterator over a [`CpgEdgeList`]
pub struct CpgEdgeIter<'g> {
    list: CpgEdgeList<'g>,
    index: u32,
}

impl<'g> Iterator for CpgEdgeIter<'g> {
    type Item = Result<CpgEdgeView<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.list.len() {
            return None;
        }
        let item = self.list.get(self.index);
        self.index += 1;
        Some(item)
    }
}

/// Kind-filtered iterator over a [`CpgEdgeList`]
///
/// Skips edges whose kind differs from the requested one; read failures are
/// still surfaced.
pub struct FilteredEdgeIter<'g> {
    inner: CpgEdgeIter<'g>,
    kind: EdgeKind,
}

impl<'g> Iterator for FilteredEdgeIter<'g> {
    type Item = Result<CpgEdgeView<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.inner.by_ref() {
            match item {
                Ok(edge) if edge.raw_kind() == self.kind as u16 => return Some(Ok(edge)),
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Collection of inline 8-byte property records
#[derive(Debug, Clone, Copy)]
pub struct PropertyList<'g> {
    buffer: &'g Buffer,
    entries: &'g [u8],
}

impl<'g> PropertyList<'g> {
    /// Borrow the property list at `offset`, treating 0 as empty
    pub(crate) fn read(buffer: &'g Buffer, offset: u32) -> Result<Self> {
        let entries = if offset == 0 {
            &[]
        } else {
            buffer.list_span(offset, std::mem::size_of::<Property>())?
        };
        Ok(Self { buffer, entries })
    }

    /// Number of properties
    pub fn len(&self) -> u32 {
        (self.entries.len() / std::mem::size_of::<Property>()) as u32
    }

    /// True when there are no properties
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The property at `index`
    pub fn get(&self, index: u32) -> Result<PropertyView<'g>> {
        let start = (index as usize) * std::mem::size_of::<Property>();
        let bytes = self
            .entries
            .get(start..start + std::mem::size_of::<Property>())
            .ok_or(GraphError::OutOfRange {
                offset: start as u32,
                length: std::mem::size_of::<Property>() as u32,
                image_len: self.buffer.len(),
            })?;
        let record = Property {
            key_offset: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            value_offset: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        };
        Ok(PropertyView {
            buffer: self.buffer,
            record,
        })
    }

    /// Iterate properties in emission order
    pub fn iter(&self) -> PropertyIter<'g> {
        PropertyIter {
            list: *self,
            index: 0,
        }
    }
}

/// Iterator over a [`PropertyList`]
pub struct PropertyIter<'g> {
    list: PropertyList<'g>,
    index: u32,
}

impl<'g> Iterator for PropertyIter<'g> {
    type Item = Result<PropertyView<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.list.len() {
            return None;
        }
        let item = self.list.get(self.index);
        self.index += 1;
        Some(item)
    }
}
