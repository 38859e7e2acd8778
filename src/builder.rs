//! Incremental graph image construction
//!
//! Builders append records in caller order, intern strings, and back-patch
//! the header when [`GraphBuilder::build`] (or [`FileGraphBuilder::finish`])
//! runs. Offsets returned from the write operations are final: finalization
//! never moves a record that has already been emitted.
//!
//! Two variants share one emission core:
//!
//! - [`GraphBuilder`] grows a byte vector and returns the finished image.
//! - [`FileGraphBuilder`] streams records into a buffered file and patches
//!   the header region through a seek. The header magic is only written at
//!   the end, so an interrupted build never leaves a file that validates.
//!
//! Emission rules: every record, list, and value header starts on a 4-byte
//! boundary (zero padding); lists are a u32 count followed by their elements;
//! interned strings and value payloads are packed without padding.

use crate::error::{GraphError, Result};
use crate::interval::IntervalIndex;
use crate::schema::{
    CpgEdge, EdgeKind, Header, PackedNode, Property, SymbolNode, ValueHeader, FLAG_FULLY_PARSED,
    HEADER_SIZE,
};
use crate::value::PropertyValue;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::mem;
use std::path::Path;
use zerocopy::IntoBytes;

/// Destination for emitted image bytes
trait ImageSink {
    /// Append bytes at the current end of the image
    fn append(&mut self, bytes: &[u8]) -> Result<()>;
    /// Current image length
    fn position(&self) -> u32;
    /// Overwrite previously appended bytes
    fn patch(&mut self, offset: u32, bytes: &[u8]) -> Result<()>;
}

/// In-memory sink: the image is a growable byte vector
struct VecSink {
    buf: Vec<u8>,
}

impl VecSink {
    fn new() -> Self {
        // Header region is reserved up front and patched at build time
        Self {
            buf: vec![0u8; HEADER_SIZE],
        }
    }
}

impl ImageSink for VecSink {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn position(&self) -> u32 {
        self.buf.len() as u32
    }

    fn patch(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.buf.len() {
            return Err(GraphError::OutOfRange {
                offset,
                length: bytes.len() as u32,
                image_len: self.buf.len(),
            });
        }
        self.buf[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

/// File sink: records stream through a buffered writer; patches seek back
struct FileSink {
    writer: BufWriter<File>,
    pos: u32,
}

impl FileSink {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| GraphError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        let mut sink = Self {
            writer: BufWriter::new(file),
            pos: 0,
        };
        sink.append(&[0u8; HEADER_SIZE])?;
        Ok(sink)
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl ImageSink for FileSink {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.pos += bytes.len() as u32;
        Ok(())
    }

    fn position(&self) -> u32 {
        self.pos
    }

    fn patch(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        // Seeking flushes the buffer, so patches stay rare: the header once,
        // plus editor fixups
        self.writer.seek(SeekFrom::Start(offset as u64))?;
        self.writer.write_all(bytes)?;
        self.writer.seek(SeekFrom::Start(self.pos as u64))?;
        Ok(())
    }
}

/// Shared emission core for both builder variants
struct Emitter<S: ImageSink> {
    sink: S,
    strings: FxHashMap<String, u32>,
    node_count: u32,
    edge_count: u32,
    flags_override: Option<u16>,
    index: Option<IntervalIndex>,
    auto_index: bool,
    built: bool,
}

impl<S: ImageSink> Emitter<S> {
    fn with_sink(sink: S) -> Self {
        Self {
            sink,
            strings: FxHashMap::default(),
            node_count: 0,
            edge_count: 0,
            flags_override: None,
            index: None,
            auto_index: false,
            built: false,
        }
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.built {
            return Err(GraphError::BuilderState(format!(
                "{} after build completed",
                operation
            )));
        }
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let projected = self.sink.position() as u64 + bytes.len() as u64;
        if projected > u32::MAX as u64 {
            return Err(GraphError::InvalidArgument(
                "image would exceed the 4 GB offset limit".to_string(),
            ));
        }
        self.sink.append(bytes)
    }

    /// Pad with zeros to the next 4-byte boundary
    fn align4(&mut self) -> Result<()> {
        let rem = self.sink.position() % 4;
        if rem != 0 {
            self.append(&[0u8; 4][..(4 - rem) as usize])?;
        }
        Ok(())
    }

    fn intern_string(&mut self, s: &str) -> Result<u32> {
        self.ensure_writable("intern_string")?;
        if let Some(&offset) = self.strings.get(s) {
            return Ok(offset);
        }
        if s.as_bytes().contains(&0) {
            return Err(GraphError::InvalidArgument(
                "interned strings cannot contain NUL".to_string(),
            ));
        }
        let offset = self.sink.position();
        self.append(s.as_bytes())?;
        self.append(&[0])?;
        self.strings.insert(s.to_string(), offset);
        Ok(offset)
    }

    fn write_value(&mut self, value: &PropertyValue) -> Result<u32> {
        self.ensure_writable("write_value")?;
        let mut payload = Vec::new();
        let len = value.encode_payload(&mut payload);
        if len > u32::MAX as usize {
            return Err(GraphError::InvalidArgument(
                "value payload exceeds u32 length".to_string(),
            ));
        }
        self.align4()?;
        let offset = self.sink.position();
        let header = ValueHeader {
            value_kind: value.kind() as u16,
            reserved: 0,
            value_byte_length: len as u32,
        };
        self.append(header.as_bytes())?;
        self.append(&payload)?;
        Ok(offset)
    }

    fn write_offset_list(&mut self, offsets: &[u32]) -> Result<u32> {
        self.ensure_writable("write_offset_list")?;
        if offsets.len() > u32::MAX as usize {
            return Err(GraphError::InvalidArgument(
                "list exceeds u32 count".to_string(),
            ));
        }
        self.align4()?;
        let list_offset = self.sink.position();
        self.append(&(offsets.len() as u32).to_le_bytes())?;
        for &offset in offsets {
            self.append(&offset.to_le_bytes())?;
        }
        Ok(list_offset)
    }

    /// Emit values and keys first, then the inline property record list.
    /// Returns 0 for an empty slice.
    fn write_property_list(&mut self, properties: &[(&str, PropertyValue)]) -> Result<u32> {
        if properties.is_empty() {
            return Ok(0);
        }
        let mut records = Vec::with_capacity(properties.len());
        for (key, value) in properties {
            let key_offset = self.intern_string(key)?;
            let value_offset = self.write_value(value)?;
            records.push(Property {
                key_offset,
                value_offset,
            });
        }
        self.align4()?;
        let list_offset = self.sink.position();
        self.append(&(records.len() as u32).to_le_bytes())?;
        for record in &records {
            self.append(record.as_bytes())?;
        }
        Ok(list_offset)
    }

    fn write_symbol_node(
        &mut self,
        symbol_id: u16,
        node_type: u16,
        source_start: u32,
        source_length: u32,
        packed_offsets: &[u32],
        properties: &[(&str, PropertyValue)],
    ) -> Result<u32> {
        self.ensure_writable("write_symbol_node")?;
        if packed_offsets.contains(&0) {
            return Err(GraphError::InvalidArgument(
                "packed-node offset 0 is not a record".to_string(),
            ));
        }
        let packed_list_offset = if packed_offsets.is_empty() {
            0
        } else {
            self.write_offset_list(packed_offsets)?
        };
        let properties_list_offset = self.write_property_list(properties)?;

        self.align4()?;
        let offset = self.sink.position();
        let record = SymbolNode {
            symbol_id,
            node_type,
            source_start,
            source_length,
            packed_list_offset,
            properties_list_offset,
        };
        self.append(record.as_bytes())?;
        self.node_count += 1;

        if self.auto_index && source_length > 0 {
            if let Some(index) = &mut self.index {
                index.insert(source_start, source_start + source_length - 1, offset)?;
            }
        }
        Ok(offset)
    }

    fn write_packed_node(
        &mut self,
        rule_id: u16,
        child_offsets: &[u32],
        edge_offsets: &[u32],
    ) -> Result<u32> {
        self.ensure_writable("write_packed_node")?;
        if edge_offsets.contains(&0) {
            return Err(GraphError::InvalidArgument(
                "edge offset 0 is not a record".to_string(),
            ));
        }
        // Child offset 0 stays legal: it is the deleted-child sentinel
        let child_list_offset = if child_offsets.is_empty() {
            0
        } else {
            self.write_offset_list(child_offsets)?
        };
        let cpg_edges_list_offset = if edge_offsets.is_empty() {
            0
        } else {
            self.write_offset_list(edge_offsets)?
        };

        self.align4()?;
        let offset = self.sink.position();
        let record = PackedNode {
            rule_id,
            reserved: 0,
            child_list_offset,
            cpg_edges_list_offset,
        };
        self.append(record.as_bytes())?;
        Ok(offset)
    }

    fn write_cpg_edge(
        &mut self,
        kind: EdgeKind,
        target_offset: u32,
        properties: &[(&str, PropertyValue)],
    ) -> Result<u32> {
        self.ensure_writable("write_cpg_edge")?;
        let properties_list_offset = self.write_property_list(properties)?;

        self.align4()?;
        let offset = self.sink.position();
        let record = CpgEdge {
            edge_kind: kind as u16,
            reserved: 0,
            target_node_offset: target_offset,
            properties_list_offset,
        };
        self.append(record.as_bytes())?;
        self.edge_count += 1;
        Ok(offset)
    }

    /// Append only the packed-node record, over lists the caller already
    /// wrote (the editor patches individual child entries afterwards)
    fn write_packed_node_record(
        &mut self,
        rule_id: u16,
        child_list_offset: u32,
        cpg_edges_list_offset: u32,
    ) -> Result<u32> {
        self.ensure_writable("write_packed_node")?;
        self.align4()?;
        let offset = self.sink.position();
        let record = PackedNode {
            rule_id,
            reserved: 0,
            child_list_offset,
            cpg_edges_list_offset,
        };
        self.append(record.as_bytes())?;
        Ok(offset)
    }

    fn patch_u32(&mut self, offset: u32, value: u32) -> Result<()> {
        self.ensure_writable("patch")?;
        self.sink.patch(offset, &value.to_le_bytes())
    }

    fn finalize(&mut self, root_offset: u32, source_text: &str) -> Result<()> {
        self.ensure_writable("build")?;
        if root_offset != 0
            && (root_offset < HEADER_SIZE as u32 || root_offset >= self.sink.position())
        {
            return Err(GraphError::InvalidArgument(format!(
                "root offset {} does not address an emitted record",
                root_offset
            )));
        }
        if source_text.len() > u32::MAX as usize {
            return Err(GraphError::InvalidArgument(
                "source text exceeds u32 length".to_string(),
            ));
        }

        let source_offset = self.sink.position();
        self.append(source_text.as_bytes())?;

        let interval_index_offset = match self.index.take() {
            Some(index) => {
                self.align4()?;
                let offset = self.sink.position();
                self.append(&index.to_bytes())?;
                offset
            }
            None => 0,
        };

        let header = Header {
            magic: crate::schema::MAGIC,
            version: crate::schema::FORMAT_VERSION,
            flags: self.flags_override.unwrap_or(FLAG_FULLY_PARSED),
            root_offset,
            node_count: self.node_count,
            edge_count: self.edge_count,
            source_len: source_text.len() as u32,
            source_offset,
            interval_index_offset,
        };
        self.sink.patch(0, header.as_bytes())?;
        self.built = true;
        Ok(())
    }
}

/// Incremental in-memory image builder
///
/// Records are appended in caller order; each write operation returns the
/// final image offset of the record it emitted. Lists referenced by a record
/// are written immediately before it, so the returned offset is the
/// post-list position readers expect.
///
/// # Example
///
/// ```
/// use cognigraph::{Graph, GraphBuilder, PropertyValue};
///
/// let mut builder = GraphBuilder::new();
/// let root = builder.write_symbol_node(
///     1,
///     100,
///     0,
///     11,
///     &[],
///     &[("Value", PropertyValue::String("hello world".to_string()))],
/// )?;
/// let image = builder.build(root, "hello world")?;
///
/// let graph = Graph::from_bytes(image)?;
/// assert_eq!(graph.root()?.symbol_id(), 1);
/// # Ok::<(), cognigraph::GraphError>(())
/// ```
pub struct GraphBuilder {
    inner: Emitter<VecSink>,
}

impl GraphBuilder {
    /// Create a builder with the header region reserved
    pub fn new() -> Self {
        Self {
            inner: Emitter::with_sink(VecSink::new()),
        }
    }

    /// Intern a string, appending it on first use; returns its offset
    pub fn intern_string(&mut self, s: &str) -> Result<u32> {
        self.inner.intern_string(s)
    }

    /// Append a value header and payload; returns the value offset
    pub fn write_value(&mut self, value: &PropertyValue) -> Result<u32> {
        self.inner.write_value(value)
    }

    /// Append a count-prefixed u32 list; returns the list offset
    pub fn write_offset_list(&mut self, offsets: &[u32]) -> Result<u32> {
        self.inner.write_offset_list(offsets)
    }

    /// Append a symbol node (and its packed/property lists); returns its
    /// offset
    pub fn write_symbol_node(
        &mut self,
        symbol_id: u16,
        node_type: u16,
        source_start: u32,
        source_length: u32,
        packed_offsets: &[u32],
        properties: &[(&str, PropertyValue)],
    ) -> Result<u32> {
        self.inner.write_symbol_node(
            symbol_id,
            node_type,
            source_start,
            source_length,
            packed_offsets,
            properties,
        )
    }

    /// Append a packed node (and its child/edge lists); returns its offset
    pub fn write_packed_node(
        &mut self,
        rule_id: u16,
        child_offsets: &[u32],
        edge_offsets: &[u32],
    ) -> Result<u32> {
        self.inner.write_packed_node(rule_id, child_offsets, edge_offsets)
    }

    /// Append a CPG edge (and its property list); returns its offset
    pub fn write_cpg_edge(
        &mut self,
        kind: EdgeKind,
        target_offset: u32,
        properties: &[(&str, PropertyValue)],
    ) -> Result<u32> {
        self.inner.write_cpg_edge(kind, target_offset, properties)
    }

    /// Override the header flags (default: `FLAG_FULLY_PARSED`)
    pub fn set_flags(&mut self, flags: u16) {
        self.inner.flags_override = Some(flags);
    }

    /// Record every subsequent symbol node's source span in the image's
    /// interval index
    pub fn enable_spatial_index(&mut self) {
        if self.inner.index.is_none() {
            self.inner.index = Some(IntervalIndex::new());
        }
        self.inner.auto_index = true;
    }

    /// Install an explicit interval index to serialize at build time
    pub fn set_interval_index(&mut self, index: IntervalIndex) {
        self.inner.index = Some(index);
    }

    /// Overwrite a previously written u32 field (editor fixups)
    pub(crate) fn patch_u32(&mut self, offset: u32, value: u32) -> Result<()> {
        self.inner.patch_u32(offset, value)
    }

    /// Append a packed-node record over pre-written lists (editor rebuild)
    pub(crate) fn write_packed_node_record(
        &mut self,
        rule_id: u16,
        child_list_offset: u32,
        cpg_edges_list_offset: u32,
    ) -> Result<u32> {
        self.inner
            .write_packed_node_record(rule_id, child_list_offset, cpg_edges_list_offset)
    }

    /// Finalize the image: append the source text and optional interval
    /// index, back-patch the header, and return the bytes
    ///
    /// # Errors
    ///
    /// [`GraphError::BuilderState`] when called twice;
    /// [`GraphError::InvalidArgument`] when `root_offset` does not address an
    /// emitted record.
    pub fn build(&mut self, root_offset: u32, source_text: &str) -> Result<Vec<u8>> {
        self.inner.finalize(root_offset, source_text)?;
        Ok(mem::take(&mut self.inner.sink.buf))
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// File-backed image builder
///
/// Streams records into a buffered writer instead of growing a vector;
/// only the header region is revisited, through a seek, once `finish` runs.
/// Until then the file starts with zeros, which no reader accepts, so an
/// interrupted build cannot leave a valid image behind.
///
/// # Example
///
/// ```no_run
/// use cognigraph::{FileGraphBuilder, Graph};
///
/// let mut builder = FileGraphBuilder::create("forest.cpg")?;
/// let root = builder.write_symbol_node(1, 100, 0, 5, &[], &[("k", cognigraph::PropertyValue::Bool(true))])?;
/// builder.finish(root, "hello")?;
///
/// let graph = Graph::open("forest.cpg")?;
/// assert_eq!(graph.stats().node_count, 1);
/// # Ok::<(), cognigraph::GraphError>(())
/// ```
pub struct FileGraphBuilder {
    inner: Emitter<FileSink>,
}

impl FileGraphBuilder {
    /// Create the output file and reserve its header region
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            inner: Emitter::with_sink(FileSink::create(path.as_ref())?),
        })
    }

    /// Intern a string, appending it on first use; returns its offset
    pub fn intern_string(&mut self, s: &str) -> Result<u32> {
        self.inner.intern_string(s)
    }

    /// Append a value header and payload; returns the value offset
    pub fn write_value(&mut self, value: &PropertyValue) -> Result<u32> {
        self.inner.write_value(value)
    }

    /// Append a count-prefixed u32 list; returns the list offset
    pub fn write_offset_list(&mut self, offsets: &[u32]) -> Result<u32> {
        self.inner.write_offset_list(offsets)
    }

    /// Append a symbol node (and its packed/property lists); returns its
    /// offset
    pub fn write_symbol_node(
        &mut self,
        symbol_id: u16,
        node_type: u16,
        source_start: u32,
        source_length: u32,
        packed_offsets: &[u32],
        properties: &[(&str, PropertyValue)],
    ) -> Result<u32> {
        self.inner.write_symbol_node(
            symbol_id,
            node_type,
            source_start,
            source_length,
            packed_offsets,
            properties,
        )
    }

    /// Append a packed node (and its child/edge lists); returns its offset
    pub fn write_packed_node(
        &mut self,
        rule_id: u16,
        child_offsets: &[u32],
        edge_offsets: &[u32],
    ) -> Result<u32> {
        self.inner.write_packed_node(rule_id, child_offsets, edge_offsets)
    }

    /// Append a CPG edge (and its property list); returns its offset
    pub fn write_cpg_edge(
        &mut self,
        kind: EdgeKind,
        target_offset: u32,
        properties: &[(&str, PropertyValue)],
    ) -> Result<u32> {
        self.inner.write_cpg_edge(kind, target_offset, properties)
    }

    /// Override the header flags (default: `FLAG_FULLY_PARSED`)
    pub fn set_flags(&mut self, flags: u16) {
        self.inner.flags_override = Some(flags);
    }

    /// Record every subsequent symbol node's source span in the image's
    /// interval index
    pub fn enable_spatial_index(&mut self) {
        if self.inner.index.is_none() {
            self.inner.index = Some(IntervalIndex::new());
        }
        self.inner.auto_index = true;
    }

    /// Install an explicit interval index to serialize at build time
    pub fn set_interval_index(&mut self, index: IntervalIndex) {
        self.inner.index = Some(index);
    }

    /// Finalize the file: append the trailing sections, back-patch the
    /// header, flush, and sync to disk
    pub fn finish(&mut self, root_offset: u32, source_text: &str) -> Result<()> {
        self.inner.finalize(root_offset, source_text)?;
        self.inner.sink.sync()
    }
}
