//! Queued edits over an existing graph, rebuilt into a new image
//!
//! The image format is immutable, so an editor never modifies bytes in
//! place: it queues operations keyed by node offsets in the source image and
//! [`GraphEditor::commit`] replays the whole graph through a fresh
//! [`GraphBuilder`], applying each operation where its target is reached.
//!
//! The rebuild is a depth-first traversal from the root. Children are
//! emitted before their parents (append order requires it); shared subtrees
//! are emitted once and referenced by their new offset; deleted nodes become
//! the sentinel offset 0 in their parents' child lists. CPG edges that point
//! forward or form cycles are written with a placeholder target and patched
//! once the target's new offset is known; targets that do not survive the
//! rebuild stay 0.

use crate::accessor::PropertyList;
use crate::builder::GraphBuilder;
use crate::error::Result;
use crate::graph::Graph;
use crate::value::PropertyValue;
use rustc_hash::{FxHashMap, FxHashSet};

/// Field set for an inserted or replacing node
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Opaque grammar-symbol identifier
    pub symbol_id: u16,
    /// Semantic node-type tag
    pub node_type: u16,
    /// First source byte covered
    pub source_start: u32,
    /// Number of source bytes covered
    pub source_length: u32,
    /// Properties in emission order
    pub properties: Vec<(String, PropertyValue)>,
}

impl NodeSpec {
    /// A spec with the four scalar fields and no properties
    pub fn new(symbol_id: u16, node_type: u16, source_start: u32, source_length: u32) -> Self {
        Self {
            symbol_id,
            node_type,
            source_start,
            source_length,
            properties: Vec::new(),
        }
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push((key.into(), value));
        self
    }
}

#[derive(Debug, Clone)]
enum EditOp {
    Replace(NodeSpec),
    Delete,
    Move { start: u32, length: u32 },
    UpdateProperty { key: String, value: PropertyValue },
    RemoveProperty { key: String },
}

/// Queues operations against a source graph and emits a new image
///
/// # Examples
///
/// ```
/// use cognigraph::{Graph, GraphBuilder, GraphEditor, PropertyValue};
///
/// let mut builder = GraphBuilder::new();
/// let root = builder.write_symbol_node(1, 1, 0, 5, &[], &[])?;
/// let graph = Graph::from_bytes(builder.build(root, "hello")?)?;
///
/// let mut editor = GraphEditor::new(&graph);
/// editor.update_property(root, "checked", PropertyValue::Bool(true));
/// let edited = Graph::from_bytes(editor.commit()?)?;
/// assert_eq!(edited.root()?.property("checked")?.as_bool()?, true);
/// # Ok::<(), cognigraph::GraphError>(())
/// ```
pub struct GraphEditor<'g> {
    graph: &'g Graph,
    /// Operations per source-node offset, in queue order
    ops: FxHashMap<u32, Vec<EditOp>>,
    /// Pending insertions per parent offset; 0 keys top-level additions
    inserts: FxHashMap<u32, Vec<NodeSpec>>,
}

impl<'g> GraphEditor<'g> {
    /// Create an editor over `graph`
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            ops: FxHashMap::default(),
            inserts: FxHashMap::default(),
        }
    }

    /// Schedule a new node under `parent_offset` (0 = top-level addition)
    ///
    /// The node joins the parent's first derivation; a parent without
    /// derivations gains one. Top-level additions are emitted into the image
    /// without a referencing child list.
    pub fn insert_node(&mut self, parent_offset: u32, spec: NodeSpec) {
        self.inserts.entry(parent_offset).or_default().push(spec);
    }

    /// Replace the fields and properties of the node at `target` wholesale
    pub fn replace_node(&mut self, target: u32, spec: NodeSpec) {
        self.push_op(target, EditOp::Replace(spec));
    }

    /// Omit the node at `target` from the rebuilt image
    ///
    /// Parents keep a sentinel-0 slot where the node used to be; edges that
    /// pointed at it are re-targeted to 0.
    pub fn delete_node(&mut self, target: u32) {
        self.push_op(target, EditOp::Delete);
    }

    /// Change only the source span of the node at `target`
    pub fn move_node(&mut self, target: u32, new_start: u32, new_length: u32) {
        self.push_op(
            target,
            EditOp::Move {
                start: new_start,
                length: new_length,
            },
        );
    }

    /// Overwrite (or add) a single property of the node at `target`
    pub fn update_property(&mut self, target: u32, key: impl Into<String>, value: PropertyValue) {
        self.push_op(
            target,
            EditOp::UpdateProperty {
                key: key.into(),
                value,
            },
        );
    }

    /// Remove a single property of the node at `target`
    pub fn remove_property(&mut self, target: u32, key: impl Into<String>) {
        self.push_op(target, EditOp::RemoveProperty { key: key.into() });
    }

    fn push_op(&mut self, target: u32, op: EditOp) {
        self.ops.entry(target).or_default().push(op);
    }

    /// Rebuild the source graph with every queued operation applied and
    /// return the new image
    pub fn commit(self) -> Result<Vec<u8>> {
        let header = self.graph.header();

        let mut builder = GraphBuilder::new();
        builder.set_flags(header.flags);
        if header.interval_index_offset != 0 {
            builder.enable_spatial_index();
        }

        let mut rebuild = Rebuild {
            graph: self.graph,
            ops: &self.ops,
            inserts: &self.inserts,
            builder,
            remap: FxHashMap::default(),
            visiting: FxHashSet::default(),
            fixups: Vec::new(),
        };

        let new_root = if header.root_offset != 0 {
            rebuild.node(header.root_offset)?
        } else {
            0
        };

        // Top-level additions live in the image unreferenced
        if let Some(specs) = self.inserts.get(&0) {
            for spec in specs {
                rebuild.write_spec(spec)?;
            }
        }

        // Forward and cyclic references resolve now that every surviving
        // node has a new offset
        let fixups = std::mem::take(&mut rebuild.fixups);
        for (position, old_target) in fixups {
            let new_target = rebuild.remap.get(&old_target).copied().unwrap_or(0);
            rebuild.builder.patch_u32(position, new_target)?;
        }

        let source_text = self.graph.source_text()?;
        rebuild.builder.build(new_root, source_text)
    }
}

/// One depth-first replay of the source graph into a builder
struct Rebuild<'g, 'e> {
    graph: &'g Graph,
    ops: &'e FxHashMap<u32, Vec<EditOp>>,
    inserts: &'e FxHashMap<u32, Vec<NodeSpec>>,
    builder: GraphBuilder,
    /// Old offset -> new offset (0 for deleted nodes)
    remap: FxHashMap<u32, u32>,
    /// Nodes currently on the traversal stack (cycle detection)
    visiting: FxHashSet<u32>,
    /// (image position of a u32 reference, old target offset) to patch last
    fixups: Vec<(u32, u32)>,
}

impl Rebuild<'_, '_> {
    fn is_deleted(&self, offset: u32) -> bool {
        self.ops
            .get(&offset)
            .is_some_and(|ops| ops.iter().any(|op| matches!(op, EditOp::Delete)))
    }

    /// Map an already-known reference, or record a fixup for one that is
    /// still being rebuilt higher up the stack
    fn resolve_reference(&mut self, old_offset: u32) -> Result<(u32, bool)> {
        if old_offset == 0 {
            return Ok((0, false));
        }
        if let Some(&mapped) = self.remap.get(&old_offset) {
            return Ok((mapped, false));
        }
        if self.visiting.contains(&old_offset) {
            return Ok((0, true));
        }
        Ok((self.node(old_offset)?, false))
    }

    /// Rebuild the node at `old_offset`; returns its new offset (0 when the
    /// node is deleted)
    fn node(&mut self, old_offset: u32) -> Result<u32> {
        if let Some(&mapped) = self.remap.get(&old_offset) {
            return Ok(mapped);
        }
        if self.is_deleted(old_offset) {
            self.remap.insert(old_offset, 0);
            return Ok(0);
        }
        self.visiting.insert(old_offset);

        let graph = self.graph;
        let view = graph.node_at(old_offset)?;

        // New children queued for this node are fresh leaves; emit them
        // first so the first derivation can reference them
        let inserts = self.inserts;
        let mut inserted = Vec::new();
        if let Some(specs) = inserts.get(&old_offset) {
            for spec in specs {
                inserted.push(self.write_spec(spec)?);
            }
        }

        let mut packed_offsets = Vec::new();
        let source_packed = view.packed_nodes()?;
        for index in 0..source_packed.len() {
            let packed = source_packed.get(index)?;

            let children = packed.children()?;
            let mut child_values = Vec::new();
            let mut child_fixups = Vec::new();
            for child_index in 0..children.len() {
                let old_child = children.offset_at(child_index)?;
                let (value, needs_fixup) = self.resolve_reference(old_child)?;
                if needs_fixup {
                    child_fixups.push((child_values.len(), old_child));
                }
                child_values.push(value);
            }
            if index == 0 {
                child_values.extend_from_slice(&inserted);
            }

            let mut edge_offsets = Vec::new();
            for edge in packed.edges()?.iter() {
                let edge = edge?;
                let properties = copy_properties(edge.properties()?)?;
                let property_refs: Vec<(&str, PropertyValue)> = properties
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.clone()))
                    .collect();
                let (target, needs_fixup) = self.resolve_reference(edge.target_offset())?;
                let edge_offset =
                    self.builder
                        .write_cpg_edge(edge.kind()?, target, &property_refs)?;
                if needs_fixup {
                    // target_node_offset sits 4 bytes into the record
                    self.fixups.push((edge_offset + 4, edge.target_offset()));
                }
                edge_offsets.push(edge_offset);
            }

            let child_list_offset = if child_values.is_empty() {
                0
            } else {
                self.builder.write_offset_list(&child_values)?
            };
            for (slot, old_child) in child_fixups {
                self.fixups
                    .push((child_list_offset + 4 + 4 * slot as u32, old_child));
            }
            let edges_list_offset = if edge_offsets.is_empty() {
                0
            } else {
                self.builder.write_offset_list(&edge_offsets)?
            };

            packed_offsets.push(self.builder.write_packed_node_record(
                packed.rule_id(),
                child_list_offset,
                edges_list_offset,
            )?);
        }

        // A parent with no derivations gains one to hold its new children
        if source_packed.is_empty() && !inserted.is_empty() {
            packed_offsets.push(self.builder.write_packed_node(0, &inserted, &[])?);
        }

        // Fields and properties, with this node's queued operations applied
        // in queue order
        let mut symbol_id = view.symbol_id();
        let mut node_type = view.node_type();
        let mut source_start = view.source_start();
        let mut source_length = view.source_length();
        let mut properties = copy_properties(view.properties()?)?;

        if let Some(ops) = self.ops.get(&old_offset) {
            for op in ops {
                match op {
                    EditOp::Replace(spec) => {
                        symbol_id = spec.symbol_id;
                        node_type = spec.node_type;
                        source_start = spec.source_start;
                        source_length = spec.source_length;
                        properties = spec.properties.clone();
                    }
                    EditOp::Move { start, length } => {
                        source_start = *start;
                        source_length = *length;
                    }
                    EditOp::UpdateProperty { key, value } => {
                        match properties.iter_mut().find(|(k, _)| k == key) {
                            Some(slot) => slot.1 = value.clone(),
                            None => properties.push((key.clone(), value.clone())),
                        }
                    }
                    EditOp::RemoveProperty { key } => {
                        properties.retain(|(k, _)| k != key);
                    }
                    EditOp::Delete => {}
                }
            }
        }

        let property_refs: Vec<(&str, PropertyValue)> = properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        let new_offset = self.builder.write_symbol_node(
            symbol_id,
            node_type,
            source_start,
            source_length,
            &packed_offsets,
            &property_refs,
        )?;

        self.visiting.remove(&old_offset);
        self.remap.insert(old_offset, new_offset);
        Ok(new_offset)
    }

    /// Emit a fresh leaf node from a spec
    fn write_spec(&mut self, spec: &NodeSpec) -> Result<u32> {
        let property_refs: Vec<(&str, PropertyValue)> = spec
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        self.builder.write_symbol_node(
            spec.symbol_id,
            spec.node_type,
            spec.source_start,
            spec.source_length,
            &[],
            &property_refs,
        )
    }
}

/// Copy a property list out of the source image into owned pairs
fn copy_properties(list: PropertyList<'_>) -> Result<Vec<(String, PropertyValue)>> {
    let mut properties = Vec::with_capacity(list.len() as usize);
    for property in list.iter() {
        let property = property?;
        properties.push((property.key()?.to_string(), property.value()?.to_property_value()?));
    }
    Ok(properties)
}
