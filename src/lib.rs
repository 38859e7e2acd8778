//! Cognigraph - Persistent Zero-Copy Parse Forests with a CPG Overlay
//!
//! Cognigraph stores the complete result of parsing a source text - every
//! syntactic ambiguity of the shared packed parse forest (SPPF), the code
//! property graph (CPG) edges derived from it, and arbitrary per-node and
//! per-edge metadata - in one self-describing binary image that loads with a
//! single `mmap` call.
//!
//! # Quick Start
//!
//! ```rust
//! use cognigraph::{Graph, GraphBuilder, PropertyValue};
//!
//! // Build an image: one string-literal node over the whole source
//! let mut builder = GraphBuilder::new();
//! let root = builder.write_symbol_node(
//!     1,
//!     100,
//!     0,
//!     11,
//!     &[],
//!     &[
//!         ("NodeType", PropertyValue::String("StringLiteral".to_string())),
//!         ("Value", PropertyValue::String("hello world".to_string())),
//!     ],
//! )?;
//! let image = builder.build(root, "hello world")?;
//!
//! // Open and navigate; accessors borrow straight out of the image
//! let graph = Graph::from_bytes(image)?;
//! let root = graph.root()?;
//! assert_eq!(root.symbol_id(), 1);
//! assert_eq!(root.source_text()?, "hello world");
//! assert_eq!(root.property("Value")?.as_str()?, "hello world");
//! assert!(!root.is_ambiguous()?);
//! # Ok::<(), cognigraph::GraphError>(())
//! ```
//!
//! # Key Features
//!
//! - **All parses, not one**: ambiguous spans keep every derivation as
//!   packed nodes under one shared symbol node
//! - **Semantic overlay**: control-flow, data-flow, call, and type edges
//!   hang off individual derivations
//! - **Zero-copy loading**: images are offset-addressed; opening a file is
//!   one `mmap` syscall and accessors borrow from the mapping
//! - **Spatial queries**: a serialized interval index answers "which nodes
//!   cover this source byte", with a bounded result cache
//! - **Immutable images**: the editor replays a graph through a fresh
//!   builder instead of mutating bytes in place
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Image Format                           │
//! ├─────────────────────────────────────────┤
//! │  1. Header (magic, version, offsets)    │
//! │  2. Nodes, derivations, edges, lists    │
//! │  3. Properties + interned strings       │
//! │  4. Source text (verbatim UTF-8)        │
//! │  5. Interval index (optional)           │
//! └─────────────────────────────────────────┘
//!          ↓ mmap() syscall
//! ┌─────────────────────────────────────────┐
//! │  Memory (read-only, shared)             │
//! │  Graph -> accessors -> borrowed views   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Everything in the image is referenced by 32-bit byte offsets, so no
//! pointer rewriting happens on save or load; the image is the arena.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
/// Borrow-scoped record views and collections
pub mod accessor;
/// Validated byte-image access
pub mod buffer;
/// Incremental image construction
pub mod builder;
/// Queued edits rebuilt into new images
pub mod editor;
/// Error types for graph operations
pub mod error;
/// Open/navigate/query façade
pub mod graph;
/// Spatial interval index
pub mod interval;
/// Minimal predicate queries
pub mod query;
/// Binary record layouts and constants
pub mod schema;
/// Deep structural image validation
pub mod validate;
/// Property value encoding and views
pub mod value;

// Re-exports for the common paths

pub use crate::accessor::{
    CpgEdgeList, CpgEdgeView, PackedNodeList, PackedNodeView, PropertyList, PropertyView,
    SymbolNodeList, SymbolNodeView,
};
pub use crate::buffer::Buffer;
pub use crate::builder::{FileGraphBuilder, GraphBuilder};
pub use crate::editor::{GraphEditor, NodeSpec};
pub use crate::error::{GraphError, Result};
pub use crate::graph::{Graph, GraphOpener, GraphStats, DEFAULT_NODE_CACHE_CAPACITY};
pub use crate::interval::IntervalIndex;
pub use crate::query::execute_query;
pub use crate::schema::{EdgeKind, Header, ValueKind};
pub use crate::value::{PropertyValue, Value};
