//! Graph façade: open, navigate, and query a finished image
//!
//! A [`Graph`] wraps a validated [`Buffer`] together with the reader-side
//! conveniences: the root accessor, image statistics, the lazily loaded
//! spatial index, and a bounded LRU cache for `find_nodes_at` results.
//!
//! Opening is zero-copy in both paths: owned bytes are wrapped as-is, and
//! files are memory-mapped read-only for the graph's lifetime, so load time
//! is a single `mmap` syscall regardless of image size. Multiple processes
//! opening the same file share physical memory.
//!
//! # Thread Safety
//!
//! `Graph` is `Send` but not `Sync`: the spatial-query cache is interior
//! mutable. Concurrent readers either hold one `Graph` per thread or share
//! the underlying [`Buffer`], which is freely `Sync`. Two graphs differing
//! only in cache configuration are observationally equivalent.

use crate::accessor::SymbolNodeView;
use crate::buffer::Buffer;
use crate::error::{GraphError, Result};
use crate::interval::IntervalIndex;
use crate::schema::Header;
use lru::LruCache;
use memmap2::Mmap;
use rustc_hash::FxHasher;
use std::cell::{OnceCell, RefCell};
use std::fs::File;
use std::hash::BuildHasherDefault;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Default capacity of the spatial-query result cache
pub const DEFAULT_NODE_CACHE_CAPACITY: usize = 1_000;

/// Statistics for an open graph and its query cache
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStats {
    /// Number of symbol nodes in the image
    pub node_count: u32,
    /// Number of CPG edges in the image
    pub edge_count: u32,
    /// Source text length in bytes
    pub source_len: u32,
    /// Total image length in bytes
    pub image_len: usize,
    /// Spatial queries executed against this graph
    pub spatial_queries: u64,
    /// Spatial queries served from the cache
    pub cache_hits: u64,
    /// Spatial queries that required an index scan
    pub cache_misses: u64,
}

impl GraphStats {
    /// Cache hit rate (0.0 to 1.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct QueryCounters {
    spatial_queries: u64,
    cache_hits: u64,
    cache_misses: u64,
}

enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Fluent opener for configuring a graph before loading it
///
/// Created via [`Graph::from`] or [`Graph::from_bytes_opener`].
///
/// # Examples
///
/// ```no_run
/// use cognigraph::Graph;
///
/// // Defaults: mmap, 1,000-entry spatial cache
/// let graph = Graph::from("forest.cpg").open()?;
///
/// // Custom cache
/// let graph = Graph::from("forest.cpg").cache_capacity(10_000).open()?;
///
/// // No cache at all
/// let graph = Graph::from("forest.cpg").no_cache().open()?;
/// # Ok::<(), cognigraph::GraphError>(())
/// ```
pub struct GraphOpener {
    source: OpenSource,
    cache_capacity: Option<usize>,
}

impl GraphOpener {
    /// Set the spatial-query cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Disable spatial-query caching entirely
    pub fn no_cache(mut self) -> Self {
        self.cache_capacity = Some(0);
        self
    }

    /// Open the graph with the configured options
    pub fn open(self) -> Result<Graph> {
        let buffer = match self.source {
            OpenSource::Path(path) => {
                let file = File::open(&path).map_err(|e| {
                    GraphError::Io(format!("Failed to open {}: {}", path.display(), e))
                })?;
                // SAFETY: the mapping is read-only and stays alive inside the
                // Buffer for the graph's whole lifetime
                let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                    GraphError::Io(format!("Failed to mmap {}: {}", path.display(), e))
                })?;
                Buffer::from_mmap(mmap)?
            }
            OpenSource::Bytes(bytes) => Buffer::open(bytes)?,
        };

        let capacity = self.cache_capacity.unwrap_or(DEFAULT_NODE_CACHE_CAPACITY);
        let cache_enabled = capacity > 0;
        let lru_capacity =
            NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Graph {
            buffer,
            index: OnceCell::new(),
            cache: RefCell::new(LruCache::with_hasher(
                lru_capacity,
                BuildHasherDefault::<FxHasher>::default(),
            )),
            cache_enabled,
            counters: RefCell::new(QueryCounters::default()),
        })
    }
}

/// An open graph image
///
/// # Examples
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
///     &[("NodeType", PropertyValue::String("StringLiteral".to_string()))],
/// )?;
/// let image = builder.build(root, "hello world")?;
///
/// let graph = Graph::from_bytes(image)?;
/// let root = graph.root()?;
/// assert_eq!(root.source_text()?, "hello world");
/// assert_eq!(root.property("NodeType")?.as_str()?, "StringLiteral");
/// # Ok::<(), cognigraph::GraphError>(())
/// ```
pub struct Graph {
    buffer: Buffer,
    /// Interval index, deserialized from its section on first spatial query
    index: OnceCell<Option<IntervalIndex>>,
    /// Spatial-query result cache keyed by source offset
    cache: RefCell<LruCache<u32, Vec<u32>, BuildHasherDefault<FxHasher>>>,
    cache_enabled: bool,
    counters: RefCell<QueryCounters>,
}

impl Graph {
    /// Create a fluent opener for a file path
    pub fn from<P: Into<PathBuf>>(path: P) -> GraphOpener {
        GraphOpener {
            source: OpenSource::Path(path.into()),
            cache_capacity: None,
        }
    }

    /// Create a fluent opener for owned image bytes
    pub fn from_bytes_opener(bytes: Vec<u8>) -> GraphOpener {
        GraphOpener {
            source: OpenSource::Bytes(bytes),
            cache_capacity: None,
        }
    }

    /// Open a graph file with default options
    ///
    /// The file is memory-mapped read-only; the mapping is released when the
    /// graph is dropped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from(path.as_ref().to_path_buf()).open()
    }

    /// Open a graph over owned bytes with default options
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_opener(bytes).open()
    }

    /// A copy of the image header
    pub fn header(&self) -> Header {
        self.buffer.header()
    }

    /// The underlying validated buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Accessor for the root symbol node
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] when the image has no root (root offset 0).
    pub fn root(&self) -> Result<SymbolNodeView<'_>> {
        let root_offset = self.buffer.header().root_offset;
        if root_offset == 0 {
            return Err(GraphError::NotFound("image has no root node".to_string()));
        }
        SymbolNodeView::read(&self.buffer, root_offset)
    }

    /// Accessor for the symbol node at `offset`
    ///
    /// Offsets come from [`Graph::find_nodes_at`], child lists, or edge
    /// targets.
    pub fn node_at(&self, offset: u32) -> Result<SymbolNodeView<'_>> {
        SymbolNodeView::read(&self.buffer, offset)
    }

    /// The complete source text
    pub fn source_text(&self) -> Result<&str> {
        let header = self.buffer.header();
        let bytes = self.buffer.slice(header.source_offset, header.source_len)?;
        std::str::from_utf8(bytes).map_err(|_| GraphError::InvalidUtf8 {
            offset: header.source_offset,
        })
    }

    /// Image and query statistics
    pub fn stats(&self) -> GraphStats {
        let header = self.buffer.header();
        let counters = *self.counters.borrow();
        GraphStats {
            node_count: header.node_count,
            edge_count: header.edge_count,
            source_len: header.source_len,
            image_len: self.buffer.len(),
            spatial_queries: counters.spatial_queries,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
        }
    }

    fn spatial_index(&self) -> Result<Option<&IntervalIndex>> {
        if self.index.get().is_none() {
            let loaded = match self.buffer.header().interval_index_offset {
                0 => None,
                offset => Some(IntervalIndex::from_buffer(&self.buffer, offset)?),
            };
            let _ = self.index.set(loaded);
        }
        Ok(self.index.get().and_then(|index| index.as_ref()))
    }

    /// Offsets of every symbol node whose span contains the source byte
    /// `offset`, in ascending span-start order
    ///
    /// Returns an empty list when the image carries no interval index.
    /// Results are cached per offset; repeated calls return the same list.
    pub fn find_nodes_at(&self, offset: u32) -> Result<Vec<u32>> {
        self.counters.borrow_mut().spatial_queries += 1;

        if self.cache_enabled {
            if let Some(cached) = self.cache.borrow_mut().get(&offset) {
                self.counters.borrow_mut().cache_hits += 1;
                return Ok(cached.clone());
            }
            self.counters.borrow_mut().cache_misses += 1;
        }

        let nodes: Vec<u32> = match self.spatial_index()? {
            Some(index) => index
                .find_at(offset)
                .iter()
                .map(|entry| entry.node_offset)
                .collect(),
            None => Vec::new(),
        };

        if self.cache_enabled {
            self.cache.borrow_mut().put(offset, nodes.clone());
        }
        Ok(nodes)
    }

    /// Invoke `visitor` for every symbol node whose span contains `offset`,
    /// in ascending span-start order, without building an intermediate list
    ///
    /// Returns the number of nodes visited.
    pub fn process_nodes_at<F>(&self, offset: u32, mut visitor: F) -> Result<usize>
    where
        F: FnMut(SymbolNodeView<'_>),
    {
        let mut visited = 0;
        if let Some(index) = self.spatial_index()? {
            for entry in index.entries() {
                if entry.start > offset {
                    // Entries are sorted by start; nothing later can match
                    break;
                }
                if offset <= entry.end {
                    visitor(self.node_at(entry.node_offset)?);
                    visited += 1;
                }
            }
        }
        Ok(visited)
    }

    /// Drop all cached spatial-query results
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Number of spatial-query results currently cached
    pub fn cache_size(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Run the deep structural validation pass over this image
    pub fn validate(&self) -> Result<()> {
        crate::validate::check_image(self.buffer.as_slice())
    }
}
