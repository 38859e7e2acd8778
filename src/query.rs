//! Minimal predicate queries over the root node
//!
//! A deliberately small shim: it recognizes the two predicates
//! `symbolId: <u16>` and `nodeType: <u16>`, evaluates them against the root
//! symbol node, and returns matching node offsets. Anything it does not
//! recognize matches the root by default. A richer query engine would sit on
//! top of the accessor layer the same way.

use crate::error::{GraphError, Result};
use crate::graph::Graph;

/// Evaluate a textual query against `graph`
///
/// Recognized forms:
///
/// - `symbolId: <u16>` - the root offset when the root's symbol id matches,
///   empty otherwise
/// - `nodeType: <u16>` - likewise for the root's node-type tag
/// - anything else - the root offset
///
/// A rootless image yields an empty result for every query.
///
/// # Errors
///
/// [`GraphError::InvalidArgument`] when a recognized predicate carries a
/// malformed number.
pub fn execute_query(graph: &Graph, query: &str) -> Result<Vec<u32>> {
    let root = match graph.root() {
        Ok(root) => root,
        Err(GraphError::NotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let query = query.trim();
    if let Some(rest) = query.strip_prefix("symbolId:") {
        let wanted = parse_predicate_value("symbolId", rest)?;
        return Ok(if root.symbol_id() == wanted {
            vec![root.offset()]
        } else {
            Vec::new()
        });
    }
    if let Some(rest) = query.strip_prefix("nodeType:") {
        let wanted = parse_predicate_value("nodeType", rest)?;
        return Ok(if root.node_type() == wanted {
            vec![root.offset()]
        } else {
            Vec::new()
        });
    }

    // Unrecognized queries match the root by default
    Ok(vec![root.offset()])
}

fn parse_predicate_value(predicate: &str, text: &str) -> Result<u16> {
    text.trim().parse().map_err(|_| {
        GraphError::InvalidArgument(format!(
            "{} predicate needs a u16, got {:?}",
            predicate,
            text.trim()
        ))
    })
}
