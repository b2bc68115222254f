/*!
 * Output projection of the diff tree
 *
 * One traversal feeds both output modes: the pretty stderr log and the
 * JSON document. Nodes bucket by their state (Created → added, Modified →
 * changed, Deleted → deleted); a node that observed a delete event but
 * re-surfaced elsewhere is additionally shadowed into the deleted bucket.
 */

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::processor::Diff;
use crate::tree::{DiffTree, NodeId};
use crate::types::OpState;

/// Compiled path filters supplied via `--ignore`
#[derive(Debug, Default)]
pub struct IgnorePaths(Vec<Regex>);

impl IgnorePaths {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self(patterns)
    }

    /// Compile a list of regex sources
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            compiled.push(Regex::new(pattern)?);
        }
        Ok(Self(compiled))
    }

    fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|re| re.is_match(path))
    }
}

/// One visible node in serialized form
#[derive(Debug, Serialize)]
pub struct NodeDocument {
    pub node_type: String,
    pub path: String,
    pub state: u8,
    pub relations: Option<Vec<RelationDocument>>,
    pub changes: Option<Vec<String>>,
}

/// A serialized relation edge
#[derive(Debug, Serialize)]
pub struct RelationDocument {
    pub path: String,
    pub reason: String,
}

/// The three output buckets; empty buckets serialize as null
#[derive(Debug, Default, Serialize)]
pub struct DiffDocument {
    pub added: Option<Vec<NodeDocument>>,
    pub changed: Option<Vec<NodeDocument>>,
    pub deleted: Option<Vec<NodeDocument>>,
}

impl Diff {
    /// Project the tree into the added/changed/deleted buckets
    pub fn document(&self, ignore: &IgnorePaths) -> DiffDocument {
        let mut doc = DiffDocument::default();
        visit_visible(&self.tree, ignore, &mut |tree, id| {
            let node = tree.node(id);
            match node.state {
                OpState::Created => push(&mut doc.added, node_document(tree, id)),
                OpState::Modified => push(&mut doc.changed, node_document(tree, id)),
                OpState::Deleted => push(&mut doc.deleted, node_document(tree, id)),
                _ => {}
            }
            // Shadow entries keep the node's visible state but land in
            // the deleted bucket as well
            if node.deleted_in_snapshot && node.state != OpState::Deleted {
                push(&mut doc.deleted, node_document(tree, id));
            }
        });
        doc
    }

    /// Log the visible tree as multi-line records on standard error
    pub fn log_pretty(&self, ignore: &IgnorePaths) {
        info!("=== Tree ===");
        visit_visible(&self.tree, ignore, &mut |tree, id| {
            let node = tree.node(id);
            if matches!(
                node.state,
                OpState::Created | OpState::Modified | OpState::Deleted
            ) {
                info!("{}", render(tree, id));
            }
            if node.deleted_in_snapshot && node.state != OpState::Deleted {
                info!("{}", render_shadow(tree, id));
            }
        });
    }
}

/// Depth-first walk applying `f` to every visible node
///
/// Each arena node is visited at most once even when a rename left it
/// reachable through two parents. Filtered nodes (root-level temporaries,
/// ignore matches) are not emitted but their subtrees are still walked.
fn visit_visible<F>(tree: &DiffTree, ignore: &IgnorePaths, f: &mut F)
where
    F: FnMut(&DiffTree, NodeId),
{
    let mut seen = HashSet::new();
    walk(tree, tree.root(), ignore, &mut seen, f);
}

fn walk<F>(
    tree: &DiffTree,
    id: NodeId,
    ignore: &IgnorePaths,
    seen: &mut HashSet<NodeId>,
    f: &mut F,
) where
    F: FnMut(&DiffTree, NodeId),
{
    let children: Vec<NodeId> = tree.node(id).children.values().copied().collect();
    for child in children {
        if !seen.insert(child) {
            continue;
        }
        if !tree.is_temporary(child) && !ignore.matches(&tree.chain_path(child)) {
            f(tree, child);
        }
        walk(tree, child, ignore, seen, f);
    }
}

fn push(bucket: &mut Option<Vec<NodeDocument>>, doc: NodeDocument) {
    bucket.get_or_insert_with(Vec::new).push(doc);
}

fn node_document(tree: &DiffTree, id: NodeId) -> NodeDocument {
    let node = tree.node(id);
    let relations: Vec<RelationDocument> = node
        .relations
        .iter()
        .map(|rel| RelationDocument {
            path: tree.chain_path(rel.target),
            reason: rel.reason.to_string(),
        })
        .collect();
    let changes: Vec<String> = node.changes.iter().map(|c| c.to_string()).collect();
    NodeDocument {
        node_type: node.kind.to_string(),
        path: tree.chain_path(id),
        state: node.state.ordinal(),
        relations: if relations.is_empty() {
            None
        } else {
            Some(relations)
        },
        changes: if changes.is_empty() {
            None
        } else {
            Some(changes)
        },
    }
}

fn display_path(tree: &DiffTree, id: NodeId) -> String {
    let path = tree.chain_path(id);
    if path.is_empty() {
        "/".to_string()
    } else {
        path
    }
}

fn render(tree: &DiffTree, id: NodeId) -> String {
    let node = tree.node(id);
    let mut parts = vec![
        format!("[{}][{}]", node.kind, node.state),
        display_path(tree, id),
    ];
    for rel in &node.relations {
        parts.push(format!(
            "[rel={}:{}]",
            tree.chain_path(rel.target),
            rel.reason
        ));
    }
    for change in &node.changes {
        parts.push(format!("[change={}]", change));
    }
    parts.join(" ")
}

fn render_shadow(tree: &DiffTree, id: NodeId) -> String {
    let node = tree.node(id);
    format!(
        "[{}][{}] {}",
        node.kind,
        OpState::Deleted,
        display_path(tree, id)
    )
}
