/*!
 * In-memory diff tree
 *
 * Nodes live in an arena and reference each other through stable
 * `NodeId` handles: parent back-pointers, child mappings and relation
 * edges all survive the reparenting that rename and delete handling
 * perform. Relation edges are cross-references, not ownership: detaching
 * a node never touches its relation targets.
 */

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{BtrfsDiffError, Result};
use crate::types::{Change, NodeKind, OpState, RelationReason};

/// Temporary names the send protocol links inodes under before their
/// final path is known (e.g. `o261-7-0`)
static TEMP_NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"o\d+-\d+-\d+").expect("temporary node pattern"));

/// True if any component of the path is a send-protocol placeholder name
pub fn is_placeholder_name(path: &str) -> bool {
    TEMP_NODE_RE.is_match(path)
}

/// Stable handle of a node in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A cross-reference to another node and the reason it exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub target: NodeId,
    pub reason: RelationReason,
}

/// One filesystem node in the diff tree
#[derive(Debug, Clone)]
pub struct DiffNode {
    pub kind: NodeKind,
    /// Last path component; the root's name is empty
    pub name: String,
    pub state: OpState,
    pub parent: Option<NodeId>,
    /// Child name → node handle; names are unique within a parent
    pub children: HashMap<String, NodeId>,
    pub relations: Vec<Relation>,
    pub changes: Vec<Change>,
    /// Set when a delete event was observed for this node, even if the
    /// node re-surfaced elsewhere under another name
    pub deleted_in_snapshot: bool,
}

impl DiffNode {
    /// Create a detached node with no verdict yet
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            state: OpState::Unspecified,
            parent: None,
            children: HashMap::new(),
            relations: Vec::new(),
            changes: Vec::new(),
            deleted_in_snapshot: false,
        }
    }

    /// Same as [`DiffNode::new`] with an initial state
    pub fn with_state(kind: NodeKind, name: impl Into<String>, state: OpState) -> Self {
        Self {
            state,
            ..Self::new(kind, name)
        }
    }
}

/// Arena-backed tree of [`DiffNode`]s with a single root
pub struct DiffTree {
    nodes: Vec<DiffNode>,
}

impl DiffTree {
    /// Create a tree holding only the root directory
    pub fn new() -> Self {
        Self {
            nodes: vec![DiffNode::new(NodeKind::Dir, "")],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &DiffNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DiffNode {
        &mut self.nodes[id.0]
    }

    /// Add a detached node to the arena
    pub fn alloc(&mut self, node: DiffNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Resolve a path to a node, if present
    ///
    /// An empty path resolves to the root. A single leading slash is
    /// tolerated; intermediate empty components are not.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for entry in split_path(path) {
            current = *self.node(current).children.get(entry)?;
        }
        Some(current)
    }

    /// A node's absolute path, reconstructed by walking parent pointers
    ///
    /// The root's chain path is empty; a detached node's chain path is its
    /// bare name.
    pub fn chain_path(&self, id: NodeId) -> String {
        let node = self.node(id);
        match node.parent {
            Some(parent) => format!("{}/{}", self.chain_path(parent), node.name),
            None => node.name.clone(),
        }
    }

    /// Walk a path from the root, synthesizing missing directories
    ///
    /// Synthesized intermediates are marked `Created` only when
    /// `old_created` is set; the terminal directory when `new_created` is.
    /// Everything else starts out `Unspecified` so untouched ancestors
    /// never surface in the output.
    pub fn mkdirp(&mut self, path: &str, old_created: bool, new_created: bool) -> NodeId {
        let entries: Vec<&str> = split_path(path).collect();
        let count = entries.len();
        let mut current = self.root();
        for (idx, entry) in entries.into_iter().enumerate() {
            if let Some(&existing) = self.node(current).children.get(entry) {
                current = existing;
                continue;
            }
            let created = if idx == count - 1 {
                new_created
            } else {
                old_created
            };
            let state = if created {
                OpState::Created
            } else {
                OpState::Unspecified
            };
            let id = self.alloc(DiffNode::with_state(NodeKind::Dir, entry, state));
            self.node_mut(id).parent = Some(current);
            self.node_mut(current).children.insert(entry.to_string(), id);
            debug!("created intermediate dir node {}", self.chain_path(id));
            current = id;
        }
        current
    }

    /// Resolve the parent of `path`, synthesizing directories as needed
    pub fn parent_or_mkdir(&mut self, path: &str) -> NodeId {
        match path.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => self.mkdirp(parent, false, false),
            _ => self.root(),
        }
    }

    /// Attach `node` as a child of `parent`
    ///
    /// `Unknown` parents are promoted to directories. An existing child of
    /// the same name may only be replaced when it is `Deleted`; the
    /// replacement then absorbs the tombstone's relations and children and
    /// inherits its deleted-in-snapshot flag. Attaching detaches the node
    /// from any previous parent first.
    pub fn add_node(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
        if self.node(parent).kind == NodeKind::Unknown {
            self.node_mut(parent).kind = NodeKind::Dir;
        }

        let name = self.node(node).name.clone();
        let existing = self.node(parent).children.get(&name).copied();
        if let Some(existing_id) = existing {
            if self.node(existing_id).state != OpState::Deleted {
                return Err(BtrfsDiffError::DuplicateChild {
                    parent: self.chain_path(parent),
                    name,
                });
            }
        }

        if self.node(node).parent.is_some() {
            self.remove_from_parent(node)?;
        }
        self.node_mut(node).parent = Some(parent);

        if let Some(existing_id) = existing {
            self.remove_from_parent(existing_id)?;

            // Merge the tombstone into its replacement
            let relations = self.node(existing_id).relations.clone();
            self.node_mut(node).relations.extend(relations);
            let orphans: Vec<NodeId> = self.node(existing_id).children.values().copied().collect();
            for child in orphans {
                self.add_node(node, child)?;
            }
            self.node_mut(node).deleted_in_snapshot = true;
            debug!(
                "replaced existing deleted node with new node {}",
                self.chain_path(node)
            );
        }

        self.node_mut(parent).children.insert(name, node);
        Ok(())
    }

    /// Remove `node` from `parent`'s child mapping
    pub fn delete_node(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
        let name = self.node(node).name.clone();
        let mapped = self.node(parent).children.get(&name).copied();
        match mapped {
            Some(mapped) if mapped == node => {
                self.node_mut(parent).children.remove(&name);
                self.node_mut(node).parent = None;
                Ok(())
            }
            _ => Err(BtrfsDiffError::MissingChild {
                parent: self.chain_path(parent),
                name,
            }),
        }
    }

    /// Detach `node` from its parent, if it has one
    pub fn remove_from_parent(&mut self, node: NodeId) -> Result<()> {
        if let Some(parent) = self.node(node).parent {
            self.delete_node(parent, node)?;
            debug!("detached node from parent {}", self.chain_path(parent));
        }
        Ok(())
    }

    /// First relation of the given reason, if any
    pub fn find_relation(&self, id: NodeId, reason: RelationReason) -> Option<NodeId> {
        self.node(id)
            .relations
            .iter()
            .find(|r| r.reason == reason)
            .map(|r| r.target)
    }

    /// Follow the rename-source chain to the node it bottoms out at
    ///
    /// Returns the node itself when it carries no rename-source relation.
    pub fn follow_rename_src(&self, id: NodeId) -> NodeId {
        match self.find_relation(id, RelationReason::RenameSrc) {
            Some(next) => self.follow_rename_src(next),
            None => id,
        }
    }

    /// True for placeholder-named nodes directly under the root
    pub fn is_temporary(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.parent == Some(self.root()) && is_placeholder_name(&node.name)
    }
}

impl Default for DiffTree {
    fn default() -> Self {
        Self::new()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let mut entries = path.split('/');
    if path.starts_with('/') || path.is_empty() {
        entries.next();
    }
    entries
}
