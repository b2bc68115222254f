/*!
 * Send-stream processor
 *
 * Drains a validated stream command by command and applies each one to
 * the diff tree. The tree is kept consistent between commands; any error
 * aborts the run and discards the tree.
 */

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::command::{AttrType, Command, CommandType, OpClass};
use crate::error::{BtrfsDiffError, Result};
use crate::reader::{validate_stream, ByteReader};
use crate::tree::{is_placeholder_name, DiffNode, DiffTree, NodeId, Relation};
use crate::types::{Change, NodeKind, OpState, RelationReason};

/// The outcome of draining a send stream: a read-only diff tree
pub struct Diff {
    pub(crate) tree: DiffTree,
}

/// Process a send-stream file into a [`Diff`]
pub fn process_file(path: &Path) -> Result<Diff> {
    let file = File::open(path)?;
    process_stream(file)
}

/// Process any byte source carrying a send stream into a [`Diff`]
pub fn process_stream<R: Read>(source: R) -> Result<Diff> {
    let mut reader = ByteReader::new(source);
    validate_stream(&mut reader)?;
    StreamProcessor::new(reader).run()
}

struct StreamProcessor<R> {
    reader: ByteReader<R>,
    tree: DiffTree,
}

impl<R: Read> StreamProcessor<R> {
    fn new(reader: ByteReader<R>) -> Self {
        Self {
            reader,
            tree: DiffTree::new(),
        }
    }

    fn run(mut self) -> Result<Diff> {
        loop {
            let mut command = Command::read(&mut self.reader)?;
            let op = command.op_class();
            if op != OpClass::Ignore {
                info!("cmd: {}, mapped: {}", command.cmd_type(), op);
            }
            match op {
                OpClass::Unspec => {
                    return Err(BtrfsDiffError::Unsupported(command.cmd_type().to_string()))
                }
                OpClass::Ignore => continue,
                OpClass::End => break,
                OpClass::Create => self.create(&mut command)?,
                OpClass::Modify => self.modify(&mut command)?,
                OpClass::Rename => self.rename_or_link(&mut command)?,
                OpClass::Delete => {
                    let path = command.path_param(AttrType::Path)?;
                    self.delete(&path, command.cmd_type())?;
                }
            }
        }
        Ok(Diff { tree: self.tree })
    }

    /// Subvolume/snapshot framing: attributes are consumed and logged but
    /// the tree is not touched
    fn subvol(&mut self, command: &mut Command) -> Result<()> {
        let path = command.path_param(AttrType::Path)?;
        let uuid = command.uuid_param(AttrType::Uuid)?;
        let ctransid = command.u64_param(AttrType::Ctransid)?;
        if command.cmd_type() == CommandType::Snapshot {
            let clone_uuid = command.uuid_param(AttrType::CloneUuid)?;
            let clone_ctransid = command.u64_param(AttrType::CloneCtransid)?;
            info!(
                "received snapshot at {} [uuid={},ctransid={},clone_uuid={},clone_ctransid={}]",
                path, uuid, ctransid, clone_uuid, clone_ctransid
            );
        } else {
            info!(
                "received subvol at {} [uuid={},ctransid={}]",
                path, uuid, ctransid
            );
        }
        Ok(())
    }

    fn create(&mut self, command: &mut Command) -> Result<()> {
        if matches!(
            command.cmd_type(),
            CommandType::Subvol | CommandType::Snapshot
        ) {
            return self.subvol(command);
        }

        let path = command.path_param(AttrType::Path)?;
        if self.tree.lookup(&path).is_some() {
            return Err(BtrfsDiffError::DuplicateCreate(path));
        }

        let kind = match command.cmd_type() {
            CommandType::Mkfile => NodeKind::File,
            CommandType::Mkdir => NodeKind::Dir,
            CommandType::Symlink => NodeKind::Symlink,
            CommandType::Mknod => NodeKind::Node,
            CommandType::Mkfifo => NodeKind::Fifo,
            CommandType::Mksock => NodeKind::Sock,
            other => return Err(BtrfsDiffError::UnhandledCommand(other.to_string())),
        };

        let node = if kind == NodeKind::Dir {
            self.tree.mkdirp(&path, false, true)
        } else {
            let parent = self.tree.parent_or_mkdir(&path);
            let id = self.tree.alloc(DiffNode::with_state(
                kind,
                last_path_part(&path),
                OpState::Created,
            ));
            self.tree.add_node(parent, id)?;
            id
        };

        if command.cmd_type() == CommandType::Symlink {
            // The inode number precedes the target on the wire
            command.u64_param(AttrType::Ino)?;
            let target_path = command.link_param()?;

            // Targets may be relative; an unresolved one stays detached
            let target = match self.tree.lookup(&target_path) {
                Some(id) => id,
                None => {
                    info!("link {} destination not found", target_path);
                    self.tree
                        .alloc(DiffNode::new(NodeKind::Unknown, target_path))
                }
            };
            self.tree.node_mut(node).relations.push(Relation {
                target,
                reason: RelationReason::LinkDest,
            });
        }

        info!("created {} [type={}]", path, self.tree.node(node).kind);
        Ok(())
    }

    fn modify(&mut self, command: &mut Command) -> Result<()> {
        if command.cmd_type() == CommandType::Clone {
            return Err(BtrfsDiffError::Unsupported(command.cmd_type().to_string()));
        }

        let path = command.path_param(AttrType::Path)?;
        let node = match self.tree.lookup(&path) {
            Some(id) => id,
            None => {
                let parent = self.tree.parent_or_mkdir(&path);
                let id = self
                    .tree
                    .alloc(DiffNode::new(NodeKind::Unknown, last_path_part(&path)));
                self.tree.add_node(parent, id)?;
                id
            }
        };

        if self.tree.node(node).state != OpState::Created {
            self.tree.node_mut(node).state = OpState::Modified;
        }

        match command.cmd_type() {
            CommandType::Write => {
                let offset = command.u64_param(AttrType::FileOffset)?;
                let data = command.bytes_param(AttrType::Data)?;
                let len = data.len();
                self.record_write(node, offset, len);
                info!("modified: write at {} at {}: {}", path, offset, data);
            }
            CommandType::UpdateExtent => {
                let offset = command.u64_param(AttrType::FileOffset)?;
                let size = command.u64_param(AttrType::Size)?;
                self.record_write(node, offset, size);
                info!("modified: write (extent) at {} at {}", path, offset);
            }
            CommandType::Truncate => {
                let size = command.u64_param(AttrType::Size)?;
                let n = self.tree.node_mut(node);
                if n.kind == NodeKind::Unknown {
                    n.kind = NodeKind::File;
                }
                n.changes.push(Change::Truncate { size });
                info!("modified: truncate at {} [size={}]", path, size);
            }
            CommandType::Utimes => {
                let atime = command.time_param(AttrType::Atime)?;
                let mtime = command.time_param(AttrType::Mtime)?;
                let ctime = command.time_param(AttrType::Ctime)?;
                self.tree.node_mut(node).changes.push(Change::Utimes {
                    atime,
                    mtime,
                    ctime,
                });
                info!(
                    "modified: utimes at {} [atime={},mtime={},ctime={}]",
                    path, atime, mtime, ctime
                );
            }
            CommandType::Chmod => {
                let mode = command.u64_param(AttrType::Mode)?;
                self.tree.node_mut(node).changes.push(Change::Chmod { mode });
                info!("modified: chmod at {} [mode={:o}]", path, mode);
            }
            CommandType::Chown => {
                let uid = command.u64_param(AttrType::Uid)?;
                let gid = command.u64_param(AttrType::Gid)?;
                self.tree
                    .node_mut(node)
                    .changes
                    .push(Change::Chown { uid, gid });
                info!("modified: chown at {} [uid={},gid={}]", path, uid, gid);
            }
            CommandType::SetXattr => {
                let name = command.string_param(AttrType::XattrName)?;
                let data = command.bytes_param(AttrType::XattrData)?;
                info!("modified: set xattr at {} [name={},data={}]", path, name, data);
                self.tree
                    .node_mut(node)
                    .changes
                    .push(Change::SetXattr { name, data });
            }
            CommandType::RemoveXattr => {
                let name = command.string_param(AttrType::XattrName)?;
                info!("modified: remove xattr at {} [name={}]", path, name);
                self.tree
                    .node_mut(node)
                    .changes
                    .push(Change::RemoveXattr { name });
            }
            other => return Err(BtrfsDiffError::UnhandledCommand(other.to_string())),
        }
        Ok(())
    }

    /// Record a write, folding it into the previous change when the two
    /// are contiguous
    fn record_write(&mut self, node: NodeId, offset: u64, len: u64) {
        let n = self.tree.node_mut(node);
        let merged = match n.changes.last() {
            Some(Change::Write {
                offset: prev_offset,
                len: prev_len,
            }) if prev_offset + prev_len == offset => Some((*prev_offset, *prev_len)),
            _ => None,
        };
        let (offset, len) = match merged {
            Some((prev_offset, prev_len)) => {
                n.changes.pop();
                (prev_offset, prev_len + len)
            }
            None => (offset, len),
        };
        if n.kind == NodeKind::Unknown {
            n.kind = NodeKind::File;
        }
        n.changes.push(Change::Write { offset, len });
    }

    fn rename_or_link(&mut self, command: &mut Command) -> Result<()> {
        let path = command.path_param(AttrType::Path)?;
        let is_rename = command.cmd_type() == CommandType::Rename;
        let (from, to) = if is_rename {
            let to = command.path_param(AttrType::PathTo)?;
            (path, to)
        } else {
            let from = command.link_param()?;
            (from, path)
        };

        let from_is_placeholder = is_placeholder_name(&from);

        let mut src = self.tree.lookup(&from);
        if src.is_none() && !from_is_placeholder {
            // The source predates this snapshot; stand in a fake node
            let fake = self
                .tree
                .alloc(DiffNode::new(NodeKind::Unknown, last_path_part(&from)));
            if is_rename {
                let parent = self.tree.parent_or_mkdir(&to);
                self.tree.add_node(parent, fake)?;
            }
            src = Some(fake);
        }
        if src.is_none() {
            debug!(
                "could not find source node {} for {} command",
                from,
                command.cmd_type()
            );
        }

        // Hand the source's identity to the destination before the source
        // is tombstoned
        let (kind, mut relations, children) = match src {
            Some(id) => {
                let node = self.tree.node(id);
                (node.kind, node.relations.clone(), node.children.clone())
            }
            None => (NodeKind::Unknown, Vec::new(), HashMap::new()),
        };

        if let Some(id) = src {
            // A rename tombstones its source; a link preserves it
            if is_rename {
                self.delete(&from, command.cmd_type())?;
            }
            if !from_is_placeholder {
                relations.push(Relation {
                    target: id,
                    reason: if is_rename {
                        RelationReason::RenameSrc
                    } else {
                        RelationReason::LinkDest
                    },
                });
            }
        }

        let parent = self.tree.parent_or_mkdir(&to);
        let mut dest_node =
            DiffNode::with_state(kind, last_path_part(&to), OpState::Created);
        dest_node.relations = relations;
        dest_node.children = children;
        let dest = self.tree.alloc(dest_node);
        self.tree.add_node(parent, dest)?;

        if let Some(id) = src {
            if is_rename {
                self.tree.node_mut(id).relations.push(Relation {
                    target: dest,
                    reason: RelationReason::RenameDest,
                });
            }
        }

        info!("rename from {} to {}", from, to);
        Ok(())
    }

    fn delete(&mut self, path: &str, cmd_type: CommandType) -> Result<()> {
        let node = match self.tree.lookup(path) {
            Some(id) => id,
            None => {
                let parent = self.tree.parent_or_mkdir(path);
                let id = self
                    .tree
                    .alloc(DiffNode::new(NodeKind::Unknown, last_path_part(path)));
                self.tree.add_node(parent, id)?;
                id
            }
        };

        let is_rmdir = cmd_type == CommandType::Rmdir;
        {
            let n = self.tree.node_mut(node);
            if n.kind == NodeKind::Unknown && is_rmdir {
                n.kind = NodeKind::Dir;
            }
            n.state = OpState::Deleted;
            n.deleted_in_snapshot = true;
        }

        // Deletes inside a renamed directory arrive against the temporary
        // placeholder; resolve them back to the pre-rename path
        if let Some(parent) = self.tree.node(node).parent {
            if self.tree.is_temporary(parent) {
                let anchor = self.tree.follow_rename_src(parent);
                let name = self.tree.node(node).name.clone();
                let in_anchor = self.tree.node(anchor).children.get(&name).copied();
                if let Some(existing) = in_anchor {
                    // The real path is already in the tree; fold the
                    // deletion into it and drop the synthetic node
                    let e = self.tree.node_mut(existing);
                    e.deleted_in_snapshot = true;
                    if is_rmdir {
                        e.kind = NodeKind::Dir;
                    }
                    self.tree.remove_from_parent(node)?;
                    return Ok(());
                }
                self.tree.add_node(anchor, node)?;
            }
        }

        info!("deleted {}", self.tree.chain_path(node));
        Ok(())
    }
}

/// Last path component; the path itself when it has a single component
fn last_path_part(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, last)| last).unwrap_or(path)
}
