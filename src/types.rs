/*!
 * Core types and data structures for the btrfs-diff application
 */

use std::fmt;

use chrono::{DateTime, Utc};
use strum::Display;

use crate::utils::ellipsis;

/// Kind of a filesystem node observed in the stream
///
/// `Unknown` is the initial kind of synthetic placeholders whose true type
/// has not been observed yet; a later command may upgrade it.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "UPPERCASE")]
pub enum NodeKind {
    /// Kind not (yet) known
    Unknown,
    /// Regular file
    File,
    /// Directory
    Dir,
    /// Named pipe
    Fifo,
    /// Unix socket
    Sock,
    /// Symbolic link
    Symlink,
    /// Device node
    Node,
}

/// Per-node verdict for this snapshot
///
/// The declared discriminant is the ordinal serialized in JSON output and
/// must stay stable.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    #[strum(to_string = "noop")]
    Unspecified = 0,
    #[strum(to_string = "ignored")]
    Ignored = 1,
    #[strum(to_string = "added")]
    Created = 2,
    #[strum(to_string = "changed")]
    Modified = 3,
    #[strum(to_string = "deleted")]
    Deleted = 4,
    #[strum(to_string = "renamed")]
    Renamed = 5,
    #[strum(to_string = "END")]
    End = 6,
}

impl OpState {
    /// Stable ordinal used in serialized output
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

/// Why one node references another
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationReason {
    /// The referenced node is the source a rename took this node from
    RenameSrc,
    /// The referenced node is where a rename moved this node to
    RenameDest,
    /// The referenced node is the target of a hard link or symlink
    LinkDest,
}

/// An opaque attribute value, with a UTF-8 validity flag for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteData {
    pub bytes: Vec<u8>,
    pub is_utf8: bool,
}

impl ByteData {
    pub fn new(bytes: Vec<u8>) -> Self {
        let is_utf8 = std::str::from_utf8(&bytes).is_ok();
        Self { bytes, is_utf8 }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for ByteData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_utf8 {
            let s = String::from_utf8_lossy(&self.bytes);
            write!(f, "{}", ellipsis(&s, 32))
        } else {
            write!(f, "bytes:len={}", self.bytes.len())
        }
    }
}

/// One recorded change on a node
///
/// Entries are kept structured so the write-coalescing check in the
/// processor is a direct numeric comparison on the last entry; the textual
/// descriptor is only rendered at output time.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Write {
        offset: u64,
        len: u64,
    },
    Truncate {
        size: u64,
    },
    Utimes {
        atime: DateTime<Utc>,
        mtime: DateTime<Utc>,
        ctime: DateTime<Utc>,
    },
    Chmod {
        mode: u64,
    },
    Chown {
        uid: u64,
        gid: u64,
    },
    SetXattr {
        name: String,
        data: ByteData,
    },
    RemoveXattr {
        name: String,
    },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Write { offset, len } => {
                write!(f, "write:offset={}:data_len={}", offset, len)
            }
            Change::Truncate { size } => write!(f, "truncate:size={}", size),
            Change::Utimes {
                atime,
                mtime,
                ctime,
            } => write!(f, "utime:atime={},mtime={},ctime={}", atime, mtime, ctime),
            Change::Chmod { mode } => write!(f, "chmod:mode={:o}", mode),
            Change::Chown { uid, gid } => write!(f, "chown:uid={},gid={}", uid, gid),
            Change::SetXattr { name, data } => {
                write!(f, "set_xattr:name={},data={}", name, data)
            }
            Change::RemoveXattr { name } => write!(f, "remove_xattr:name={}", name),
        }
    }
}
