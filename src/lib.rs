/*!
 * btrfs-diff - Summarize the path-level effects of a btrfs incremental
 * send stream
 *
 * This library decodes the binary stream produced by
 * `btrfs send -p PARENT NEW`, maintains a filesystem-shaped diff tree
 * while the commands are applied (resolving the protocol's temporary
 * `oNNN-NN-NN` placeholder names back to real paths), and projects the
 * result into added/changed/deleted buckets.
 */

pub mod command;
pub mod config;
pub mod error;
pub mod processor;
pub mod reader;
pub mod tree;
pub mod types;
pub mod utils;
pub mod writer;

// Re-export main components for easier access
pub use command::{AttrType, Command, CommandType, OpClass};
pub use config::{Args, Config};
pub use error::{BtrfsDiffError, Result};
pub use processor::{process_file, process_stream, Diff};
pub use reader::ByteReader;
pub use tree::{DiffNode, DiffTree, NodeId, Relation};
pub use types::{ByteData, Change, NodeKind, OpState, RelationReason};
pub use writer::{DiffDocument, IgnorePaths, NodeDocument, RelationDocument};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
