//! Global error handling for btrfs-diff
//!
//! This module provides a centralized error type that can represent errors
//! from every stage of stream processing: the byte reader, the command and
//! attribute decoders, and the diff-tree mutations.

use std::io;
use thiserror::Error;

/// Global error type for btrfs-diff operations
#[derive(Error, Debug)]
pub enum BtrfsDiffError {
    /// File system errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The input ended before the requested number of bytes was available
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// The stream header did not carry the btrfs send-stream magic
    #[error("bad stream magic, expected {expected:?} got {got:?}")]
    BadMagic { expected: String, got: String },

    /// The stream speaks a protocol version this tool does not understand
    #[error("unexpected stream version {0}")]
    UnsupportedVersion(u32),

    /// A command record carried a type id outside the known range
    #[error("stream contains invalid command type {0}")]
    InvalidCommandType(u16),

    /// The next attribute in a command payload was not the requested one
    #[error("expected attribute {expected}, got {got}")]
    UnexpectedAttribute { expected: String, got: String },

    /// A command payload ended in the middle of an attribute
    #[error("truncated attribute {attr}: {reason}")]
    TruncatedAttribute { attr: String, reason: String },

    /// A command this tool refuses to process (UNSPEC, CLONE)
    #[error("unsupported command {0}")]
    Unsupported(String),

    /// A create command addressed a path that already exists in the tree
    #[error("found existing node in tree while processing create operation: {0}")]
    DuplicateCreate(String),

    /// A node was attached over a live (non-deleted) child of the same name
    #[error("found existing child node {name} while adding new node under {parent}")]
    DuplicateChild { parent: String, name: String },

    /// Parent/child bookkeeping got out of sync while detaching a node
    #[error("child node {name} not found in parent {parent}")]
    MissingChild { parent: String, name: String },

    /// Catch-all for decoder/processor drift on otherwise valid commands
    #[error("unhandled command {0}")]
    UnhandledCommand(String),

    /// Regular expression errors (ignore patterns)
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON processing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Specialized Result type for btrfs-diff operations
pub type Result<T> = std::result::Result<T, BtrfsDiffError>;
