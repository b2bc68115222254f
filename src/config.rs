/*!
 * Configuration handling for btrfs-diff
 */

use std::path::PathBuf;

use clap::Parser;

use crate::error::Result;
use crate::writer::IgnorePaths;

/// Command-line arguments for btrfs-diff
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "btrfs-diff",
    version = env!("CARGO_PKG_VERSION"),
    about = "Summarize which paths a btrfs incremental send stream creates, modifies or deletes",
    long_about = "Reads the stream produced by `btrfs send -p PARENT NEW` and reports every \
                  path that was created, modified or deleted in the child snapshot, without \
                  touching any real filesystem."
)]
pub struct Args {
    /// Path to a btrfs send stream file
    pub snapshot_file: PathBuf,

    /// Regex of node paths to ignore (may be repeated)
    #[clap(long = "ignore", value_name = "REGEX")]
    pub ignore: Vec<String>,

    /// Output JSON on stdout instead of logging the tree
    #[clap(long)]
    pub json: bool,
}

/// Application configuration
pub struct Config {
    /// Send-stream file to process
    pub snapshot_file: PathBuf,

    /// Compiled ignore patterns
    pub ignore_paths: IgnorePaths,

    /// Emit the JSON document instead of the pretty log
    pub json: bool,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args(args: Args) -> Result<Self> {
        Ok(Self {
            snapshot_file: args.snapshot_file,
            ignore_paths: IgnorePaths::compile(&args.ignore)?,
            json: args.json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BtrfsDiffError;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from([
            "btrfs-diff",
            "--ignore",
            "^/tmp",
            "--ignore",
            "\\.log$",
            "--json",
            "stream.snap",
        ])
        .unwrap();
        assert_eq!(args.snapshot_file, PathBuf::from("stream.snap"));
        assert_eq!(args.ignore, vec!["^/tmp", "\\.log$"]);
        assert!(args.json);
    }

    #[test]
    fn test_snapshot_file_is_required() {
        assert!(Args::try_parse_from(["btrfs-diff"]).is_err());
    }

    #[test]
    fn test_from_args_rejects_bad_regex() {
        let args = Args::try_parse_from(["btrfs-diff", "--ignore", "[oops", "stream.snap"])
            .unwrap();
        match Config::from_args(args) {
            Err(BtrfsDiffError::Regex(_)) => {}
            other => panic!("expected Regex error, got {:?}", other.map(|_| ())),
        }
    }
}
