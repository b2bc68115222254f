/*!
 * Command-line interface for btrfs-diff
 */

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use btrfs_diff::config::{Args, Config};
use btrfs_diff::error::Result;
use btrfs_diff::process_file;

fn run(config: &Config) -> Result<()> {
    let diff = process_file(&config.snapshot_file)?;

    if config.json {
        // The document is built wholly in memory so a failure never
        // leaves partial output behind
        let document = diff.document(&config.ignore_paths);
        print!("{}", serde_json::to_string(&document)?);
    } else {
        diff.log_pretty(&config.ignore_paths);
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Diagnostics go to stderr; JSON mode installs no subscriber at all,
    // which silences every event before processing begins
    if !args.json {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("btrfs_diff=debug")),
            )
            .with_target(false)
            .init();
    }

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = run(&config) {
        eprintln!("failed to process snapshot file: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
