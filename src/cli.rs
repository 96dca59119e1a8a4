// Command-line surface. A `clap`-derive `Cli` with a subcommand per run
// mode.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "concord", about = "Multi-master JSON document conflict resolver")]
pub struct Cli {
    /// Path to a YAML configuration file. Falls back to built-in defaults
    /// when omitted.
    #[arg(long, env = "CONCORD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the long-lived daemon loop against the configured collection.
    Run {
        /// Directory to dump each conflicted winner and sibling body to
        /// before resolving it, for offline replay via `resolve-file`.
        #[arg(long)]
        dump_dir: Option<PathBuf>,
    },

    /// Resolves a single fixture file (a JSON array of `{id, doc}`
    /// records) and prints the outcome for each document. Useful for
    /// replaying a captured conflict offline, without a running feed.
    ResolveFile {
        /// Path to the fixture file.
        path: PathBuf,
    },
}
