// Runtime configuration: database/collection parameters plus the ambient
// daemon knobs. Loaded from an optional YAML file with `clap`-derived
// CLI/env overrides layered on top.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use eyre::{Context, Result};
use serde::Deserialize;

fn default_collection() -> String {
    "tenders".to_string()
}

fn default_timezone() -> String {
    "Europe/Kiev".to_string()
}

fn default_poll_seconds() -> u64 {
    30
}

/// Daemon configuration, deserialized from YAML and overridable from the
/// CLI (see [`crate::cli::Cli`]).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the JSONL collection file backing `JsonlConflictStore`.
    /// A real deployment would point this at a database URL instead; the
    /// file-backed adapter is what this crate ships.
    pub collection_path: PathBuf,

    /// Logical collection name, used for the on-disk file name when
    /// `collection_path` is derived rather than given directly.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Where the last-processed change-feed sequence is checkpointed.
    /// `None` disables checkpointing (e.g. for the `resolve-file` debug
    /// command, which has no feed to resume).
    #[serde(default)]
    pub seq_file: Option<PathBuf>,

    /// Directory to dump each conflicted winner and sibling body to before
    /// resolving. `None` disables dumping.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,

    /// IANA time zone used to stamp `dateModified` on merged documents.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How long a feed poll may block before returning an empty batch.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_path: PathBuf::from("tenders.jsonl"),
            collection: default_collection(),
            seq_file: None,
            dump_dir: None,
            timezone: default_timezone(),
            poll_seconds: default_poll_seconds(),
            debug: false,
        }
    }
}

impl Config {
    /// Loads configuration from `path` if given, falling back to defaults
    /// otherwise.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("failed to parse config file: {}", path.display()))
            }
            None => Ok(Config::default()),
        }
    }

    /// The configured IANA zone, falling back to UTC if unparsable rather
    /// than failing the whole daemon over a typo'd config value.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// The current time in the configured zone, formatted the way
    /// `dateModified` is stored (RFC 3339 with the zone's offset).
    pub fn now_in_zone(&self) -> String {
        Utc::now().with_timezone(&self.tz()).to_rfc3339()
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }
}
