use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use concord::changefeed::{handle_conflict, run_until_idle, ChangeRecord, FixedChangeFeed};
use concord::cli::{Cli, Command};
use concord::config::Config;
use concord::store::{ConflictStore, InMemoryStore, JsonlConflictStore};

fn setup_logging(debug: bool) {
    let default_filter = if debug { "concord=debug,info" } else { "concord=info,warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// One fixture entry for the `resolve-file` debug command: a winner body
/// carrying `_conflicts`, plus the sibling bodies it refers to.
#[derive(Debug, Deserialize)]
struct FixtureEntry {
    winner: Value,
    #[serde(default)]
    siblings: Vec<Value>,
}

/// Scans the configured collection for documents carrying `_conflicts`
/// and drains them through the resolver. A real multi-master database
/// binding would push these records over a long-poll change feed instead;
/// this reference `run` command substitutes a one-shot file scan so the
/// daemon loop stays exercisable end to end.
fn run_daemon(config: &Config) -> Result<()> {
    if let Some(dir) = &config.dump_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create dump directory: {}", dir.display()))?;
    }

    let store = JsonlConflictStore::new(&config.collection_path);
    let entries = concord::jsonl::read_all(&config.collection_path)
        .context("failed to read collection for conflict scan")?;

    let mut latest_by_id: std::collections::HashMap<String, Value> = std::collections::HashMap::new();
    for entry in entries {
        if let Some(id) = entry.get("_id").and_then(Value::as_str) {
            latest_by_id.insert(id.to_string(), entry);
        }
    }

    let records: Vec<ChangeRecord> = latest_by_id
        .into_iter()
        .filter(|(_, doc)| {
            doc.get("_conflicts")
                .and_then(Value::as_array)
                .map(|a| !a.is_empty())
                .unwrap_or(false)
        })
        .enumerate()
        .map(|(seq, (id, doc))| ChangeRecord { id, seq: seq as u64, doc })
        .collect();

    info!(count = records.len(), "scanned collection for conflicted documents");

    let mut feed = FixedChangeFeed::new(records);
    run_until_idle(&mut feed, &store, config);
    Ok(())
}

/// Resolves a captured fixture offline, without a feed or a persistent
/// store: each entry seeds an in-memory store with its siblings, runs the
/// same `handle_conflict` path the daemon uses, and prints the outcome.
fn run_resolve_file(path: &std::path::Path, config: &Config) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture file: {}", path.display()))?;
    let fixtures: Vec<FixtureEntry> =
        serde_json::from_str(&contents).context("failed to parse fixture file as a JSON array")?;

    let store = InMemoryStore::new();
    for fixture in &fixtures {
        let id = fixture
            .winner
            .get("_id")
            .and_then(Value::as_str)
            .context("fixture winner missing _id")?
            .to_string();
        for sibling in &fixture.siblings {
            let rev = sibling
                .get("_rev")
                .and_then(Value::as_str)
                .context("fixture sibling missing _rev")?;
            store.seed(&id, rev, sibling.clone());
        }
        let winner_rev = fixture
            .winner
            .get("_rev")
            .and_then(Value::as_str)
            .context("fixture winner missing _rev")?
            .to_string();
        store.set_current(&id, &winner_rev);

        handle_conflict(&store, config, &id, fixture.winner.clone());

        match store.get(&id, &winner_rev) {
            Ok(doc) => println!("{} {id}: {}", "✓".green(), doc.body),
            Err(_) => println!("{} {id}: resolved (winner revision superseded)", "✓".green()),
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;

    setup_logging(config.debug);
    println!("{} concord starting (collection: {})", "▶".cyan(), config.collection);
    info!(poll_seconds = config.poll_seconds, timezone = %config.timezone, "starting concord");

    match cli.command {
        Command::Run { dump_dir } => {
            if dump_dir.is_some() {
                config.dump_dir = dump_dir;
            }
            run_daemon(&config)
        }
        Command::ResolveFile { path } => run_resolve_file(&path, &config),
    }
}
