//! Relay daemon
//!
//! Hosts the broadcast hub for a replay session: the `/sync` WebSocket
//! fan-out and the capsule feed at `/api/replaycapsules`. Capsule lists
//! come from a JSON file keyed by mode; sessions with no file run with an
//! empty feed (clients then rely on the sovereign's snapshots).

use anyhow::Context;
use capsule_core::{ReplayCapsule, ReplayMode};
use capsule_sync::relay;
use capsule_sync::RelayState;
use clap::{value_parser, Arg, Command};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("capsule-relayd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Broadcast relay for capsule replay sessions")
        .arg(
            Arg::new("bind")
                .long("bind")
                .default_value("0.0.0.0:8765")
                .value_parser(value_parser!(SocketAddr))
                .help("Address to listen on"),
        )
        .arg(
            Arg::new("capsules")
                .long("capsules")
                .help("JSON file mapping mode names to capsule lists"),
        )
        .arg(
            Arg::new("history-cap")
                .long("history-cap")
                .default_value("500")
                .value_parser(value_parser!(usize))
                .help("Maximum chat messages retained for backfill"),
        )
        .get_matches();

    let addr = *matches
        .get_one::<SocketAddr>("bind")
        .context("bind address missing")?;
    let history_cap = *matches
        .get_one::<usize>("history-cap")
        .context("history cap missing")?;

    let capsules = match matches.get_one::<String>("capsules") {
        Some(path) => load_capsules(Path::new(path))?,
        None => HashMap::new(),
    };
    for (mode, list) in &capsules {
        tracing::info!(mode = %mode, count = list.len(), "capsule list loaded");
    }

    relay::serve(RelayState::new(capsules, history_cap), addr).await;
    Ok(())
}

/// Read a `{"daily": [...], "seasonal": [...]}` style file.
///
/// Unknown mode keys are skipped with a warning so a file written for a
/// newer build still loads.
fn load_capsules(path: &Path) -> anyhow::Result<HashMap<ReplayMode, Vec<ReplayCapsule>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading capsule file {}", path.display()))?;
    let raw: HashMap<String, Vec<ReplayCapsule>> = serde_json::from_str(&text)
        .with_context(|| format!("parsing capsule file {}", path.display()))?;

    let mut capsules = HashMap::new();
    for (key, list) in raw {
        match key.parse::<ReplayMode>() {
            Ok(mode) => {
                capsules.insert(mode, list);
            }
            Err(err) => tracing::warn!(%err, "skipping unrecognized mode key"),
        }
    }
    Ok(capsules)
}
