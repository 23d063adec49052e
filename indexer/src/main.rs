//! Event indexer: replays the table, registry and vault logs into an
//! in-memory mirror and serves it over REST plus a per-table stream.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ethers::types::Address;
use showdown_chain::{ChainConfig, Ledger};
use showdown_indexer::api::{self, AppState};
use showdown_indexer::broadcast::BroadcastManager;
use showdown_indexer::listener::{seed_from_chain, Listener, ListenerConfig};
use showdown_indexer::store::{CursorFile, MirrorStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Event indexer and read API for on-chain poker tables")]
struct Args {
    /// Listen address for the HTTP API
    #[arg(long, default_value = "0.0.0.0:9000")]
    listen: String,

    /// EVM JSON-RPC endpoint URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Poker table contract address
    #[arg(long)]
    table_address: Option<String>,

    /// Agent registry contract address
    #[arg(long)]
    registry_address: Option<String>,

    /// Treasury vault contract address
    #[arg(long)]
    vault_address: Option<String>,

    /// EVM chain id
    #[arg(long, default_value = "1")]
    chain_id: u64,

    /// Cursor persistence path
    #[arg(long, default_value = "indexer-cursor.json")]
    cursor_path: PathBuf,

    /// First block to scan when no cursor exists
    #[arg(long, default_value = "0")]
    start_block: u64,

    /// Discard the saved cursor and replay from this block
    #[arg(long)]
    replay_from: Option<u64>,

    /// Max block range per log query
    #[arg(long, default_value = "2000")]
    log_range: u64,

    /// Poll interval in seconds once caught up
    #[arg(long, default_value = "2")]
    poll_secs: u64,

    /// Backoff in seconds after a sync error
    #[arg(long, default_value = "5")]
    backoff_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let rpc_url = require_arg_or_env(args.rpc_url, "INDEXER_RPC_URL")?;
    let table_address = parse_address(
        &require_arg_or_env(args.table_address, "INDEXER_TABLE_ADDRESS")?,
        "table",
    )?;
    let registry_address = parse_address(
        &require_arg_or_env(args.registry_address, "INDEXER_REGISTRY_ADDRESS")?,
        "registry",
    )?;
    let vault_address = parse_address(
        &require_arg_or_env(args.vault_address, "INDEXER_VAULT_ADDRESS")?,
        "vault",
    )?;

    let ledger = Ledger::connect(ChainConfig {
        rpc_url,
        table_address,
        registry_address,
        vault_address,
        chain_id: args.chain_id,
    })?;

    let store = Arc::new(MirrorStore::new());
    let broadcaster = Arc::new(BroadcastManager::new());

    let cursor_file = CursorFile::new(&args.cursor_path);
    let replay_start_block = match args.replay_from {
        Some(block) => {
            cursor_file.reset().context("reset cursor for replay")?;
            info!(from_block = block, "replaying event history");
            block
        }
        None => args.start_block,
    };
    // The mirror is in-memory, so every start rebuilds it by replaying from
    // the start block; idempotent handlers make the redo safe. The saved
    // cursor is kept only as the prior run's progress high-water mark.
    if let Some(cursor) = cursor_file.load().context("load cursor")? {
        // A start block beyond the prior progress would skip the history in
        // between; moving the scan origin requires an explicit replay.
        if cursor.last_processed_block < replay_start_block {
            return Err(anyhow!(
                "saved cursor at block {} is behind --start-block {}; \
                 pass --replay-from to rescan",
                cursor.last_processed_block,
                replay_start_block
            ));
        }
        info!(
            block = cursor.last_processed_block,
            log_index = cursor.last_processed_log_index,
            "replaying history up to and past the saved cursor"
        );
    }

    seed_from_chain(&store, &ledger).await;

    let listener = Listener::new(
        ledger,
        store.clone(),
        broadcaster.clone(),
        Some(cursor_file),
        ListenerConfig {
            replay_start_block,
            max_block_range: args.log_range,
            poll_interval: Duration::from_secs(args.poll_secs),
            error_backoff: Duration::from_secs(args.backoff_secs),
        },
    );

    let stop = Arc::new(AtomicBool::new(false));
    let listener_stop = stop.clone();
    let listener_task = tokio::spawn(async move { listener.run(listener_stop).await });

    let state = AppState {
        store,
        broadcaster,
        chain_configured: true,
    };
    let router = api::router(state);
    let http_listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    info!(listen = %args.listen, "indexer API listening");

    tokio::select! {
        result = axum::serve(http_listener, router).into_future() => {
            result.context("api server exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    stop.store(true, Ordering::Relaxed);
    let _ = listener_task.await;
    Ok(())
}

fn parse_address(value: &str, which: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|err| anyhow!("invalid {which} address {value}: {err}"))
}

fn require_arg_or_env(value: Option<String>, env_key: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    if let Ok(value) = std::env::var(env_key) {
        return Ok(value);
    }
    Err(anyhow!("Missing {env_key} (flag or env var)"))
}
