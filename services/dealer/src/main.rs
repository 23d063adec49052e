//! Commit-reveal dealing service: draws hole cards, publishes hash
//! commitments, and serves each seat owner their own cards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ethers::types::Address;
use showdown_chain::{ChainConfig, Ledger, SeatInfo};
use showdown_dealer::api::{self, AppState, SeatDirectory};
use showdown_dealer::auth::SessionManager;
use showdown_dealer::service::Dealer;
use showdown_dealer::store::HoleCardStore;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Commit-reveal dealing service for on-chain poker tables")]
struct Args {
    /// Listen address for the HTTP API
    #[arg(long, default_value = "0.0.0.0:9100")]
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

    /// Shared bearer token for keeper-only routes
    #[arg(long)]
    keeper_token: Option<String>,

    /// Path to file with the keeper bearer token
    #[arg(long)]
    keeper_token_file: Option<String>,

    /// Hole-card record persistence path
    #[arg(long, default_value = "dealer-holecards.json")]
    store_path: PathBuf,

    /// Number of seats dealt per hand
    #[arg(long, default_value = "6")]
    seat_count: u8,

    /// Owner session lifetime in seconds
    #[arg(long, default_value = "3600")]
    session_ttl_secs: u64,

    /// Evict records older than this many seconds
    #[arg(long, default_value = "86400")]
    record_max_age_secs: u64,
}

struct LedgerDirectory {
    ledger: Ledger,
}

impl SeatDirectory for LedgerDirectory {
    async fn seats(&self, _table_id: u64) -> Result<Vec<SeatInfo>> {
        Ok(self.ledger.read_seats().await?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let rpc_url = require_arg_or_env(args.rpc_url, "DEALER_RPC_URL")?;
    let table_address = parse_address(
        &require_arg_or_env(args.table_address, "DEALER_TABLE_ADDRESS")?,
        "table",
    )?;
    let registry_address = parse_address(
        &require_arg_or_env(args.registry_address, "DEALER_REGISTRY_ADDRESS")?,
        "registry",
    )?;
    let vault_address = parse_address(
        &require_arg_or_env(args.vault_address, "DEALER_VAULT_ADDRESS")?,
        "vault",
    )?;
    let keeper_token = require_arg_or_env_or_file(
        args.keeper_token,
        args.keeper_token_file,
        "DEALER_KEEPER_TOKEN",
        "DEALER_KEEPER_TOKEN_FILE",
    )?;
    let chain_id = env_u64("DEALER_CHAIN_ID").unwrap_or(args.chain_id);

    let ledger = Ledger::connect(ChainConfig {
        rpc_url,
        table_address,
        registry_address,
        vault_address,
        chain_id,
    })?;

    let store = HoleCardStore::open(&args.store_path).context("open hole-card store")?;
    info!(
        path = %args.store_path.display(),
        records = store.len(),
        "hole-card store ready"
    );
    let dealer = Arc::new(Dealer::new(store, args.seat_count));
    let sessions = Arc::new(SessionManager::new(args.session_ttl_secs));

    spawn_eviction(dealer.clone(), sessions.clone(), args.record_max_age_secs);

    let state = AppState {
        dealer,
        sessions,
        directory: Arc::new(LedgerDirectory { ledger }),
        keeper_token,
    };
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    info!(listen = %args.listen, "dealer service listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Hourly sweep of stale hole-card records and expired sessions.
fn spawn_eviction(dealer: Arc<Dealer>, sessions: Arc<SessionManager>, max_age_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3_600));
        loop {
            interval.tick().await;
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            match dealer.store().evict_older_than(max_age_secs, now) {
                Ok(0) => {}
                Ok(removed) => info!(removed, "evicted stale hole-card records"),
                Err(err) => warn!(%err, "hole-card eviction failed"),
            }
            let purged = sessions.purge_expired(now);
            if purged > 0 {
                info!(purged, "purged expired owner sessions");
            }
        }
    });
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

fn require_arg_or_env_or_file(
    value: Option<String>,
    file: Option<String>,
    env_key: &str,
    env_file: &str,
) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    if let Some(file_path) = file {
        return read_secret_file(&file_path);
    }
    if let Ok(value) = std::env::var(env_key) {
        return Ok(value);
    }
    if let Ok(file_path) = std::env::var(env_file) {
        return read_secret_file(&file_path);
    }
    Err(anyhow!("Missing {env_key} or {env_file} (flag or env var)"))
}

fn read_secret_file(path: &str) -> Result<String> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read secret file {path}"))?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Secret file is empty: {path}"));
    }
    Ok(trimmed.to_string())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
