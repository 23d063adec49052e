//! Keeper binary: connects a signing ledger handle and the dealing service,
//! then ticks until interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ethers::types::Address;
use showdown_chain::{ChainConfig, Ledger};
use showdown_keeper::dealer_client::DealerClient;
use showdown_keeper::{Keeper, KeeperConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Control loop that keeps on-chain poker tables moving")]
struct Args {
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

    /// Keeper signing key hex
    #[arg(long)]
    private_key: Option<String>,

    /// Path to file with the keeper signing key hex
    #[arg(long)]
    private_key_file: Option<String>,

    /// Dealer service base URL
    #[arg(long, default_value = "http://localhost:9100")]
    dealer_url: String,

    /// Shared bearer token for the dealer's keeper routes
    #[arg(long)]
    dealer_token: Option<String>,

    /// Disable commit and reveal handling entirely
    #[arg(long)]
    no_dealer: bool,

    /// Tick interval in seconds
    #[arg(long, default_value = "3")]
    tick_secs: u64,

    /// Backoff ceiling in seconds when rate limited
    #[arg(long, default_value = "60")]
    max_backoff_secs: u64,

    /// Seconds before a pending randomness request is re-issued
    #[arg(long, default_value = "120")]
    randomness_timeout_secs: u64,

    /// Vault rebalance amount; zero disables rebalancing
    #[arg(long, default_value = "0")]
    rebalance_amount: u128,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let rpc_url = require_arg_or_env(args.rpc_url, "KEEPER_RPC_URL")?;
    let table_address = parse_address(
        &require_arg_or_env(args.table_address, "KEEPER_TABLE_ADDRESS")?,
        "table",
    )?;
    let registry_address = parse_address(
        &require_arg_or_env(args.registry_address, "KEEPER_REGISTRY_ADDRESS")?,
        "registry",
    )?;
    let vault_address = parse_address(
        &require_arg_or_env(args.vault_address, "KEEPER_VAULT_ADDRESS")?,
        "vault",
    )?;
    let private_key = require_arg_or_env_or_file(
        args.private_key,
        args.private_key_file,
        "KEEPER_PRIVATE_KEY",
        "KEEPER_PRIVATE_KEY_FILE",
    )?;

    let ledger = Ledger::connect(ChainConfig {
        rpc_url,
        table_address,
        registry_address,
        vault_address,
        chain_id: args.chain_id,
    })?
    .with_signer(&private_key)?;

    let dealer_enabled = !args.no_dealer;
    let dealer_token = if dealer_enabled {
        require_arg_or_env(args.dealer_token, "KEEPER_DEALER_TOKEN")?
    } else {
        String::new()
    };
    let dealer = DealerClient::new(&args.dealer_url, &dealer_token);

    let config = KeeperConfig {
        tick_interval: Duration::from_secs(args.tick_secs),
        max_backoff: Duration::from_secs(args.max_backoff_secs),
        randomness_timeout_secs: args.randomness_timeout_secs,
        rebalance_amount: args.rebalance_amount,
        dealer_enabled,
    };
    let mut keeper = Keeper::new(ledger, dealer, config);

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    keeper.run(stop).await;
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
