//! Ledger boundary for the showdown control plane.
//!
//! Wraps the three on-chain contracts (table, agent registry, treasury vault)
//! behind typed read calls, confirmed write calls and bounded log queries.
//! All consensus, hand evaluation and share pricing live on-chain; this crate
//! only moves bytes.

use std::sync::Arc;

use ethers::abi::RawLog;
use ethers::contract::EthLogDecode;
use ethers::middleware::SignerMiddleware;
use ethers::prelude::abigen;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, Filter, Log, H256, U256};
use showdown_types::{ChainEvent, GameState};
use thiserror::Error;
use tracing::warn;

pub mod decode;

abigen!(
    PokerTable,
    r#"[
        event SeatUpdated(uint64 indexed tableId, uint8 seatIndex, address owner, address operator, uint256 stack, bool isActive)
        event HandStarted(uint64 indexed tableId, uint64 indexed handId, uint8 buttonSeat, uint256 smallBlind, uint256 bigBlind)
        event ActionTaken(uint64 indexed tableId, uint64 indexed handId, uint8 seatIndex, uint8 action, uint256 amount, uint256 potAfter)
        event PotUpdated(uint64 indexed tableId, uint64 indexed handId, uint256 pot, uint256 currentBet, uint8 actorSeat)
        event BettingRoundComplete(uint64 indexed tableId, uint64 indexed handId, uint8 street)
        event RandomnessRequested(uint64 indexed tableId, uint64 indexed handId, uint8 street, uint64 requestedAt)
        event CommunityCardsDealt(uint64 indexed tableId, uint64 indexed handId, uint8[] cards)
        event HandSettled(uint64 indexed tableId, uint64 indexed handId, uint8 winnerSeat, uint256 amount)
        event TimeoutForced(uint64 indexed tableId, uint64 indexed handId, uint8 seatIndex)
        event HoleCommitSubmitted(uint64 indexed tableId, uint64 indexed handId, uint8 seatIndex, bytes32 commitment)
        event HoleCardsRevealed(uint64 indexed tableId, uint64 indexed handId, uint8 seatIndex, uint8 card0, uint8 card1)
        function tableId() external view returns (uint64)
        function gameState() external view returns (uint8)
        function currentHandId() external view returns (uint64)
        function actionDeadline() external view returns (uint64)
        function lastActionBlock() external view returns (uint64)
        function randomnessRequestedAt() external view returns (uint64)
        function isReadyToStart() external view returns (bool)
        function maxSeats() external view returns (uint8)
        function smallBlind() external view returns (uint256)
        function bigBlind() external view returns (uint256)
        function getSeat(uint8 seatIndex) external view returns (address, address, uint256, bool, uint256)
        function activeSeats() external view returns (uint8[])
        function hasHoleCommit(uint64 handId, uint8 seatIndex) external view returns (bool)
        function hasHoleReveal(uint64 handId, uint8 seatIndex) external view returns (bool)
        function submitHoleCommit(uint64 handId, uint8 seatIndex, bytes32 commitment) external
        function forceTimeout() external
        function requestRandomness() external
        function startHand() external
        function revealHoleCards(uint64 handId, uint8 seatIndex, uint8 card0, uint8 card1, bytes32 salt) external
        function settleShowdown(uint64 handId) external
    ]"#
);

abigen!(
    AgentRegistry,
    r#"[
        event AgentRegistered(address indexed tokenAddress, address vaultAddress, address tableAddress, address owner, address operator, string metaUri)
        event AgentUpdated(address indexed tokenAddress, address operator, string metaUri)
    ]"#
);

abigen!(
    TreasuryVault,
    r#"[
        event VaultSnapshotted(address indexed vaultAddress, uint64 indexed handId, uint256 externalAssets, uint256 treasuryShares, uint256 outstandingShares, uint256 navPerShare, int256 cumulativePnl)
        function isRebalanceEligible() external view returns (bool)
        function rebalanceBuy(uint256 amount) external
        function rebalanceSell(uint256 amount) external
    ]"#
);

#[derive(Error, Debug)]
pub enum Error {
    #[error("provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),
    #[error("contract call failed: {0}")]
    Contract(String),
    #[error("invalid signer key: {0}")]
    InvalidKey(String),
    #[error("write call attempted without a configured signer")]
    NoSigner,
    #[error("transaction {0:#x} reverted")]
    TxReverted(H256),
    #[error("transaction dropped before inclusion")]
    TxDropped,
    #[error("log missing block number or log index")]
    IncompleteLog,
    #[error("unexpected on-chain value: {0}")]
    UnexpectedValue(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// True when an error message looks like upstream RPC rate limiting. The
/// keeper stretches its poll delay on these instead of hammering the RPC.
pub fn is_rate_limited(err: &Error) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    message.contains("429")
        || message.contains("rate limit")
        || message.contains("too many requests")
}

/// True when a failed write matches a known benign race with a competing
/// keeper (the action already happened, or its precondition is not met yet).
pub fn is_expected_race(err: &Error, needles: &[&str]) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    needles
        .iter()
        .any(|needle| message.contains(&needle.to_ascii_lowercase()))
}

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub table_address: Address,
    pub registry_address: Address,
    pub vault_address: Address,
    pub chain_id: u64,
}

/// Point-in-time ledger view the keeper evaluates each tick. One struct so a
/// mock can script an entire tick without a live chain.
#[derive(Clone, Debug, Default)]
pub struct TableStatus {
    pub table_id: u64,
    pub current_block: u64,
    pub now: u64,
    pub game_state: Option<GameState>,
    pub current_hand_id: u64,
    pub action_deadline: u64,
    pub last_action_block: u64,
    pub randomness_requested_at: u64,
    pub active_seats: Vec<u8>,
    pub committed_seats: Vec<u8>,
    pub revealed_seats: Vec<u8>,
    pub ready_to_start: bool,
    pub rebalance_eligible: bool,
}

/// Live seat occupancy used by the startup chain seed and by the card
/// endpoint's owner check.
#[derive(Clone, Debug)]
pub struct SeatInfo {
    pub seat_index: u8,
    pub owner: Address,
    pub operator: Address,
    pub stack: u128,
    pub is_active: bool,
    pub current_bet: u128,
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Handle to the three contracts. Reads go through the bare provider; writes
/// require a signer and wait for inclusion before returning.
#[derive(Clone)]
pub struct Ledger {
    provider: Arc<Provider<Http>>,
    config: ChainConfig,
    table: PokerTable<Provider<Http>>,
    vault: TreasuryVault<Provider<Http>>,
    signer: Option<Arc<SignerClient>>,
}

impl Ledger {
    /// Read-only handle; sufficient for the indexer.
    pub fn connect(config: ChainConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|err| Error::Contract(err.to_string()))?;
        let provider = Arc::new(provider);
        let table = PokerTable::new(config.table_address, provider.clone());
        let vault = TreasuryVault::new(config.vault_address, provider.clone());
        Ok(Self {
            provider,
            config,
            table,
            vault,
            signer: None,
        })
    }

    /// Attach a signing key; required for every keeper write.
    pub fn with_signer(mut self, private_key_hex: &str) -> Result<Self> {
        let wallet: LocalWallet = private_key_hex
            .trim_start_matches("0x")
            .parse()
            .map_err(|err: ethers::signers::WalletError| Error::InvalidKey(err.to_string()))?;
        let wallet = wallet.with_chain_id(self.config.chain_id);
        let client = SignerMiddleware::new(self.provider.as_ref().clone(), wallet);
        self.signer = Some(Arc::new(client));
        Ok(self)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub async fn head_block(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    /// Fetch logs for all three contracts over one bounded block range,
    /// concurrently, and decode them into the event union. The result is
    /// unsorted; the listener owns the (block, logIndex) total order.
    pub async fn fetch_events(&self, from_block: u64, to_block: u64) -> Result<Vec<ChainEvent>> {
        let (table_logs, registry_logs, vault_logs) = tokio::try_join!(
            self.fetch_logs(self.config.table_address, from_block, to_block),
            self.fetch_logs(self.config.registry_address, from_block, to_block),
            self.fetch_logs(self.config.vault_address, from_block, to_block),
        )?;

        let mut events = Vec::new();
        for log in table_logs {
            append_decoded(&mut events, decode::decode_table_log(&log), &log)?;
        }
        for log in registry_logs {
            append_decoded(&mut events, decode::decode_registry_log(&log), &log)?;
        }
        for log in vault_logs {
            append_decoded(&mut events, decode::decode_vault_log(&log), &log)?;
        }
        Ok(events)
    }

    async fn fetch_logs(&self, address: Address, from: u64, to: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(address)
            .from_block(BlockNumber::Number(from.into()))
            .to_block(BlockNumber::Number(to.into()));
        Ok(self.provider.get_logs(&filter).await?)
    }

    /// Gather the full per-tick ledger view the keeper evaluates.
    pub async fn read_status(&self) -> Result<TableStatus> {
        let (current_block, now) = self.block_and_timestamp().await?;
        let game_state_raw = self.call(self.table.game_state()).await?;
        let game_state = GameState::from_u8(game_state_raw);
        if game_state.is_none() {
            warn!(raw = game_state_raw, "unknown game state reported by table");
        }
        let current_hand_id = self.call(self.table.current_hand_id()).await?;
        let action_deadline = self.call(self.table.action_deadline()).await?;
        let last_action_block = self.call(self.table.last_action_block()).await?;
        let randomness_requested_at = self.call(self.table.randomness_requested_at()).await?;
        let ready_to_start = self.call(self.table.is_ready_to_start()).await?;
        let active_seats = self.call(self.table.active_seats()).await?;
        let rebalance_eligible = self.call(self.vault.is_rebalance_eligible()).await?;
        let table_id = self.call(self.table.table_id()).await?;

        let mut committed_seats = Vec::new();
        let mut revealed_seats = Vec::new();
        for seat in &active_seats {
            if self
                .call(self.table.has_hole_commit(current_hand_id, *seat))
                .await?
            {
                committed_seats.push(*seat);
            }
            if self
                .call(self.table.has_hole_reveal(current_hand_id, *seat))
                .await?
            {
                revealed_seats.push(*seat);
            }
        }

        Ok(TableStatus {
            table_id,
            current_block,
            now,
            game_state,
            current_hand_id,
            action_deadline,
            last_action_block,
            randomness_requested_at,
            active_seats,
            committed_seats,
            revealed_seats,
            ready_to_start,
            rebalance_eligible,
        })
    }

    /// Live seat occupancy and blinds; used for the startup chain seed and
    /// the card endpoint's never-cached owner check.
    pub async fn read_seats(&self) -> Result<Vec<SeatInfo>> {
        let max_seats = self.call(self.table.max_seats()).await?;
        let mut seats = Vec::with_capacity(max_seats as usize);
        for seat_index in 0..max_seats {
            let (owner, operator, stack, is_active, current_bet) =
                self.call(self.table.get_seat(seat_index)).await?;
            seats.push(SeatInfo {
                seat_index,
                owner,
                operator,
                stack: to_u128(stack)?,
                is_active,
                current_bet: to_u128(current_bet)?,
            });
        }
        Ok(seats)
    }

    pub async fn read_blinds(&self) -> Result<(u128, u128)> {
        let small = self.call(self.table.small_blind()).await?;
        let big = self.call(self.table.big_blind()).await?;
        Ok((to_u128(small)?, to_u128(big)?))
    }

    pub async fn submit_hole_commit(
        &self,
        hand_id: u64,
        seat_index: u8,
        commitment: [u8; 32],
    ) -> Result<H256> {
        let table = self.signed_table()?;
        self.send(table.submit_hole_commit(hand_id, seat_index, commitment))
            .await
    }

    pub async fn force_timeout(&self) -> Result<H256> {
        let table = self.signed_table()?;
        self.send(table.force_timeout()).await
    }

    pub async fn request_randomness(&self) -> Result<H256> {
        let table = self.signed_table()?;
        self.send(table.request_randomness()).await
    }

    pub async fn start_hand(&self) -> Result<H256> {
        let table = self.signed_table()?;
        self.send(table.start_hand()).await
    }

    pub async fn reveal_hole_cards(
        &self,
        hand_id: u64,
        seat_index: u8,
        cards: [u8; 2],
        salt: [u8; 32],
    ) -> Result<H256> {
        let table = self.signed_table()?;
        self.send(table.reveal_hole_cards(hand_id, seat_index, cards[0], cards[1], salt))
            .await
    }

    pub async fn settle_showdown(&self, hand_id: u64) -> Result<H256> {
        let table = self.signed_table()?;
        self.send(table.settle_showdown(hand_id)).await
    }

    pub async fn rebalance_buy(&self, amount: u128) -> Result<H256> {
        let vault = self.signed_vault()?;
        self.send(vault.rebalance_buy(U256::from(amount))).await
    }

    pub async fn rebalance_sell(&self, amount: u128) -> Result<H256> {
        let vault = self.signed_vault()?;
        self.send(vault.rebalance_sell(U256::from(amount))).await
    }

    fn signed_table(&self) -> Result<PokerTable<SignerClient>> {
        let signer = self.signer.as_ref().ok_or(Error::NoSigner)?;
        Ok(PokerTable::new(self.config.table_address, signer.clone()))
    }

    fn signed_vault(&self) -> Result<TreasuryVault<SignerClient>> {
        let signer = self.signer.as_ref().ok_or(Error::NoSigner)?;
        Ok(TreasuryVault::new(self.config.vault_address, signer.clone()))
    }

    async fn block_and_timestamp(&self) -> Result<(u64, u64)> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await?
            .ok_or_else(|| Error::UnexpectedValue("latest block unavailable".to_string()))?;
        let number = block
            .number
            .ok_or_else(|| Error::UnexpectedValue("latest block has no number".to_string()))?;
        Ok((number.as_u64(), block.timestamp.as_u64()))
    }

    async fn call<M, D>(&self, call: ethers::contract::FunctionCall<Arc<M>, M, D>) -> Result<D>
    where
        M: Middleware + 'static,
        D: ethers::abi::Detokenize,
    {
        call.call()
            .await
            .map_err(|err| Error::Contract(err.to_string()))
    }

    /// Submit a write and wait for inclusion; a reverted or dropped
    /// transaction is an error the caller classifies.
    async fn send<D>(
        &self,
        call: ethers::contract::FunctionCall<Arc<SignerClient>, SignerClient, D>,
    ) -> Result<H256>
    where
        D: ethers::abi::Detokenize,
    {
        let pending = call
            .send()
            .await
            .map_err(|err| Error::Contract(err.to_string()))?;
        let tx_hash = pending.tx_hash();
        let receipt = pending
            .await
            .map_err(|err| Error::Contract(err.to_string()))?
            .ok_or(Error::TxDropped)?;
        if receipt.status == Some(0.into()) {
            return Err(Error::TxReverted(tx_hash));
        }
        Ok(tx_hash)
    }
}

fn append_decoded(
    events: &mut Vec<ChainEvent>,
    body: Option<showdown_types::ChainEventBody>,
    log: &Log,
) -> Result<()> {
    let Some(body) = body else {
        return Ok(());
    };
    let block_number = log.block_number.ok_or(Error::IncompleteLog)?.as_u64();
    let log_index = log.log_index.ok_or(Error::IncompleteLog)?.as_u64();
    let tx_hash = log.transaction_hash.ok_or(Error::IncompleteLog)?;
    events.push(ChainEvent {
        block_number,
        log_index,
        tx_hash,
        body,
    });
    Ok(())
}

pub(crate) fn raw_log(log: &Log) -> RawLog {
    RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    }
}

pub(crate) fn to_u128(value: U256) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::UnexpectedValue(format!(
            "value exceeds u128: {value}"
        )));
    }
    Ok(value.as_u128())
}

pub(crate) fn decode_event<E: EthLogDecode>(log: &Log) -> Option<E> {
    E::decode_log(&raw_log(log)).ok()
}
