use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::cards::Card;

/// Idempotency key for a single ledger log: `(block_number, log_index)`.
pub type EventKey = (u64, u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Street {
    PreFlop,
    Flop,
    Turn,
    River,
}

impl Street {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PreFlop),
            1 => Some(Self::Flop),
            2 => Some(Self::Turn),
            3 => Some(Self::River),
            _ => None,
        }
    }
}

/// A decoded ledger log together with its total-order key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: H256,
    pub body: ChainEventBody,
}

impl ChainEvent {
    pub fn key(&self) -> EventKey {
        (self.block_number, self.log_index)
    }
}

/// Tagged union over every event kind the three contracts emit. Unknown log
/// topics never reach this type; the decoder drops them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ChainEventBody {
    #[serde(rename_all = "camelCase")]
    SeatUpdated {
        table_id: u64,
        seat_index: u8,
        owner: Address,
        operator: Address,
        stack: u128,
        is_active: bool,
    },
    #[serde(rename_all = "camelCase")]
    HandStarted {
        table_id: u64,
        hand_id: u64,
        button_seat: u8,
        small_blind: u128,
        big_blind: u128,
    },
    #[serde(rename_all = "camelCase")]
    ActionTaken {
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
        action: u8,
        amount: u128,
        pot_after: u128,
    },
    #[serde(rename_all = "camelCase")]
    PotUpdated {
        table_id: u64,
        hand_id: u64,
        pot: u128,
        current_bet: u128,
        actor_seat: u8,
    },
    #[serde(rename_all = "camelCase")]
    BettingRoundComplete {
        table_id: u64,
        hand_id: u64,
        street: Street,
    },
    #[serde(rename_all = "camelCase")]
    RandomnessRequested {
        table_id: u64,
        hand_id: u64,
        street: Street,
        requested_at: u64,
    },
    #[serde(rename_all = "camelCase")]
    CommunityCardsDealt {
        table_id: u64,
        hand_id: u64,
        /// Only the cards newly revealed for this street, not the full board.
        cards: Vec<Card>,
    },
    #[serde(rename_all = "camelCase")]
    HandSettled {
        table_id: u64,
        hand_id: u64,
        winner_seat: u8,
        amount: u128,
    },
    #[serde(rename_all = "camelCase")]
    TimeoutForced {
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
    },
    #[serde(rename_all = "camelCase")]
    HoleCommitSubmitted {
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
        commitment: H256,
    },
    #[serde(rename_all = "camelCase")]
    HoleCardsRevealed {
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
        cards: [Card; 2],
    },
    #[serde(rename_all = "camelCase")]
    AgentRegistered {
        token_address: Address,
        vault_address: Address,
        table_address: Address,
        owner: Address,
        operator: Address,
        meta_uri: String,
    },
    #[serde(rename_all = "camelCase")]
    AgentUpdated {
        token_address: Address,
        operator: Address,
        meta_uri: String,
    },
    #[serde(rename_all = "camelCase")]
    VaultSnapshotted {
        vault_address: Address,
        hand_id: u64,
        external_assets: u128,
        treasury_shares: u128,
        outstanding_shares: u128,
        nav_per_share: u128,
        cumulative_pnl: i128,
    },
}

impl ChainEventBody {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SeatUpdated { .. } => "seatUpdated",
            Self::HandStarted { .. } => "handStarted",
            Self::ActionTaken { .. } => "actionTaken",
            Self::PotUpdated { .. } => "potUpdated",
            Self::BettingRoundComplete { .. } => "bettingRoundComplete",
            Self::RandomnessRequested { .. } => "randomnessRequested",
            Self::CommunityCardsDealt { .. } => "communityCardsDealt",
            Self::HandSettled { .. } => "handSettled",
            Self::TimeoutForced { .. } => "timeoutForced",
            Self::HoleCommitSubmitted { .. } => "holeCommitSubmitted",
            Self::HoleCardsRevealed { .. } => "holeCardsRevealed",
            Self::AgentRegistered { .. } => "agentRegistered",
            Self::AgentUpdated { .. } => "agentUpdated",
            Self::VaultSnapshotted { .. } => "vaultSnapshotted",
        }
    }

    /// Table the event belongs to, when it is table-scoped. Registry and
    /// vault events return `None` and are broadcast to no table channel.
    pub fn table_id(&self) -> Option<u64> {
        match self {
            Self::SeatUpdated { table_id, .. }
            | Self::HandStarted { table_id, .. }
            | Self::ActionTaken { table_id, .. }
            | Self::PotUpdated { table_id, .. }
            | Self::BettingRoundComplete { table_id, .. }
            | Self::RandomnessRequested { table_id, .. }
            | Self::CommunityCardsDealt { table_id, .. }
            | Self::HandSettled { table_id, .. }
            | Self::TimeoutForced { table_id, .. }
            | Self::HoleCommitSubmitted { table_id, .. }
            | Self::HoleCardsRevealed { table_id, .. } => Some(*table_id),
            Self::AgentRegistered { .. }
            | Self::AgentUpdated { .. }
            | Self::VaultSnapshotted { .. } => None,
        }
    }
}
