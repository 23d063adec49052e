use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::cards::Card;

/// Lifecycle of a table as reported by the table contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameState {
    AwaitingSeats,
    AwaitingRandomness,
    PreFlopBetting,
    FlopBetting,
    TurnBetting,
    RiverBetting,
    Showdown,
    Settled,
}

impl GameState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AwaitingSeats),
            1 => Some(Self::AwaitingRandomness),
            2 => Some(Self::PreFlopBetting),
            3 => Some(Self::FlopBetting),
            4 => Some(Self::TurnBetting),
            5 => Some(Self::RiverBetting),
            6 => Some(Self::Showdown),
            7 => Some(Self::Settled),
            _ => None,
        }
    }

    /// States in which a seat is on the clock and a timeout can be forced.
    pub fn is_betting(&self) -> bool {
        matches!(
            self,
            Self::PreFlopBetting | Self::FlopBetting | Self::TurnBetting | Self::RiverBetting
        )
    }

    /// States from which the keeper may try to start the next hand.
    pub fn is_startable(&self) -> bool {
        matches!(self, Self::AwaitingSeats | Self::Settled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Blind,
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    Timeout,
}

impl ActionKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Blind),
            1 => Some(Self::Fold),
            2 => Some(Self::Check),
            3 => Some(Self::Call),
            4 => Some(Self::Bet),
            5 => Some(Self::Raise),
            6 => Some(Self::Timeout),
            _ => None,
        }
    }
}

/// Denormalized mirror of a table contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: u64,
    pub contract_address: Address,
    pub small_blind: u128,
    pub big_blind: u128,
    pub current_hand_id: Option<u64>,
    pub game_state: GameState,
    pub button_seat: Option<u8>,
    pub action_deadline: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub table_id: u64,
    pub seat_index: u8,
    pub owner: Address,
    pub operator: Address,
    pub stack: u128,
    pub is_active: bool,
    pub current_bet: u128,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hand {
    pub table_id: u64,
    pub hand_id: u64,
    pub pot: u128,
    pub current_bet: u128,
    pub actor_seat: Option<u8>,
    pub game_state: GameState,
    pub community_cards: Vec<Card>,
    pub winner_seat: Option<u8>,
    pub settlement_amount: Option<u128>,
    pub started_at: u64,
    pub settled_at: Option<u64>,
}

/// A single betting action, append-only and ordered by insertion.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandAction {
    pub table_id: u64,
    pub hand_id: u64,
    pub seat_index: u8,
    pub kind: ActionKind,
    pub amount: u128,
    pub pot_after: u128,
    pub block_number: u64,
    pub tx_hash: H256,
    pub created_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub token_address: Address,
    pub vault_address: Address,
    pub table_address: Address,
    pub owner: Address,
    pub operator: Address,
    pub meta_uri: String,
    pub is_registered: bool,
}

/// Append-only NAV time series per vault, one point per settled hand.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSnapshot {
    pub vault_address: Address,
    pub hand_id: u64,
    pub external_assets: u128,
    pub treasury_shares: u128,
    pub outstanding_shares: u128,
    /// NAV per share scaled by 1e18, as reported by the vault contract.
    pub nav_per_share: u128,
    pub cumulative_pnl: i128,
    pub block_number: u64,
    pub recorded_at: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub table_id: u64,
    pub hand_id: u64,
    pub winner_seat: u8,
    pub pot_amount: u128,
    pub block_number: u64,
    pub tx_hash: H256,
}
