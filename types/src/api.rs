//! Wire types for the REST, streaming and dealer surfaces.

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::cards::Card;

/// Typed push message sent to per-table stream subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub table_id: u64,
    pub timestamp: u64,
    pub data: serde_json::Value,
}

/// Structured error body returned by every read endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderboardMetric {
    Roi,
    Pnl,
    Winrate,
    /// Maximum drawdown; the only metric ranked ascending (lower is better).
    Mdd,
}

impl std::str::FromStr for LeaderboardMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roi" => Ok(Self::Roi),
            "pnl" => Ok(Self::Pnl),
            "winrate" => Ok(Self::Winrate),
            "mdd" => Ok(Self::Mdd),
            other => Err(format!("unknown leaderboard metric: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderboardPeriod {
    Day,
    Week,
    Month,
    All,
}

impl LeaderboardPeriod {
    pub fn as_seconds(&self) -> Option<u64> {
        match self {
            Self::Day => Some(86_400),
            Self::Week => Some(7 * 86_400),
            Self::Month => Some(30 * 86_400),
            Self::All => None,
        }
    }
}

impl std::str::FromStr for LeaderboardPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(Self::Day),
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "all" => Ok(Self::All),
            other => Err(format!("unknown leaderboard period: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub token_address: Address,
    pub vault_address: Address,
    pub value: f64,
    pub sample_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub ready: bool,
    pub storage_ready: bool,
    pub chain_configured: bool,
    pub last_processed_block: u64,
    pub tables: usize,
    pub ws_connections: usize,
    pub version: &'static str,
}

// Dealer surface.

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRequest {
    pub table_id: u64,
    pub hand_id: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatCommitment {
    pub seat_index: u8,
    /// 0x-prefixed hex of the 32-byte commitment.
    pub commitment: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealResponse {
    pub table_id: u64,
    pub hand_id: u64,
    pub commitments: Vec<SeatCommitment>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRequest {
    pub table_id: u64,
    pub hand_id: u64,
    pub seat_index: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealResponse {
    pub seat_index: u8,
    pub cards: [Card; 2],
    /// 0x-prefixed hex of the 32-byte salt.
    pub salt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsResponse {
    pub table_id: u64,
    pub hand_id: u64,
    pub seat_index: u8,
    pub cards: [Card; 2],
}

// Owner session handshake.

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    pub address: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub address: Address,
    pub nonce: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub address: Address,
    /// 0x-prefixed hex of the EIP-191 personal signature over the nonce message.
    pub signature: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: u64,
}
