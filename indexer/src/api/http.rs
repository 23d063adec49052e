use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use showdown_types::api::{
    ErrorBody, HealthResponse, LeaderboardMetric, LeaderboardPeriod,
};
use showdown_types::{Hand, HandAction};

use super::AppState;
use crate::leaderboard;

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("notFound", message)),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new("badRequest", message)),
    )
        .into_response()
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub async fn health(State(state): State<AppState>) -> Response {
    let cursor = state.store.cursor();
    Json(HealthResponse {
        healthy: true,
        ready: state.store.table_count() > 0,
        storage_ready: true,
        chain_configured: state.chain_configured,
        last_processed_block: cursor.last_processed_block,
        tables: state.store.table_count(),
        ws_connections: state.broadcaster.connection_count(),
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

pub async fn list_tables(State(state): State<AppState>) -> Response {
    Json(state.store.tables()).into_response()
}

pub async fn get_table(State(state): State<AppState>, Path(table_id): Path<u64>) -> Response {
    match state.store.table(table_id) {
        Some(table) => Json(table).into_response(),
        None => not_found("table not found"),
    }
}

pub async fn get_seats(State(state): State<AppState>, Path(table_id): Path<u64>) -> Response {
    if state.store.table(table_id).is_none() {
        return not_found("table not found");
    }
    Json(state.store.seats_for_table(table_id)).into_response()
}

const HAND_PAGE_SIZE: usize = 50;

pub async fn list_hands(State(state): State<AppState>, Path(table_id): Path<u64>) -> Response {
    if state.store.table(table_id).is_none() {
        return not_found("table not found");
    }
    Json(state.store.hands_for_table(table_id, HAND_PAGE_SIZE)).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandDetail {
    #[serde(flatten)]
    pub hand: Hand,
    pub actions: Vec<HandAction>,
}

pub async fn get_hand(
    State(state): State<AppState>,
    Path((table_id, hand_id)): Path<(u64, u64)>,
) -> Response {
    match state.store.hand(table_id, hand_id) {
        Some(hand) => Json(HandDetail {
            hand,
            actions: state.store.actions_for_hand(table_id, hand_id),
        })
        .into_response(),
        None => not_found("hand not found"),
    }
}

pub async fn list_agents(State(state): State<AppState>) -> Response {
    Json(state.store.agents()).into_response()
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(token_address): Path<Address>,
) -> Response {
    match state.store.agent(token_address) {
        Some(agent) => Json(agent).into_response(),
        None => not_found("agent not found"),
    }
}

const SNAPSHOT_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct SnapshotPage {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

/// NAV time series for an agent's vault, oldest first, paged with
/// `?offset=&limit=`.
pub async fn get_snapshots(
    State(state): State<AppState>,
    Path(token_address): Path<Address>,
    Query(page): Query<SnapshotPage>,
) -> Response {
    let Some(agent) = state.store.agent(token_address) else {
        return not_found("agent not found");
    };
    let snapshots = state.store.snapshots_for_vault(agent.vault_address);
    let limit = page.limit.unwrap_or(SNAPSHOT_PAGE_SIZE).min(1_000);
    let page: Vec<_> = snapshots
        .into_iter()
        .skip(page.offset)
        .take(limit)
        .collect();
    Json(page).into_response()
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Path((metric, period)): Path<(String, String)>,
) -> Response {
    let metric: LeaderboardMetric = match metric.parse() {
        Ok(metric) => metric,
        Err(err) => return bad_request(err),
    };
    let period: LeaderboardPeriod = match period.parse() {
        Ok(period) => period,
        Err(err) => return bad_request(err),
    };
    Json(leaderboard::rank(&state.store, metric, period, unix_now())).into_response()
}
