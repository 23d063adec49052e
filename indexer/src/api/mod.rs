//! Read API over the mirror: REST queries plus a per-table event stream.

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::broadcast::BroadcastManager;
use crate::store::MirrorStore;

mod http;
mod ws;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MirrorStore>,
    pub broadcaster: Arc<BroadcastManager>,
    pub chain_configured: bool,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(http::health))
        .route("/tables", get(http::list_tables))
        .route("/tables/:table_id", get(http::get_table))
        .route("/tables/:table_id/seats", get(http::get_seats))
        .route("/tables/:table_id/hands", get(http::list_hands))
        .route("/tables/:table_id/hands/:hand_id", get(http::get_hand))
        .route("/tables/:table_id/stream", get(ws::stream))
        .route("/agents", get(http::list_agents))
        .route("/agents/:token_address", get(http::get_agent))
        .route("/agents/:token_address/snapshots", get(http::get_snapshots))
        .route("/leaderboard/:metric/:period", get(http::leaderboard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
