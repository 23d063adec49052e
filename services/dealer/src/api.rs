//! HTTP surface of the dealing service. Two audiences, two auth schemes:
//! seat owners log in with a wallet signature and may read their own cards;
//! the keeper authenticates with a shared bearer token and drives the
//! deal / reveal / cleanup lifecycle.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use showdown_chain::SeatInfo;
use showdown_types::api::{
    CardsResponse, DealRequest, DealResponse, ErrorBody, NonceRequest, NonceResponse,
    RevealRequest, RevealResponse, SeatCommitment, SessionResponse, VerifyRequest,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{AuthError, SessionManager};
use crate::service::{DealError, Dealer};

/// Where the router looks up seat ownership. The production impl reads the
/// table contract; tests substitute a fixture.
pub trait SeatDirectory: Send + Sync + 'static {
    fn seats(
        &self,
        table_id: u64,
    ) -> impl Future<Output = anyhow::Result<Vec<SeatInfo>>> + Send;
}

pub struct AppState<S> {
    pub dealer: Arc<Dealer>,
    pub sessions: Arc<SessionManager>,
    pub directory: Arc<S>,
    pub keeper_token: String,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            dealer: self.dealer.clone(),
            sessions: self.sessions.clone(),
            directory: self.directory.clone(),
            keeper_token: self.keeper_token.clone(),
        }
    }
}

pub fn router<S: SeatDirectory>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/healthz", get(healthz::<S>))
        .route("/auth/nonce", post(auth_nonce::<S>))
        .route("/auth/verify", post(auth_verify::<S>))
        .route(
            "/tables/:table_id/hands/:hand_id/cards",
            get(get_cards::<S>),
        )
        .route("/deal", post(deal::<S>))
        .route("/commitments/:table_id/:hand_id", get(get_commitments::<S>))
        .route("/reveal", post(reveal::<S>))
        .route("/cleanup/:table_id/:hand_id", post(cleanup::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(code, message))).into_response()
}

fn unauthorized(message: &str) -> Response {
    error_response(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn require_keeper<S>(state: &AppState<S>, headers: &HeaderMap) -> Result<(), Response> {
    match bearer_token(headers) {
        Some(token) if token == state.keeper_token => Ok(()),
        _ => Err(unauthorized("keeper token required")),
    }
}

fn hex32(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

async fn healthz<S: SeatDirectory>(State(state): State<AppState<S>>) -> Response {
    Json(serde_json::json!({
        "healthy": true,
        "storedRecords": state.dealer.store().len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

async fn auth_nonce<S: SeatDirectory>(
    State(state): State<AppState<S>>,
    Json(request): Json<NonceRequest>,
) -> Response {
    let nonce = state.sessions.issue_nonce(request.address, now_secs());
    let message = SessionManager::login_message(request.address, &nonce);
    Json(NonceResponse {
        address: request.address,
        nonce,
        message,
    })
    .into_response()
}

async fn auth_verify<S: SeatDirectory>(
    State(state): State<AppState<S>>,
    Json(request): Json<VerifyRequest>,
) -> Response {
    match state
        .sessions
        .verify(request.address, &request.signature, now_secs())
    {
        Ok((token, expires_at)) => {
            info!(address = %request.address, "owner session established");
            Json(SessionResponse { token, expires_at }).into_response()
        }
        Err(AuthError::UnknownNonce) => {
            error_response(StatusCode::BAD_REQUEST, "unknownNonce", "request a nonce first")
        }
        Err(err) => {
            warn!(address = %request.address, %err, "login rejected");
            unauthorized("signature verification failed")
        }
    }
}

/// The access-controlled card view. Only the seat OWNER may read hole cards;
/// an operator delegate acting for the same seat is explicitly refused.
async fn get_cards<S: SeatDirectory>(
    State(state): State<AppState<S>>,
    Path((table_id, hand_id)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized("session token required");
    };
    let address = match state.sessions.authenticate(token, now_secs()) {
        Ok(address) => address,
        Err(_) => return unauthorized("invalid or expired session token"),
    };

    let seats = match state.directory.seats(table_id).await {
        Ok(seats) => seats,
        Err(err) => {
            warn!(table_id, %err, "seat lookup failed");
            return error_response(
                StatusCode::BAD_GATEWAY,
                "chainUnavailable",
                "seat lookup failed",
            );
        }
    };

    if let Some(seat) = seats.iter().find(|seat| seat.owner == address) {
        match state.dealer.cards_for_seat(table_id, hand_id, seat.seat_index) {
            Some(cards) => Json(CardsResponse {
                table_id,
                hand_id,
                seat_index: seat.seat_index,
                cards,
            })
            .into_response(),
            None => error_response(
                StatusCode::NOT_FOUND,
                "notDealt",
                "no cards dealt for this seat and hand",
            ),
        }
    } else if seats.iter().any(|seat| seat.operator == address) {
        // Operators act on behalf of a seat but never see its cards.
        error_response(
            StatusCode::FORBIDDEN,
            "operatorForbidden",
            "operators may not view hole cards",
        )
    } else {
        error_response(
            StatusCode::FORBIDDEN,
            "notSeated",
            "account holds no seat at this table",
        )
    }
}

async fn deal<S: SeatDirectory>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<DealRequest>,
) -> Response {
    if let Err(response) = require_keeper(&state, &headers) {
        return response;
    }
    match state.dealer.deal(request.table_id, request.hand_id, now_secs()) {
        Ok(dealt) => {
            info!(
                table_id = request.table_id,
                hand_id = request.hand_id,
                seats = dealt.len(),
                "hand dealt"
            );
            let commitments = dealt
                .into_iter()
                .map(|seat| SeatCommitment {
                    seat_index: seat.seat_index,
                    commitment: hex32(&seat.commitment),
                })
                .collect();
            (
                StatusCode::CREATED,
                Json(DealResponse {
                    table_id: request.table_id,
                    hand_id: request.hand_id,
                    commitments,
                }),
            )
                .into_response()
        }
        Err(DealError::AlreadyDealt { .. }) => error_response(
            StatusCode::CONFLICT,
            "alreadyDealt",
            "hand already dealt; fetch commitments instead",
        ),
        Err(err) => {
            warn!(table_id = request.table_id, hand_id = request.hand_id, %err, "deal failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "dealFailed", err.to_string())
        }
    }
}

async fn get_commitments<S: SeatDirectory>(
    State(state): State<AppState<S>>,
    Path((table_id, hand_id)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_keeper(&state, &headers) {
        return response;
    }
    match state.dealer.commitments(table_id, hand_id) {
        Some(dealt) => Json(DealResponse {
            table_id,
            hand_id,
            commitments: dealt
                .into_iter()
                .map(|seat| SeatCommitment {
                    seat_index: seat.seat_index,
                    commitment: hex32(&seat.commitment),
                })
                .collect(),
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "notDealt", "hand not dealt"),
    }
}

async fn reveal<S: SeatDirectory>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<RevealRequest>,
) -> Response {
    if let Err(response) = require_keeper(&state, &headers) {
        return response;
    }
    match state
        .dealer
        .reveal_data(request.table_id, request.hand_id, request.seat_index)
    {
        Some((cards, salt)) => Json(RevealResponse {
            seat_index: request.seat_index,
            cards,
            salt: hex32(&salt),
        })
        .into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "notDealt",
            "no cards recorded for this seat and hand",
        ),
    }
}

async fn cleanup<S: SeatDirectory>(
    State(state): State<AppState<S>>,
    Path((table_id, hand_id)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_keeper(&state, &headers) {
        return response;
    }
    match state.dealer.cleanup_hand(table_id, hand_id) {
        Ok(removed) => {
            info!(table_id, hand_id, removed, "hand records cleaned up");
            Json(serde_json::json!({ "removed": removed })).into_response()
        }
        Err(err) => {
            warn!(table_id, hand_id, %err, "cleanup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "cleanupFailed", err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HoleCardStore;
    use axum::body::Body;
    use axum::http::Request;
    use ethers::types::Address;
    use tower::ServiceExt;

    struct FixtureDirectory {
        seats: Vec<SeatInfo>,
    }

    impl SeatDirectory for FixtureDirectory {
        async fn seats(&self, _table_id: u64) -> anyhow::Result<Vec<SeatInfo>> {
            Ok(self.seats.clone())
        }
    }

    const OWNER: Address = Address::repeat_byte(0xaa);
    const OPERATOR: Address = Address::repeat_byte(0xbb);

    fn fixture_state() -> AppState<FixtureDirectory> {
        let directory = FixtureDirectory {
            seats: vec![SeatInfo {
                seat_index: 0,
                owner: OWNER,
                operator: OPERATOR,
                stack: 1_000,
                is_active: true,
                current_bet: 0,
            }],
        };
        AppState {
            dealer: Arc::new(Dealer::new(HoleCardStore::in_memory(), 2)),
            sessions: Arc::new(SessionManager::new(3_600)),
            directory: Arc::new(directory),
            keeper_token: "keeper-secret".into(),
        }
    }

    fn session_for(state: &AppState<FixtureDirectory>, address: Address) -> String {
        // Mint a session directly; the signature handshake is covered in the
        // auth module's tests.
        state.sessions.test_session(address, now_secs() + 3_600)
    }

    async fn get(router: Router, uri: &str, bearer: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn owner_reads_cards_operator_is_forbidden() {
        let state = fixture_state();
        state.dealer.deal(1, 1, 100).unwrap();

        let owner_token = session_for(&state, OWNER);
        let operator_token = session_for(&state, OPERATOR);
        let router = router(state);

        let (status, body) = get(router.clone(), "/tables/1/hands/1/cards", Some(&owner_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["seatIndex"], 0);
        assert_eq!(body["cards"].as_array().unwrap().len(), 2);

        let (status, body) = get(router, "/tables/1/hands/1/cards", Some(&operator_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "operatorForbidden");
    }

    #[tokio::test]
    async fn missing_or_stale_session_is_unauthorized() {
        let state = fixture_state();
        state.dealer.deal(1, 1, 100).unwrap();
        let router = router(state);

        let (status, _) = get(router.clone(), "/tables/1/hands/1/cards", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = get(router, "/tables/1/hands/1/cards", Some("bogus-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn undealt_hand_is_not_found_for_the_owner() {
        let state = fixture_state();
        let owner_token = session_for(&state, OWNER);
        let router = router(state);

        let (status, body) = get(router, "/tables/1/hands/9/cards", Some(&owner_token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "notDealt");
    }

    #[tokio::test]
    async fn keeper_routes_reject_other_bearers() {
        let state = fixture_state();
        let owner_token = session_for(&state, OWNER);
        let router = router(state);

        let (status, _) = get(router.clone(), "/commitments/1/1", Some(&owner_token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = get(router, "/commitments/1/1", Some("keeper-secret")).await;
        // Authenticated but nothing dealt yet.
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deal_then_commitments_round_trip() {
        let state = fixture_state();
        let router = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/deal")
            .header(header::AUTHORIZATION, "Bearer keeper-secret")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"tableId":1,"handId":4}"#))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let (status, body) = get(router.clone(), "/commitments/1/4", Some("keeper-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["commitments"].as_array().unwrap().len(), 2);

        // A second deal for the same hand conflicts.
        let request = Request::builder()
            .method("POST")
            .uri("/deal")
            .header(header::AUTHORIZATION, "Bearer keeper-secret")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"tableId":1,"handId":4}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
