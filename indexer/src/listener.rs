//! Polling event listener. Scans bounded block ranges, applies every decoded
//! log in (block, logIndex) order, and only then advances the persisted
//! cursor, so a crash mid-range replays the whole range.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use showdown_chain::{Ledger, SeatInfo, TableStatus};
use showdown_types::ChainEvent;
use tracing::{debug, info, warn};

use crate::broadcast::BroadcastManager;
use crate::handlers;
use crate::store::{Cursor, CursorFile, MirrorStore};

/// Where events come from. The production impl is the ledger's bounded log
/// query; tests script a sequence of ranges.
pub trait EventSource: Send + Sync + 'static {
    fn head_block(&self) -> impl Future<Output = showdown_chain::Result<u64>> + Send;
    fn fetch_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = showdown_chain::Result<Vec<ChainEvent>>> + Send;
}

impl EventSource for Ledger {
    async fn head_block(&self) -> showdown_chain::Result<u64> {
        Ledger::head_block(self).await
    }

    async fn fetch_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> showdown_chain::Result<Vec<ChainEvent>> {
        Ledger::fetch_events(self, from_block, to_block).await
    }
}

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// First block scanned when no cursor exists yet.
    pub replay_start_block: u64,
    /// Upper bound on blocks per log query.
    pub max_block_range: u64,
    /// Sleep between polls once caught up with the head.
    pub poll_interval: Duration,
    /// Sleep after any sync error before retrying the same range.
    pub error_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            replay_start_block: 0,
            max_block_range: 2_000,
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    CaughtUp,
    Applied { events: usize, to_block: u64 },
}

pub struct Listener<S> {
    source: S,
    store: Arc<MirrorStore>,
    broadcaster: Arc<BroadcastManager>,
    cursor_file: Option<CursorFile>,
    config: ListenerConfig,
}

impl<S: EventSource> Listener<S> {
    pub fn new(
        source: S,
        store: Arc<MirrorStore>,
        broadcaster: Arc<BroadcastManager>,
        cursor_file: Option<CursorFile>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            source,
            store,
            broadcaster,
            cursor_file,
            config,
        }
    }

    /// One bounded scan: fetch, order, apply, then advance the cursor.
    pub async fn sync_once(&self) -> anyhow::Result<SyncOutcome> {
        let head = self.source.head_block().await?;
        let cursor = self.store.cursor();
        let from = if cursor == Cursor::default() {
            self.config.replay_start_block
        } else {
            cursor.last_processed_block + 1
        };
        if from > head {
            return Ok(SyncOutcome::CaughtUp);
        }
        let to = head.min(from + self.config.max_block_range - 1);

        let mut events = self.source.fetch_events(from, to).await?;
        // The single total order every consumer observes.
        events.sort_by_key(|event| event.key());

        let now = unix_now();
        let mut applied = 0usize;
        for event in &events {
            if handlers::apply_event(&self.store, &self.broadcaster, event, now) {
                applied += 1;
            }
        }

        // The whole range is done; no event at or below `to` remains.
        let last_index = events.last().map(|event| event.log_index).unwrap_or(0);
        let cursor = self.store.advance_cursor((to, last_index));
        if let Some(file) = &self.cursor_file {
            file.save(&cursor)?;
        }
        debug!(from, to, events = events.len(), applied, "range synced");
        Ok(SyncOutcome::Applied {
            events: applied,
            to_block: to,
        })
    }

    /// Poll until `stop` flips. Errors back off and retry the same range;
    /// nothing is skipped.
    pub async fn run(&self, stop: Arc<AtomicBool>) {
        info!(
            replay_start = self.config.replay_start_block,
            max_range = self.config.max_block_range,
            "event listener started"
        );
        while !stop.load(Ordering::Relaxed) {
            match self.sync_once().await {
                Ok(SyncOutcome::CaughtUp) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(SyncOutcome::Applied { events, to_block }) => {
                    if events > 0 {
                        info!(events, to_block, "applied indexed events");
                    }
                }
                Err(err) => {
                    warn!(%err, "sync failed; backing off");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
        info!("event listener stopped");
    }
}

/// Best-effort prefill of table and seat rows from live contract state, so
/// the read API is useful before the replay catches up.
pub async fn seed_from_chain(store: &MirrorStore, ledger: &Ledger) {
    match ledger.read_seats().await {
        Ok(seats) => {
            let table_address = ledger.config().table_address;
            if let Ok(status) = ledger.read_status().await {
                let blinds = ledger.read_blinds().await.unwrap_or((0, 0));
                apply_seed(store, table_address, &status, &seats, blinds);
                info!(table_id = status.table_id, "mirror seeded from live chain state");
            }
        }
        Err(err) => warn!(%err, "chain seed skipped"),
    }
}

/// Write one live status snapshot into the mirror. The action deadline and
/// current hand come from contract reads; no event carries them.
pub fn apply_seed(
    store: &MirrorStore,
    table_address: Address,
    status: &TableStatus,
    seats: &[SeatInfo],
    (small_blind, big_blind): (u128, u128),
) {
    store.upsert_table(status.table_id, |table| {
        table.contract_address = table_address;
        table.small_blind = small_blind;
        table.big_blind = big_blind;
        table.current_hand_id =
            (status.current_hand_id > 0).then_some(status.current_hand_id);
        table.action_deadline = (status.action_deadline > 0).then_some(status.action_deadline);
        if let Some(state) = status.game_state {
            table.game_state = state;
        }
    });
    for seat in seats {
        store.upsert_seat(showdown_types::Seat {
            table_id: status.table_id,
            seat_index: seat.seat_index,
            owner: seat.owner,
            operator: seat.operator,
            stack: seat.stack,
            is_active: seat.is_active,
            current_bet: seat.current_bet,
        });
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
