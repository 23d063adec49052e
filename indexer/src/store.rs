//! In-memory mirror of the on-chain state, rebuilt deterministically from
//! the event stream. Only the cursor is persisted; everything else replays.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use showdown_types::{
    Agent, EventKey, GameState, Hand, HandAction, Seat, Settlement, Table, VaultSnapshot,
};
use tracing::info;

/// High-water mark of fully processed events. Advances only, and only after
/// every event in a fetched range has been applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub last_processed_block: u64,
    pub last_processed_log_index: u64,
}

impl Cursor {
    pub fn key(&self) -> EventKey {
        (self.last_processed_block, self.last_processed_log_index)
    }

    /// Move the cursor forward; a regression is ignored.
    pub fn advance(&mut self, key: EventKey) {
        if key > self.key() {
            self.last_processed_block = key.0;
            self.last_processed_log_index = key.1;
        }
    }
}

/// JSON file persistence for the cursor, written atomically via tmp+rename.
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn load(&self) -> anyhow::Result<Option<Cursor>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&self.path).context("read cursor file")?;
        let cursor: Cursor = serde_json::from_slice(&data).context("parse cursor file")?;
        Ok(Some(cursor))
    }

    pub fn save(&self, cursor: &Cursor) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(cursor).context("serialize cursor")?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, data).context("write cursor tmp file")?;
        std::fs::rename(&tmp_path, &self.path).context("rename cursor file")?;
        Ok(())
    }

    pub fn reset(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("remove cursor file")?;
            info!(path = %self.path.display(), "cursor file removed for replay");
        }
        Ok(())
    }
}

/// Receipt for an applied event, kept alongside the idempotency key so
/// replay skips can be traced back to the original transaction.
#[derive(Clone, Debug)]
pub struct ProcessedEvent {
    pub tx_hash: H256,
    pub name: &'static str,
    pub processed_at: u64,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<u64, Table>,
    seats: HashMap<(u64, u8), Seat>,
    hands: HashMap<(u64, u64), Hand>,
    actions: HashMap<(u64, u64), Vec<HandAction>>,
    agents: HashMap<Address, Agent>,
    snapshots: HashMap<Address, Vec<VaultSnapshot>>,
    settlements: Vec<Settlement>,
    processed: HashMap<EventKey, ProcessedEvent>,
    cursor: Cursor,
}

/// The queryable mirror. Handlers mutate it single-threaded from the
/// listener; the HTTP API reads it concurrently.
#[derive(Default)]
pub struct MirrorStore {
    inner: RwLock<Inner>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Idempotency.

    /// Record an event key as processed; returns false when it was already
    /// present, in which case the caller must not apply the event again.
    pub fn mark_processed(&self, key: EventKey, record: ProcessedEvent) -> bool {
        let mut inner = self.inner.write().expect("store lock poisoned");
        match inner.processed.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn is_processed(&self, key: EventKey) -> bool {
        self.inner
            .read()
            .expect("store lock poisoned")
            .processed
            .contains_key(&key)
    }

    pub fn processed_event(&self, key: EventKey) -> Option<ProcessedEvent> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .processed
            .get(&key)
            .cloned()
    }

    pub fn processed_count(&self) -> usize {
        self.inner
            .read()
            .expect("store lock poisoned")
            .processed
            .len()
    }

    // Cursor.

    pub fn cursor(&self) -> Cursor {
        self.inner.read().expect("store lock poisoned").cursor
    }

    pub fn set_cursor(&self, cursor: Cursor) {
        self.inner.write().expect("store lock poisoned").cursor = cursor;
    }

    pub fn advance_cursor(&self, key: EventKey) -> Cursor {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.cursor.advance(key);
        inner.cursor
    }

    // Tables.

    /// Fetch-or-create a table row, then apply `update` to it.
    pub fn upsert_table(&self, table_id: u64, update: impl FnOnce(&mut Table)) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let table = inner.tables.entry(table_id).or_insert_with(|| Table {
            id: table_id,
            contract_address: Address::zero(),
            small_blind: 0,
            big_blind: 0,
            current_hand_id: None,
            game_state: GameState::AwaitingSeats,
            button_seat: None,
            action_deadline: None,
        });
        update(table);
    }

    pub fn table(&self, table_id: u64) -> Option<Table> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .tables
            .get(&table_id)
            .cloned()
    }

    pub fn tables(&self) -> Vec<Table> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut tables: Vec<Table> = inner.tables.values().cloned().collect();
        tables.sort_by_key(|table| table.id);
        tables
    }

    /// Resolve a table by its contract address; used to route vault and
    /// registry events to the right broadcast channel.
    pub fn table_id_by_contract(&self, address: Address) -> Option<u64> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .tables
            .values()
            .find(|table| table.contract_address == address)
            .map(|table| table.id)
    }

    // Seats.

    pub fn upsert_seat(&self, seat: Seat) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .seats
            .insert((seat.table_id, seat.seat_index), seat);
    }

    pub fn seats_for_table(&self, table_id: u64) -> Vec<Seat> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut seats: Vec<Seat> = inner
            .seats
            .values()
            .filter(|seat| seat.table_id == table_id)
            .cloned()
            .collect();
        seats.sort_by_key(|seat| seat.seat_index);
        seats
    }

    pub fn update_seat(&self, table_id: u64, seat_index: u8, update: impl FnOnce(&mut Seat)) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if let Some(seat) = inner.seats.get_mut(&(table_id, seat_index)) {
            update(seat);
        }
    }

    // Hands.

    pub fn upsert_hand(&self, table_id: u64, hand_id: u64, update: impl FnOnce(&mut Hand)) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let hand = inner.hands.entry((table_id, hand_id)).or_insert_with(|| Hand {
            table_id,
            hand_id,
            pot: 0,
            current_bet: 0,
            actor_seat: None,
            game_state: GameState::PreFlopBetting,
            community_cards: Vec::new(),
            winner_seat: None,
            settlement_amount: None,
            started_at: 0,
            settled_at: None,
        });
        update(hand);
    }

    pub fn hand(&self, table_id: u64, hand_id: u64) -> Option<Hand> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .hands
            .get(&(table_id, hand_id))
            .cloned()
    }

    pub fn hands_for_table(&self, table_id: u64, limit: usize) -> Vec<Hand> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut hands: Vec<Hand> = inner
            .hands
            .values()
            .filter(|hand| hand.table_id == table_id)
            .cloned()
            .collect();
        hands.sort_by_key(|hand| std::cmp::Reverse(hand.hand_id));
        hands.truncate(limit);
        hands
    }

    // Actions.

    pub fn push_action(&self, action: HandAction) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .actions
            .entry((action.table_id, action.hand_id))
            .or_default()
            .push(action);
    }

    pub fn actions_for_hand(&self, table_id: u64, hand_id: u64) -> Vec<HandAction> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .actions
            .get(&(table_id, hand_id))
            .cloned()
            .unwrap_or_default()
    }

    // Agents and vaults.

    pub fn upsert_agent(&self, agent: Agent) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .agents
            .insert(agent.token_address, agent);
    }

    pub fn update_agent(&self, token_address: Address, update: impl FnOnce(&mut Agent)) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if let Some(agent) = inner.agents.get_mut(&token_address) {
            update(agent);
        }
    }

    pub fn agent(&self, token_address: Address) -> Option<Agent> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .agents
            .get(&token_address)
            .cloned()
    }

    pub fn agents(&self) -> Vec<Agent> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut agents: Vec<Agent> = inner.agents.values().cloned().collect();
        agents.sort_by_key(|agent| agent.token_address);
        agents
    }

    pub fn agent_by_vault(&self, vault_address: Address) -> Option<Agent> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .agents
            .values()
            .find(|agent| agent.vault_address == vault_address)
            .cloned()
    }

    /// Append a NAV point for a vault; the series stays sorted because
    /// snapshots arrive in event order.
    pub fn push_snapshot(&self, snapshot: VaultSnapshot) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .snapshots
            .entry(snapshot.vault_address)
            .or_default()
            .push(snapshot);
    }

    pub fn snapshots_for_vault(&self, vault_address: Address) -> Vec<VaultSnapshot> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .snapshots
            .get(&vault_address)
            .cloned()
            .unwrap_or_default()
    }

    // Settlements.

    pub fn push_settlement(&self, settlement: Settlement) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .settlements
            .push(settlement);
    }

    pub fn settlements_for_table(&self, table_id: u64) -> Vec<Settlement> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .settlements
            .iter()
            .filter(|settlement| settlement.table_id == table_id)
            .cloned()
            .collect()
    }

    pub fn table_count(&self) -> usize {
        self.inner.read().expect("store lock poisoned").tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_never_regresses() {
        let mut cursor = Cursor::default();
        cursor.advance((10, 3));
        cursor.advance((10, 2));
        cursor.advance((9, 9));
        assert_eq!(cursor.key(), (10, 3));
        cursor.advance((10, 4));
        assert_eq!(cursor.key(), (10, 4));
    }

    #[test]
    fn processed_keys_are_insert_once() {
        let store = MirrorStore::new();
        let record = || ProcessedEvent {
            tx_hash: H256::repeat_byte(0xab),
            name: "handStarted",
            processed_at: 1_000,
        };
        assert!(store.mark_processed((5, 0), record()));
        assert!(!store.mark_processed((5, 0), record()));
        assert!(store.is_processed((5, 0)));
        assert!(!store.is_processed((5, 1)));

        let stored = store.processed_event((5, 0)).unwrap();
        assert_eq!(stored.tx_hash, H256::repeat_byte(0xab));
        assert_eq!(stored.name, "handStarted");
        assert_eq!(store.processed_count(), 1);
    }

    #[test]
    fn upsert_table_creates_then_updates() {
        let store = MirrorStore::new();
        store.upsert_table(7, |table| table.small_blind = 50);
        store.upsert_table(7, |table| table.big_blind = 100);
        let table = store.table(7).unwrap();
        assert_eq!(table.small_blind, 50);
        assert_eq!(table.big_blind, 100);
    }

    #[test]
    fn cursor_file_round_trips_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let file = CursorFile::new(&dir.path().join("cursor.json"));
        assert!(file.load().unwrap().is_none());

        let cursor = Cursor {
            last_processed_block: 42,
            last_processed_log_index: 7,
        };
        file.save(&cursor).unwrap();
        assert_eq!(file.load().unwrap(), Some(cursor));

        file.reset().unwrap();
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn hands_listing_is_newest_first_and_limited() {
        let store = MirrorStore::new();
        for hand_id in 1..=5 {
            store.upsert_hand(1, hand_id, |_| {});
        }
        let hands = store.hands_for_table(1, 3);
        let ids: Vec<u64> = hands.iter().map(|hand| hand.hand_id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }
}
