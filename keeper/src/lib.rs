//! Keeper control loop. Each tick reads one ledger snapshot and walks a
//! fixed sequence of concerns; a failure in one concern never blocks the
//! rest of the tick, and benign races with competing keepers are tolerated.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::H256;
use showdown_chain::{is_expected_race, is_rate_limited, Ledger, TableStatus};
use showdown_types::GameState;
use tracing::{debug, info, warn};

pub mod dealer_client;

/// Ledger writes the keeper may issue, behind a seam so a tick can run
/// against a scripted mock.
pub trait LedgerOps: Send + Sync + 'static {
    fn status(&self) -> impl Future<Output = showdown_chain::Result<TableStatus>> + Send;
    fn force_timeout(&self) -> impl Future<Output = showdown_chain::Result<H256>> + Send;
    fn request_randomness(&self) -> impl Future<Output = showdown_chain::Result<H256>> + Send;
    fn start_hand(&self) -> impl Future<Output = showdown_chain::Result<H256>> + Send;
    fn submit_hole_commit(
        &self,
        hand_id: u64,
        seat_index: u8,
        commitment: [u8; 32],
    ) -> impl Future<Output = showdown_chain::Result<H256>> + Send;
    fn reveal_hole_cards(
        &self,
        hand_id: u64,
        seat_index: u8,
        cards: [u8; 2],
        salt: [u8; 32],
    ) -> impl Future<Output = showdown_chain::Result<H256>> + Send;
    fn settle_showdown(&self, hand_id: u64)
        -> impl Future<Output = showdown_chain::Result<H256>> + Send;
    fn rebalance_buy(&self, amount: u128)
        -> impl Future<Output = showdown_chain::Result<H256>> + Send;
}

impl LedgerOps for Ledger {
    async fn status(&self) -> showdown_chain::Result<TableStatus> {
        self.read_status().await
    }

    async fn force_timeout(&self) -> showdown_chain::Result<H256> {
        Ledger::force_timeout(self).await
    }

    async fn request_randomness(&self) -> showdown_chain::Result<H256> {
        Ledger::request_randomness(self).await
    }

    async fn start_hand(&self) -> showdown_chain::Result<H256> {
        Ledger::start_hand(self).await
    }

    async fn submit_hole_commit(
        &self,
        hand_id: u64,
        seat_index: u8,
        commitment: [u8; 32],
    ) -> showdown_chain::Result<H256> {
        Ledger::submit_hole_commit(self, hand_id, seat_index, commitment).await
    }

    async fn reveal_hole_cards(
        &self,
        hand_id: u64,
        seat_index: u8,
        cards: [u8; 2],
        salt: [u8; 32],
    ) -> showdown_chain::Result<H256> {
        Ledger::reveal_hole_cards(self, hand_id, seat_index, cards, salt).await
    }

    async fn settle_showdown(&self, hand_id: u64) -> showdown_chain::Result<H256> {
        Ledger::settle_showdown(self, hand_id).await
    }

    async fn rebalance_buy(&self, amount: u128) -> showdown_chain::Result<H256> {
        Ledger::rebalance_buy(self, amount).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DealOutcome {
    Dealt,
    AlreadyDealt,
}

#[derive(Clone, Debug)]
pub struct SeatCommitmentData {
    pub seat_index: u8,
    pub commitment: [u8; 32],
}

#[derive(Clone, Debug)]
pub struct RevealData {
    pub cards: [u8; 2],
    pub salt: [u8; 32],
}

/// The dealing service as the keeper sees it.
pub trait DealerOps: Send + Sync + 'static {
    fn ensure_dealt(
        &self,
        table_id: u64,
        hand_id: u64,
    ) -> impl Future<Output = anyhow::Result<DealOutcome>> + Send;
    fn commitments(
        &self,
        table_id: u64,
        hand_id: u64,
    ) -> impl Future<Output = anyhow::Result<Option<Vec<SeatCommitmentData>>>> + Send;
    fn reveal(
        &self,
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
    ) -> impl Future<Output = anyhow::Result<Option<RevealData>>> + Send;
    fn cleanup(
        &self,
        table_id: u64,
        hand_id: u64,
    ) -> impl Future<Output = anyhow::Result<usize>> + Send;
}

#[derive(Clone, Debug)]
pub struct KeeperConfig {
    pub tick_interval: Duration,
    /// Ceiling for the rate-limit backoff doubling.
    pub max_backoff: Duration,
    /// Seconds after which a pending randomness request is re-issued.
    pub randomness_timeout_secs: u64,
    /// Amount pushed through the vault when a rebalance window opens.
    pub rebalance_amount: u128,
    /// When false the keeper skips dealing and revealing entirely.
    pub dealer_enabled: bool,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            max_backoff: Duration::from_secs(60),
            randomness_timeout_secs: 120,
            rebalance_amount: 0,
            dealer_enabled: true,
        }
    }
}

/// What one tick did. `rate_limited` stretches the loop's delay.
#[derive(Debug, Default)]
pub struct TickReport {
    pub actions: Vec<String>,
    pub errors: usize,
    pub rate_limited: bool,
}

impl TickReport {
    fn action(&mut self, what: impl Into<String>) {
        self.actions.push(what.into());
    }

    fn failed(&mut self, step: &str, err: &showdown_chain::Error) {
        if is_rate_limited(err) {
            self.rate_limited = true;
        }
        warn!(step, %err, "keeper step failed");
        self.errors += 1;
    }
}

pub struct Keeper<L, D> {
    ledger: L,
    dealer: D,
    config: KeeperConfig,
    /// Hands whose commitments are fully on-chain; process-local, so a
    /// restart re-checks against the contract and converges again.
    synced_hands: HashSet<u64>,
}

impl<L: LedgerOps, D: DealerOps> Keeper<L, D> {
    pub fn new(ledger: L, dealer: D, config: KeeperConfig) -> Self {
        Self {
            ledger,
            dealer,
            config,
            synced_hands: HashSet::new(),
        }
    }

    /// One pass over every concern, in fixed order. Steps never short-circuit
    /// each other; a dead dealer must not stop timeouts from firing.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let status = match self.ledger.status().await {
            Ok(status) => status,
            Err(err) => {
                report.failed("status", &err);
                return report;
            }
        };

        if self.config.dealer_enabled {
            self.sync_commitments(&status, &mut report).await;
        }
        self.force_timeout(&status, &mut report).await;
        self.nudge_randomness(&status, &mut report).await;
        self.start_hand(&status, &mut report).await;
        self.settle_showdown(&status, &mut report).await;
        self.rebalance(&status, &mut report).await;
        report
    }

    /// Make sure the current hand's commitments are dealt and on-chain.
    async fn sync_commitments(&mut self, status: &TableStatus, report: &mut TickReport) {
        let in_play = status
            .game_state
            .map(|state| state.is_betting() || state == GameState::Showdown)
            .unwrap_or(false);
        if !in_play || self.synced_hands.contains(&status.current_hand_id) {
            return;
        }
        if status.committed_seats.len() >= status.active_seats.len() {
            self.synced_hands.insert(status.current_hand_id);
            return;
        }

        match self
            .dealer
            .ensure_dealt(status.table_id, status.current_hand_id)
            .await
        {
            Ok(DealOutcome::Dealt) => {
                report.action(format!("dealt hand {}", status.current_hand_id));
            }
            Ok(DealOutcome::AlreadyDealt) => {}
            Err(err) => {
                warn!(%err, "dealer deal request failed");
                report.errors += 1;
                return;
            }
        }

        let commitments = match self
            .dealer
            .commitments(status.table_id, status.current_hand_id)
            .await
        {
            Ok(Some(commitments)) => commitments,
            Ok(None) => return,
            Err(err) => {
                warn!(%err, "dealer commitment fetch failed");
                report.errors += 1;
                return;
            }
        };

        let mut all_committed = true;
        for commitment in commitments {
            if !status.active_seats.contains(&commitment.seat_index)
                || status.committed_seats.contains(&commitment.seat_index)
            {
                continue;
            }
            match self
                .ledger
                .submit_hole_commit(
                    status.current_hand_id,
                    commitment.seat_index,
                    commitment.commitment,
                )
                .await
            {
                Ok(tx) => report.action(format!(
                    "committed seat {} in {tx:#x}",
                    commitment.seat_index
                )),
                Err(err) if is_expected_race(&err, &["already", "commit exists"]) => {
                    debug!(seat = commitment.seat_index, "commit already on-chain");
                }
                Err(err) => {
                    all_committed = false;
                    report.failed("submit_hole_commit", &err);
                }
            }
        }
        if all_committed {
            self.synced_hands.insert(status.current_hand_id);
        }
    }

    /// Fold out a seat that blew its action deadline.
    async fn force_timeout(&self, status: &TableStatus, report: &mut TickReport) {
        let betting = status.game_state.map(|state| state.is_betting()).unwrap_or(false);
        if !betting || status.action_deadline == 0 || status.now <= status.action_deadline {
            return;
        }
        // The contract rejects a timeout in the same block as the action it
        // would fold out, so wait for the chain to move first.
        if status.current_block <= status.last_action_block {
            return;
        }
        match self.ledger.force_timeout().await {
            Ok(tx) => report.action(format!("forced timeout in {tx:#x}")),
            Err(err) if is_expected_race(&err, &["deadline", "not expired", "no pending"]) => {
                debug!("timeout already handled");
            }
            Err(err) => report.failed("force_timeout", &err),
        }
    }

    /// Re-issue a randomness request that has been pending too long.
    async fn nudge_randomness(&self, status: &TableStatus, report: &mut TickReport) {
        if status.game_state != Some(GameState::AwaitingRandomness)
            || status.randomness_requested_at == 0
        {
            return;
        }
        let pending_for = status.now.saturating_sub(status.randomness_requested_at);
        if pending_for < self.config.randomness_timeout_secs {
            return;
        }
        match self.ledger.request_randomness().await {
            Ok(tx) => report.action(format!("re-requested randomness in {tx:#x}")),
            Err(err) if is_expected_race(&err, &["already requested", "fulfilled"]) => {
                debug!("randomness request already in flight");
            }
            Err(err) => report.failed("request_randomness", &err),
        }
    }

    async fn start_hand(&mut self, status: &TableStatus, report: &mut TickReport) {
        let startable = status
            .game_state
            .map(|state| state.is_startable())
            .unwrap_or(false);
        if !startable || !status.ready_to_start {
            return;
        }
        match self.ledger.start_hand().await {
            Ok(tx) => {
                report.action(format!("started hand in {tx:#x}"));
                // The next hand gets a fresh commitment sync.
                self.synced_hands.remove(&(status.current_hand_id + 1));
            }
            Err(err) if is_expected_race(&err, &["already started", "not ready"]) => {
                debug!("hand start raced with another keeper");
            }
            Err(err) => report.failed("start_hand", &err),
        }
    }

    /// Reveal the remaining committed seats and settle once everyone is open.
    /// Only the reveal fetch depends on the dealer; a keeper running without
    /// one still settles when every reveal is already on-chain.
    async fn settle_showdown(&self, status: &TableStatus, report: &mut TickReport) {
        if status.game_state != Some(GameState::Showdown) {
            return;
        }
        let mut revealed = status.revealed_seats.clone();
        if self.config.dealer_enabled {
            for seat_index in &status.committed_seats {
                if revealed.contains(seat_index) {
                    continue;
                }
                let reveal = match self
                    .dealer
                    .reveal(status.table_id, status.current_hand_id, *seat_index)
                    .await
                {
                    Ok(Some(reveal)) => reveal,
                    Ok(None) => {
                        warn!(seat = seat_index, "dealer holds no cards for seat");
                        continue;
                    }
                    Err(err) => {
                        warn!(seat = seat_index, %err, "dealer reveal fetch failed");
                        report.errors += 1;
                        continue;
                    }
                };
                match self
                    .ledger
                    .reveal_hole_cards(
                        status.current_hand_id,
                        *seat_index,
                        reveal.cards,
                        reveal.salt,
                    )
                    .await
                {
                    Ok(tx) => {
                        report.action(format!("revealed seat {seat_index} in {tx:#x}"));
                        revealed.push(*seat_index);
                    }
                    Err(err)
                        if is_expected_race(&err, &["already revealed", "no commitment"]) =>
                    {
                        revealed.push(*seat_index);
                    }
                    Err(err) => report.failed("reveal_hole_cards", &err),
                }
            }
        }

        // A seat that never committed cannot reveal and does not block the pot.
        if status
            .committed_seats
            .iter()
            .all(|seat| revealed.contains(seat))
        {
            match self.ledger.settle_showdown(status.current_hand_id).await {
                Ok(tx) => {
                    report.action(format!("settled hand {} in {tx:#x}", status.current_hand_id));
                    if !self.config.dealer_enabled {
                        return;
                    }
                    if let Err(err) = self
                        .dealer
                        .cleanup(status.table_id, status.current_hand_id)
                        .await
                    {
                        warn!(%err, "dealer cleanup failed");
                    }
                }
                Err(err) if is_expected_race(&err, &["already settled", "not showdown"]) => {
                    debug!("settlement raced with another keeper");
                }
                Err(err) => report.failed("settle_showdown", &err),
            }
        }
    }

    async fn rebalance(&self, status: &TableStatus, report: &mut TickReport) {
        if !status.rebalance_eligible || self.config.rebalance_amount == 0 {
            return;
        }
        match self.ledger.rebalance_buy(self.config.rebalance_amount).await {
            Ok(tx) => report.action(format!("rebalanced vault in {tx:#x}")),
            Err(err) if is_expected_race(&err, &["not eligible", "window closed"]) => {
                debug!("rebalance window closed under us");
            }
            Err(err) => report.failed("rebalance_buy", &err),
        }
    }

    /// Tick until `stop` flips. Rate limiting doubles the delay up to the
    /// configured ceiling; one clean tick resets it.
    pub async fn run(&mut self, stop: Arc<AtomicBool>) {
        info!(
            interval_ms = self.config.tick_interval.as_millis() as u64,
            dealer_enabled = self.config.dealer_enabled,
            "keeper started"
        );
        let mut delay = self.config.tick_interval;
        let mut ticks = 0u64;
        let mut total_actions = 0usize;
        let mut total_errors = 0usize;

        while !stop.load(Ordering::Relaxed) {
            let report = self.tick().await;
            ticks += 1;
            total_actions += report.actions.len();
            total_errors += report.errors;
            for action in &report.actions {
                info!(action = %action, "keeper acted");
            }

            if report.rate_limited {
                delay = (delay * 2).min(self.config.max_backoff);
                warn!(delay_ms = delay.as_millis() as u64, "rate limited; backing off");
            } else {
                delay = self.config.tick_interval;
            }
            tokio::time::sleep(delay).await;
        }
        info!(ticks, total_actions, total_errors, "keeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showdown_chain::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockLedger {
        status: TableStatus,
        calls: Mutex<Vec<String>>,
        failures: Mutex<HashMap<&'static str, String>>,
    }

    impl MockLedger {
        fn with_status(status: TableStatus) -> Self {
            Self {
                status,
                ..Default::default()
            }
        }

        fn fail(&self, call: &'static str, message: &str) {
            self.failures
                .lock()
                .unwrap()
                .insert(call, message.to_string());
        }

        fn record(&self, call: String, key: &'static str) -> showdown_chain::Result<H256> {
            self.calls.lock().unwrap().push(call);
            if let Some(message) = self.failures.lock().unwrap().get(key) {
                return Err(Error::Contract(message.clone()));
            }
            Ok(H256::zero())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LedgerOps for MockLedger {
        async fn status(&self) -> showdown_chain::Result<TableStatus> {
            Ok(self.status.clone())
        }

        async fn force_timeout(&self) -> showdown_chain::Result<H256> {
            self.record("force_timeout".into(), "force_timeout")
        }

        async fn request_randomness(&self) -> showdown_chain::Result<H256> {
            self.record("request_randomness".into(), "request_randomness")
        }

        async fn start_hand(&self) -> showdown_chain::Result<H256> {
            self.record("start_hand".into(), "start_hand")
        }

        async fn submit_hole_commit(
            &self,
            hand_id: u64,
            seat_index: u8,
            _commitment: [u8; 32],
        ) -> showdown_chain::Result<H256> {
            self.record(
                format!("submit_hole_commit {hand_id} {seat_index}"),
                "submit_hole_commit",
            )
        }

        async fn reveal_hole_cards(
            &self,
            hand_id: u64,
            seat_index: u8,
            _cards: [u8; 2],
            _salt: [u8; 32],
        ) -> showdown_chain::Result<H256> {
            self.record(
                format!("reveal_hole_cards {hand_id} {seat_index}"),
                "reveal_hole_cards",
            )
        }

        async fn settle_showdown(&self, hand_id: u64) -> showdown_chain::Result<H256> {
            self.record(format!("settle_showdown {hand_id}"), "settle_showdown")
        }

        async fn rebalance_buy(&self, amount: u128) -> showdown_chain::Result<H256> {
            self.record(format!("rebalance_buy {amount}"), "rebalance_buy")
        }
    }

    #[derive(Default)]
    struct MockDealer {
        dealt: Mutex<HashSet<(u64, u64)>>,
        calls: Mutex<Vec<String>>,
    }

    impl DealerOps for MockDealer {
        async fn ensure_dealt(&self, table_id: u64, hand_id: u64) -> anyhow::Result<DealOutcome> {
            self.calls.lock().unwrap().push(format!("deal {hand_id}"));
            if self.dealt.lock().unwrap().insert((table_id, hand_id)) {
                Ok(DealOutcome::Dealt)
            } else {
                Ok(DealOutcome::AlreadyDealt)
            }
        }

        async fn commitments(
            &self,
            table_id: u64,
            hand_id: u64,
        ) -> anyhow::Result<Option<Vec<SeatCommitmentData>>> {
            if !self.dealt.lock().unwrap().contains(&(table_id, hand_id)) {
                return Ok(None);
            }
            Ok(Some(
                [0u8, 1]
                    .iter()
                    .map(|seat| SeatCommitmentData {
                        seat_index: *seat,
                        commitment: [*seat; 32],
                    })
                    .collect(),
            ))
        }

        async fn reveal(
            &self,
            _table_id: u64,
            _hand_id: u64,
            seat_index: u8,
        ) -> anyhow::Result<Option<RevealData>> {
            Ok(Some(RevealData {
                cards: [seat_index, seat_index + 13],
                salt: [7u8; 32],
            }))
        }

        async fn cleanup(&self, _table_id: u64, hand_id: u64) -> anyhow::Result<usize> {
            self.calls.lock().unwrap().push(format!("cleanup {hand_id}"));
            Ok(2)
        }
    }

    fn betting_status() -> TableStatus {
        TableStatus {
            table_id: 1,
            current_block: 10,
            now: 1_000,
            game_state: Some(GameState::FlopBetting),
            current_hand_id: 3,
            action_deadline: 900,
            last_action_block: 5,
            active_seats: vec![0, 1],
            committed_seats: vec![0, 1],
            ..Default::default()
        }
    }

    fn make_keeper(ledger: MockLedger) -> Keeper<MockLedger, MockDealer> {
        Keeper::new(ledger, MockDealer::default(), KeeperConfig::default())
    }

    #[tokio::test]
    async fn timeout_fires_after_the_deadline_not_before() {
        let mut status = betting_status();
        status.now = 800;
        let mut keeper = make_keeper(MockLedger::with_status(status));
        keeper.tick().await;
        assert!(!keeper.ledger.calls().contains(&"force_timeout".to_string()));

        let mut keeper = make_keeper(MockLedger::with_status(betting_status()));
        let report = keeper.tick().await;
        assert!(keeper.ledger.calls().contains(&"force_timeout".to_string()));
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn timeout_waits_for_a_block_after_the_last_action() {
        let mut status = betting_status();
        status.current_block = 5;
        let mut keeper = make_keeper(MockLedger::with_status(status));
        keeper.tick().await;
        assert!(!keeper.ledger.calls().contains(&"force_timeout".to_string()));
    }

    #[tokio::test]
    async fn overdue_randomness_is_rerequested() {
        let status = TableStatus {
            game_state: Some(GameState::AwaitingRandomness),
            now: 1_000,
            randomness_requested_at: 500,
            ..Default::default()
        };
        let mut keeper = make_keeper(MockLedger::with_status(status.clone()));
        keeper.tick().await;
        assert!(keeper
            .ledger
            .calls()
            .contains(&"request_randomness".to_string()));

        // Still inside the grace window: no nudge.
        let recent = TableStatus {
            randomness_requested_at: 950,
            ..status
        };
        let mut keeper = make_keeper(MockLedger::with_status(recent));
        keeper.tick().await;
        assert!(keeper.ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn one_failing_step_does_not_block_the_rest() {
        let status = TableStatus {
            game_state: Some(GameState::FlopBetting),
            current_block: 20,
            now: 1_000,
            action_deadline: 10,
            active_seats: vec![0, 1],
            committed_seats: vec![0, 1],
            rebalance_eligible: true,
            ..Default::default()
        };
        let ledger = MockLedger::with_status(status);
        ledger.fail("force_timeout", "rpc exploded");
        let mut keeper = Keeper::new(
            ledger,
            MockDealer::default(),
            KeeperConfig {
                rebalance_amount: 500,
                ..KeeperConfig::default()
            },
        );

        let report = keeper.tick().await;
        assert_eq!(report.errors, 1);
        assert!(keeper
            .ledger
            .calls()
            .contains(&"rebalance_buy 500".to_string()));
    }

    #[tokio::test]
    async fn starts_a_hand_when_the_table_is_ready() {
        let status = TableStatus {
            game_state: Some(GameState::Settled),
            ready_to_start: true,
            ..Default::default()
        };
        let mut keeper = make_keeper(MockLedger::with_status(status));
        keeper.tick().await;
        assert!(keeper.ledger.calls().contains(&"start_hand".to_string()));
    }

    #[tokio::test]
    async fn commits_missing_seats_then_remembers_the_hand() {
        let status = TableStatus {
            game_state: Some(GameState::PreFlopBetting),
            current_hand_id: 3,
            active_seats: vec![0, 1],
            committed_seats: vec![0],
            ..Default::default()
        };
        let mut keeper = make_keeper(MockLedger::with_status(status));
        keeper.tick().await;
        let calls = keeper.ledger.calls();
        // Seat 0 is already committed on-chain; only seat 1 is submitted.
        assert_eq!(
            calls
                .iter()
                .filter(|call| call.starts_with("submit_hole_commit"))
                .collect::<Vec<_>>(),
            vec![&"submit_hole_commit 3 1".to_string()]
        );
        assert!(keeper.synced_hands.contains(&3));

        // A second tick leaves the ledger untouched.
        keeper.tick().await;
        assert_eq!(keeper.ledger.calls().len(), calls.len());
    }

    #[tokio::test]
    async fn showdown_reveals_then_settles_then_cleans_up() {
        let status = TableStatus {
            table_id: 1,
            game_state: Some(GameState::Showdown),
            current_hand_id: 7,
            active_seats: vec![0, 1],
            committed_seats: vec![0, 1],
            revealed_seats: vec![0],
            ..Default::default()
        };
        let mut keeper = make_keeper(MockLedger::with_status(status));
        let report = keeper.tick().await;

        let calls = keeper.ledger.calls();
        assert!(calls.contains(&"reveal_hole_cards 7 1".to_string()));
        assert!(!calls.contains(&"reveal_hole_cards 7 0".to_string()));
        assert!(calls.contains(&"settle_showdown 7".to_string()));
        assert!(keeper
            .dealer
            .calls
            .lock()
            .unwrap()
            .contains(&"cleanup 7".to_string()));
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn keeper_without_a_dealer_still_settles_a_fully_revealed_showdown() {
        let status = TableStatus {
            table_id: 1,
            game_state: Some(GameState::Showdown),
            current_hand_id: 7,
            active_seats: vec![0, 1],
            committed_seats: vec![0, 1],
            revealed_seats: vec![0, 1],
            ..Default::default()
        };
        let mut keeper = Keeper::new(
            MockLedger::with_status(status),
            MockDealer::default(),
            KeeperConfig {
                dealer_enabled: false,
                ..KeeperConfig::default()
            },
        );
        let report = keeper.tick().await;

        assert!(keeper
            .ledger
            .calls()
            .contains(&"settle_showdown 7".to_string()));
        assert!(keeper.dealer.calls.lock().unwrap().is_empty());
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn uncommitted_seat_does_not_block_settlement() {
        // Seat 2 sat down but never committed; it cannot reveal and must not
        // hold the pot hostage.
        let status = TableStatus {
            table_id: 1,
            game_state: Some(GameState::Showdown),
            current_hand_id: 7,
            active_seats: vec![0, 1, 2],
            committed_seats: vec![0, 1],
            revealed_seats: vec![0, 1],
            ..Default::default()
        };
        let mut keeper = make_keeper(MockLedger::with_status(status));
        let report = keeper.tick().await;

        let calls = keeper.ledger.calls();
        assert!(!calls.iter().any(|call| call.starts_with("reveal_hole_cards")));
        assert!(calls.contains(&"settle_showdown 7".to_string()));
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn rate_limited_errors_are_flagged() {
        let ledger = MockLedger::with_status(betting_status());
        ledger.fail("force_timeout", "429 too many requests");
        let mut keeper = make_keeper(ledger);
        let report = keeper.tick().await;
        assert!(report.rate_limited);
    }
}
