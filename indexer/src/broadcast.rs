//! Per-table fan-out of indexed events to stream subscribers. Messages are
//! serialized once per broadcast; subscribers whose channels have closed are
//! pruned during the same pass.

use std::collections::HashMap;
use std::sync::Mutex;

use showdown_types::api::Notification;
use tokio::sync::mpsc;
use tracing::debug;

pub struct Subscriber {
    pub id: u64,
    pub sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct BroadcastManager {
    channels: Mutex<HashMap<u64, Vec<Subscriber>>>,
    next_id: Mutex<u64>,
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber on a table channel; the returned id is the
    /// handle for unsubscribing.
    pub fn subscribe(&self, table_id: u64, sender: mpsc::UnboundedSender<String>) -> u64 {
        let id = {
            let mut next = self.next_id.lock().expect("broadcast lock poisoned");
            *next += 1;
            *next
        };
        self.channels
            .lock()
            .expect("broadcast lock poisoned")
            .entry(table_id)
            .or_default()
            .push(Subscriber { id, sender });
        debug!(table_id, subscriber = id, "stream subscriber added");
        id
    }

    pub fn unsubscribe(&self, table_id: u64, subscriber_id: u64) {
        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        if let Some(subscribers) = channels.get_mut(&table_id) {
            subscribers.retain(|subscriber| subscriber.id != subscriber_id);
            if subscribers.is_empty() {
                channels.remove(&table_id);
            }
        }
    }

    /// Push a notification to every live subscriber of the table. A failed
    /// send means the receiving half is gone; those entries are dropped.
    pub fn broadcast(&self, table_id: u64, notification: &Notification) {
        let payload = match serde_json::to_string(notification) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(table_id, %err, "failed to serialize notification");
                return;
            }
        };
        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        if let Some(subscribers) = channels.get_mut(&table_id) {
            subscribers.retain(|subscriber| subscriber.sender.send(payload.clone()).is_ok());
            if subscribers.is_empty() {
                channels.remove(&table_id);
            }
        }
    }

    /// Remove one connection from every table channel. Socket teardown uses
    /// this so a subscriber never lingers on a channel it left implicitly.
    pub fn unsubscribe_all(&self, subscriber_id: u64) {
        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        channels.retain(|_, subscribers| {
            subscribers.retain(|subscriber| subscriber.id != subscriber_id);
            !subscribers.is_empty()
        });
    }

    pub fn connection_count(&self) -> usize {
        self.channels
            .lock()
            .expect("broadcast lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(table_id: u64) -> Notification {
        Notification {
            kind: "handStarted".into(),
            table_id,
            timestamp: 1_000,
            data: serde_json::json!({"handId": 1}),
        }
    }

    #[test]
    fn delivers_only_to_the_tables_channel() {
        let manager = BroadcastManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        manager.subscribe(1, tx_a);
        manager.subscribe(2, tx_b);

        manager.broadcast(1, &notification(1));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn prunes_closed_subscribers() {
        let manager = BroadcastManager::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        manager.subscribe(1, tx_live);
        manager.subscribe(1, tx_dead);
        drop(rx_dead);

        manager.broadcast(1, &notification(1));
        assert!(rx_live.try_recv().is_ok());
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn unsubscribe_removes_exactly_one() {
        let manager = BroadcastManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let id_a = manager.subscribe(1, tx_a);
        manager.subscribe(1, tx_b);

        manager.unsubscribe(1, id_a);
        manager.broadcast(1, &notification(1));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_all_removes_the_connection_without_naming_a_table() {
        let manager = BroadcastManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        let id = manager.subscribe(1, tx);
        manager.subscribe(1, tx_other);

        manager.unsubscribe_all(id);
        assert_eq!(manager.connection_count(), 1);
        manager.broadcast(1, &notification(1));
        assert!(rx_other.try_recv().is_ok());
    }
}
