//! Keyed persistent store for dealt hole cards. In-memory map with an
//! optional JSON file backing, rewritten atomically after every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use showdown_types::Card;
use thiserror::Error;
use tracing::info;

use crate::commitment::{Commitment, Salt};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("hole cards already dealt for table {table_id} hand {hand_id} seat {seat_index}")]
    DuplicateRecord {
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
    },
    #[error("failed to persist hole-card store: {0}")]
    Persist(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoleCardRecord {
    pub table_id: u64,
    pub hand_id: u64,
    pub seat_index: u8,
    pub cards: [Card; 2],
    pub salt: Salt,
    pub commitment: Commitment,
    pub created_at: u64,
}

type Key = (u64, u64, u8);

pub struct HoleCardStore {
    records: RwLock<HashMap<Key, HoleCardRecord>>,
    path: Option<PathBuf>,
}

impl HoleCardStore {
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// File-backed store; loads any existing records at startup.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let mut records = HashMap::new();
        if path.exists() {
            let data = std::fs::read(path).context("read hole-card store")?;
            let loaded: Vec<HoleCardRecord> =
                serde_json::from_slice(&data).context("parse hole-card store")?;
            info!(count = loaded.len(), path = %path.display(), "loaded hole-card records");
            for record in loaded {
                records.insert(
                    (record.table_id, record.hand_id, record.seat_index),
                    record,
                );
            }
        }
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path.to_path_buf()),
        })
    }

    /// Insert-if-absent; a duplicate key is rejected, never overwritten.
    pub fn insert(&self, record: HoleCardRecord) -> Result<(), StoreError> {
        let key = (record.table_id, record.hand_id, record.seat_index);
        {
            let mut records = self.records.write().expect("store lock poisoned");
            if records.contains_key(&key) {
                return Err(StoreError::DuplicateRecord {
                    table_id: key.0,
                    hand_id: key.1,
                    seat_index: key.2,
                });
            }
            records.insert(key, record);
        }
        self.persist()
    }

    pub fn get(&self, table_id: u64, hand_id: u64, seat_index: u8) -> Option<HoleCardRecord> {
        self.records
            .read()
            .expect("store lock poisoned")
            .get(&(table_id, hand_id, seat_index))
            .cloned()
    }

    /// All records for a hand, ordered by seat index.
    pub fn records_for_hand(&self, table_id: u64, hand_id: u64) -> Vec<HoleCardRecord> {
        let records = self.records.read().expect("store lock poisoned");
        let mut found: Vec<HoleCardRecord> = records
            .values()
            .filter(|record| record.table_id == table_id && record.hand_id == hand_id)
            .cloned()
            .collect();
        found.sort_by_key(|record| record.seat_index);
        found
    }

    pub fn is_hand_dealt(&self, table_id: u64, hand_id: u64) -> bool {
        self.records
            .read()
            .expect("store lock poisoned")
            .values()
            .any(|record| record.table_id == table_id && record.hand_id == hand_id)
    }

    /// Bulk delete for a settled hand; returns the number of records removed.
    pub fn cleanup_hand(&self, table_id: u64, hand_id: u64) -> Result<usize, StoreError> {
        let removed = {
            let mut records = self.records.write().expect("store lock poisoned");
            let before = records.len();
            records.retain(|_, record| {
                !(record.table_id == table_id && record.hand_id == hand_id)
            });
            before - records.len()
        };
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Age-based eviction for hands that were never cleaned up explicitly.
    pub fn evict_older_than(&self, max_age_secs: u64, now: u64) -> Result<usize, StoreError> {
        let cutoff = now.saturating_sub(max_age_secs);
        let removed = {
            let mut records = self.records.write().expect("store lock poisoned");
            let before = records.len();
            records.retain(|_, record| record.created_at >= cutoff);
            before - records.len()
        };
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: Vec<HoleCardRecord> = {
            let records = self.records.read().expect("store lock poisoned");
            records.values().cloned().collect()
        };
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| StoreError::Persist(err.to_string()))?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, data).map_err(|err| StoreError::Persist(err.to_string()))?;
        std::fs::rename(&tmp_path, path).map_err(|err| StoreError::Persist(err.to_string()))?;
        Ok(())
    }
}
