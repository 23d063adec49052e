//! Orchestrates the commitment codec and the hole-card store. Cards and
//! salts never leave this module except through `reveal_data`, which only the
//! keeper may reach.

use showdown_types::Card;
use thiserror::Error;

use crate::commitment::{self, CodecError, Commitment, Salt};
use crate::store::{HoleCardRecord, HoleCardStore, StoreError};

#[derive(Error, Debug)]
pub enum DealError {
    #[error("hand already dealt: table {table_id} hand {hand_id}")]
    AlreadyDealt { table_id: u64, hand_id: u64 },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DealtSeat {
    pub seat_index: u8,
    pub commitment: Commitment,
}

pub struct Dealer {
    store: HoleCardStore,
    seat_count: u8,
}

impl Dealer {
    pub fn new(store: HoleCardStore, seat_count: u8) -> Self {
        Self { store, seat_count }
    }

    pub fn store(&self) -> &HoleCardStore {
        &self.store
    }

    /// Deal the whole table for a hand: one global draw without replacement,
    /// two cards per seat, one commitment per seat. Returns commitments only.
    pub fn deal(&self, table_id: u64, hand_id: u64, now: u64) -> Result<Vec<DealtSeat>, DealError> {
        if self.store.is_hand_dealt(table_id, hand_id) {
            return Err(DealError::AlreadyDealt { table_id, hand_id });
        }

        let drawn =
            commitment::generate_unique_cards(self.seat_count as usize * 2, &[], None)?;
        let mut dealt = Vec::with_capacity(self.seat_count as usize);
        for seat_index in 0..self.seat_count {
            let offset = seat_index as usize * 2;
            let cards: [Card; 2] = [drawn[offset], drawn[offset + 1]];
            let salt = commitment::generate_salt();
            let seat_commitment = commitment::commitment(hand_id, seat_index, cards, &salt);
            self.store.insert(HoleCardRecord {
                table_id,
                hand_id,
                seat_index,
                cards,
                salt,
                commitment: seat_commitment,
                created_at: now,
            })?;
            dealt.push(DealtSeat {
                seat_index,
                commitment: seat_commitment,
            });
        }
        Ok(dealt)
    }

    /// Stored commitments for a hand, or `None` if undealt.
    pub fn commitments(&self, table_id: u64, hand_id: u64) -> Option<Vec<DealtSeat>> {
        let records = self.store.records_for_hand(table_id, hand_id);
        if records.is_empty() {
            return None;
        }
        Some(
            records
                .into_iter()
                .map(|record| DealtSeat {
                    seat_index: record.seat_index,
                    commitment: record.commitment,
                })
                .collect(),
        )
    }

    /// Reveal data for one seat. Keeper-only; never served publicly.
    pub fn reveal_data(
        &self,
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
    ) -> Option<([Card; 2], Salt)> {
        self.store
            .get(table_id, hand_id, seat_index)
            .map(|record| (record.cards, record.salt))
    }

    /// The seat owner's private card view; gated by the access-controlled
    /// endpoint, which authorizes before calling here.
    pub fn cards_for_seat(&self, table_id: u64, hand_id: u64, seat_index: u8) -> Option<[Card; 2]> {
        self.store
            .get(table_id, hand_id, seat_index)
            .map(|record| record.cards)
    }

    pub fn is_hand_dealt(&self, table_id: u64, hand_id: u64) -> bool {
        self.store.is_hand_dealt(table_id, hand_id)
    }

    pub fn cleanup_hand(&self, table_id: u64, hand_id: u64) -> Result<usize, DealError> {
        Ok(self.store.cleanup_hand(table_id, hand_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn dealer(seat_count: u8) -> Dealer {
        Dealer::new(HoleCardStore::in_memory(), seat_count)
    }

    #[test]
    fn deals_distinct_cards_across_the_table() {
        let dealer = dealer(6);
        let dealt = dealer.deal(1, 1, 100).unwrap();
        assert_eq!(dealt.len(), 6);

        let mut seen = HashSet::new();
        for seat in &dealt {
            let (cards, _) = dealer.reveal_data(1, 1, seat.seat_index).unwrap();
            assert_ne!(cards[0], cards[1]);
            for card in cards {
                assert!(seen.insert(card), "card dealt twice: {card}");
            }
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn second_deal_is_rejected_and_first_survives() {
        let dealer = dealer(2);
        let first = dealer.deal(1, 5, 100).unwrap();
        let err = dealer.deal(1, 5, 200).unwrap_err();
        assert!(matches!(err, DealError::AlreadyDealt { table_id: 1, hand_id: 5 }));
        let commitments = dealer.commitments(1, 5).unwrap();
        assert_eq!(commitments, first);
    }

    #[test]
    fn commitments_are_none_when_undealt() {
        let dealer = dealer(2);
        assert!(dealer.commitments(1, 1).is_none());
        assert!(dealer.reveal_data(1, 1, 0).is_none());
        assert!(!dealer.is_hand_dealt(1, 1));
    }

    #[test]
    fn reveal_matches_commitment() {
        let dealer = dealer(3);
        let dealt = dealer.deal(2, 9, 100).unwrap();
        for seat in dealt {
            let (cards, salt) = dealer.reveal_data(2, 9, seat.seat_index).unwrap();
            assert!(crate::commitment::verify_reveal(
                9,
                seat.seat_index,
                cards,
                &salt,
                &seat.commitment,
            ));
        }
    }

    #[test]
    fn cleanup_returns_count() {
        let dealer = dealer(4);
        dealer.deal(1, 1, 100).unwrap();
        assert_eq!(dealer.cleanup_hand(1, 1).unwrap(), 4);
        assert_eq!(dealer.cleanup_hand(1, 1).unwrap(), 0);
    }
}
