//! Raw log → event-union decoding, one arm per event kind. Logs that do not
//! match a known topic are dropped with a warning; they are never fatal.

use ethers::types::Log;
use showdown_types::{Card, ChainEventBody, Street};
use tracing::warn;

use crate::{
    decode_event, to_u128, AgentRegistryEvents, PokerTableEvents, VaultSnapshottedFilter,
};

pub fn decode_table_log(log: &Log) -> Option<ChainEventBody> {
    let event = match decode_event::<PokerTableEvents>(log) {
        Some(event) => event,
        None => {
            warn!(topic = ?log.topics.first(), "unrecognized table log; skipping");
            return None;
        }
    };
    match event {
        PokerTableEvents::SeatUpdatedFilter(ev) => Some(ChainEventBody::SeatUpdated {
            table_id: ev.table_id,
            seat_index: ev.seat_index,
            owner: ev.owner,
            operator: ev.operator,
            stack: to_u128(ev.stack).ok()?,
            is_active: ev.is_active,
        }),
        PokerTableEvents::HandStartedFilter(ev) => Some(ChainEventBody::HandStarted {
            table_id: ev.table_id,
            hand_id: ev.hand_id,
            button_seat: ev.button_seat,
            small_blind: to_u128(ev.small_blind).ok()?,
            big_blind: to_u128(ev.big_blind).ok()?,
        }),
        PokerTableEvents::ActionTakenFilter(ev) => Some(ChainEventBody::ActionTaken {
            table_id: ev.table_id,
            hand_id: ev.hand_id,
            seat_index: ev.seat_index,
            action: ev.action,
            amount: to_u128(ev.amount).ok()?,
            pot_after: to_u128(ev.pot_after).ok()?,
        }),
        PokerTableEvents::PotUpdatedFilter(ev) => Some(ChainEventBody::PotUpdated {
            table_id: ev.table_id,
            hand_id: ev.hand_id,
            pot: to_u128(ev.pot).ok()?,
            current_bet: to_u128(ev.current_bet).ok()?,
            actor_seat: ev.actor_seat,
        }),
        PokerTableEvents::BettingRoundCompleteFilter(ev) => {
            Some(ChainEventBody::BettingRoundComplete {
                table_id: ev.table_id,
                hand_id: ev.hand_id,
                street: decode_street(ev.street)?,
            })
        }
        PokerTableEvents::RandomnessRequestedFilter(ev) => {
            Some(ChainEventBody::RandomnessRequested {
                table_id: ev.table_id,
                hand_id: ev.hand_id,
                street: decode_street(ev.street)?,
                requested_at: ev.requested_at,
            })
        }
        PokerTableEvents::CommunityCardsDealtFilter(ev) => {
            let mut cards = Vec::with_capacity(ev.cards.len());
            for raw in ev.cards {
                match Card::new(raw) {
                    Ok(card) => cards.push(card),
                    Err(err) => {
                        warn!(%err, "community card out of range; dropping log");
                        return None;
                    }
                }
            }
            Some(ChainEventBody::CommunityCardsDealt {
                table_id: ev.table_id,
                hand_id: ev.hand_id,
                cards,
            })
        }
        PokerTableEvents::HandSettledFilter(ev) => Some(ChainEventBody::HandSettled {
            table_id: ev.table_id,
            hand_id: ev.hand_id,
            winner_seat: ev.winner_seat,
            amount: to_u128(ev.amount).ok()?,
        }),
        PokerTableEvents::TimeoutForcedFilter(ev) => Some(ChainEventBody::TimeoutForced {
            table_id: ev.table_id,
            hand_id: ev.hand_id,
            seat_index: ev.seat_index,
        }),
        PokerTableEvents::HoleCommitSubmittedFilter(ev) => {
            Some(ChainEventBody::HoleCommitSubmitted {
                table_id: ev.table_id,
                hand_id: ev.hand_id,
                seat_index: ev.seat_index,
                commitment: ev.commitment.into(),
            })
        }
        PokerTableEvents::HoleCardsRevealedFilter(ev) => {
            let card0 = Card::new(ev.card_0).ok()?;
            let card1 = Card::new(ev.card_1).ok()?;
            Some(ChainEventBody::HoleCardsRevealed {
                table_id: ev.table_id,
                hand_id: ev.hand_id,
                seat_index: ev.seat_index,
                cards: [card0, card1],
            })
        }
    }
}

pub fn decode_registry_log(log: &Log) -> Option<ChainEventBody> {
    let event = match decode_event::<AgentRegistryEvents>(log) {
        Some(event) => event,
        None => {
            warn!(topic = ?log.topics.first(), "unrecognized registry log; skipping");
            return None;
        }
    };
    match event {
        AgentRegistryEvents::AgentRegisteredFilter(ev) => Some(ChainEventBody::AgentRegistered {
            token_address: ev.token_address,
            vault_address: ev.vault_address,
            table_address: ev.table_address,
            owner: ev.owner,
            operator: ev.operator,
            meta_uri: ev.meta_uri,
        }),
        AgentRegistryEvents::AgentUpdatedFilter(ev) => Some(ChainEventBody::AgentUpdated {
            token_address: ev.token_address,
            operator: ev.operator,
            meta_uri: ev.meta_uri,
        }),
    }
}

pub fn decode_vault_log(log: &Log) -> Option<ChainEventBody> {
    // The vault emits a single event kind, so it is decoded directly rather
    // than through a generated event union.
    let ev = match decode_event::<VaultSnapshottedFilter>(log) {
        Some(ev) => ev,
        None => {
            warn!(topic = ?log.topics.first(), "unrecognized vault log; skipping");
            return None;
        }
    };
    let cumulative_pnl = match i128::try_from(ev.cumulative_pnl) {
        Ok(value) => value,
        Err(_) => {
            warn!("cumulative pnl exceeds i128; dropping log");
            return None;
        }
    };
    Some(ChainEventBody::VaultSnapshotted {
        vault_address: ev.vault_address,
        hand_id: ev.hand_id,
        external_assets: to_u128(ev.external_assets).ok()?,
        treasury_shares: to_u128(ev.treasury_shares).ok()?,
        outstanding_shares: to_u128(ev.outstanding_shares).ok()?,
        nav_per_share: to_u128(ev.nav_per_share).ok()?,
        cumulative_pnl,
    })
}

fn decode_street(raw: u8) -> Option<Street> {
    let street = Street::from_u8(raw);
    if street.is_none() {
        warn!(raw, "unknown street in log; dropping");
    }
    street
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::contract::EthEvent;
    use ethers::types::{Address, H256, U256};

    use crate::{HandSettledFilter, VaultSnapshottedFilter};

    fn topic_u64(value: u64) -> H256 {
        H256::from_low_u64_be(value)
    }

    #[test]
    fn vault_snapshot_log_decodes() {
        let vault = Address::repeat_byte(0x22);
        let log = Log {
            address: vault,
            topics: vec![
                VaultSnapshottedFilter::signature(),
                H256::from(vault),
                topic_u64(7),
            ],
            data: encode(&[
                Token::Uint(U256::from(1_000u64)),
                Token::Uint(U256::from(10u64)),
                Token::Uint(U256::from(90u64)),
                Token::Uint(U256::exp10(18)),
                Token::Int(U256::from(250u64)),
            ])
            .into(),
            ..Default::default()
        };

        match decode_vault_log(&log) {
            Some(ChainEventBody::VaultSnapshotted {
                vault_address,
                hand_id,
                nav_per_share,
                cumulative_pnl,
                ..
            }) => {
                assert_eq!(vault_address, vault);
                assert_eq!(hand_id, 7);
                assert_eq!(nav_per_share, 10u128.pow(18));
                assert_eq!(cumulative_pnl, 250);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn table_log_decodes_and_unknown_topics_are_dropped() {
        let log = Log {
            topics: vec![
                HandSettledFilter::signature(),
                topic_u64(1),
                topic_u64(4),
            ],
            data: encode(&[Token::Uint(U256::from(2u64)), Token::Uint(U256::from(600u64))])
                .into(),
            ..Default::default()
        };
        match decode_table_log(&log) {
            Some(ChainEventBody::HandSettled {
                table_id,
                hand_id,
                winner_seat,
                amount,
            }) => {
                assert_eq!((table_id, hand_id, winner_seat, amount), (1, 4, 2, 600));
            }
            other => panic!("unexpected decode result: {other:?}"),
        }

        let unknown = Log {
            topics: vec![H256::repeat_byte(0x01)],
            ..Default::default()
        };
        assert!(decode_table_log(&unknown).is_none());
        assert!(decode_vault_log(&unknown).is_none());
    }
}
