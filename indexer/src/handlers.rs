//! Applies decoded ledger events to the mirror. One event, one minimal
//! mutation, one broadcast. Replays are absorbed by the processed-key set,
//! so applying the same log twice is a no-op.

use showdown_types::api::Notification;
use showdown_types::{
    ActionKind, Agent, ChainEvent, ChainEventBody, GameState, HandAction, Seat, Settlement,
    Street, VaultSnapshot,
};
use tracing::{debug, warn};

use crate::broadcast::BroadcastManager;
use crate::store::{MirrorStore, ProcessedEvent};

/// Apply one event to the mirror and notify the table's stream channel.
/// Returns false when the event was already processed.
pub fn apply_event(
    store: &MirrorStore,
    broadcaster: &BroadcastManager,
    event: &ChainEvent,
    now: u64,
) -> bool {
    let record = ProcessedEvent {
        tx_hash: event.tx_hash,
        name: event.body.name(),
        processed_at: now,
    };
    if !store.mark_processed(event.key(), record) {
        debug!(
            block = event.block_number,
            log_index = event.log_index,
            "event already processed; skipping"
        );
        return false;
    }

    let broadcast_table = match &event.body {
        ChainEventBody::SeatUpdated {
            table_id,
            seat_index,
            owner,
            operator,
            stack,
            is_active,
        } => {
            store.upsert_table(*table_id, |_| {});
            store.upsert_seat(Seat {
                table_id: *table_id,
                seat_index: *seat_index,
                owner: *owner,
                operator: *operator,
                stack: *stack,
                is_active: *is_active,
                current_bet: 0,
            });
            Some(*table_id)
        }
        ChainEventBody::HandStarted {
            table_id,
            hand_id,
            button_seat,
            small_blind,
            big_blind,
        } => {
            store.upsert_hand(*table_id, *hand_id, |hand| {
                hand.game_state = GameState::PreFlopBetting;
                hand.started_at = now;
            });
            store.upsert_table(*table_id, |table| {
                table.current_hand_id = Some(*hand_id);
                table.button_seat = Some(*button_seat);
                table.small_blind = *small_blind;
                table.big_blind = *big_blind;
                table.game_state = GameState::PreFlopBetting;
            });
            Some(*table_id)
        }
        ChainEventBody::ActionTaken {
            table_id,
            hand_id,
            seat_index,
            action,
            amount,
            pot_after,
        } => {
            match ActionKind::from_u8(*action) {
                Some(kind) => store.push_action(HandAction {
                    table_id: *table_id,
                    hand_id: *hand_id,
                    seat_index: *seat_index,
                    kind,
                    amount: *amount,
                    pot_after: *pot_after,
                    block_number: event.block_number,
                    tx_hash: event.tx_hash,
                    created_at: now,
                }),
                // The pot still moved; only the action row is dropped.
                None => warn!(raw = action, "unknown action kind; row not recorded"),
            }
            store.upsert_hand(*table_id, *hand_id, |hand| hand.pot = *pot_after);
            Some(*table_id)
        }
        ChainEventBody::PotUpdated {
            table_id,
            hand_id,
            pot,
            current_bet,
            actor_seat,
        } => {
            store.upsert_hand(*table_id, *hand_id, |hand| {
                hand.pot = *pot;
                hand.current_bet = *current_bet;
                hand.actor_seat = Some(*actor_seat);
            });
            Some(*table_id)
        }
        ChainEventBody::BettingRoundComplete {
            table_id,
            hand_id,
            street,
        } => {
            let next_state = match street {
                Street::PreFlop => GameState::FlopBetting,
                Street::Flop => GameState::TurnBetting,
                Street::Turn => GameState::RiverBetting,
                Street::River => GameState::Showdown,
            };
            store.upsert_hand(*table_id, *hand_id, |hand| {
                hand.game_state = next_state;
                hand.current_bet = 0;
            });
            store.upsert_table(*table_id, |table| table.game_state = next_state);
            Some(*table_id)
        }
        ChainEventBody::RandomnessRequested { table_id, .. } => Some(*table_id),
        ChainEventBody::CommunityCardsDealt {
            table_id,
            hand_id,
            cards,
        } => {
            // The event carries only the newly revealed street; the board
            // grows by appending, never by replacement.
            store.upsert_hand(*table_id, *hand_id, |hand| {
                hand.community_cards.extend_from_slice(cards);
            });
            Some(*table_id)
        }
        ChainEventBody::HandSettled {
            table_id,
            hand_id,
            winner_seat,
            amount,
        } => {
            store.upsert_hand(*table_id, *hand_id, |hand| {
                hand.winner_seat = Some(*winner_seat);
                hand.settlement_amount = Some(*amount);
                hand.game_state = GameState::Settled;
                hand.settled_at = Some(now);
            });
            store.upsert_table(*table_id, |table| {
                table.game_state = GameState::Settled;
                table.action_deadline = None;
            });
            store.push_settlement(Settlement {
                table_id: *table_id,
                hand_id: *hand_id,
                winner_seat: *winner_seat,
                pot_amount: *amount,
                block_number: event.block_number,
                tx_hash: event.tx_hash,
            });
            Some(*table_id)
        }
        ChainEventBody::TimeoutForced { table_id, .. }
        | ChainEventBody::HoleCommitSubmitted { table_id, .. }
        | ChainEventBody::HoleCardsRevealed { table_id, .. } => Some(*table_id),
        ChainEventBody::AgentRegistered {
            token_address,
            vault_address,
            table_address,
            owner,
            operator,
            meta_uri,
        } => {
            store.upsert_agent(Agent {
                token_address: *token_address,
                vault_address: *vault_address,
                table_address: *table_address,
                owner: *owner,
                operator: *operator,
                meta_uri: meta_uri.clone(),
                is_registered: true,
            });
            store.table_id_by_contract(*table_address)
        }
        ChainEventBody::AgentUpdated {
            token_address,
            operator,
            meta_uri,
        } => {
            store.update_agent(*token_address, |agent| {
                agent.operator = *operator;
                agent.meta_uri = meta_uri.clone();
            });
            store
                .agent(*token_address)
                .and_then(|agent| store.table_id_by_contract(agent.table_address))
        }
        ChainEventBody::VaultSnapshotted {
            vault_address,
            hand_id,
            external_assets,
            treasury_shares,
            outstanding_shares,
            nav_per_share,
            cumulative_pnl,
        } => {
            store.push_snapshot(VaultSnapshot {
                vault_address: *vault_address,
                hand_id: *hand_id,
                external_assets: *external_assets,
                treasury_shares: *treasury_shares,
                outstanding_shares: *outstanding_shares,
                nav_per_share: *nav_per_share,
                cumulative_pnl: *cumulative_pnl,
                block_number: event.block_number,
                recorded_at: now,
            });
            store
                .agent_by_vault(*vault_address)
                .and_then(|agent| store.table_id_by_contract(agent.table_address))
        }
    };

    if let Some(table_id) = broadcast_table {
        let data = match serde_json::to_value(&event.body) {
            Ok(data) => data,
            Err(err) => {
                warn!(%err, "failed to serialize event body for broadcast");
                serde_json::Value::Null
            }
        };
        broadcaster.broadcast(
            table_id,
            &Notification {
                kind: event.body.name().to_string(),
                table_id,
                timestamp: now,
                data,
            },
        );
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use showdown_types::Card;
    use tokio::sync::mpsc;

    fn event(block: u64, index: u64, body: ChainEventBody) -> ChainEvent {
        ChainEvent {
            block_number: block,
            log_index: index,
            tx_hash: Default::default(),
            body,
        }
    }

    fn cards(values: &[u8]) -> Vec<Card> {
        values.iter().map(|v| Card::new(*v).unwrap()).collect()
    }

    #[test]
    fn replay_is_idempotent_and_broadcasts_once() {
        let store = MirrorStore::new();
        let broadcaster = BroadcastManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.subscribe(1, tx);

        let started = event(
            10,
            0,
            ChainEventBody::HandStarted {
                table_id: 1,
                hand_id: 3,
                button_seat: 2,
                small_blind: 50,
                big_blind: 100,
            },
        );
        assert!(apply_event(&store, &broadcaster, &started, 1_000));
        assert!(!apply_event(&store, &broadcaster, &started, 1_000));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(store.table(1).unwrap().current_hand_id, Some(3));
    }

    #[test]
    fn community_cards_append_across_streets() {
        let store = MirrorStore::new();
        let broadcaster = BroadcastManager::new();

        let flop = event(
            10,
            0,
            ChainEventBody::CommunityCardsDealt {
                table_id: 1,
                hand_id: 1,
                cards: cards(&[0, 13, 26]),
            },
        );
        let turn = event(
            11,
            0,
            ChainEventBody::CommunityCardsDealt {
                table_id: 1,
                hand_id: 1,
                cards: cards(&[39]),
            },
        );
        apply_event(&store, &broadcaster, &flop, 1_000);
        apply_event(&store, &broadcaster, &turn, 1_001);

        let hand = store.hand(1, 1).unwrap();
        assert_eq!(hand.community_cards, cards(&[0, 13, 26, 39]));
    }

    #[test]
    fn settlement_closes_the_hand_and_records_a_row() {
        let store = MirrorStore::new();
        let broadcaster = BroadcastManager::new();

        let settled = event(
            20,
            1,
            ChainEventBody::HandSettled {
                table_id: 1,
                hand_id: 8,
                winner_seat: 4,
                amount: 900,
            },
        );
        apply_event(&store, &broadcaster, &settled, 2_000);

        let hand = store.hand(1, 8).unwrap();
        assert_eq!(hand.winner_seat, Some(4));
        assert_eq!(hand.settlement_amount, Some(900));
        assert_eq!(hand.game_state, GameState::Settled);
        assert_eq!(hand.settled_at, Some(2_000));
        assert_eq!(store.settlements_for_table(1).len(), 1);
    }

    #[test]
    fn unknown_action_kind_is_dropped_but_pot_still_moves() {
        let store = MirrorStore::new();
        let broadcaster = BroadcastManager::new();

        let action = event(
            5,
            0,
            ChainEventBody::ActionTaken {
                table_id: 1,
                hand_id: 1,
                seat_index: 0,
                action: 200,
                amount: 10,
                pot_after: 160,
            },
        );
        apply_event(&store, &broadcaster, &action, 1_000);
        assert!(store.actions_for_hand(1, 1).is_empty());
        assert_eq!(store.hand(1, 1).unwrap().pot, 160);
    }

    #[test]
    fn vault_snapshot_routes_through_the_registered_agent() {
        let store = MirrorStore::new();
        let broadcaster = BroadcastManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.subscribe(1, tx);

        let table_contract = ethers::types::Address::repeat_byte(0x01);
        let vault = ethers::types::Address::repeat_byte(0x02);
        store.upsert_table(1, |table| table.contract_address = table_contract);
        apply_event(
            &store,
            &broadcaster,
            &event(
                1,
                0,
                ChainEventBody::AgentRegistered {
                    token_address: ethers::types::Address::repeat_byte(0x03),
                    vault_address: vault,
                    table_address: table_contract,
                    owner: Default::default(),
                    operator: Default::default(),
                    meta_uri: "ipfs://agent".into(),
                },
            ),
            1_000,
        );
        assert!(rx.try_recv().is_ok());

        apply_event(
            &store,
            &broadcaster,
            &event(
                2,
                0,
                ChainEventBody::VaultSnapshotted {
                    vault_address: vault,
                    hand_id: 1,
                    external_assets: 1_000,
                    treasury_shares: 10,
                    outstanding_shares: 100,
                    nav_per_share: 10u128.pow(18),
                    cumulative_pnl: -5,
                },
            ),
            1_001,
        );
        assert!(rx.try_recv().is_ok());
        assert_eq!(store.snapshots_for_vault(vault).len(), 1);
    }
}
