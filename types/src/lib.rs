pub mod api;
pub mod cards;
pub mod events;
pub mod model;

pub use cards::{Card, DECK_SIZE};
pub use events::{ChainEvent, ChainEventBody, EventKey, Street};
pub use model::{
    ActionKind, Agent, GameState, Hand, HandAction, Seat, Settlement, Table, VaultSnapshot,
};
