use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of cards in a standard deck.
pub const DECK_SIZE: u8 = 52;

const RANKS: [char; 13] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'T', 'J', 'Q', 'K', 'A',
];
const SUITS: [char; 4] = ['c', 'd', 'h', 's'];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("card value out of range: {0} (expected 0..{DECK_SIZE})")]
pub struct InvalidCard(pub u8);

/// A single card, encoded as a value in [0, 51]. The encoding matches the
/// on-chain representation: `value = suit * 13 + rank`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Card(u8);

impl Card {
    pub fn new(value: u8) -> Result<Self, InvalidCard> {
        if value >= DECK_SIZE {
            return Err(InvalidCard(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Rank index in [0, 12], where 0 is a deuce and 12 is an ace.
    pub fn rank(&self) -> u8 {
        self.0 % 13
    }

    /// Suit index in [0, 3]: clubs, diamonds, hearts, spades.
    pub fn suit(&self) -> u8 {
        self.0 / 13
    }
}

impl TryFrom<u8> for Card {
    type Error = InvalidCard;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            RANKS[self.rank() as usize],
            SUITS[self.suit() as usize]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Card::new(51).is_ok());
        assert_eq!(Card::new(52), Err(InvalidCard(52)));
        assert_eq!(Card::new(255), Err(InvalidCard(255)));
    }

    #[test]
    fn displays_rank_and_suit() {
        assert_eq!(Card::new(0).unwrap().to_string(), "2c");
        assert_eq!(Card::new(12).unwrap().to_string(), "Ac");
        assert_eq!(Card::new(51).unwrap().to_string(), "As");
    }

    #[test]
    fn serializes_as_bare_value() {
        let card = Card::new(17).unwrap();
        assert_eq!(serde_json::to_string(&card).unwrap(), "17");
        let back: Card = serde_json::from_str("17").unwrap();
        assert_eq!(back, card);
    }
}
