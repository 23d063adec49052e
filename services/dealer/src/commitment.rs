//! Pure commit-reveal primitives: salt generation, collision-free card
//! draws and the binding hash commitment anchored on-chain.

use ethers::types::U256;
use ethers::utils::keccak256;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};
use showdown_types::{Card, DECK_SIZE};
use thiserror::Error;

pub type Salt = [u8; 32];
pub type Commitment = [u8; 32];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("requested card count out of range: {0} (expected 1..=52)")]
    InvalidCardCount(usize),
    #[error("deck exhausted: requested {requested}, only {remaining} remain after exclusion")]
    DeckExhausted { requested: usize, remaining: usize },
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

/// 32 cryptographically random bytes.
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Draw `n` distinct cards, excluding `excluded`. A supplied seed makes the
/// draw deterministic; that path exists for tests only.
pub fn generate_unique_cards(
    n: usize,
    excluded: &[Card],
    seed: Option<u64>,
) -> Result<Vec<Card>, CodecError> {
    if n == 0 || n > DECK_SIZE as usize {
        return Err(CodecError::InvalidCardCount(n));
    }
    let mut pool: Vec<Card> = (0..DECK_SIZE)
        .filter_map(|value| {
            let card = Card::new(value).ok()?;
            (!excluded.contains(&card)).then_some(card)
        })
        .collect();
    if pool.len() < n {
        return Err(CodecError::DeckExhausted {
            requested: n,
            remaining: pool.len(),
        });
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(OsRng).map_err(|err| CodecError::Entropy(err.to_string()))?,
    };

    // Partial Fisher-Yates: draw without replacement from the front.
    let mut drawn = Vec::with_capacity(n);
    for i in 0..n {
        let j = rng.gen_range(i..pool.len());
        pool.swap(i, j);
        drawn.push(pool[i]);
    }
    Ok(drawn)
}

/// Binding commitment over `(hand_id, seat_index, cards, salt)`. The table id
/// is intentionally excluded from the preimage; the on-chain verifier hashes
/// the same packed layout: `uint256 ∥ uint8 ∥ uint8 ∥ uint8 ∥ bytes32`.
pub fn commitment(hand_id: u64, seat_index: u8, cards: [Card; 2], salt: &Salt) -> Commitment {
    let mut preimage = Vec::with_capacity(32 + 3 + 32);
    let mut hand_bytes = [0u8; 32];
    U256::from(hand_id).to_big_endian(&mut hand_bytes);
    preimage.extend_from_slice(&hand_bytes);
    preimage.push(seat_index);
    preimage.push(cards[0].value());
    preimage.push(cards[1].value());
    preimage.extend_from_slice(salt);
    keccak256(preimage)
}

/// Check a reveal against a previously published commitment.
pub fn verify_reveal(
    hand_id: u64,
    seat_index: u8,
    cards: [Card; 2],
    salt: &Salt,
    expected: &Commitment,
) -> bool {
    &commitment(hand_id, seat_index, cards, salt) == expected
}
