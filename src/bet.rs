//! Bet record and the win predicate applied at draw time.

use chrono::NaiveDate;

/// Bet number that wins the draw.
pub const WINNING_NUMBER: u32 = 7574;

/// One lottery entry tied to a participant and a chosen number.
///
/// Immutable after decoding; owned by the durable store once persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub agency: u32,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birthdate: NaiveDate,
    pub number: u32,
}

/// Deterministic win predicate applied to every stored bet at draw time.
pub fn has_won(bet: &Bet) -> bool {
    bet.number == WINNING_NUMBER
}
