use std::fmt;

pub use rs_poker::core::{Card, Suit, Value};
use serde::{Deserialize, Serialize};

/// Opaque handle for a connected client. Assigned by the core when a
/// connection registers; it is the only identity a player has.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// For simplicity, money is represented as discreet, indivisible units.
pub type Chips = u32;

/// Rooms are named by the clients that join them.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        RoomId(s.into())
    }
}

/// The wire form of a card: rank in `2..10,J,Q,K,A` followed by a suit symbol.
pub fn card_label(card: &Card) -> String {
    let rank = match card.value {
        Value::Two => "2",
        Value::Three => "3",
        Value::Four => "4",
        Value::Five => "5",
        Value::Six => "6",
        Value::Seven => "7",
        Value::Eight => "8",
        Value::Nine => "9",
        Value::Ten => "10",
        Value::Jack => "J",
        Value::Queen => "Q",
        Value::King => "K",
        Value::Ace => "A",
    };
    let suit = match card.suit {
        Suit::Spade => '♠',
        Suit::Heart => '♥',
        Suit::Diamond => '♦',
        Suit::Club => '♣',
    };
    format!("{}{}", rank, suit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_use_rank_then_suit_symbol() {
        let ten = Card {
            value: Value::Ten,
            suit: Suit::Heart,
        };
        let ace = Card {
            value: Value::Ace,
            suit: Suit::Spade,
        };
        assert_eq!(card_label(&ten), "10♥");
        assert_eq!(card_label(&ace), "A♠");
    }
}
