//! Hand ranking, as seen by the engine.
//!
//! The engine never ranks cards itself; it hands every contender's cards to a
//! `HandEvaluator` at showdown and pays whoever comes back.

use rs_poker::core::{Hand, Rank, Rankable};

use crate::model::Card;

pub trait HandEvaluator: Send + Sync + 'static {
    type Strength: Ord;

    /// Strength of the best five-card hand within `cards`.
    fn rank(&self, cards: &[Card]) -> Self::Strength;

    /// Indices of the hands tied for best. Empty only if `hands` is.
    fn winners(&self, hands: &[Vec<Card>]) -> Vec<usize> {
        let ranks: Vec<Self::Strength> = hands.iter().map(|h| self.rank(h)).collect();
        match ranks.iter().max() {
            Some(best) => ranks
                .iter()
                .enumerate()
                .filter(|(_, r)| *r == best)
                .map(|(i, _)| i)
                .collect(),
            None => vec![],
        }
    }
}

/// Standard poker ranking, courtesy of `rs_poker`.
#[derive(Debug, Copy, Clone, Default)]
pub struct RankEvaluator;

impl HandEvaluator for RankEvaluator {
    type Strength = Rank;

    fn rank(&self, cards: &[Card]) -> Rank {
        Hand::new_with_cards(cards.to_vec()).rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Suit, Value};

    fn card(value: Value, suit: Suit) -> Card {
        Card { value, suit }
    }

    fn seven(extra: [Card; 2]) -> Vec<Card> {
        let mut cards = vec![
            card(Value::Two, Suit::Club),
            card(Value::Seven, Suit::Diamond),
            card(Value::Nine, Suit::Heart),
            card(Value::Jack, Suit::Spade),
            card(Value::Four, Suit::Heart),
        ];
        cards.extend_from_slice(&extra);
        cards
    }

    #[test]
    fn pair_beats_high_card() {
        let pair = seven([card(Value::Nine, Suit::Club), card(Value::Three, Suit::Spade)]);
        let high = seven([card(Value::Ace, Suit::Club), card(Value::King, Suit::Spade)]);
        assert_eq!(RankEvaluator.winners(&[high, pair]), vec![1]);
    }

    #[test]
    fn identical_strength_ties() {
        let a = seven([card(Value::Ace, Suit::Club), card(Value::King, Suit::Club)]);
        let b = seven([card(Value::Ace, Suit::Diamond), card(Value::King, Suit::Diamond)]);
        assert_eq!(RankEvaluator.winners(&[a, b]), vec![0, 1]);
    }

    #[test]
    fn ranks_more_than_seven_cards() {
        // Five hole cards plus five community cards.
        let mut cards = seven([card(Value::Two, Suit::Diamond), card(Value::Two, Suit::Heart)]);
        cards.push(card(Value::Two, Suit::Spade));
        cards.push(card(Value::Six, Suit::Club));
        cards.push(card(Value::Eight, Suit::Club));
        let quads = RankEvaluator.rank(&cards);
        let trips = RankEvaluator.rank(&cards[..7]);
        assert!(quads > trips);
    }

    #[test]
    fn no_hands_no_winners() {
        assert!(RankEvaluator.winners(&[]).is_empty());
    }
}
