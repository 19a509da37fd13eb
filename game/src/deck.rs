use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{Card, Suit, Value};

/// Suits in canonical deck order.
pub const SUITS: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Diamond, Suit::Club];

/// Ranks in canonical deck order, lowest first.
pub const VALUES: [Value; 13] = [
    Value::Two,
    Value::Three,
    Value::Four,
    Value::Five,
    Value::Six,
    Value::Seven,
    Value::Eight,
    Value::Nine,
    Value::Ten,
    Value::Jack,
    Value::Queen,
    Value::King,
    Value::Ace,
];

pub const DECK_SIZE: usize = 52;

/// A standard 52-card deck, consumed from the front.
///
/// Cards that have been drawn are gone for good; a fresh deck is built for
/// every hand.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: VecDeque<Card>,
}

impl Deck {
    /// All 52 cards in canonical order: each suit in turn, two through ace.
    pub fn new() -> Self {
        let mut cards = VecDeque::with_capacity(DECK_SIZE);
        for &suit in SUITS.iter() {
            for &value in VALUES.iter() {
                cards.push_back(Card { value, suit });
            }
        }
        Deck { cards }
    }

    /// A freshly built deck, already shuffled.
    pub fn shuffled() -> Self {
        let mut deck = Deck::new();
        deck.shuffle();
        deck
    }

    /// Uniformly permute the remaining cards in place.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        // Fisher-Yates over the contiguous buffer.
        self.cards.make_contiguous().shuffle(rng);
    }

    /// Remove `n` cards from the front. Returns fewer only if the deck runs
    /// out.
    pub fn draw(&mut self, n: usize) -> Vec<Card> {
        let n = n.min(self.cards.len());
        self.cards.drain(..n).collect()
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl Default for Deck {
    fn default() -> Self {
        Deck::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn new_deck_is_canonical_and_unique() {
        let mut deck = Deck::new();
        assert_eq!(deck.remaining(), DECK_SIZE);
        let cards = deck.draw(DECK_SIZE);
        let unique: HashSet<_> = cards.iter().cloned().collect();
        assert_eq!(unique.len(), DECK_SIZE);
        assert_eq!(
            cards[0],
            Card {
                value: Value::Two,
                suit: Suit::Spade
            }
        );
        assert_eq!(
            cards[51],
            Card {
                value: Value::Ace,
                suit: Suit::Club
            }
        );
    }

    #[test]
    fn draw_consumes_from_the_front() {
        let mut deck = Deck::new();
        let first = deck.draw(2);
        let next = deck.draw(1);
        assert_eq!(first[0].value, Value::Two);
        assert_eq!(first[1].value, Value::Three);
        assert_eq!(next[0].value, Value::Four);
        assert_eq!(deck.remaining(), DECK_SIZE - 3);
    }

    #[test]
    fn drawn_cards_never_come_back() {
        let mut deck = Deck::shuffled();
        let mut seen = HashSet::new();
        while !deck.is_empty() {
            for card in deck.draw(5) {
                assert!(seen.insert(card), "card {:?} drawn twice", card);
            }
        }
        assert_eq!(seen.len(), DECK_SIZE);
        assert!(deck.draw(1).is_empty());
    }

    #[test]
    fn shuffle_keeps_the_same_cards() {
        let mut deck = Deck::shuffled();
        let cards: HashSet<_> = deck.draw(DECK_SIZE).into_iter().collect();
        let canonical: HashSet<_> = Deck::new().draw(DECK_SIZE).into_iter().collect();
        assert_eq!(cards, canonical);
    }

    #[test]
    fn shuffle_moves_the_top_card_around() {
        // Every position should be able to receive the canonical first card.
        let mut positions = HashSet::new();
        for _ in 0..2000 {
            let mut deck = Deck::new();
            deck.shuffle();
            let cards = deck.draw(DECK_SIZE);
            let pos = cards
                .iter()
                .position(|c| c.value == Value::Two && c.suit == Suit::Spade);
            positions.insert(pos);
        }
        assert!(positions.len() > 40);
    }
}
