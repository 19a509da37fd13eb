//! The state of a single table.
//!
//! `Room` owns everything about one game: who is seated and in what order,
//! the deck, the community cards, the chips in the middle and whose turn it
//! is. The rules that move this state along live in `engine`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::deck::Deck;
use crate::error::Rejection;
use crate::model::{card_label, Card, Chips, ClientId, RoomId};
use crate::protocol::{GameState, SeatView};
use crate::server::Settings;

/// A stage of a hand's betting, or of its card reveals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Street {
    PreFlop,
    Flop,
    Turn,
    River,
}

impl Street {
    /// Community cards revealed when the street is dealt.
    pub fn community_cards(self) -> usize {
        match self {
            Street::PreFlop => 0,
            Street::Flop => 3,
            Street::Turn | Street::River => 1,
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Street::PreFlop => "pre-flop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        })
    }
}

/// Where a room is in the life of a hand.
///
/// A hand runs `BlindPost`, `Betting(PreFlop)`, then for each of the flop,
/// turn and river a `Deal`, a `Discard` and a `Betting` phase, and finally
/// `Showdown`. `Waiting` and `HandOver` sit between hands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    Waiting,
    BlindPost,
    Betting(Street),
    Deal(Street),
    Discard(Street),
    Showdown,
    HandOver,
}

impl Phase {
    /// The phase that follows this one within a hand.
    pub fn successor(self) -> Option<Phase> {
        use Phase::*;
        match self {
            Waiting | HandOver => None,
            BlindPost => Some(Betting(Street::PreFlop)),
            Betting(Street::PreFlop) => Some(Deal(Street::Flop)),
            Betting(Street::Flop) => Some(Deal(Street::Turn)),
            Betting(Street::Turn) => Some(Deal(Street::River)),
            Betting(Street::River) => Some(Showdown),
            Deal(street) => Some(Discard(street)),
            Discard(street) => Some(Betting(street)),
            Showdown => Some(HandOver),
        }
    }

    /// Whether cards are out and chips are at stake.
    pub fn in_hand(self) -> bool {
        !matches!(self, Phase::Waiting | Phase::HandOver)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Waiting => f.write_str("waiting"),
            Phase::BlindPost => f.write_str("blind-post"),
            Phase::Betting(s) => write!(f, "betting({})", s),
            Phase::Deal(s) => write!(f, "deal({})", s),
            Phase::Discard(s) => write!(f, "discard({})", s),
            Phase::Showdown => f.write_str("showdown"),
            Phase::HandOver => f.write_str("hand-over"),
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: ClientId,
    pub name: String,
    pub chips: Chips,
    pub hand: Vec<Card>,
    pub folded: bool,
    /// Set once the player has swapped a card in the current discard phase.
    pub discarded: bool,
}

impl Player {
    fn new(id: ClientId, name: String, chips: Chips) -> Self {
        Player {
            id,
            name,
            chips,
            hand: vec![],
            folded: true,
            discarded: false,
        }
    }
}

pub struct Room {
    pub(crate) id: RoomId,
    pub(crate) settings: Settings,
    /// Seats in turn order.
    pub(crate) players: Vec<Player>,
    pub(crate) deck: Deck,
    pub(crate) community: Vec<Card>,
    /// Chips from closed rounds and folded contributions.
    pub(crate) pot: Chips,
    pub(crate) phase: Phase,
    pub(crate) turn: Option<ClientId>,
    /// Reaching this seat with every bet matched closes the round.
    pub(crate) anchor: Option<ClientId>,
    pub(crate) current_bet: Chips,
    /// What each player has put in during the current betting round.
    pub(crate) bets: BTreeMap<ClientId, Chips>,
    pub(crate) dealer: Option<ClientId>,
    pub(crate) actions_this_round: u32,
    pub(crate) hands_played: u64,
    /// Odd chips left over from split pots.
    pub(crate) forfeited: Chips,
}

impl Room {
    pub fn new(id: RoomId, settings: Settings) -> Self {
        Room {
            id,
            settings,
            players: vec![],
            deck: Deck::new(),
            community: vec![],
            pot: 0,
            phase: Phase::Waiting,
            turn: None,
            anchor: None,
            current_bet: 0,
            bets: BTreeMap::new(),
            dealer: None,
            actions_this_round: 0,
            hands_played: 0,
            forfeited: 0,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The pot as players see it: everything in the middle, this round's bets
    /// included.
    pub fn pot(&self) -> Chips {
        self.pot + self.bets.values().sum::<Chips>()
    }

    pub fn current_bet(&self) -> Chips {
        self.current_bet
    }

    pub fn turn(&self) -> Option<ClientId> {
        self.turn
    }

    pub fn dealer(&self) -> Option<ClientId> {
        self.dealer
    }

    pub fn community(&self) -> &[Card] {
        &self.community
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: ClientId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn bet_of(&self, id: ClientId) -> Chips {
        self.bets.get(&id).copied().unwrap_or(0)
    }

    pub fn hands_played(&self) -> u64 {
        self.hands_played
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.settings.max_players as usize
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.index_of(id).is_some()
    }

    /// Every chip on the table, wherever it currently sits.
    pub fn ledger(&self) -> Chips {
        self.pot()
            + self.forfeited
            + self.players.iter().map(|p| p.chips).sum::<Chips>()
    }

    /// Seat a new player.
    ///
    /// Returns `Ok(false)` without touching anything if the client already has
    /// a seat here. Anyone joining mid-hand sits out until the next deal.
    pub fn seat(&mut self, id: ClientId, name: &str) -> Result<bool, Rejection> {
        if self.contains(id) {
            return Ok(false);
        }
        if self.is_full() {
            return Err(Rejection::RoomFull {
                room_id: self.id.clone(),
            });
        }
        let player = Player::new(id, name.into(), self.settings.starting_chips);
        self.players.push(player);
        Ok(true)
    }

    /// Seats with enough chips to post the big blind.
    pub fn funded_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.chips >= self.settings.big_blind)
            .count()
    }

    /// Whether a new hand may be dealt right now.
    pub fn can_start(&self) -> bool {
        !self.phase.in_hand() && self.funded_count() >= 2
    }

    pub(crate) fn index_of(&self, id: ClientId) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    pub(crate) fn live_count(&self) -> usize {
        self.players.iter().filter(|p| !p.folded).count()
    }

    /// The first non-folded seat strictly after `index`, wrapping around.
    pub(crate) fn next_live_after(&self, index: usize) -> Option<usize> {
        self.next_live_from(index + 1)
    }

    /// The first non-folded seat at or after `index`, wrapping around.
    pub(crate) fn next_live_from(&self, index: usize) -> Option<usize> {
        let n = self.players.len();
        (0..n)
            .map(|offset| (index + offset) % n)
            .find(|&i| !self.players[i].folded)
    }

    /// What `viewer` is allowed to see: their own cards face up, everyone
    /// else's face down.
    pub fn snapshot(&self, viewer: ClientId) -> GameState {
        let players = self
            .players
            .iter()
            .map(|p| SeatView {
                id: p.id,
                name: p.name.clone(),
                chips: p.chips,
                bet: self.bet_of(p.id),
                folded: p.folded,
                discarded: p.discarded,
                hand: p
                    .hand
                    .iter()
                    .map(|c| {
                        if p.id == viewer {
                            Some(card_label(c))
                        } else {
                            None
                        }
                    })
                    .collect(),
            })
            .collect();
        GameState {
            room_id: self.id.clone(),
            you: viewer,
            phase: self.phase,
            hand_number: self.hands_played,
            pot: self.pot(),
            current_bet: self.current_bet,
            dealer: self.dealer,
            turn: self.turn,
            community: self.community.iter().map(card_label).collect(),
            players,
        }
    }
}
