//! The rules of a hand.
//!
//! Everything here is a method on `Room` that either rejects a request
//! outright, leaving the room untouched, or carries it through to completion,
//! queueing whatever the players need to hear on the way.

use log::{debug, info};

use crate::deck::Deck;
use crate::error::Rejection;
use crate::eval::HandEvaluator;
use crate::model::{card_label, Card, Chips, ClientId};
use crate::outbox::Outbox;
use crate::protocol::{Action, ShowdownResponse, ShownHand};
use crate::room::{Phase, Player, Room, Street};

/// Cards dealt to each player.
pub const HAND_SIZE: usize = 5;

fn labels(cards: &[Card]) -> String {
    cards.iter().map(card_label).collect::<Vec<_>>().join(" ")
}

impl Room {
    /// Deal a new hand.
    ///
    /// Returns `false`, and parks the room in `Waiting`, if fewer than two
    /// players can cover the big blind.
    pub fn start_hand(&mut self, out: &mut Outbox) -> bool {
        if self.phase.in_hand() {
            return false;
        }
        if self.funded_count() < 2 {
            self.phase = Phase::Waiting;
            self.turn = None;
            self.anchor = None;
            out.status("waiting for players");
            out.snapshot(self);
            return false;
        }
        let (small, big) = (self.settings.small_blind, self.settings.big_blind);

        self.hands_played += 1;
        self.community.clear();
        self.bets.clear();
        self.pot = 0;
        self.current_bet = 0;
        self.deck = Deck::shuffled();
        for p in self.players.iter_mut() {
            p.hand.clear();
            p.discarded = false;
            p.folded = p.chips < big;
        }
        let dealer = self.rotate_dealer();
        for p in self.players.iter_mut().filter(|p| !p.folded) {
            p.hand = self.deck.draw(HAND_SIZE);
        }

        self.phase = Phase::BlindPost;
        let sb = self.seat_after(dealer);
        let bb = self.seat_after(sb);
        self.commit(sb, small);
        self.commit(bb, big);
        self.current_bet = big;

        let first = self.players[self.seat_after(bb)].id;
        self.turn = Some(first);
        self.anchor = Some(first);
        self.actions_this_round = 0;
        self.phase = Phase::Betting(Street::PreFlop);

        info!(
            "room {}: hand #{} dealt to {} players",
            self.id,
            self.hands_played,
            self.live_count()
        );
        out.status(format!(
            "hand #{}: {} deals, {} posts {}, {} posts {}",
            self.hands_played,
            self.players[dealer].name,
            self.players[sb].name,
            small,
            self.players[bb].name,
            big,
        ));
        out.snapshot(self);
        out.prompt(self);
        true
    }

    /// Apply a player's move.
    pub fn act<E: HandEvaluator>(
        &mut self,
        who: ClientId,
        action: Action,
        evaluator: &E,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        let index = self.index_of(who).ok_or_else(|| Rejection::NotSeated {
            room_id: self.id.clone(),
        })?;
        match action {
            Action::Discard(card) => self.discard(index, card, evaluator, out),
            // Discards are simultaneous, so anyone still in may drop out.
            Action::Fold if matches!(self.phase, Phase::Discard(_)) => {
                if self.players[index].folded {
                    return Err(Rejection::AlreadyFolded);
                }
                self.fold_seat(index);
                out.status(format!("{} folds", self.players[index].name));
                self.after_discard_change(evaluator, out);
                Ok(())
            }
            action => self.bet(index, action, evaluator, out),
        }
    }

    /// Take a player out of the room, treating a departure mid-hand as a fold.
    pub fn remove_player<E: HandEvaluator>(
        &mut self,
        who: ClientId,
        evaluator: &E,
        out: &mut Outbox,
    ) -> Option<Player> {
        let index = self.index_of(who)?;
        let in_hand = self.phase.in_hand() && !self.players[index].folded;
        if in_hand {
            self.fold_seat(index);
        }
        let had_turn = self.turn == Some(who);
        let leaver = self.players.remove(index);
        self.bets.remove(&who);
        debug!("room {}: {} left during {}", self.id, leaver.name, self.phase);

        if self.players.is_empty() {
            self.phase = Phase::Waiting;
            self.turn = None;
            self.anchor = None;
            self.dealer = None;
            return Some(leaver);
        }

        // Everything that pointed at the leaver now points at a neighbour in
        // what is left of the seat list.
        let n = self.players.len();
        if self.dealer == Some(who) {
            self.dealer = Some(self.players[(index + n - 1) % n].id);
        }
        if self.anchor == Some(who) {
            self.anchor = self.next_live_from(index % n).map(|i| self.players[i].id);
        }
        if had_turn {
            self.turn = None;
        }
        out.status(format!("{} left the table", leaver.name));

        if !in_hand {
            out.snapshot(self);
            return Some(leaver);
        }
        match self.phase {
            Phase::Betting(_) if self.live_count() <= 1 => self.fold_out(out),
            Phase::Betting(_) if had_turn => match self.next_live_from(index % n) {
                Some(next) => self.settle_turn(next, evaluator, out),
                None => self.fold_out(out),
            },
            Phase::Discard(_) => self.after_discard_change(evaluator, out),
            _ => out.snapshot(self),
        }
        Some(leaver)
    }

    fn bet<E: HandEvaluator>(
        &mut self,
        index: usize,
        action: Action,
        evaluator: &E,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        if !matches!(self.phase, Phase::Betting(_)) {
            return Err(Rejection::WrongPhase {
                action: action.name(),
                phase: self.phase,
            });
        }
        let (id, chips, folded) = {
            let p = &self.players[index];
            (p.id, p.chips, p.folded)
        };
        if folded {
            return Err(Rejection::AlreadyFolded);
        }
        if self.turn != Some(id) {
            return Err(Rejection::NotYourTurn);
        }
        let bet = self.bet_of(id);
        let to_call = self.current_bet - bet;

        let message = match action {
            Action::Fold => {
                self.fold_seat(index);
                format!("{} folds", self.players[index].name)
            }
            Action::Check => {
                if to_call != 0 {
                    return Err(Rejection::CannotCheck { to_call });
                }
                format!("{} checks", self.players[index].name)
            }
            Action::Call => {
                if chips < to_call {
                    return Err(Rejection::InsufficientChips {
                        needed: to_call,
                        available: chips,
                    });
                }
                self.commit(index, to_call);
                format!("{} calls {}", self.players[index].name, to_call)
            }
            Action::Raise(amount) => {
                if amount <= self.current_bet {
                    return Err(Rejection::RaiseTooSmall {
                        current_bet: self.current_bet,
                    });
                }
                let delta = amount - bet;
                if chips < delta {
                    return Err(Rejection::InsufficientChips {
                        needed: delta,
                        available: chips,
                    });
                }
                self.commit(index, delta);
                self.current_bet = amount;
                // The round now ends back at the seat after the raiser.
                self.anchor = self.next_live_after(index).map(|i| self.players[i].id);
                format!("{} raises to {}", self.players[index].name, amount)
            }
            Action::Discard(_) => {
                return Err(Rejection::WrongPhase {
                    action: action.name(),
                    phase: self.phase,
                })
            }
        };
        self.actions_this_round += 1;
        out.status(message);
        self.advance_from(index, evaluator, out);
        Ok(())
    }

    fn discard<E: HandEvaluator>(
        &mut self,
        index: usize,
        card: usize,
        evaluator: &E,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        if !matches!(self.phase, Phase::Discard(_)) {
            return Err(Rejection::WrongPhase {
                action: "discard",
                phase: self.phase,
            });
        }
        let player = &self.players[index];
        if player.folded {
            return Err(Rejection::AlreadyFolded);
        }
        if player.discarded {
            return Err(Rejection::AlreadyDiscarded);
        }
        if card >= player.hand.len() {
            return Err(Rejection::NoSuchCard { index: card });
        }
        let replacement = match self.deck.draw(1).pop() {
            Some(c) => c,
            None => return Err(Rejection::DeckExhausted),
        };

        let player = &mut self.players[index];
        player.hand[card] = replacement;
        player.discarded = true;
        out.status(format!("{} swaps a card", player.name));
        self.after_discard_change(evaluator, out);
        Ok(())
    }

    /// Re-check a discard phase after someone swapped, folded or left.
    fn after_discard_change<E: HandEvaluator>(&mut self, evaluator: &E, out: &mut Outbox) {
        if self.live_count() <= 1 {
            return self.fold_out(out);
        }
        let done = self.players.iter().all(|p| p.folded || p.discarded);
        match self.phase.successor() {
            Some(next) if done => self.transition(next, evaluator, out),
            _ => out.snapshot(self),
        }
    }

    /// Pass the turn on from the seat at `index`, closing the round or the
    /// whole hand if that is what the move did.
    fn advance_from<E: HandEvaluator>(&mut self, index: usize, evaluator: &E, out: &mut Outbox) {
        if self.live_count() <= 1 {
            return self.fold_out(out);
        }
        match self.next_live_after(index) {
            Some(next) => self.settle_turn(next, evaluator, out),
            None => self.fold_out(out),
        }
    }

    /// `next` is the seat the turn would move to. The round is over if it has
    /// come back around to the anchor with every bet matched; otherwise it is
    /// that seat's turn.
    fn settle_turn<E: HandEvaluator>(&mut self, next: usize, evaluator: &E, out: &mut Outbox) {
        let anchor = self
            .anchor
            .and_then(|a| self.index_of(a))
            .and_then(|i| self.next_live_from(i));
        if self.actions_this_round > 0 && self.bets_matched() && anchor == Some(next) {
            self.close_round(evaluator, out);
        } else {
            self.turn = Some(self.players[next].id);
            out.snapshot(self);
            out.prompt(self);
        }
    }

    fn bets_matched(&self) -> bool {
        self.players
            .iter()
            .filter(|p| !p.folded)
            .all(|p| self.bet_of(p.id) == self.current_bet)
    }

    fn close_round<E: HandEvaluator>(&mut self, evaluator: &E, out: &mut Outbox) {
        self.pot += self.bets.values().sum::<Chips>();
        self.bets.clear();
        self.current_bet = 0;
        self.turn = None;
        self.anchor = None;
        debug!("room {}: {} closed, pot {}", self.id, self.phase, self.pot);
        if let Some(next) = self.phase.successor() {
            self.transition(next, evaluator, out);
        }
    }

    /// Enter `phase`, then keep going for as long as the phase entered moves
    /// on by itself.
    fn transition<E: HandEvaluator>(&mut self, phase: Phase, evaluator: &E, out: &mut Outbox) {
        let mut pending = Some(phase);
        while let Some(phase) = pending.take() {
            debug!("room {}: entering {}", self.id, phase);
            self.phase = phase;
            pending = self.enter(phase, evaluator, out);
        }
    }

    /// Set up `phase`. Returns the phase to move straight on to, if any.
    fn enter<E: HandEvaluator>(
        &mut self,
        phase: Phase,
        evaluator: &E,
        out: &mut Outbox,
    ) -> Option<Phase> {
        match phase {
            Phase::Deal(street) => {
                let cards = self.deck.draw(street.community_cards());
                out.status(format!("the {}: {}", street, labels(&cards)));
                self.community.extend(cards);
                phase.successor()
            }
            Phase::Discard(street) => {
                for p in self.players.iter_mut() {
                    p.discarded = false;
                }
                out.status(format!("discard after the {}: swap one card", street));
                out.snapshot(self);
                None
            }
            Phase::Betting(_) => {
                self.open_round();
                out.snapshot(self);
                out.prompt(self);
                None
            }
            Phase::Showdown => {
                self.showdown(evaluator, out);
                None
            }
            Phase::Waiting | Phase::BlindPost | Phase::HandOver => None,
        }
    }

    /// Start a betting round after the blinds: first live seat after the
    /// dealer opens, and closes it on the way back around.
    fn open_round(&mut self) {
        self.bets.clear();
        self.current_bet = 0;
        self.actions_this_round = 0;
        let dealer = self.dealer.and_then(|d| self.index_of(d)).unwrap_or(0);
        let first = self.next_live_after(dealer).map(|i| self.players[i].id);
        self.turn = first;
        self.anchor = first;
    }

    fn showdown<E: HandEvaluator>(&mut self, evaluator: &E, out: &mut Outbox) {
        let contenders: Vec<usize> = (0..self.players.len())
            .filter(|&i| !self.players[i].folded)
            .collect();
        let hands: Vec<Vec<Card>> = contenders
            .iter()
            .map(|&i| {
                let mut cards = self.players[i].hand.clone();
                cards.extend_from_slice(&self.community);
                cards
            })
            .collect();
        let winners: Vec<usize> = evaluator
            .winners(&hands)
            .into_iter()
            .filter(|&w| w < contenders.len())
            .collect();

        let pot = self.pot + self.bets.values().sum::<Chips>();
        self.bets.clear();
        self.pot = 0;
        let share = if winners.is_empty() {
            0
        } else {
            pot / winners.len() as Chips
        };
        let remainder = pot - share * winners.len() as Chips;
        for &w in &winners {
            self.players[contenders[w]].chips += share;
        }
        self.forfeited += remainder;

        let hands = contenders
            .iter()
            .enumerate()
            .map(|(k, &i)| ShownHand {
                id: self.players[i].id,
                name: self.players[i].name.clone(),
                hand: self.players[i].hand.iter().map(card_label).collect(),
                winner: winners.contains(&k),
            })
            .collect::<Vec<_>>();
        let names = hands
            .iter()
            .filter(|h| h.winner)
            .map(|h| h.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "room {}: showdown, {} split {} ({} each, {} forfeited)",
            self.id, names, pot, share, remainder
        );
        out.broadcast(ShowdownResponse {
            community: self.community.iter().map(card_label).collect(),
            hands,
            pot,
            share,
            forfeited: remainder,
        });
        out.status(format!("{} won {}", names, share));
        self.end_hand(out);
    }

    /// Everyone else folded: the last player standing takes it all.
    fn fold_out(&mut self, out: &mut Outbox) {
        let won = self.pot + self.bets.values().sum::<Chips>();
        self.bets.clear();
        self.pot = 0;
        match self.players.iter_mut().find(|p| !p.folded) {
            Some(winner) => {
                winner.chips += won;
                info!("room {}: {} wins {} uncontested", self.id, winner.name, won);
                out.status(format!("{} wins {}", winner.name, won));
            }
            None => self.forfeited += won,
        }
        self.end_hand(out);
    }

    fn end_hand(&mut self, out: &mut Outbox) {
        self.phase = Phase::HandOver;
        self.turn = None;
        self.anchor = None;
        self.current_bet = 0;
        out.snapshot(self);
        out.finish_hand();
    }

    fn rotate_dealer(&mut self) -> usize {
        let next = match self.dealer.and_then(|d| self.index_of(d)) {
            Some(i) => self.next_live_after(i),
            None => self.next_live_from(0),
        };
        let index = next.unwrap_or(0);
        self.dealer = Some(self.players[index].id);
        index
    }

    fn seat_after(&self, index: usize) -> usize {
        self.next_live_after(index).unwrap_or(index)
    }

    /// Move chips from a player's stack into their bet for this round.
    fn commit(&mut self, index: usize, amount: Chips) {
        let p = &mut self.players[index];
        p.chips -= amount;
        *self.bets.entry(p.id).or_insert(0) += amount;
    }

    /// Fold a seat, forfeiting whatever it has bet this round exactly once.
    fn fold_seat(&mut self, index: usize) {
        let p = &mut self.players[index];
        p.folded = true;
        if let Some(bet) = self.bets.remove(&p.id) {
            self.pot += bet;
        }
    }
}
