use crate::model::ClientId;
use crate::protocol::{Response, StatusResponse, YourTurnResponse};
use crate::room::Room;

/// Who a notice is meant for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    Only(ClientId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub audience: Audience,
    pub response: Response,
}

/// Everything an operation on a room wants to tell its members.
///
/// Notices are rendered at the moment they are queued, while the room is
/// still held by the operation, so a batch always describes one consistent
/// state no matter when it is delivered.
#[derive(Debug, Default)]
pub struct Outbox {
    notices: Vec<Notice>,
    hand_finished: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Outbox::default()
    }

    pub fn broadcast(&mut self, response: impl Into<Response>) {
        self.notices.push(Notice {
            audience: Audience::Everyone,
            response: response.into(),
        });
    }

    pub fn send(&mut self, to: ClientId, response: impl Into<Response>) {
        self.notices.push(Notice {
            audience: Audience::Only(to),
            response: response.into(),
        });
    }

    pub fn status(&mut self, message: impl Into<String>) {
        self.broadcast(StatusResponse {
            message: message.into(),
        });
    }

    /// Queue a personalised game state for every seated player.
    pub fn snapshot(&mut self, room: &Room) {
        for p in room.players() {
            self.send(p.id, room.snapshot(p.id));
        }
    }

    /// Prompt whoever holds the turn.
    pub fn prompt(&mut self, room: &Room) {
        if let Some(id) = room.turn() {
            let to_call = room.current_bet().saturating_sub(room.bet_of(id));
            self.send(
                id,
                YourTurnResponse {
                    phase: room.phase(),
                    current_bet: room.current_bet(),
                    to_call,
                },
            );
        }
    }

    /// Mark that a hand just ended, so the next one should be scheduled.
    pub fn finish_hand(&mut self) {
        self.hand_finished = true;
    }

    pub fn hand_finished(&self) -> bool {
        self.hand_finished
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn into_notices(self) -> Vec<Notice> {
        self.notices
    }
}
