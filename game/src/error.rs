use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::model::{Chips, RoomId};
use crate::room::Phase;

/// Why a request was turned down.
///
/// A rejection is only ever reported to the client that caused it, and the
/// operation that produced it leaves the room exactly as it found it.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Rejection {
    #[snafu(display("malformed request: {reason}"))]
    Malformed { reason: String },

    #[snafu(display("it is not your turn"))]
    NotYourTurn,

    #[snafu(display("you have already folded"))]
    AlreadyFolded,

    #[snafu(display("cannot check: {to_call} to call"))]
    CannotCheck { to_call: Chips },

    #[snafu(display("not enough chips: need {needed}, have {available}"))]
    InsufficientChips { needed: Chips, available: Chips },

    #[snafu(display("a raise must exceed the current bet of {current_bet}"))]
    RaiseTooSmall { current_bet: Chips },

    #[snafu(display("room {room_id} is full"))]
    RoomFull { room_id: RoomId },

    #[snafu(display("{action} is not allowed during {phase}"))]
    WrongPhase { action: &'static str, phase: Phase },

    #[snafu(display("you are not seated in room {room_id}"))]
    NotSeated { room_id: RoomId },

    #[snafu(display("already seated in room {room_id}"))]
    SeatedElsewhere { room_id: RoomId },

    #[snafu(display("you have already discarded this round"))]
    AlreadyDiscarded,

    #[snafu(display("no card at position {index}"))]
    NoSuchCard { index: usize },

    #[snafu(display("the deck has run out of cards"))]
    DeckExhausted,
}

/// The broad class of a rejection, reported alongside its message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ProtocolError,
    TurnViolation,
    BettingViolation,
    CapacityError,
    StateInconsistency,
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        use Rejection::*;
        match self {
            Malformed { .. } => ErrorKind::ProtocolError,
            NotYourTurn => ErrorKind::TurnViolation,
            AlreadyFolded
            | CannotCheck { .. }
            | InsufficientChips { .. }
            | RaiseTooSmall { .. } => ErrorKind::BettingViolation,
            RoomFull { .. } => ErrorKind::CapacityError,
            WrongPhase { .. }
            | NotSeated { .. }
            | SeatedElsewhere { .. }
            | AlreadyDiscarded
            | NoSuchCard { .. }
            | DeckExhausted => ErrorKind::StateInconsistency,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Rejection::Malformed {
            reason: reason.into(),
        }
    }
}
