//! Messages exchanged with clients.
//!
//! Every message travels as a JSON object of the form
//! `{"event": "<name>", "payload": {...}}`.

use std::convert::{From, TryFrom};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Rejection};
use crate::model::{Chips, ClientId, RoomId};
use crate::room::Phase;

/// Every possible kind of request that a client may send.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum Request {
    JoinRoom(JoinRoomRequest),
    PlayerAction(PlayerActionRequest),
}

/// Every possible kind of message that a server may send.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum Response {
    GameState(GameState),
    YourTurn(YourTurnResponse),
    Status(StatusResponse),
    ErrorMessage(ErrorResponse),
    Showdown(ShowdownResponse),
    RoomFull(RoomFullResponse),
}

// Auxillary macro for converting inner request/response types into their
// outermost counterparts.

macro_rules! derive_from {
    ($to:ident, $ty:ident, $r:ident) => {
        impl From<$r> for $to {
            fn from(r: $r) -> Self {
                $to::$ty(r)
            }
        }
    };
}

/// Take a seat in a room, creating the room if nobody is in it yet.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
    pub name: String,
}

derive_from!(Request, JoinRoom, JoinRoomRequest);

#[derive(Debug, Copy, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Raise,
    Discard,
}

/// A move in the current hand.
///
/// `amount` is the total a raise brings the player's bet to this round, and
/// is required for raises. `discard_indices` names the card to swap, by
/// position in the player's hand, and is required for discards.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerActionRequest {
    pub room_id: RoomId,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Chips>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_indices: Option<Vec<usize>>,
}

derive_from!(Request, PlayerAction, PlayerActionRequest);

/// A validated move, as the engine understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Fold,
    Check,
    Call,
    Raise(Chips),
    Discard(usize),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Fold => "fold",
            Action::Check => "check",
            Action::Call => "call",
            Action::Raise(_) => "raise",
            Action::Discard(_) => "discard",
        }
    }
}

impl TryFrom<&PlayerActionRequest> for Action {
    type Error = Rejection;

    fn try_from(req: &PlayerActionRequest) -> Result<Self, Rejection> {
        Ok(match req.action {
            ActionKind::Fold => Action::Fold,
            ActionKind::Check => Action::Check,
            ActionKind::Call => Action::Call,
            ActionKind::Raise => match req.amount {
                Some(amount) => Action::Raise(amount),
                None => return Err(Rejection::malformed("raise requires an amount")),
            },
            ActionKind::Discard => match req.discard_indices.as_deref() {
                Some(&[index]) => Action::Discard(index),
                Some(_) => {
                    return Err(Rejection::malformed(
                        "discard takes exactly one card index",
                    ))
                }
                None => return Err(Rejection::malformed("discard requires discardIndices")),
            },
        })
    }
}

/// A full view of the table, personalised for the recipient.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub room_id: RoomId,
    pub you: ClientId,
    pub phase: Phase,
    pub hand_number: u64,
    pub pot: Chips,
    pub current_bet: Chips,
    pub dealer: Option<ClientId>,
    pub turn: Option<ClientId>,
    pub community: Vec<String>,
    pub players: Vec<SeatView>,
}

derive_from!(Response, GameState, GameState);

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub id: ClientId,
    pub name: String,
    pub chips: Chips,
    pub bet: Chips,
    pub folded: bool,
    pub discarded: bool,
    /// Face-up labels for the viewer's own cards, `null` for everyone else's.
    pub hand: Vec<Option<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YourTurnResponse {
    pub phase: Phase,
    pub current_bet: Chips,
    pub to_call: Chips,
}

derive_from!(Response, YourTurn, YourTurnResponse);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusResponse {
    pub message: String,
}

derive_from!(Response, Status, StatusResponse);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

derive_from!(Response, ErrorMessage, ErrorResponse);

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShowdownResponse {
    pub community: Vec<String>,
    pub hands: Vec<ShownHand>,
    pub pot: Chips,
    /// What each winner collected.
    pub share: Chips,
    /// Odd chips that could not be split evenly.
    pub forfeited: Chips,
}

derive_from!(Response, Showdown, ShowdownResponse);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShownHand {
    pub id: ClientId,
    pub name: String,
    pub hand: Vec<String>,
    pub winner: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomFullResponse {
    pub room_id: RoomId,
}

derive_from!(Response, RoomFull, RoomFullResponse);

impl From<Rejection> for Response {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::RoomFull { room_id } => RoomFullResponse { room_id }.into(),
            other => ErrorResponse {
                kind: other.kind(),
                message: other.to_string(),
            }
            .into(),
        }
    }
}

/// Parse a request from its wire form.
pub fn decode(text: &str) -> Result<Request, Rejection> {
    serde_json::from_str(text).map_err(|e| Rejection::malformed(e.to_string()))
}

/// Render a response to its wire form.
pub fn encode(response: &Response) -> serde_json::Result<String> {
    serde_json::to_string(response)
}
