//! The core business logic of the server: which rooms exist, who sits where,
//! and routing each client's requests to the right table.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::default::Default;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt};
use futures::lock::Mutex;
use log::{debug, error, info};
use serde::Deserialize;
use snafu::{ensure, Snafu};

use crate::error::Rejection;
use crate::eval::{HandEvaluator, RankEvaluator};
use crate::model::{Chips, ClientId, RoomId};
use crate::outbox::{Audience, Outbox};
use crate::protocol::{Action, JoinRoomRequest, PlayerActionRequest, Request, Response};
use crate::room::{Phase, Room};

/// The sender half for responses to a client.
pub type ResponseTx = mpsc::UnboundedSender<Response>;

/// The receiver half for responses to a client.
pub type ResponseRx = mpsc::UnboundedReceiver<Response>;

/// The most players one deck can serve: five cards each, five community
/// cards and a replacement per player in each of the three discard rounds.
pub const MAX_SEATS: u8 = 5;

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub max_players: u8,
    pub starting_chips: Chips,
    pub small_blind: Chips,
    pub big_blind: Chips,
    /// How long the result of a hand stays up before the next deal.
    pub next_hand_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_players: MAX_SEATS,
            starting_chips: 200,
            small_blind: 1,
            big_blind: 2,
            next_hand_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum SettingsError {
    #[snafu(display("a room seats 2 to {} players, not {}", MAX_SEATS, max_players))]
    SeatCount { max_players: u8 },

    #[snafu(display("blinds {small}/{big} must be positive with small <= big"))]
    Blinds { small: Chips, big: Chips },

    #[snafu(display("starting chips {chips} do not cover the big blind {big}"))]
    ShortStack { chips: Chips, big: Chips },
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        ensure!(
            (2..=MAX_SEATS).contains(&self.max_players),
            SeatCountSnafu {
                max_players: self.max_players
            }
        );
        ensure!(
            self.small_blind > 0 && self.small_blind <= self.big_blind,
            BlindsSnafu {
                small: self.small_blind,
                big: self.big_blind
            }
        );
        ensure!(
            self.starting_chips >= self.big_blind,
            ShortStackSnafu {
                chips: self.starting_chips,
                big: self.big_blind
            }
        );
        Ok(())
    }

    pub fn next_hand_delay(&self) -> Duration {
        Duration::from_millis(self.next_hand_delay_ms)
    }
}

/// The room registry, shared by every connection task.
pub struct Core<E = RankEvaluator> {
    settings: Settings,
    evaluator: E,
    next_client_id: AtomicU64,
    rooms: Mutex<Rooms>,
    deferred_tx: mpsc::UnboundedSender<Deferred>,
}

impl<E: HandEvaluator> Core<E> {
    /// Create a new, empty server core.
    ///
    /// The returned receiver yields the deals the core wants made later. Its
    /// consumer should wait out each one's delay and then run it; see
    /// `Deferred`.
    pub fn new(settings: Settings, evaluator: E) -> (Self, mpsc::UnboundedReceiver<Deferred>) {
        let (deferred_tx, deferred_rx) = mpsc::unbounded();
        let core = Core {
            settings,
            evaluator,
            next_client_id: AtomicU64::new(1),
            rooms: Mutex::new(Rooms::new()),
            deferred_tx,
        };
        (core, deferred_rx)
    }

    /// Register a new client with the core.
    ///
    /// The response channel should have a consumer that somehow delivers the
    /// responses to the client. In the actual server, this would involve
    /// serializing and writing the response to a WebSocket; in a test, the
    /// client would have the receiving channel.
    ///
    /// The returned context provides the client-handling task the means to
    /// execute incoming requests.
    pub async fn register(&self, response_tx: ResponseTx) -> Context<'_, E> {
        let client_id = ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst));
        debug!("registered client {}", client_id);
        Context::new(self, client_id, response_tx)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Look at a room's current state.
    pub async fn inspect<R>(&self, room_id: &RoomId, f: impl FnOnce(&Room) -> R) -> Option<R> {
        let table = self.rooms.lock().await.lookup(room_id)?;
        let table = table.lock().await;
        Some(f(&table.room))
    }

    // Deliver what an operation produced, and line up the next deal if it
    // finished a hand.
    fn dispatch(&self, synced: &Synced<Table>, table: &mut Table, out: Outbox) {
        let finished = out.hand_finished();
        table.deliver(out);
        if finished {
            self.schedule_next_hand(synced, table);
        }
    }

    fn schedule_next_hand(&self, synced: &Synced<Table>, table: &mut Table) {
        let (handle, registration) = AbortHandle::new_pair();
        if let Some(previous) = table.pending_deal.replace(handle) {
            previous.abort();
        }
        let weak = Arc::downgrade(synced);
        let task = async move {
            if let Some(synced) = weak.upgrade() {
                let mut table = synced.lock().await;
                table.pending_deal = None;
                let mut out = Outbox::new();
                table.room.start_hand(&mut out);
                table.deliver(out);
            }
        }
        .boxed();
        let deferred = Deferred {
            room_id: table.room.id().clone(),
            delay: self.settings.next_hand_delay(),
            task: Abortable::new(task, registration),
        };
        if let Err(e) = self.deferred_tx.unbounded_send(deferred) {
            error!("while scheduling next hand: {}", e);
        }
    }
}

/// A deal to be made once `delay` has passed.
///
/// The core aborts the deal if its room closes, or if another one is
/// scheduled for the same room, before it runs.
pub struct Deferred {
    pub room_id: RoomId,
    pub delay: Duration,
    task: Abortable<BoxFuture<'static, ()>>,
}

impl Deferred {
    /// Make the deal now, unless it has been called off.
    pub async fn run(self) {
        if self.task.await.is_err() {
            debug!("deal for room {} was called off", self.room_id);
        }
    }
}

/// The handle by which client tasks may send requests to the core.
pub struct Context<'core, E = RankEvaluator> {
    core: &'core Core<E>,
    client_id: ClientId,
    response_tx: ResponseTx,
    seat: Option<Seat>,
}

// Where a client is playing.
struct Seat {
    room_id: RoomId,
    table: Synced<Table>,
}

impl<'core, E: HandEvaluator> Context<'core, E> {
    fn new(core: &'core Core<E>, client_id: ClientId, response_tx: ResponseTx) -> Self {
        Context {
            core,
            client_id,
            response_tx,
            seat: None,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// The room this client is seated in, if any.
    pub fn room_id(&self) -> Option<&RoomId> {
        self.seat.as_ref().map(|s| &s.room_id)
    }

    /// Send a request to the core.
    ///
    /// This does not return a value: whatever comes of the request, including
    /// its rejection, is sent to the channel provided to `Core::register`, or
    /// to everyone at the table.
    pub async fn execute(&mut self, req: Request) {
        if let Err(rejection) = self.handle(req).await {
            debug!("rejected request from {}: {}", self.client_id, rejection);
            self.reject(rejection);
        }
    }

    /// Tell this client, and only this client, that something it sent was no
    /// good.
    pub fn reject(&self, rejection: Rejection) {
        self.reply(rejection.into());
    }

    /// Cleanup data for this client from the core, e.g. due to disconnection.
    ///
    /// This would be better done as a Drop destructor, but, unfortunately,
    /// those don't support async yet.
    pub async fn cleanup(&mut self) {
        let seat = match self.seat.take() {
            Some(seat) => seat,
            None => return,
        };
        let mut rooms = self.core.rooms.lock().await;
        let mut table = seat.table.lock().await;
        table.members.remove(&self.client_id);
        let mut out = Outbox::new();
        table
            .room
            .remove_player(self.client_id, &self.core.evaluator, &mut out);
        if table.room.is_empty() {
            table.cancel_deal();
            rooms.remove(&seat.room_id);
            info!("room {} closed", seat.room_id);
        } else {
            self.core.dispatch(&seat.table, &mut table, out);
        }
    }

    // Top-level request-handling function.
    async fn handle(&mut self, req: Request) -> Result<(), Rejection> {
        match req {
            Request::JoinRoom(join) => self.join(join).await,
            Request::PlayerAction(action) => self.play(action).await,
        }
    }

    async fn join(&mut self, req: JoinRoomRequest) -> Result<(), Rejection> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Rejection::malformed("name must not be empty"));
        }
        if req.room_id.0.trim().is_empty() {
            return Err(Rejection::malformed("roomId must not be empty"));
        }
        if let Some(seat) = &self.seat {
            if seat.room_id == req.room_id {
                debug!("{} is already seated in {}", self.client_id, seat.room_id);
                return Ok(());
            }
            return Err(Rejection::SeatedElsewhere {
                room_id: seat.room_id.clone(),
            });
        }

        let mut rooms = self.core.rooms.lock().await;
        let synced = rooms.get_or_create(&req.room_id, self.core.settings);
        let mut table = synced.lock().await;
        table.room.seat(self.client_id, name)?;
        table.members.insert(
            self.client_id,
            Member {
                response_tx: self.response_tx.clone(),
            },
        );
        info!("{} joined room {} as {}", self.client_id, req.room_id, name);

        let mut out = Outbox::new();
        out.status(format!("{} joined", name));
        if table.room.phase() == Phase::Waiting && table.room.can_start() {
            table.room.start_hand(&mut out);
        } else {
            out.snapshot(&table.room);
        }
        self.core.dispatch(&synced, &mut table, out);
        drop(table);
        drop(rooms);

        self.seat = Some(Seat {
            room_id: req.room_id,
            table: synced,
        });
        Ok(())
    }

    async fn play(&mut self, req: PlayerActionRequest) -> Result<(), Rejection> {
        let seat = match &self.seat {
            Some(seat) if seat.room_id == req.room_id => seat,
            _ => {
                return Err(Rejection::NotSeated {
                    room_id: req.room_id,
                })
            }
        };
        let action = Action::try_from(&req)?;
        let mut table = seat.table.lock().await;
        let mut out = Outbox::new();
        table
            .room
            .act(self.client_id, action, &self.core.evaluator, &mut out)?;
        self.core.dispatch(&seat.table, &mut table, out);
        Ok(())
    }

    fn reply(&self, r: Response) {
        if let Err(e) = self.response_tx.unbounded_send(r) {
            debug!("while sending response to {}: {}", self.client_id, e);
        }
    }
}

// The set of rooms available on the server.
struct Rooms {
    rooms: BTreeMap<RoomId, Synced<Table>>,
}

impl Rooms {
    fn new() -> Self {
        Rooms {
            rooms: BTreeMap::new(),
        }
    }

    fn get_or_create(&mut self, room_id: &RoomId, settings: Settings) -> Synced<Table> {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                info!("opening room {}", room_id);
                make_synced(Table::new(Room::new(room_id.clone(), settings)))
            })
            .clone()
    }

    fn lookup(&self, room_id: &RoomId) -> Option<Synced<Table>> {
        self.rooms.get(room_id).cloned()
    }

    fn remove(&mut self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }

    fn len(&self) -> usize {
        self.rooms.len()
    }
}

// A room together with the connections of the players seated in it.
struct Table {
    room: Room,
    members: BTreeMap<ClientId, Member>,
    pending_deal: Option<AbortHandle>,
}

impl Table {
    fn new(room: Room) -> Self {
        Table {
            room,
            members: BTreeMap::new(),
            pending_deal: None,
        }
    }

    fn deliver(&self, out: Outbox) {
        for notice in out.into_notices() {
            match notice.audience {
                Audience::Everyone => {
                    for m in self.members.values() {
                        m.send(notice.response.clone());
                    }
                }
                Audience::Only(id) => {
                    if let Some(m) = self.members.get(&id) {
                        m.send(notice.response);
                    }
                }
            }
        }
    }

    fn cancel_deal(&mut self) {
        if let Some(handle) = self.pending_deal.take() {
            handle.abort();
        }
    }
}

struct Member {
    response_tx: ResponseTx,
}

impl Member {
    fn send(&self, r: Response) {
        if let Err(e) = self.response_tx.unbounded_send(r) {
            debug!("while sending response: {}", e);
        }
    }
}

type Synced<T> = Arc<Mutex<T>>;

fn make_synced<T>(t: T) -> Arc<Mutex<T>> {
    Arc::new(Mutex::new(t))
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::StreamExt;

    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::ActionKind;

    fn core() -> (Core, mpsc::UnboundedReceiver<Deferred>) {
        Core::new(Settings::default(), RankEvaluator)
    }

    fn drain(rx: &mut ResponseRx) -> Vec<Response> {
        let mut responses = vec![];
        while let Ok(Some(r)) = rx.try_next() {
            responses.push(r);
        }
        responses
    }

    fn join(room: &str, name: &str) -> Request {
        JoinRoomRequest {
            room_id: room.into(),
            name: name.into(),
        }
        .into()
    }

    fn action(room: &str, action: ActionKind, amount: Option<Chips>) -> Request {
        PlayerActionRequest {
            room_id: room.into(),
            action,
            amount,
            discard_indices: None,
        }
        .into()
    }

    fn errors(responses: &[Response]) -> Vec<ErrorKind> {
        responses
            .iter()
            .filter_map(|r| match r {
                Response::ErrorMessage(e) => Some(e.kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn second_join_deals_a_hand() {
        let (core, _deferred) = core();
        let (a_tx, mut a_rx) = mpsc::unbounded();
        let (b_tx, mut b_rx) = mpsc::unbounded();
        block_on(async {
            let mut a = core.register(a_tx).await;
            let mut b = core.register(b_tx).await;
            a.execute(join("t1", "ann")).await;
            assert_eq!(
                core.inspect(&"t1".into(), |r| r.phase()).await,
                Some(Phase::Waiting)
            );
            b.execute(join("t1", "bob")).await;
            let (phase, pot, bet, turn) = core
                .inspect(&"t1".into(), |r| (r.phase(), r.pot(), r.current_bet(), r.turn()))
                .await
                .expect("room exists");
            assert!(matches!(phase, Phase::Betting(_)));
            assert_eq!((pot, bet), (3, 2));
            assert_eq!(turn, Some(b.client_id()));
        });
        let b_responses = drain(&mut b_rx);
        assert!(b_responses
            .iter()
            .any(|r| matches!(r, Response::YourTurn(_))));
        let a_responses = drain(&mut a_rx);
        assert!(a_responses
            .iter()
            .any(|r| matches!(r, Response::GameState(_))));
        assert!(!a_responses
            .iter()
            .any(|r| matches!(r, Response::YourTurn(_))));
    }

    #[test]
    fn rejoining_is_a_no_op() {
        let (core, _deferred) = core();
        let (tx, mut rx) = mpsc::unbounded();
        block_on(async {
            let mut a = core.register(tx).await;
            a.execute(join("t1", "ann")).await;
            drain(&mut rx);
            a.execute(join("t1", "ann")).await;
            assert!(drain(&mut rx).is_empty());
            assert_eq!(
                core.inspect(&"t1".into(), |r| r.players().len()).await,
                Some(1)
            );
            a.execute(join("t2", "ann")).await;
            assert_eq!(errors(&drain(&mut rx)), vec![ErrorKind::StateInconsistency]);
            assert_eq!(core.room_count().await, 1);
        });
    }

    #[test]
    fn sixth_player_is_turned_away() {
        let (core, _deferred) = core();
        block_on(async {
            let mut channels = vec![];
            let mut contexts = vec![];
            for i in 0..6 {
                let (tx, rx) = mpsc::unbounded();
                let mut ctx = core.register(tx).await;
                ctx.execute(join("t1", &format!("p{}", i))).await;
                channels.push(rx);
                contexts.push(ctx);
            }
            let last = drain(&mut channels[5]);
            assert_eq!(
                last,
                vec![Response::RoomFull(crate::protocol::RoomFullResponse {
                    room_id: "t1".into()
                })]
            );
            assert_eq!(contexts[5].room_id(), None);
            assert_eq!(
                core.inspect(&"t1".into(), |r| r.players().len()).await,
                Some(5)
            );
        });
    }

    #[test]
    fn rejections_reach_only_the_offender() {
        let (core, _deferred) = core();
        let (a_tx, mut a_rx) = mpsc::unbounded();
        let (b_tx, mut b_rx) = mpsc::unbounded();
        block_on(async {
            let mut a = core.register(a_tx).await;
            let mut b = core.register(b_tx).await;
            a.execute(join("t1", "ann")).await;
            b.execute(join("t1", "bob")).await;
            drain(&mut a_rx);
            drain(&mut b_rx);

            // It is bob's turn, not ann's.
            a.execute(action("t1", ActionKind::Call, None)).await;
            assert_eq!(errors(&drain(&mut a_rx)), vec![ErrorKind::TurnViolation]);
            assert!(drain(&mut b_rx).is_empty());

            b.execute(action("t1", ActionKind::Raise, None)).await;
            assert_eq!(errors(&drain(&mut b_rx)), vec![ErrorKind::ProtocolError]);

            b.execute(action("t2", ActionKind::Call, None)).await;
            assert_eq!(errors(&drain(&mut b_rx)), vec![ErrorKind::StateInconsistency]);

            b.execute(action("t1", ActionKind::Raise, Some(1000))).await;
            assert_eq!(errors(&drain(&mut b_rx)), vec![ErrorKind::BettingViolation]);
            assert!(drain(&mut a_rx).is_empty());
        });
    }

    #[test]
    fn finished_hand_schedules_the_next_deal() {
        let (core, mut deferred) = core();
        let (a_tx, _a_rx) = mpsc::unbounded();
        let (b_tx, _b_rx) = mpsc::unbounded();
        block_on(async {
            let mut a = core.register(a_tx).await;
            let mut b = core.register(b_tx).await;
            a.execute(join("t1", "ann")).await;
            b.execute(join("t1", "bob")).await;
            b.execute(action("t1", ActionKind::Fold, None)).await;
            assert_eq!(
                core.inspect(&"t1".into(), |r| r.phase()).await,
                Some(Phase::HandOver)
            );
            let deal = deferred.next().await.expect("a deal to be scheduled");
            assert_eq!(deal.room_id, "t1".into());
            assert_eq!(deal.delay, Settings::default().next_hand_delay());
            deal.run().await;
            let (phase, hands) = core
                .inspect(&"t1".into(), |r| (r.phase(), r.hands_played()))
                .await
                .expect("room exists");
            assert!(matches!(phase, Phase::Betting(_)));
            assert_eq!(hands, 2);
        });
    }

    #[test]
    fn disconnect_mid_hand_awards_the_pot() {
        let (core, mut deferred) = core();
        let (a_tx, mut a_rx) = mpsc::unbounded();
        let (b_tx, _b_rx) = mpsc::unbounded();
        block_on(async {
            let mut a = core.register(a_tx).await;
            let mut b = core.register(b_tx).await;
            a.execute(join("t1", "ann")).await;
            b.execute(join("t1", "bob")).await;
            drain(&mut a_rx);
            b.cleanup().await;
            let (phase, chips) = core
                .inspect(&"t1".into(), |r| (r.phase(), r.players()[0].chips))
                .await
                .expect("room exists");
            assert_eq!(phase, Phase::HandOver);
            assert_eq!(chips, 201);
            assert!(drain(&mut a_rx)
                .iter()
                .any(|r| matches!(r, Response::Status(_))));

            // The last one out closes the room and calls off the next deal.
            a.cleanup().await;
            assert_eq!(core.room_count().await, 0);
            let deal = deferred.next().await.expect("a deal to be scheduled");
            deal.run().await;
            assert_eq!(core.room_count().await, 0);
        });
    }

    #[test]
    fn settings_are_validated() {
        assert_eq!(Settings::default().validate(), Ok(()));
        let too_many = Settings {
            max_players: 6,
            ..Settings::default()
        };
        assert!(too_many.validate().is_err());
        let inverted = Settings {
            small_blind: 5,
            ..Settings::default()
        };
        assert!(inverted.validate().is_err());
        let short = Settings {
            starting_chips: 1,
            ..Settings::default()
        };
        assert!(short.validate().is_err());
    }
}
