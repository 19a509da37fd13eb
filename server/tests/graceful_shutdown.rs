use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use drawholdem_game::server;
use drawholdem_server::{run, settings};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const BIND_ADDR: &str = "127.0.0.1:8081";
const SERVER_URL: &str = "ws://127.0.0.1:8081/server";

async fn connect() -> Client {
    let (stream, _) = tokio_tungstenite::connect_async(SERVER_URL)
        .await
        .expect("server to be up");
    stream
}

async fn send(client: &mut Client, request: Value) {
    client
        .send(Message::text(request.to_string()))
        .await
        .expect("server to accept frames");
}

// Skip ahead to the next message of the given kind and return its payload.
async fn expect_event(client: &mut Client, event: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("server to respond in time")
            .expect("connection to stay open")
            .expect("frame to be readable");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).expect("JSON response");
            if value["event"] == event {
                return value["payload"].clone();
            }
        }
    }
}

async fn expect_phase(client: &mut Client, phase: &str) -> Value {
    loop {
        let state = expect_event(client, "gameState").await;
        if state["phase"] == phase {
            return state;
        }
    }
}

fn join(room_id: &str, name: &str) -> Value {
    json!({"event": "joinRoom", "payload": {"roomId": room_id, "name": name}})
}

fn action(room_id: &str, action: &str) -> Value {
    json!({"event": "playerAction", "payload": {"roomId": room_id, "action": action}})
}

// Ensure that:
//
// - a server can be started.
// - clients can join a room and get a hand dealt to them.
// - bad frames and out-of-turn moves are reported to the sender.
// - a full room turns newcomers away.
// - the next hand is dealt on its own once one ends.
// - the server shuts down gracefully.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graceful_shutdown() {
    flexi_logger::Logger::try_with_env_or_str("info")
        .expect("valid log spec")
        .format(flexi_logger::with_thread)
        .start()
        .expect("logger to start");
    // Spawn server.
    let settings = settings::Server {
        bind_addr: BIND_ADDR.into(),
    };
    let game = server::Settings {
        max_players: 2,
        next_hand_delay_ms: 50,
        ..server::Settings::default()
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(async move { run(settings, game, shutdown_rx).await.ok() });

    // Hack: wait a bit for the server to be ready.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut alice = connect().await;
    send(&mut alice, join("t1", "alice")).await;
    let state = expect_phase(&mut alice, "waiting").await;
    assert_eq!(state["players"][0]["chips"], 200);

    let mut bob = connect().await;
    send(&mut bob, join("t1", "bob")).await;
    let state = expect_phase(&mut alice, "betting(pre-flop)").await;
    assert_eq!(state["pot"], 3);
    assert_eq!(state["currentBet"], 2);
    let prompt = expect_event(&mut bob, "yourTurn").await;
    assert_eq!(prompt["toCall"], 1);

    send(&mut alice, json!("not a request")).await;
    let error = expect_event(&mut alice, "errorMessage").await;
    assert_eq!(error["kind"], "protocolError");

    send(&mut alice, action("t1", "call")).await;
    let error = expect_event(&mut alice, "errorMessage").await;
    assert_eq!(error["kind"], "turnViolation");

    let mut carol = connect().await;
    send(&mut carol, join("t1", "carol")).await;
    let full = expect_event(&mut carol, "roomFull").await;
    assert_eq!(full["roomId"], "t1");

    // Binary frames carry the same JSON.
    bob.send(Message::binary(action("t1", "fold").to_string().into_bytes()))
        .await
        .expect("server to accept frames");
    let state = expect_phase(&mut alice, "hand-over").await;
    assert_eq!(state["players"][0]["chips"], 201);
    let state = expect_phase(&mut alice, "betting(pre-flop)").await;
    assert_eq!(state["handNumber"], 2);

    // Tell server to shutdown.
    shutdown_tx.send(true).expect("server still running");
    let stats = server
        .await
        .expect("server shutdown smoothly")
        .expect("server shutdown smoothly");

    // Ensure the server agrees with us.
    assert_eq!(stats.total_accepted_connections, 3);
    drop((alice, bob, carol));
}
