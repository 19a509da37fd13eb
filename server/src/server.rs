use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::sync::{mpsc as tokio_mpsc, watch};
use warp::filters::ws::{Message, WebSocket};
use warp::Filter;

use drawholdem_game::error::Rejection;
use drawholdem_game::eval::RankEvaluator;
use drawholdem_game::protocol::{self, Response};
use drawholdem_game::server::{Context, Core, Deferred, SettingsError};

use crate::settings;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid game settings: {source}"))]
    GameSettings { source: SettingsError },

    #[snafu(display("could not resolve {addr}: {source}"))]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    #[snafu(display("{addr} did not resolve to any address"))]
    NoAddress { addr: String },

    #[snafu(display("could not bind {addr}: {source}"))]
    Bind {
        addr: SocketAddr,
        source: warp::Error,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stats {
    pub total_accepted_connections: usize,
}

/// Execute the entire life-cycle of the drawholdem server.
///
/// The server stops accepting connections, and every client task winds down,
/// once `shutdown_rx` sees `true` or its sender goes away.
pub async fn run(
    server: settings::Server,
    game: drawholdem_game::server::Settings,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<Stats, Error> {
    game.validate().context(GameSettingsSnafu)?;
    let bind_addr = resolve(&server.bind_addr)?;

    let (core, deferred_rx) = Core::new(game, RankEvaluator);
    let core = Arc::new(core);

    // Every task holds a clone of the sender; the channel closes once they
    // have all terminated.
    let (terminated_tx, mut terminated_rx) = tokio_mpsc::channel::<()>(1);

    // Keep track of some basic statistics.
    let total_accepted_connections = Arc::new(AtomicUsize::new(0));

    tokio::spawn(make_deals(
        deferred_rx,
        shutdown_rx.clone(),
        terminated_tx.clone(),
    ));

    let handle = ClientHandle {
        core,
        shutdown_rx: shutdown_rx.clone(),
        terminated_tx,
    };
    let accepted = total_accepted_connections.clone();
    let websocket_server = warp::path("server")
        .and(warp::ws())
        .and(warp::addr::remote())
        .map(move |ws: warp::ws::Ws, addr: Option<SocketAddr>| {
            let handle = handle.clone();
            let accepted = accepted.clone();
            ws.on_upgrade(move |stream| async move {
                if let Some(addr) = addr {
                    accepted.fetch_add(1, Ordering::Release);
                    info!("accepted connection from {}", addr);
                    handle_client(handle, stream, addr).await;
                } else {
                    error!("no address for incoming connection")
                }
            })
        });

    let mut server_shutdown = shutdown_rx;
    let (addr, server) = warp::serve(websocket_server)
        .try_bind_with_graceful_shutdown(bind_addr, async move {
            shutdown_notice(&mut server_shutdown).await;
            info!("received shutdown notice");
        })
        .context(BindSnafu { addr: bind_addr })?;
    info!("running on {}", addr);

    // Wait for the server to stop; this drops the routes and their handle.
    server.await;
    info!("web server stopped");

    info!("waiting for client tasks to terminate");
    terminated_rx.recv().await;

    Ok(Stats {
        total_accepted_connections: total_accepted_connections.load(Ordering::Acquire),
    })
}

fn resolve(addr: &str) -> Result<SocketAddr, Error> {
    addr.to_socket_addrs()
        .context(ResolveSnafu { addr })?
        .next()
        .context(NoAddressSnafu { addr })
}

// Resolves once shutdown has been requested.
async fn shutdown_notice(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
}

// Wait out each scheduled deal, then make it.
async fn make_deals(
    mut deferred_rx: mpsc::UnboundedReceiver<Deferred>,
    mut shutdown_rx: watch::Receiver<bool>,
    terminated_tx: tokio_mpsc::Sender<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_notice(&mut shutdown_rx) => break,
            deferred = deferred_rx.next() => match deferred {
                Some(deal) => {
                    debug!("next hand in room {} in {:?}", deal.room_id, deal.delay);
                    tokio::spawn(async move {
                        tokio::time::sleep(deal.delay).await;
                        deal.run().await;
                    });
                }
                None => break,
            }
        }
    }
    drop(terminated_tx);
}

async fn handle_client(handle: ClientHandle, mut stream: WebSocket, addr: SocketAddr) {
    let ClientHandle {
        core,
        mut shutdown_rx,
        terminated_tx,
    } = handle;
    let (response_tx, mut response_rx) = mpsc::unbounded();
    let mut context = core.register(response_tx).await;
    info!("{} is client {}", addr, context.client_id());

    let mut hard_stop = false;
    debug!("starting connection processing loop for {}", addr);
    loop {
        tokio::select! {
            // Server shutting down
            _ = shutdown_notice(&mut shutdown_rx) => {
                debug!("received notification to stop handling {}", addr);
                hard_stop = true;
                break;
            },
            // Write out response to socket
            Some(resp) = response_rx.next() =>
                send_response(&resp, &mut stream, &addr).await,
            // Receive request from socket
            msg = stream.next() =>
                if handle_message(msg, &mut context, &addr).await {
                    break;
                }
        }
    }

    if !hard_stop {
        debug!("cleaning up {}", addr);
        context.cleanup().await;
    }
    info!("finished handling {}", addr);
    // notify main task that we're done.
    drop(terminated_tx);
}

async fn send_response(resp: &Response, stream: &mut WebSocket, addr: &SocketAddr) {
    match protocol::encode(resp) {
        Ok(text) => {
            if let Err(e) = stream.send(Message::text(text)).await {
                error!("while sending response to {}: {}", addr, e);
            }
        }
        Err(e) => error!("while serializing response to {}: {}", addr, e),
    }
}

// Returns whether the connection is finished.
async fn handle_message(
    msg: Option<Result<Message, warp::Error>>,
    context: &mut Context<'_>,
    addr: &SocketAddr,
) -> bool {
    let msg = match msg {
        Some(Ok(msg)) => msg,
        Some(Err(e)) => {
            error!("reading frame from {}: {}", addr, e);
            return true;
        }
        None => return true,
    };
    if msg.is_close() {
        return true;
    }
    if msg.is_ping() || msg.is_pong() {
        return false;
    }
    // Text and binary frames both carry JSON.
    match std::str::from_utf8(msg.as_bytes()) {
        Ok(text) => match protocol::decode(text) {
            Ok(req) => context.execute(req).await,
            Err(rejection) => {
                debug!("malformed request from {}: {}", addr, rejection);
                context.reject(rejection);
            }
        },
        Err(_) => context.reject(Rejection::malformed("frames must be UTF-8 JSON")),
    }
    false
}

/// A handle to the core and shutdown notifications for new clients.
#[derive(Clone)]
struct ClientHandle {
    core: Arc<Core>,
    shutdown_rx: watch::Receiver<bool>,
    terminated_tx: tokio_mpsc::Sender<()>,
}
