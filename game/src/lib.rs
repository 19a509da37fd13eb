//! Rules engine for a server-authoritative draw poker game.
//!
//! Nothing in this crate performs IO. The `server` module takes decoded
//! requests and hands back responses on channels; how they reach a client is
//! up to whoever drives it.
#![warn(rust_2018_idioms)]

pub mod deck;
pub mod engine;
pub mod error;
pub mod eval;
pub mod model;
pub mod outbox;
pub mod protocol;
pub mod room;
pub mod server;
