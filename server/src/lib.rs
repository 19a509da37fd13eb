#![warn(rust_2018_idioms)]

mod server;
pub mod settings;

pub use server::{run, Error, Stats};
