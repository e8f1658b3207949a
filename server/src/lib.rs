//! Pong room server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod error;
pub mod game_loop;
pub mod http;
pub mod physics;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod session;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;
