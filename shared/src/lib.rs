//! Wire types and tuning shared between the arena server and its clients.

pub mod config;
pub mod protocol;
