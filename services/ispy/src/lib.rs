//! I Spy Service Library Crate
//!
//! Everything needed to put the game from `ispy-core` in front of a player:
//! configuration, prompt loading and the two robot gateways (a terminal
//! console and the WebSocket bridge to the real robot). The `ispy` binary is a
//! thin wrapper around this library.

pub mod bridge;
pub mod config;
pub mod console;
pub mod prompts;
