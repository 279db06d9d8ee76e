//! Connection to the robot's control plane.
//!
//! The bridge is a small WebSocket service running next to the robot. It
//! speaks JSON frames, turns requests into robot actions and answers each one
//! with a reply carrying the same `id`.

pub mod gateway;
pub mod protocol;

pub use gateway::{BridgeError, BridgeGateway};
