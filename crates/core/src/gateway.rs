//! The robot as seen by the game: a mouth, an ear, a camera and a body.
//!
//! Implementations wrap whatever transport reaches the robot. The orchestrator
//! owns exactly one gateway, injected at construction, and awaits one call at
//! a time.

use crate::error::GameError;
use crate::scan::{ScanDescriptor, ScanMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body postures and gestures the game asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Crouch,
    Stand,
    Wave,
    /// Points at the robot's secret object once the player found it.
    Point,
    Celebrate,
    Defeat,
    ShakeNo,
}

/// Speech, hearing, scanning and posture capabilities of the robot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RobotGateway: Send {
    /// Speaks `text` and returns once the robot has finished saying it.
    ///
    /// Fails with [`GameError::SpeechOutputFailed`] if the robot is unreachable.
    async fn speak(&mut self, text: &str) -> Result<(), GameError>;

    /// Waits up to `timeout` for the next transcribed utterance.
    ///
    /// Returns an empty string when nothing was heard. Fails with
    /// [`GameError::SpeechInputFailed`] on a hard disconnect.
    async fn listen(&mut self, timeout: Duration) -> Result<String, GameError>;

    /// Captures the surroundings in the given mode.
    async fn scan(&mut self, mode: ScanMode) -> Result<ScanDescriptor, GameError>;

    async fn posture(&mut self, posture: Posture) -> Result<(), GameError>;
}
