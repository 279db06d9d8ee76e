//! Failure taxonomy shared by the orchestrator and its collaborators.

/// Errors surfaced by the robot gateway, the scan coordinator and the
/// reasoner client.
///
/// None of these escape the state machine during normal play: each one is
/// handled in the phase where it occurs (see [`crate::game::GameOrchestrator`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Speech output failed: {0}")]
    SpeechOutputFailed(String),
    #[error("Speech input failed: {0}")]
    SpeechInputFailed(String),
    #[error("Posture change failed: {0}")]
    PostureFailed(String),
    #[error("Scan failed: {0}")]
    ScanFailed(String),
    #[error("Reasoning service unavailable: {0}")]
    ReasoningUnavailable(String),
}

impl GameError {
    /// True for failures of the robot's speech/motion channel, which are
    /// retried per phase before the session is ended.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            GameError::SpeechOutputFailed(_)
                | GameError::SpeechInputFailed(_)
                | GameError::PostureFailed(_)
        )
    }
}
