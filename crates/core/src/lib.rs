//! Game logic for a robot-hosted game of I Spy.
//!
//! The crate holds everything that decides what the robot says and when: the
//! turn-taking state machine ([`game`]), speech intent classification
//! ([`intent`]), the object-reasoning client ([`reasoner`]) and scan
//! coordination ([`scan`]). The robot itself is reached through the
//! [`gateway::RobotGateway`] trait, implemented outside this crate.

pub mod error;
pub mod game;
pub mod gateway;
pub mod intent;
pub mod llm_client;
pub mod prompts;
pub mod reasoner;
pub mod scan;
pub mod script;
pub mod session;

pub use error::GameError;
pub use game::{GameOrchestrator, GameSettings};
pub use gateway::{Posture, RobotGateway};
pub use reasoner::{GuessReasoner, LLMGuessReasoner, OfflineGuessReasoner};
pub use scan::{ScanDescriptor, ScanMode};
pub use session::{GameSession, Phase, Role, RoundOutcome, SessionUpdate};
