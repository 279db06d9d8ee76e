//! In-memory state of one played session.
//!
//! A [`GameSession`] lives from process start to the final goodbye. Round
//! fields are reset every time the play-again loop starts a new round. Only
//! the turn-taking state machine mutates it; everything else receives copies
//! of what it needs.

use crate::intent::Intent;
use crate::scan::{ScanDescriptor, ScanMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// States of the turn-taking state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Startup,
    Greeting,
    AskPlay,
    ChooseMode,
    ModeSelected,
    Gameplay,
    RoundResolved,
    PlayAgain,
    End,
}

/// Which party is guessing in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The robot holds the secret; the human guesses.
    HumanGuesses,
    /// The human holds the secret; the robot guesses.
    RobotGuesses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundOutcome {
    Pending,
    CorrectGuess,
    GaveUp,
    Unresolved,
}

impl RoundOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoundOutcome::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    Human,
    Robot,
}

/// One contribution to the round's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintEntry {
    pub speaker: Speaker,
    pub intent: Intent,
}

/// The object the robot picked for a human-guesses round.
///
/// `Debug` never prints the name so the secret cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretObject(String);

impl SecretObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The object's name. Only called when the robot itself reasons about
    /// the secret or when the round is resolved.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretObject(<hidden>)")
    }
}

/// A point-in-time view of the session, published after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub session_id: Uuid,
    pub phase: Phase,
    pub active_role: Option<Role>,
    pub hint_count: usize,
    pub round_outcome: RoundOutcome,
    pub rounds_played: u32,
}

/// State of one game session.
#[derive(Debug, Clone)]
pub struct GameSession {
    session_id: Uuid,
    player_name: Option<String>,
    phase: Phase,
    active_role: Option<Role>,
    hint_history: Vec<HintEntry>,
    secret_object: Option<SecretObject>,
    scan_mode: ScanMode,
    round_outcome: RoundOutcome,
    /// Advisory scan result gathered during this round, if any.
    scan_context: Option<ScanDescriptor>,
    /// Candidates the robot has already proposed this round.
    previous_guesses: Vec<String>,
    /// Completed turns in the current round.
    turns: u32,
    rounds_played: u32,
    /// Set when the session ends because the robot stopped responding.
    failure: Option<String>,
}

impl GameSession {
    pub fn new(scan_mode: ScanMode) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            player_name: None,
            phase: Phase::Startup,
            active_role: None,
            hint_history: Vec::new(),
            secret_object: None,
            scan_mode,
            round_outcome: RoundOutcome::Pending,
            scan_context: None,
            previous_guesses: Vec::new(),
            turns: 0,
            rounds_played: 0,
            failure: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    /// Name used in spoken lines; "friend" until a name has been captured.
    pub fn display_name(&self) -> &str {
        self.player_name.as_deref().unwrap_or("friend")
    }

    /// Stores the player's name. Returns `false` if a name was already set.
    pub fn set_player_name(&mut self, name: impl Into<String>) -> bool {
        if self.player_name.is_some() {
            return false;
        }
        self.player_name = Some(name.into());
        true
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves to `phase`. The hint history of a finished round is dropped on
    /// entering `PlayAgain` or `End`.
    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if matches!(phase, Phase::PlayAgain | Phase::End) {
            self.hint_history.clear();
        }
        self.phase = phase;
    }

    pub fn active_role(&self) -> Option<Role> {
        self.active_role
    }

    pub fn hint_history(&self) -> &[HintEntry] {
        &self.hint_history
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.scan_mode
    }

    pub fn round_outcome(&self) -> RoundOutcome {
        self.round_outcome
    }

    pub fn scan_context(&self) -> Option<&ScanDescriptor> {
        self.scan_context.as_ref()
    }

    pub fn previous_guesses(&self) -> &[String] {
        &self.previous_guesses
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn rounds_played(&self) -> u32 {
        self.rounds_played
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn has_secret(&self) -> bool {
        self.secret_object.is_some()
    }

    pub(crate) fn secret_object(&self) -> Option<&SecretObject> {
        self.secret_object.as_ref()
    }

    /// Resets every round field and fixes the role for the new round.
    pub(crate) fn start_round(&mut self, role: Role) {
        self.active_role = Some(role);
        self.hint_history.clear();
        self.secret_object = None;
        self.round_outcome = RoundOutcome::Pending;
        self.scan_context = None;
        self.previous_guesses.clear();
        self.turns = 0;
    }

    /// Clears the role so the next `ChooseMode` can pick a new one.
    pub(crate) fn end_round(&mut self) {
        self.active_role = None;
        self.hint_history.clear();
        self.secret_object = None;
        self.scan_context = None;
        self.previous_guesses.clear();
        self.turns = 0;
    }

    pub(crate) fn set_secret(&mut self, secret: SecretObject) {
        self.secret_object = Some(secret);
    }

    pub(crate) fn set_scan_context(&mut self, scan: Option<ScanDescriptor>) {
        self.scan_context = scan;
    }

    /// Appends to the history. Ignored outside of `Gameplay`.
    pub(crate) fn record(&mut self, speaker: Speaker, intent: Intent) -> bool {
        if self.phase != Phase::Gameplay {
            tracing::warn!(phase = ?self.phase, "Dropping history entry outside of gameplay");
            return false;
        }
        self.hint_history.push(HintEntry { speaker, intent });
        true
    }

    pub(crate) fn push_guess(&mut self, candidate: String) {
        self.previous_guesses.push(candidate);
    }

    pub(crate) fn complete_turn(&mut self) -> u32 {
        self.turns += 1;
        self.turns
    }

    /// Moves the outcome from `Pending` to `outcome`. Returns `false` if the
    /// round was already resolved or `outcome` is not terminal.
    pub(crate) fn resolve(&mut self, outcome: RoundOutcome) -> bool {
        if self.round_outcome.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        self.round_outcome = outcome;
        self.rounds_played += 1;
        true
    }

    pub(crate) fn set_failure(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    pub fn snapshot(&self) -> SessionUpdate {
        SessionUpdate {
            session_id: self.session_id,
            phase: self.phase,
            active_role: self.active_role,
            hint_count: self.hint_history.len(),
            round_outcome: self.round_outcome,
            rounds_played: self.rounds_played,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_at_startup() {
        let session = GameSession::new(ScanMode::Static);
        assert_eq!(session.phase(), Phase::Startup);
        assert_eq!(session.round_outcome(), RoundOutcome::Pending);
        assert!(session.active_role().is_none());
        assert!(session.hint_history().is_empty());
        assert_eq!(session.display_name(), "friend");
    }

    #[test]
    fn test_player_name_is_set_once() {
        let mut session = GameSession::new(ScanMode::Static);
        assert!(session.set_player_name("Anna"));
        assert!(!session.set_player_name("Bob"));
        assert_eq!(session.player_name(), Some("Anna"));
    }

    #[test]
    fn test_resolve_only_from_pending() {
        let mut session = GameSession::new(ScanMode::Static);
        session.start_round(Role::RobotGuesses);
        assert!(!session.resolve(RoundOutcome::Pending));
        assert!(session.resolve(RoundOutcome::CorrectGuess));
        assert!(!session.resolve(RoundOutcome::GaveUp));
        assert_eq!(session.round_outcome(), RoundOutcome::CorrectGuess);
        assert_eq!(session.rounds_played(), 1);
    }

    #[test]
    fn test_history_only_grows_during_gameplay() {
        let mut session = GameSession::new(ScanMode::Static);
        session.start_round(Role::RobotGuesses);
        session.set_phase(Phase::ModeSelected);
        assert!(!session.record(Speaker::Human, Intent::Affirmative));
        assert!(session.hint_history().is_empty());

        session.set_phase(Phase::Gameplay);
        assert!(session.record(Speaker::Human, Intent::HintText("it is red".into())));
        assert_eq!(session.hint_history().len(), 1);

        session.start_round(Role::HumanGuesses);
        assert!(session.hint_history().is_empty());
        assert_eq!(session.round_outcome(), RoundOutcome::Pending);
    }

    #[test]
    fn test_history_is_dropped_after_the_round() {
        for after in [Phase::PlayAgain, Phase::End] {
            let mut session = GameSession::new(ScanMode::Static);
            session.start_round(Role::RobotGuesses);
            session.set_phase(Phase::Gameplay);
            session.record(Speaker::Human, Intent::HintText("it is red".into()));
            session.resolve(RoundOutcome::CorrectGuess);
            session.set_phase(Phase::RoundResolved);
            assert_eq!(session.hint_history().len(), 1);

            session.set_phase(after);
            assert!(session.hint_history().is_empty());
            assert_eq!(session.round_outcome(), RoundOutcome::CorrectGuess);
        }
    }

    #[test]
    fn test_secret_is_hidden_from_debug() {
        let mut session = GameSession::new(ScanMode::Static);
        session.start_round(Role::HumanGuesses);
        session.set_secret(SecretObject::new("a red ball"));
        let printed = format!("{:?}", session);
        assert!(!printed.contains("red ball"));
        assert!(session.has_secret());
    }
}
