//! Turn-Taking State Machine
//!
//! [`GameOrchestrator`] owns the [`GameSession`] and the injected robot
//! gateway. It advances one phase handler per [`GameOrchestrator::step`]; a
//! `Gameplay` step is exactly one turn. Failures are handled in the phase
//! where they occur:
//!
//! - speech and posture failures re-run the phase, up to
//!   [`GameSettings::io_retries`] times, then end the session with a failure
//!   annotation;
//! - scan failures are logged and the round continues without scan context;
//! - reasoning failures fall back to scripted behavior or resolve the round as
//!   `Unresolved`.
//!
//! Only a failure to say the closing line escapes [`GameOrchestrator::run`].

use crate::error::GameError;
use crate::gateway::{Posture, RobotGateway};
use crate::intent::{HUMAN_TURN, Intent, IntentClassifier, IntentKind, YES_NO, extract_player_name};
use crate::reasoner::{GuessContext, GuessReasoner, HintQuery, ReasonerClient, Verdict, same_object};
use crate::scan::{ScanCoordinator, ScanDescriptor, ScanMode};
use crate::script;
use crate::session::{GameSession, Phase, Role, RoundOutcome, SecretObject, SessionUpdate, Speaker};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Extra time granted to the gateway's own listen timeout before the
/// orchestrator stops waiting. Must exceed the grace a gateway adds itself,
/// so the gateway's timeout handling runs first.
pub const LISTEN_GRACE: Duration = Duration::from_secs(5);

/// Timeouts and bounds of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSettings {
    /// How long to wait for the player to start speaking.
    pub listen_timeout: Duration,
    pub scan_timeout: Duration,
    /// Deadline of a single reasoner call.
    pub reasoning_timeout: Duration,
    /// Pause before the single reasoner retry.
    pub reasoning_backoff: Duration,
    /// Consecutive unrecognized answers before a prompt falls back.
    pub max_unrecognized: usize,
    /// Times the player is asked for their name.
    pub max_name_attempts: usize,
    /// Re-runs of a phase after a speech or posture failure.
    pub io_retries: usize,
    /// Guesses the robot makes before giving up.
    pub max_robot_guesses: usize,
    /// Questions and guesses the player gets before the round is given up.
    pub max_human_turns: u32,
    /// Reasoner failures tolerated while answering questions in one round.
    pub max_reasoning_failures: u32,
    /// Extra time the player gets after saying they have not picked an object
    /// yet.
    pub think_pause: Duration,
    /// Whether the robot scans at the start of a round in which it guesses.
    pub scan_when_guessing: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(15),
            scan_timeout: Duration::from_secs(60),
            reasoning_timeout: Duration::from_secs(20),
            reasoning_backoff: Duration::from_millis(500),
            max_unrecognized: 3,
            max_name_attempts: 2,
            io_retries: 2,
            max_robot_guesses: 5,
            max_human_turns: 8,
            max_reasoning_failures: 2,
            think_pause: Duration::from_secs(5),
            scan_when_guessing: true,
        }
    }
}

/// Drives one session from `Startup` to `End`.
pub struct GameOrchestrator<G: RobotGateway> {
    session: GameSession,
    gateway: G,
    classifier: IntentClassifier,
    reasoner: ReasonerClient,
    scanner: ScanCoordinator,
    settings: GameSettings,
    /// Optional channel for publishing snapshots to observers.
    updates: Option<mpsc::Sender<SessionUpdate>>,
    /// Consecutive I/O failures of the current phase.
    io_failures: usize,
    /// Reasoner failures in the current round.
    reasoning_failures: u32,
    /// Set once the closing line has been spoken.
    closed: bool,
}

impl<G: RobotGateway> GameOrchestrator<G> {
    /// Creates an orchestrator for a fresh session.
    ///
    /// # Arguments
    ///
    /// * `gateway` - The robot connection. Owned for the whole session.
    /// * `reasoner` - The backend used to guess, answer and give hints.
    /// * `scan_mode` - How the robot looks around, fixed for the session.
    /// * `settings` - Timeouts and bounds.
    pub fn new(
        gateway: G,
        reasoner: Arc<dyn GuessReasoner>,
        scan_mode: ScanMode,
        settings: GameSettings,
    ) -> Self {
        Self {
            session: GameSession::new(scan_mode),
            gateway,
            classifier: IntentClassifier::new(),
            reasoner: ReasonerClient::new(
                reasoner,
                settings.reasoning_timeout,
                settings.reasoning_backoff,
            ),
            scanner: ScanCoordinator::new(settings.scan_timeout),
            settings,
            updates: None,
            io_failures: 0,
            reasoning_failures: 0,
            closed: false,
        }
    }

    /// Publishes a [`SessionUpdate`] after every completed step.
    pub fn with_updates(mut self, updates: mpsc::Sender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Plays the session to the end.
    ///
    /// Returns an error only when the closing line itself could not be
    /// spoken after the retry budget was used up.
    pub async fn run(&mut self) -> Result<(), GameError> {
        let span = info_span!("session", session_id = %self.session.session_id());
        async {
            info!(scan_mode = %self.session.scan_mode(), "Session started");
            self.publish();
            while !self.closed {
                self.step().await?;
            }
            info!(
                rounds = self.session.rounds_played(),
                failed = self.session.failure().is_some(),
                "Session finished"
            );
            Ok::<(), GameError>(())
        }
        .instrument(span)
        .await
    }

    /// Runs the handler of the current phase once and returns the phase the
    /// session is in afterwards.
    pub async fn step(&mut self) -> Result<Phase, GameError> {
        let phase = self.session.phase();
        let result = match phase {
            Phase::Startup => self.on_startup().await,
            Phase::Greeting => self.on_greeting().await,
            Phase::AskPlay => self.on_ask_play().await,
            Phase::ChooseMode => self.on_choose_mode().await,
            Phase::ModeSelected => self.on_mode_selected().await,
            Phase::Gameplay => self.on_gameplay().await,
            Phase::RoundResolved => self.on_round_resolved().await,
            Phase::PlayAgain => self.on_play_again().await,
            Phase::End => self.on_end().await,
        };

        match result {
            Ok(next) => {
                self.io_failures = 0;
                self.transition(next);
                Ok(next)
            }
            Err(e) if phase == Phase::End => {
                self.io_failures += 1;
                if self.io_failures > self.settings.io_retries {
                    error!(error = %e, "Could not say goodbye, giving up");
                    return Err(e);
                }
                warn!(error = %e, attempt = self.io_failures, "Closing line failed, retrying");
                Ok(Phase::End)
            }
            Err(e) if e.is_io() => {
                self.io_failures += 1;
                if self.io_failures > self.settings.io_retries {
                    error!(?phase, error = %e, "Robot I/O keeps failing, ending session");
                    self.abort(phase, &e);
                    return Ok(Phase::End);
                }
                warn!(?phase, error = %e, attempt = self.io_failures, "Robot I/O failed, re-running phase");
                Ok(phase)
            }
            Err(e) => {
                error!(?phase, error = %e, "Unhandled failure, ending session");
                self.abort(phase, &e);
                Ok(Phase::End)
            }
        }
    }

    fn abort(&mut self, phase: Phase, cause: &GameError) {
        self.io_failures = 0;
        self.session.set_failure(format!("{:?}: {}", phase, cause));
        if self.session.active_role().is_some() {
            self.session.resolve(RoundOutcome::Unresolved);
        }
        self.transition(Phase::End);
    }

    fn transition(&mut self, next: Phase) {
        let from = self.session.phase();
        if from != next {
            info!(?from, to = ?next, "Phase transition");
        }
        self.session.set_phase(next);
        self.publish();
    }

    fn publish(&self) {
        if let Some(tx) = &self.updates {
            if tx.try_send(self.session.snapshot()).is_err() {
                warn!("Failed to publish session update: channel full or receiver dropped.");
            }
        }
    }

    // --- Phase handlers ---

    async fn on_startup(&mut self) -> Result<Phase, GameError> {
        self.gateway.posture(Posture::Crouch).await?;
        self.say(script::INITIALIZING).await?;
        Ok(Phase::Greeting)
    }

    async fn on_greeting(&mut self) -> Result<Phase, GameError> {
        self.gateway.posture(Posture::Stand).await?;
        if self.session.player_name().is_none() {
            for attempt in 0..self.settings.max_name_attempts {
                let prompt = match attempt {
                    0 => script::ASK_NAME.to_string(),
                    n => script::reprompt(script::ASK_NAME, n),
                };
                self.say(&prompt).await?;
                let heard = self.hear().await?;
                if let Some(name) = extract_player_name(&heard) {
                    info!(%name, "Player introduced themselves");
                    self.session.set_player_name(name);
                    break;
                }
            }
        }
        let greeting = script::greet(self.session.display_name());
        self.say(&greeting).await?;
        Ok(Phase::AskPlay)
    }

    async fn on_ask_play(&mut self) -> Result<Phase, GameError> {
        match self.ask(script::ASK_PLAY, YES_NO).await? {
            Intent::Affirmative => Ok(Phase::ChooseMode),
            Intent::Negative => Ok(Phase::End),
            other => {
                info!(?other, "No clear answer to the invitation");
                Ok(Phase::End)
            }
        }
    }

    async fn on_choose_mode(&mut self) -> Result<Phase, GameError> {
        let role = match self.ask(script::ASK_MODE, &[IntentKind::ModeChoice]).await? {
            Intent::ModeChoice(role) => role,
            other => {
                info!(?other, "No mode chosen, the player guesses");
                Role::HumanGuesses
            }
        };
        info!(?role, "Round starting");
        self.session.start_round(role);
        self.reasoning_failures = 0;
        Ok(Phase::ModeSelected)
    }

    async fn on_mode_selected(&mut self) -> Result<Phase, GameError> {
        let Some(role) = self.session.active_role() else {
            warn!("Mode selected without a role, asking again");
            return Ok(Phase::ChooseMode);
        };
        match role {
            Role::RobotGuesses => {
                self.say(script::THINK_OF_OBJECT).await?;
                self.wait_for_object_choice().await?;
            }
            Role::HumanGuesses => {
                if !self.session.has_secret() {
                    self.say(script::LOOKING_AROUND).await?;
                    let scan = self.try_scan().await;
                    let secret = match self.reasoner.choose_object(scan.as_ref()).await {
                        Ok(object) => object,
                        Err(e) => {
                            warn!(error = %e, "Picking a fallback object");
                            script::FALLBACK_OBJECTS
                                .choose(&mut rand::rng())
                                .copied()
                                .unwrap_or("a chair")
                                .to_string()
                        }
                    };
                    self.session.set_scan_context(scan);
                    self.session.set_secret(SecretObject::new(secret));
                    info!("Secret object chosen");
                }
            }
        }
        Ok(Phase::Gameplay)
    }

    async fn on_gameplay(&mut self) -> Result<Phase, GameError> {
        match self.session.active_role() {
            Some(Role::RobotGuesses) => self.robot_turn().await,
            Some(Role::HumanGuesses) => self.human_turn().await,
            None => {
                warn!("Gameplay without a role");
                self.session.resolve(RoundOutcome::Unresolved);
                Ok(Phase::RoundResolved)
            }
        }
    }

    async fn on_round_resolved(&mut self) -> Result<Phase, GameError> {
        if !self.session.round_outcome().is_terminal() {
            warn!("Round reached resolution while pending");
            self.session.resolve(RoundOutcome::Unresolved);
        }
        let outcome = self.session.round_outcome();
        let secret = self
            .session
            .secret_object()
            .map(|s| s.reveal().to_string());
        let name = self.session.display_name();

        let announcement = match (self.session.active_role(), outcome, secret.as_deref()) {
            (Some(Role::HumanGuesses), RoundOutcome::CorrectGuess, Some(secret)) => {
                script::human_won(name, secret)
            }
            (Some(Role::HumanGuesses), RoundOutcome::GaveUp, Some(secret)) => {
                script::human_gave_up(secret)
            }
            (Some(Role::RobotGuesses), RoundOutcome::CorrectGuess, _) => {
                script::ROBOT_WON.to_string()
            }
            (Some(Role::RobotGuesses), RoundOutcome::GaveUp, _) => {
                script::ROBOT_GAVE_UP.to_string()
            }
            (_, _, Some(secret)) => format!("{} {}", script::UNRESOLVED, script::reveal(secret)),
            (_, _, None) => script::UNRESOLVED.to_string(),
        };
        info!(?outcome, "Round resolved");
        self.say(&announcement).await?;

        let gesture = match (self.session.active_role(), outcome) {
            (Some(Role::HumanGuesses), RoundOutcome::CorrectGuess) => Posture::Point,
            (Some(Role::RobotGuesses), RoundOutcome::CorrectGuess) => Posture::Celebrate,
            (Some(Role::RobotGuesses), RoundOutcome::GaveUp) => Posture::Defeat,
            _ => Posture::ShakeNo,
        };
        if let Err(e) = self.gateway.posture(gesture).await {
            warn!(?gesture, error = %e, "Could not gesture at the outcome");
        }
        Ok(Phase::PlayAgain)
    }

    async fn on_play_again(&mut self) -> Result<Phase, GameError> {
        match self.ask(script::ASK_PLAY_AGAIN, YES_NO).await? {
            Intent::Affirmative => {
                self.session.end_round();
                Ok(Phase::ChooseMode)
            }
            Intent::Negative => Ok(Phase::End),
            other => {
                info!(?other, "No clear answer to play again");
                Ok(Phase::End)
            }
        }
    }

    async fn on_end(&mut self) -> Result<Phase, GameError> {
        let closing = match self.session.failure() {
            Some(_) => script::FAILURE_APOLOGY.to_string(),
            None => script::goodbye(self.session.display_name()),
        };
        self.say(&closing).await?;
        if let Err(e) = self.gateway.posture(Posture::Wave).await {
            warn!(error = %e, "Could not wave goodbye");
        }
        self.closed = true;
        Ok(Phase::End)
    }

    // --- Turns ---

    /// One turn of a round in which the player holds the secret.
    async fn robot_turn(&mut self) -> Result<Phase, GameError> {
        if self.session.turns() == 0 {
            match self.ask_hint(script::ASK_OPENING_HINT).await? {
                Some(hint) => {
                    self.session.record(Speaker::Human, Intent::HintText(hint));
                }
                None => self.say(script::NO_OPENING_HINT).await?,
            }
            if self.settings.scan_when_guessing {
                self.say(script::SCANNING).await?;
                let scan = self.try_scan().await;
                self.session.set_scan_context(scan);
            }
            self.session.complete_turn();
            return Ok(Phase::Gameplay);
        }

        if self.session.previous_guesses().len() >= self.settings.max_robot_guesses {
            self.session.resolve(RoundOutcome::GaveUp);
            return Ok(Phase::RoundResolved);
        }

        let context = GuessContext {
            hint_history: self.session.hint_history().to_vec(),
            previous_guesses: self.session.previous_guesses().to_vec(),
            scan: self.session.scan_context().cloned(),
        };
        let candidate = match self.reasoner.propose_guess(&context).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(error = %e, "No guess available, round unresolved");
                self.session.resolve(RoundOutcome::Unresolved);
                return Ok(Phase::RoundResolved);
            }
        };
        info!(%candidate, "Proposing guess");

        let answer = self.ask(&script::propose(&candidate), YES_NO).await?;
        self.session
            .record(Speaker::Robot, Intent::ObjectName(candidate.clone()));
        self.session.push_guess(candidate);
        self.session.complete_turn();

        if answer == Intent::Affirmative {
            self.session.record(Speaker::Human, Intent::Affirmative);
            self.session.resolve(RoundOutcome::CorrectGuess);
            return Ok(Phase::RoundResolved);
        }
        // An answer that stays unclear after re-prompting counts as a no.
        self.session.record(Speaker::Human, Intent::Negative);

        if self.session.previous_guesses().len() >= self.settings.max_robot_guesses {
            self.session.resolve(RoundOutcome::GaveUp);
            return Ok(Phase::RoundResolved);
        }

        match self.ask_hint(script::ASK_ANOTHER_HINT).await? {
            Some(hint) => {
                self.session.record(Speaker::Human, Intent::HintText(hint));
            }
            None => self.say(script::NO_HINT).await?,
        }
        Ok(Phase::Gameplay)
    }

    /// One turn of a round in which the robot holds the secret.
    async fn human_turn(&mut self) -> Result<Phase, GameError> {
        let Some(secret) = self.session.secret_object().map(|s| s.reveal().to_string()) else {
            warn!("Player is guessing but no secret was chosen");
            self.session.resolve(RoundOutcome::Unresolved);
            return Ok(Phase::RoundResolved);
        };

        if self.session.turns() == 0 {
            let intro = script::intro_human_guesses(self.session.display_name());
            self.say(&intro).await?;
            self.give_hint(&secret).await?;
            self.session.complete_turn();
            return Ok(Phase::Gameplay);
        }

        if self.session.turns() > self.settings.max_human_turns {
            info!(turns = self.session.turns(), "Player ran out of turns");
            self.session.resolve(RoundOutcome::GaveUp);
            return Ok(Phase::RoundResolved);
        }

        let intent = self.ask(script::ASK_QUESTION_OR_GUESS, HUMAN_TURN).await?;
        debug!(?intent, "Player turn");
        match intent {
            Intent::ObjectName(guess) => {
                self.session
                    .record(Speaker::Human, Intent::ObjectName(guess.clone()));
                let verdict = match self
                    .reasoner
                    .evaluate_hint(&HintQuery::Guess(guess.clone()), &secret)
                    .await
                {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        warn!(error = %e, "Checking the guess locally");
                        if same_object(&guess, &secret) {
                            Verdict::Consistent
                        } else {
                            Verdict::Inconsistent
                        }
                    }
                };
                if verdict == Verdict::Consistent {
                    self.session.resolve(RoundOutcome::CorrectGuess);
                    return Ok(Phase::RoundResolved);
                }
                self.say(script::WRONG_GUESS).await?;
            }
            Intent::HintText(question) => {
                self.session
                    .record(Speaker::Human, Intent::HintText(question.clone()));
                match self
                    .reasoner
                    .evaluate_hint(&HintQuery::Question(question.clone()), &secret)
                    .await
                {
                    Ok(Verdict::Consistent) if same_object(&question, &secret) => {
                        self.session.resolve(RoundOutcome::CorrectGuess);
                        return Ok(Phase::RoundResolved);
                    }
                    Ok(Verdict::Consistent) => self.say(script::ANSWER_YES).await?,
                    Ok(Verdict::Inconsistent) => self.say(script::ANSWER_NO).await?,
                    Ok(Verdict::Unknown) => self.say(script::NOT_SURE).await?,
                    Err(e) => {
                        self.reasoning_failures += 1;
                        warn!(error = %e, failures = self.reasoning_failures, "Cannot answer question");
                        if self.reasoning_failures >= self.settings.max_reasoning_failures {
                            self.session.resolve(RoundOutcome::Unresolved);
                            return Ok(Phase::RoundResolved);
                        }
                        self.say(script::CLARIFY).await?;
                    }
                }
            }
            Intent::HintRequest => {
                self.session.record(Speaker::Human, Intent::HintRequest);
                self.give_hint(&secret).await?;
            }
            Intent::Negative => {
                self.session.record(Speaker::Human, Intent::Negative);
                self.session.resolve(RoundOutcome::GaveUp);
                return Ok(Phase::RoundResolved);
            }
            Intent::Affirmative | Intent::ModeChoice(_) | Intent::Unrecognized => {
                debug!("Turn passed without a question or guess");
            }
        }
        self.session.complete_turn();
        Ok(Phase::Gameplay)
    }

    /// Speaks a fresh hint about `secret` and records it.
    async fn give_hint(&mut self, secret: &str) -> Result<(), GameError> {
        let previous: Vec<String> = self
            .session
            .hint_history()
            .iter()
            .filter(|entry| entry.speaker == Speaker::Robot)
            .filter_map(|entry| match &entry.intent {
                Intent::HintText(text) => Some(text.clone()),
                _ => None,
            })
            .collect();
        let hint = match self.reasoner.give_hint(secret, &previous).await {
            Ok(hint) => hint,
            Err(e) => {
                warn!(error = %e, "Using a scripted hint");
                script::fallback_hint(previous.len(), secret)
            }
        };
        self.say(&hint).await?;
        self.session.record(Speaker::Robot, Intent::HintText(hint));
        Ok(())
    }

    // --- Robot I/O ---

    async fn say(&mut self, text: &str) -> Result<(), GameError> {
        debug!(%text, "Speaking");
        self.gateway.speak(text).await
    }

    async fn hear(&mut self) -> Result<String, GameError> {
        let deadline = self.settings.listen_timeout + LISTEN_GRACE;
        match tokio::time::timeout(deadline, self.gateway.listen(self.settings.listen_timeout)).await
        {
            Ok(Ok(heard)) => {
                debug!(%heard, "Heard");
                Ok(heard)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(timeout = ?deadline, "Listen did not return in time");
                Ok(String::new())
            }
        }
    }

    /// Asks `prompt` until the answer is recognized, re-prompting with varied
    /// phrasing. Returns `Unrecognized` once the bound is reached.
    async fn ask(&mut self, prompt: &str, expected: &[IntentKind]) -> Result<Intent, GameError> {
        for attempt in 0..self.settings.max_unrecognized {
            let line = match attempt {
                0 => prompt.to_string(),
                n => script::reprompt(prompt, n),
            };
            self.say(&line).await?;
            let heard = self.hear().await?;
            let intent = self.classifier.classify(&heard, expected);
            if intent != Intent::Unrecognized {
                return Ok(intent);
            }
            debug!(attempt, "Answer not recognized");
        }
        Ok(Intent::Unrecognized)
    }

    /// Waits until the player confirms they have picked an object. Every "not
    /// yet" buys another `think_pause`; after `max_unrecognized` of them, or
    /// an answer that stays unclear, the robot starts guessing anyway.
    async fn wait_for_object_choice(&mut self) -> Result<(), GameError> {
        for _ in 0..self.settings.max_unrecognized {
            match self.ask(script::ASK_OBJECT_CHOSEN, YES_NO).await? {
                Intent::Affirmative => return Ok(()),
                Intent::Negative => {
                    self.say(script::TAKE_YOUR_TIME).await?;
                    tokio::time::sleep(self.settings.think_pause).await;
                }
                _ => break,
            }
        }
        info!("Starting to guess without a confirmed object");
        Ok(())
    }

    /// Asks once for a free-text hint.
    async fn ask_hint(&mut self, prompt: &str) -> Result<Option<String>, GameError> {
        self.say(prompt).await?;
        let heard = self.hear().await?;
        match self.classifier.classify(&heard, &[IntentKind::HintText]) {
            Intent::HintText(hint) => Ok(Some(hint)),
            _ => Ok(None),
        }
    }

    async fn try_scan(&mut self) -> Option<ScanDescriptor> {
        match self
            .scanner
            .perform_scan(&mut self.gateway, self.session.scan_mode())
            .await
        {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(error = %e, "Continuing without scan context");
                None
            }
        }
    }
}
