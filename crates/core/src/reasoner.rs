//! Guess Reasoner
//!
//! This module wraps the external object-reasoning service. The robot uses it
//! to propose guesses when the player holds the secret, and to answer the
//! player's questions and guesses when the robot holds the secret.
//!
//! Backends implement [`GuessReasoner`]. The orchestrator never calls a backend
//! directly; it goes through [`ReasonerClient`], which applies the timeout and
//! the single-retry policy and turns every failure into
//! [`GameError::ReasoningUnavailable`].

use crate::error::GameError;
use crate::intent::{Intent, normalize};
use crate::llm_client::{ChatClient, CompletionParams};
use crate::scan::ScanDescriptor;
use crate::script;
use crate::session::{HintEntry, Speaker};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything the reasoner may know when proposing a guess.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuessContext {
    pub hint_history: Vec<HintEntry>,
    pub previous_guesses: Vec<String>,
    pub scan: Option<ScanDescriptor>,
}

/// What the player said about the robot's secret object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintQuery {
    /// A yes/no question such as "is it red?".
    Question(String),
    /// A guess at the object itself.
    Guess(String),
}

impl HintQuery {
    pub fn text(&self) -> &str {
        match self {
            HintQuery::Question(text) | HintQuery::Guess(text) => text,
        }
    }
}

/// Whether a hint or guess fits the candidate object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Consistent,
    Inconsistent,
    Unknown,
}

/// Defines the contract for any service that can reason about I Spy objects.
///
/// This abstraction allows the game to swap between an LLM-backed reasoner
/// and a deterministic offline one without touching the state machine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuessReasoner: Send + Sync {
    /// Proposes the next candidate object from the hints gathered so far.
    async fn propose_guess(&self, context: &GuessContext) -> Result<String>;

    /// Checks a question or guess against `candidate`.
    async fn evaluate_hint(&self, query: &HintQuery, candidate: &str) -> Result<Verdict>;

    /// Picks a secret object, preferably one the scan actually saw.
    async fn choose_object(&self, scan: Option<ScanDescriptor>) -> Result<String>;

    /// Produces a fresh hint about `secret`.
    async fn give_hint(&self, secret: &str, previous_hints: &[String]) -> Result<String>;
}

const GUESS_PARAMS: CompletionParams = CompletionParams::new(50, 0.8);
const VERDICT_PARAMS: CompletionParams = CompletionParams::new(10, 0.0);
const CHOOSE_PARAMS: CompletionParams = CompletionParams::new(30, 0.5);
const HINT_PARAMS: CompletionParams = CompletionParams::new(100, 0.7);

/// An implementation of `GuessReasoner` that prompts a chat model.
pub struct LLMGuessReasoner {
    client: Arc<dyn ChatClient>,
    prompts: HashMap<String, String>,
}

impl LLMGuessReasoner {
    /// Creates a new LLM-backed reasoner.
    ///
    /// # Arguments
    ///
    /// * `client` - The chat completion client to send prompts to.
    /// * `prompts` - Template strings keyed by name. Must include `system`,
    ///   `propose_guess`, `evaluate_question`, `evaluate_guess`,
    ///   `choose_object` and `give_hint`.
    pub fn new(client: Arc<dyn ChatClient>, prompts: HashMap<String, String>) -> Self {
        Self { client, prompts }
    }

    fn template(&self, key: &str) -> Result<&str> {
        self.prompts
            .get(key)
            .map(String::as_str)
            .with_context(|| format!("Missing prompt template: '{}'", key))
    }

    async fn ask(&self, prompt: String, params: CompletionParams) -> Result<String> {
        let system = self.template("system")?.to_string();
        debug!(%prompt, "Sending reasoner prompt");
        let raw = self.client.complete(system, prompt, params).await?;
        debug!(%raw, "Raw reasoner response");
        Ok(raw)
    }
}

#[async_trait]
impl GuessReasoner for LLMGuessReasoner {
    async fn propose_guess(&self, context: &GuessContext) -> Result<String> {
        let prompt = self
            .template("propose_guess")?
            .replace("{hints}", &render_history(&context.hint_history))
            .replace("{previous_guesses}", &render_list(&context.previous_guesses))
            .replace("{scan}", &render_scan(context.scan.as_ref()));
        let raw = self.ask(prompt, GUESS_PARAMS).await?;
        parse_delimited(&raw)
    }

    async fn evaluate_hint(&self, query: &HintQuery, candidate: &str) -> Result<Verdict> {
        let prompt = match query {
            HintQuery::Question(question) => self
                .template("evaluate_question")?
                .replace("{object}", candidate)
                .replace("{question}", question),
            HintQuery::Guess(guess) => self
                .template("evaluate_guess")?
                .replace("{object}", candidate)
                .replace("{guess}", guess),
        };
        let raw = self.ask(prompt, VERDICT_PARAMS).await?;
        parse_verdict(&raw)
    }

    async fn choose_object(&self, scan: Option<ScanDescriptor>) -> Result<String> {
        let prompt = self
            .template("choose_object")?
            .replace("{scan}", &render_scan(scan.as_ref()));
        let raw = self.ask(prompt, CHOOSE_PARAMS).await?;
        parse_delimited(&raw)
    }

    async fn give_hint(&self, secret: &str, previous_hints: &[String]) -> Result<String> {
        let prompt = self
            .template("give_hint")?
            .replace("{object}", secret)
            .replace("{round}", &(previous_hints.len() + 1).to_string())
            .replace("{previous_hints}", &render_list(previous_hints));
        let raw = self.ask(prompt, HINT_PARAMS).await?;
        let hint = parse_delimited(&raw)?;
        if same_object(&hint, secret) {
            bail!("Hint gives the object away");
        }
        Ok(hint)
    }
}

const OFFLINE_OBJECTS: &[&str] = &[
    "a red ball",
    "a blue book",
    "a wooden chair",
    "a desk lamp",
    "a green plant",
    "a white cup",
    "a yellow pencil",
    "a round clock",
    "a window",
    "a door",
];

/// A deterministic `GuessReasoner` that needs no network.
///
/// Useful for offline play and for tests: identical inputs always produce
/// identical outputs, except for `choose_object` without a fixed secret,
/// which picks at random.
#[derive(Debug, Clone, Default)]
pub struct OfflineGuessReasoner {
    secret: Option<String>,
}

impl OfflineGuessReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always chooses `secret` when the robot picks the object.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }
}

#[async_trait]
impl GuessReasoner for OfflineGuessReasoner {
    async fn propose_guess(&self, context: &GuessContext) -> Result<String> {
        let hint_words: Vec<String> = context
            .hint_history
            .iter()
            .filter(|entry| entry.speaker == Speaker::Human)
            .filter_map(|entry| match &entry.intent {
                Intent::HintText(text) => Some(content_words(text)),
                _ => None,
            })
            .flatten()
            .collect();

        let scanned = context
            .scan
            .iter()
            .flat_map(|scan| scan.objects.iter().map(|o| with_article(o)));
        let candidates: Vec<String> = scanned
            .chain(OFFLINE_OBJECTS.iter().map(|o| o.to_string()))
            .filter(|c| {
                !context
                    .previous_guesses
                    .iter()
                    .any(|previous| same_object(previous, c))
            })
            .collect();

        // Highest overlap with the player's hints wins; ties keep list order.
        let mut best: Option<(usize, &String)> = None;
        for candidate in &candidates {
            let score = content_words(candidate)
                .iter()
                .filter(|w| hint_words.contains(w))
                .count();
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, candidate));
            }
        }
        best.map(|(_, candidate)| candidate.clone())
            .context("Ran out of objects to guess")
    }

    async fn evaluate_hint(&self, query: &HintQuery, candidate: &str) -> Result<Verdict> {
        Ok(match query {
            HintQuery::Guess(guess) => {
                if same_object(guess, candidate) {
                    Verdict::Consistent
                } else {
                    Verdict::Inconsistent
                }
            }
            HintQuery::Question(question) => {
                let object_words = content_words(candidate);
                if content_words(question)
                    .iter()
                    .any(|w| object_words.contains(w))
                {
                    Verdict::Consistent
                } else {
                    Verdict::Unknown
                }
            }
        })
    }

    async fn choose_object(&self, scan: Option<ScanDescriptor>) -> Result<String> {
        if let Some(secret) = &self.secret {
            return Ok(secret.clone());
        }
        let seen: Vec<String> = scan
            .map(|s| s.objects.iter().map(|o| with_article(o)).collect())
            .unwrap_or_default();
        let pool: Vec<String> = if seen.is_empty() {
            OFFLINE_OBJECTS.iter().map(|o| o.to_string()).collect()
        } else {
            seen
        };
        pool.choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| anyhow!("No objects to choose from"))
    }

    async fn give_hint(&self, secret: &str, previous_hints: &[String]) -> Result<String> {
        Ok(script::fallback_hint(previous_hints.len(), secret))
    }
}

/// Number of calls made before a reasoning failure is surfaced.
const MAX_ATTEMPTS: usize = 2;

/// Applies the timeout and retry policy around a [`GuessReasoner`].
///
/// Stateless with respect to the game: every call takes what it needs as
/// parameters.
#[derive(Clone)]
pub struct ReasonerClient {
    backend: Arc<dyn GuessReasoner>,
    timeout: Duration,
    backoff: Duration,
}

impl ReasonerClient {
    pub fn new(backend: Arc<dyn GuessReasoner>, timeout: Duration, backoff: Duration) -> Self {
        Self {
            backend,
            timeout,
            backoff,
        }
    }

    pub async fn propose_guess(&self, context: &GuessContext) -> Result<String, GameError> {
        let backend = &self.backend;
        let guess = self
            .call("propose_guess", move || backend.propose_guess(context))
            .await?;
        let guess = guess.trim().to_string();
        if guess.is_empty() {
            return Err(GameError::ReasoningUnavailable(
                "propose_guess: empty candidate".to_string(),
            ));
        }
        Ok(guess)
    }

    pub async fn evaluate_hint(
        &self,
        query: &HintQuery,
        candidate: &str,
    ) -> Result<Verdict, GameError> {
        if candidate.trim().is_empty() {
            return Err(GameError::ReasoningUnavailable(
                "evaluate_hint: empty candidate".to_string(),
            ));
        }
        let backend = &self.backend;
        self.call("evaluate_hint", move || backend.evaluate_hint(query, candidate))
            .await
    }

    pub async fn choose_object(&self, scan: Option<&ScanDescriptor>) -> Result<String, GameError> {
        let backend = &self.backend;
        let object = self
            .call("choose_object", move || backend.choose_object(scan.cloned()))
            .await?;
        let object = object.trim().to_string();
        if object.is_empty() {
            return Err(GameError::ReasoningUnavailable(
                "choose_object: empty object".to_string(),
            ));
        }
        Ok(object)
    }

    pub async fn give_hint(
        &self,
        secret: &str,
        previous_hints: &[String],
    ) -> Result<String, GameError> {
        let backend = &self.backend;
        self.call("give_hint", move || backend.give_hint(secret, previous_hints))
            .await
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut request: F) -> Result<T, GameError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(self.backoff).await;
            }
            match tokio::time::timeout(self.timeout, request()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!(operation, attempt, error = %e, "Reasoner call failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(operation, attempt, timeout = ?self.timeout, "Reasoner call timed out");
                    last_error = format!("timed out after {:?}", self.timeout);
                }
            }
        }
        Err(GameError::ReasoningUnavailable(format!(
            "{}: {}",
            operation, last_error
        )))
    }
}

/// Extracts the text between `<<<` and `>>>`.
///
/// A reply without delimiters is accepted only if it is a short single line.
pub fn parse_delimited(raw: &str) -> Result<String> {
    if let Some(start) = raw.find("<<<") {
        let rest = &raw[start + 3..];
        let end = rest.find(">>>").context("Unterminated <<< delimiter in reply")?;
        let inner = rest[..end].trim().trim_matches(|c: char| c == '"' || c == '\'');
        if inner.is_empty() {
            bail!("Empty answer between delimiters");
        }
        return Ok(inner.to_string());
    }
    let trimmed = raw.trim().trim_matches(|c: char| c == '"' || c == '\'');
    if trimmed.is_empty() || trimmed.contains('\n') || trimmed.split_whitespace().count() > 12 {
        bail!("Malformed reasoner reply: {:?}", raw);
    }
    Ok(trimmed.to_string())
}

/// Reads a yes / no / unknown answer.
pub fn parse_verdict(raw: &str) -> Result<Verdict> {
    let answer = parse_delimited(raw)?;
    let normalized = normalize(&answer);
    if normalized.starts_with("unknown")
        || normalized.starts_with("i dont know")
        || normalized.starts_with("not sure")
    {
        return Ok(Verdict::Unknown);
    }
    match normalized.split_whitespace().next() {
        Some("yes") => Ok(Verdict::Consistent),
        Some("no") => Ok(Verdict::Inconsistent),
        _ => bail!("Unexpected verdict: {:?}", answer),
    }
}

const ARTICLES: &[&str] = &["a", "an", "the", "my", "your", "that", "this", "some"];

/// Words that carry meaning, without articles.
fn content_words(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .filter(|w| !ARTICLES.contains(w))
        .map(str::to_string)
        .collect()
}

/// True when `text` names `object`, ignoring articles, case and punctuation.
///
/// "is it the red ball" names "a red ball"; "a ball" does not name
/// "a red ball".
pub fn same_object(text: &str, object: &str) -> bool {
    let object = content_words(object).join(" ");
    if object.is_empty() {
        return false;
    }
    let text = format!(" {} ", content_words(text).join(" "));
    text.contains(&format!(" {} ", object))
}

fn with_article(label: &str) -> String {
    let label = label.trim();
    let first = normalize(label);
    let first = first.split_whitespace().next().unwrap_or_default();
    if ARTICLES.contains(&first) {
        label.to_string()
    } else if label.starts_with(['a', 'e', 'i', 'o', 'u']) {
        format!("an {}", label)
    } else {
        format!("a {}", label)
    }
}

fn render_history(history: &[HintEntry]) -> String {
    if history.is_empty() {
        return "None".to_string();
    }
    history
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let who = match entry.speaker {
                Speaker::Human => "Player",
                Speaker::Robot => "Robot",
            };
            let what = match &entry.intent {
                Intent::Affirmative => "yes".to_string(),
                Intent::Negative => "no".to_string(),
                Intent::HintText(text) => format!("hint: {}", text),
                Intent::ObjectName(name) => format!("guess: {}", name),
                Intent::HintRequest => "asked for a hint".to_string(),
                Intent::ModeChoice(_) | Intent::Unrecognized => "(unclear)".to_string(),
            };
            format!("{}. {} {}", i + 1, who, what)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_list(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render_scan(scan: Option<&ScanDescriptor>) -> String {
    scan.map(ScanDescriptor::summary)
        .unwrap_or_else(|| "No scan available".to_string())
}
