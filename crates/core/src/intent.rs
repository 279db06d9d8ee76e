//! Intent classification for transcribed utterances.
//!
//! Turns raw speech-to-text output into a closed set of game intents. The
//! classifier is pure: identical input and expectation set always produce the
//! same [`Intent`]. When it cannot commit to an answer it returns
//! [`Intent::Unrecognized`] and leaves the re-prompt to the caller.

use crate::session::Role;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

/// The kinds of intent a prompt can expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Affirmative,
    Negative,
    HintText,
    ObjectName,
    ModeChoice,
    HintRequest,
    Unrecognized,
}

/// The classified meaning of an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Affirmative,
    Negative,
    /// Free text offered as a clue, or a yes/no question about the object.
    HintText(String),
    /// A named object, i.e. a guess.
    ObjectName(String),
    /// Answer to "do you want to guess, or shall I?".
    ModeChoice(Role),
    /// The player asks the robot for a clue.
    HintRequest,
    Unrecognized,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Affirmative => IntentKind::Affirmative,
            Intent::Negative => IntentKind::Negative,
            Intent::HintText(_) => IntentKind::HintText,
            Intent::ObjectName(_) => IntentKind::ObjectName,
            Intent::ModeChoice(_) => IntentKind::ModeChoice,
            Intent::HintRequest => IntentKind::HintRequest,
            Intent::Unrecognized => IntentKind::Unrecognized,
        }
    }
}

/// Expectation set for plain yes/no prompts.
pub const YES_NO: &[IntentKind] = &[
    IntentKind::Affirmative,
    IntentKind::Negative,
    IntentKind::Unrecognized,
];

/// Expectation set for the human's turn when the robot holds the secret.
pub const HUMAN_TURN: &[IntentKind] = &[
    IntentKind::ObjectName,
    IntentKind::HintText,
    IntentKind::HintRequest,
    IntentKind::Negative,
];

const AFFIRMATIVE_WORDS: &[&str] = &[
    "yes", "yeah", "yea", "yep", "yup", "yah", "ja", "sure", "correct", "right", "ok", "okay",
    "exactly", "absolutely", "definitely", "affirmative",
];
const AFFIRMATIVE_PHRASES: &[&str] = &[
    "of course",
    "thats it",
    "you got it",
    "got it",
    "why not",
];
const NEGATIVE_PHRASES: &[&str] = &["of course not", "not really", "not at all"];
const NEGATIVE_WORDS: &[&str] = &[
    "no", "nope", "nah", "nee", "not", "wrong", "incorrect", "never", "negative",
];
const HEDGE_PHRASES: &[&str] = &["not sure", "dont know", "no idea", "maybe", "dunno"];
const CONCEDE_PHRASES: &[&str] = &[
    "give up",
    "i quit",
    "i surrender",
    "tell me the answer",
    "tell me what it is",
];
const HINT_WORDS: &[&str] = &["hint", "hints", "clue", "clues", "help"];
const QUESTION_WORDS: &[&str] = &[
    "is", "are", "does", "do", "can", "could", "has", "have", "would", "will", "was", "what",
    "where", "which", "who", "how", "why", "should",
];
const GUESS_PREFIXES: &[&str] = &[
    "i guess its",
    "i guess it is",
    "i guess",
    "i think its",
    "i think it is",
    "my guess is",
    "maybe its",
    "its",
    "it is",
];
const ROBOT_WORDS: &[&str] = &["you", "your", "yourself", "robot"];
const HUMAN_WORDS: &[&str] = &["i", "me", "my", "myself", "ill", "im", "id"];
const NAME_LEAD_INS: &[&str] = &[
    "my name is",
    "my names",
    "the name is",
    "call me",
    "this is",
    "i am",
    "im",
    "its",
    "it is",
    "hello",
    "hi",
];

/// Longest statement still treated as an object name rather than free text.
const MAX_GUESS_WORDS: usize = 5;

/// Keywords at least this long also match with one stray letter, e.g.
/// "exactely".
const FUZZY_MIN_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Yes,
    No,
    Conflicted,
    Hedged,
    Neither,
}

/// Keyword and fuzzy-match based intent classifier.
pub struct IntentClassifier {
    matcher: SkimMatcherV2,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Classifies `utterance` against the intents the current prompt expects.
    ///
    /// Kinds not present in `expected` are never returned (apart from
    /// `Unrecognized`, which is always possible).
    pub fn classify(&self, utterance: &str, expected: &[IntentKind]) -> Intent {
        let text = normalize(utterance);
        if text.is_empty() {
            return Intent::Unrecognized;
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let expects = |kind: IntentKind| expected.contains(&kind);

        if expects(IntentKind::ModeChoice) {
            if let Some(role) = self.mode_choice(&tokens) {
                return Intent::ModeChoice(role);
            }
        }

        if expects(IntentKind::Negative) && contains_phrase(&text, CONCEDE_PHRASES) {
            return Intent::Negative;
        }

        if expects(IntentKind::HintRequest) && tokens.iter().any(|t| self.is_keyword(t, HINT_WORDS))
        {
            return Intent::HintRequest;
        }

        let polarity = self.polarity(&text);
        if expects(IntentKind::Affirmative) {
            match polarity {
                Polarity::Yes => return Intent::Affirmative,
                Polarity::No if expects(IntentKind::Negative) => return Intent::Negative,
                Polarity::Conflicted | Polarity::Hedged => return Intent::Unrecognized,
                _ => {}
            }
        }

        if expects(IntentKind::HintText) && is_question(utterance, &tokens) {
            return Intent::HintText(utterance.trim().to_string());
        }

        let bare_answer = tokens
            .iter()
            .all(|t| self.is_keyword(t, AFFIRMATIVE_WORDS) || self.is_keyword(t, NEGATIVE_WORDS));

        if expects(IntentKind::ObjectName) && !bare_answer {
            if let Some(name) = guess_payload(&text, &tokens) {
                return Intent::ObjectName(name);
            }
        }

        if expects(IntentKind::HintText) && !bare_answer {
            return Intent::HintText(utterance.trim().to_string());
        }

        Intent::Unrecognized
    }

    /// Phrases are matched before single words, so "of course not" is a no
    /// and "why not" is a yes.
    fn polarity(&self, text: &str) -> Polarity {
        if contains_phrase(text, HEDGE_PHRASES) {
            return Polarity::Hedged;
        }
        let negated = contains_phrase(text, NEGATIVE_PHRASES);
        let rest = strip_phrases(text, NEGATIVE_PHRASES);
        let yes = contains_phrase(&rest, AFFIRMATIVE_PHRASES)
            || rest
                .split_whitespace()
                .any(|t| self.is_keyword(t, AFFIRMATIVE_WORDS));
        let rest = strip_phrases(&rest, AFFIRMATIVE_PHRASES);
        let no = negated
            || rest
                .split_whitespace()
                .any(|t| self.is_keyword(t, NEGATIVE_WORDS));
        match (yes, no) {
            (true, true) => Polarity::Conflicted,
            (true, false) => Polarity::Yes,
            (false, true) => Polarity::No,
            (false, false) => Polarity::Neither,
        }
    }

    /// Exact keyword hit, or a near miss from the transcriber.
    ///
    /// Short keywords only tolerate stretched letters ("yess", "noo"), so
    /// words like "now" or "need" never count. Longer keywords also accept a
    /// single extra letter.
    fn is_keyword(&self, token: &str, keywords: &[&str]) -> bool {
        let squeezed = squeeze(token);
        keywords.iter().any(|kw| {
            if token == *kw || squeezed == squeeze(kw) {
                return true;
            }
            kw.len() >= FUZZY_MIN_LEN
                && token.len() == kw.len() + 1
                && token.chars().next() == kw.chars().next()
                && self.matcher.fuzzy_match(token, kw).is_some()
        })
    }

    fn is_guess_word(&self, token: &str) -> bool {
        token.starts_with('g') && self.matcher.fuzzy_match(token, "gues").is_some()
    }

    /// Picks the role from the pronoun closest before the "guess" word, e.g.
    /// "I want you to guess" means the robot guesses.
    fn mode_choice(&self, tokens: &[&str]) -> Option<Role> {
        let pronoun_role = |token: &str| {
            if ROBOT_WORDS.contains(&token) {
                Some(Role::RobotGuesses)
            } else if HUMAN_WORDS.contains(&token) {
                Some(Role::HumanGuesses)
            } else {
                None
            }
        };

        if let Some(guess_at) = tokens.iter().rposition(|t| self.is_guess_word(t)) {
            if let Some(role) = tokens[..guess_at].iter().rev().find_map(|t| pronoun_role(*t)) {
                return Some(role);
            }
        }

        let roles: Vec<Role> = tokens.iter().filter_map(|t| pronoun_role(*t)).collect();
        match roles.first() {
            Some(first) if roles.iter().all(|r| r == first) => Some(*first),
            _ => None,
        }
    }
}

/// Extracts the player's name from an introduction like "my name is anna".
///
/// Longer answers keep only the last word. Returns `None` when nothing is
/// left after removing the lead-in.
pub fn extract_player_name(utterance: &str) -> Option<String> {
    let mut text = normalize(utterance);
    loop {
        let stripped = NAME_LEAD_INS.iter().find_map(|lead| {
            if text == *lead {
                Some(String::new())
            } else {
                text.strip_prefix(&format!("{} ", lead))
                    .map(|rest| rest.trim().to_string())
            }
        });
        match stripped {
            Some(rest) => text = rest,
            None => break,
        }
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let name_tokens = if tokens.len() > 2 {
        &tokens[tokens.len() - 1..]
    } else {
        &tokens[..]
    };
    if name_tokens.is_empty() {
        return None;
    }
    Some(
        name_tokens
            .iter()
            .map(|t| capitalize(t))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Lowercases, drops apostrophes and turns other punctuation into spaces.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_phrase(text: &str, phrases: &[&str]) -> bool {
    let padded = format!(" {} ", text);
    phrases
        .iter()
        .any(|phrase| padded.contains(&format!(" {} ", phrase)))
}

/// Removes every occurrence of `phrases` from normalized `text`.
fn strip_phrases(text: &str, phrases: &[&str]) -> String {
    let mut padded = format!(" {} ", text);
    for phrase in phrases {
        let needle = format!(" {} ", phrase);
        while padded.contains(&needle) {
            padded = padded.replacen(&needle, " ", 1);
        }
    }
    padded.trim().to_string()
}

/// Collapses runs of the same letter: "yesss" becomes "yes".
fn squeeze(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        if !out.ends_with(c) {
            out.push(c);
        }
    }
    out
}

fn is_question(raw: &str, tokens: &[&str]) -> bool {
    raw.trim_end().ends_with('?')
        || tokens
            .first()
            .is_some_and(|first| QUESTION_WORDS.contains(first))
}

fn guess_payload(text: &str, tokens: &[&str]) -> Option<String> {
    for prefix in GUESS_PREFIXES {
        if let Some(rest) = text.strip_prefix(&format!("{} ", prefix)) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    if tokens.len() <= MAX_GUESS_WORDS {
        return Some(text.to_string());
    }
    None
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(utterance: &str, expected: &[IntentKind]) -> Intent {
        IntentClassifier::new().classify(utterance, expected)
    }

    #[test]
    fn test_yes_no_keywords() {
        assert_eq!(classify("yes", YES_NO), Intent::Affirmative);
        assert_eq!(classify("Yeah, sure!", YES_NO), Intent::Affirmative);
        assert_eq!(classify("that's it", YES_NO), Intent::Affirmative);
        assert_eq!(classify("no", YES_NO), Intent::Negative);
        assert_eq!(classify("Nope.", YES_NO), Intent::Negative);
    }

    #[test]
    fn test_transcription_near_misses() {
        assert_eq!(classify("yess", YES_NO), Intent::Affirmative);
        assert_eq!(classify("noo", YES_NO), Intent::Negative);
    }

    #[test]
    fn test_similar_words_are_not_keywords() {
        assert_eq!(classify("I need a minute", YES_NO), Intent::Unrecognized);
        assert_eq!(classify("happy new year", YES_NO), Intent::Unrecognized);
        assert_eq!(classify("now", YES_NO), Intent::Unrecognized);
        assert_eq!(classify("yes, right now", YES_NO), Intent::Affirmative);
        assert_eq!(classify("yeahh", YES_NO), Intent::Affirmative);
        assert_eq!(classify("exactely", YES_NO), Intent::Affirmative);
    }

    #[test]
    fn test_negation_phrases() {
        assert_eq!(classify("why not", YES_NO), Intent::Affirmative);
        assert_eq!(classify("sure, why not!", YES_NO), Intent::Affirmative);
        assert_eq!(classify("of course not", YES_NO), Intent::Negative);
        assert_eq!(classify("of course", YES_NO), Intent::Affirmative);
        assert_eq!(classify("not really", YES_NO), Intent::Negative);
    }

    #[test]
    fn test_conflicted_or_hedged_answers_are_unrecognized() {
        assert_eq!(classify("yes no", YES_NO), Intent::Unrecognized);
        assert_eq!(classify("I'm not sure", YES_NO), Intent::Unrecognized);
        assert_eq!(classify("banana", YES_NO), Intent::Unrecognized);
        assert_eq!(classify("", YES_NO), Intent::Unrecognized);
        assert_eq!(classify("   ", YES_NO), Intent::Unrecognized);
    }

    #[test]
    fn test_negative_not_returned_when_not_expected() {
        let only_yes = &[IntentKind::Affirmative, IntentKind::Unrecognized];
        assert_eq!(classify("no", only_yes), Intent::Unrecognized);
    }

    #[test]
    fn test_mode_choice() {
        let expected = &[IntentKind::ModeChoice, IntentKind::Unrecognized];
        assert_eq!(
            classify("you guess", expected),
            Intent::ModeChoice(Role::RobotGuesses)
        );
        assert_eq!(
            classify("I guess", expected),
            Intent::ModeChoice(Role::HumanGuesses)
        );
        assert_eq!(
            classify("I want you to guess", expected),
            Intent::ModeChoice(Role::RobotGuesses)
        );
        assert_eq!(
            classify("let me guess!", expected),
            Intent::ModeChoice(Role::HumanGuesses)
        );
        assert_eq!(
            classify("you", expected),
            Intent::ModeChoice(Role::RobotGuesses)
        );
        assert_eq!(classify("pizza", expected), Intent::Unrecognized);
    }

    #[test]
    fn test_human_turn_guess_and_question() {
        assert_eq!(
            classify("a red ball", HUMAN_TURN),
            Intent::ObjectName("a red ball".to_string())
        );
        assert_eq!(
            classify("I guess it's the lamp", HUMAN_TURN),
            Intent::ObjectName("the lamp".to_string())
        );
        assert_eq!(
            classify("Is it red?", HUMAN_TURN),
            Intent::HintText("Is it red?".to_string())
        );
        assert_eq!(
            classify("does it have wheels", HUMAN_TURN),
            Intent::HintText("does it have wheels".to_string())
        );
    }

    #[test]
    fn test_human_turn_hint_request_and_concession() {
        assert_eq!(classify("can I get a hint", HUMAN_TURN), Intent::HintRequest);
        assert_eq!(classify("I give up", HUMAN_TURN), Intent::Negative);
        assert_eq!(classify("no", HUMAN_TURN), Intent::Unrecognized);
    }

    #[test]
    fn test_question_with_negation_is_not_a_concession() {
        assert_eq!(
            classify("is it not red", HUMAN_TURN),
            Intent::HintText("is it not red".to_string())
        );
    }

    #[test]
    fn test_free_text_hint() {
        let expected = &[IntentKind::HintText, IntentKind::Unrecognized];
        assert_eq!(
            classify("it is round and you can bounce it", expected),
            Intent::HintText("it is round and you can bounce it".to_string())
        );
        assert_eq!(classify("", expected), Intent::Unrecognized);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = IntentClassifier::new();
        let first = classifier.classify("I think it is the red chair", HUMAN_TURN);
        let second = classifier.classify("I think it is the red chair", HUMAN_TURN);
        assert_eq!(first, second);
        assert_eq!(first, Intent::ObjectName("the red chair".to_string()));
    }

    #[test]
    fn test_extract_player_name() {
        assert_eq!(extract_player_name("my name is anna"), Some("Anna".to_string()));
        assert_eq!(extract_player_name("Hi, I'm Bob."), Some("Bob".to_string()));
        assert_eq!(extract_player_name("Lotte"), Some("Lotte".to_string()));
        assert_eq!(
            extract_player_name("well everyone calls me sam"),
            Some("Sam".to_string())
        );
        assert_eq!(extract_player_name("my name is"), None);
        assert_eq!(extract_player_name(""), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  That's IT!! "), "thats it");
        assert_eq!(normalize("a-red ball?"), "a red ball");
    }
}
