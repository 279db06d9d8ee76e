//! Everything the robot says that does not come from the reasoner.

use crate::intent::normalize;

pub const INITIALIZING: &str = "Initializing the game...";
pub const ASK_NAME: &str = "Hello! What's your name?";
pub const ASK_PLAY: &str = "Do you want to play a game of I Spy? Please say yes or no.";
pub const ASK_MODE: &str =
    "Do you want to guess my object, or shall I guess yours? Say 'I guess' or 'you guess'.";
pub const THINK_OF_OBJECT: &str =
    "Please look around the room and think of an object. Don't tell me what it is!";
pub const ASK_OBJECT_CHOSEN: &str = "Have you chosen an object?";
pub const TAKE_YOUR_TIME: &str = "Okay, take your time. I'll wait a little longer.";
pub const LOOKING_AROUND: &str = "Let me look around for something interesting...";
pub const ASK_OPENING_HINT: &str = "Can you tell me the color of your object?";
pub const NO_OPENING_HINT: &str = "I didn't catch that. I'll just have to guess!";
pub const SCANNING: &str = "Now I'll look around to find your object!";
pub const ASK_ANOTHER_HINT: &str = "Can you give me another hint?";
pub const NO_HINT: &str = "No hint? I'll try again anyway!";
pub const ASK_QUESTION_OR_GUESS: &str = "What is your question or guess?";
pub const NOT_SURE: &str = "Hmm, I'm not sure about that one.";
pub const ANSWER_YES: &str = "Yes!";
pub const ANSWER_NO: &str = "No.";
pub const WRONG_GUESS: &str = "That's not it. Keep trying!";
pub const CLARIFY: &str =
    "Hmm, I can't answer that one right now. Try asking about its color, shape or size.";
pub const ASK_PLAY_AGAIN: &str = "Do you want to play again? Please say yes or no.";
pub const ROBOT_WON: &str = "Yay! I got it right!";
pub const ROBOT_GAVE_UP: &str = "I give up! Your object was too tricky for me.";
pub const UNRESOLVED: &str = "I'm having trouble thinking right now, so let's call this round a draw.";
pub const FAILURE_APOLOGY: &str =
    "Sorry, I'm having trouble hearing or talking right now. Let's play again another time. Goodbye!";

/// Varied re-prompts, used after the first attempt of a question.
const REPROMPTS: &[&str] = &[
    "Sorry, I didn't catch that.",
    "Could you say that again?",
    "One more time, please?",
];

/// Secrets used when the reasoner cannot pick one.
pub const FALLBACK_OBJECTS: &[&str] = &[
    "a chair",
    "a table",
    "a window",
    "a door",
    "a book",
    "a cup",
];

/// Re-prompt for attempt `attempt` (1-based) of `prompt`.
pub fn reprompt(prompt: &str, attempt: usize) -> String {
    let lead = REPROMPTS[(attempt.saturating_sub(1)) % REPROMPTS.len()];
    format!("{} {}", lead, prompt)
}

pub fn greet(name: &str) -> String {
    format!("Nice to meet you, {}!", name)
}

pub fn intro_human_guesses(name: &str) -> String {
    format!(
        "Okay {}, I spy with my little eye something in this room. Ask me yes or no questions, \
         say 'hint' for a clue, or tell me your guess.",
        name
    )
}

pub fn propose(candidate: &str) -> String {
    format!("Is it {}?", candidate)
}

pub fn human_won(name: &str, secret: &str) -> String {
    format!("Congratulations {}! You guessed it, it was {}!", name, secret)
}

pub fn human_gave_up(secret: &str) -> String {
    format!("Never mind! {}", reveal(secret))
}

pub fn reveal(secret: &str) -> String {
    format!("The object was {}.", secret)
}

pub fn goodbye(name: &str) -> String {
    format!("Thanks for playing I Spy with me, {}! Goodbye!", name)
}

/// Scripted hint ladder, used when the reasoner cannot produce a hint.
///
/// `round` is the number of hints already given. Hints never contain the
/// object's name: once descriptive words run out the ladder switches to
/// generic nudges.
pub fn fallback_hint(round: usize, secret: &str) -> String {
    let words: Vec<String> = normalize(secret)
        .split_whitespace()
        .filter(|w| !matches!(*w, "a" | "an" | "the"))
        .map(str::to_string)
        .collect();
    // Everything but the final noun describes the object.
    let descriptors = words.len().saturating_sub(1);
    if round < descriptors {
        return format!("The object I'm thinking of is {}.", words[round]);
    }
    let generic = [
        format!("Its name has {} letters.", words.last().map_or(0, |w| w.len())),
        format!(
            "Its name starts with the letter {}.",
            words
                .last()
                .and_then(|w| w.chars().next())
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or('?')
        ),
        "You might use this object every day.".to_string(),
        "Look around the room carefully.".to_string(),
    ];
    generic[(round - descriptors).min(generic.len() - 1)].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reprompt_cycles() {
        assert_eq!(
            reprompt("Say yes or no.", 1),
            "Sorry, I didn't catch that. Say yes or no."
        );
        assert_eq!(reprompt("X", 4), reprompt("X", 1));
    }

    #[test]
    fn test_fallback_hint_ladder() {
        assert_eq!(fallback_hint(0, "a red ball"), "The object I'm thinking of is red.");
        assert_eq!(fallback_hint(1, "a red ball"), "Its name has 4 letters.");
        assert_eq!(fallback_hint(2, "a red ball"), "Its name starts with the letter B.");
        assert_eq!(fallback_hint(9, "a red ball"), "Look around the room carefully.");
    }

    #[test]
    fn test_fallback_hint_never_names_object() {
        for round in 0..6 {
            let hint = fallback_hint(round, "a big blue umbrella");
            assert!(!hint.to_lowercase().contains("umbrella"), "{}", hint);
        }
    }
}
