//! Prompt templates for [`crate::reasoner::LLMGuessReasoner`].
//!
//! The templates ship inside the crate so the game runs without a prompts
//! directory. Deployments may override any of them by key.

use std::collections::HashMap;

const DEFAULTS: &[(&str, &str)] = &[
    ("system", include_str!("../prompts/system.md")),
    ("propose_guess", include_str!("../prompts/propose_guess.md")),
    ("evaluate_question", include_str!("../prompts/evaluate_question.md")),
    ("evaluate_guess", include_str!("../prompts/evaluate_guess.md")),
    ("choose_object", include_str!("../prompts/choose_object.md")),
    ("give_hint", include_str!("../prompts/give_hint.md")),
];

/// The built-in templates keyed by name.
pub fn default_prompts() -> HashMap<String, String> {
    DEFAULTS
        .iter()
        .map(|(key, template)| (key.to_string(), template.to_string()))
        .collect()
}

/// Built-in templates with `overrides` replacing any matching keys.
pub fn with_overrides(overrides: HashMap<String, String>) -> HashMap<String, String> {
    let mut prompts = default_prompts();
    prompts.extend(overrides);
    prompts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_placeholders() {
        let prompts = default_prompts();
        assert_eq!(prompts.len(), 6);
        assert!(prompts["propose_guess"].contains("{hints}"));
        assert!(prompts["evaluate_question"].contains("{question}"));
        assert!(prompts["evaluate_guess"].contains("{guess}"));
        assert!(prompts["give_hint"].contains("{previous_hints}"));
    }

    #[test]
    fn test_overrides_replace_by_key() {
        let overrides = HashMap::from([("system".to_string(), "Be brief.".to_string())]);
        let prompts = with_overrides(overrides);
        assert_eq!(prompts["system"], "Be brief.");
        assert!(prompts.contains_key("choose_object"));
    }
}
