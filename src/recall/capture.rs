//! Heuristics for picking capture-worthy statements out of a finished turn.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::CaptureConfig;
use crate::lifecycle::TurnMessage;

static TRIGGERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(remember|don'?t forget|prefer(s|red|ence)?|decided|decision|from now on|going forward)\b",
    )
    .expect("capture trigger pattern")
});

/// A statement selected for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub role: String,
    pub text: String,
}

/// Text we injected ourselves, or code, is never captured back.
fn is_excluded(text: &str) -> bool {
    text.contains(&format!("<{}", super::CONTEXT_TAG)) || text.contains("```")
}

pub fn is_capture_worthy(text: &str, config: &CaptureConfig) -> bool {
    let len = text.chars().count();
    len >= config.min_chars
        && len <= config.max_chars
        && !is_excluded(text)
        && TRIGGERS.is_match(text)
}

/// Scan user and assistant messages in order and return at most
/// `config.max_per_turn` distinct candidates.
pub fn extract_candidates(messages: &[TurnMessage], config: &CaptureConfig) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    messages
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| (m, m.content.trim()))
        .filter(|(_, text)| is_capture_worthy(text, config))
        .filter(|(_, text)| seen.insert(text.to_string()))
        .take(config.max_per_turn)
        .map(|(m, text)| Candidate {
            role: m.role.clone(),
            text: text.to_string(),
        })
        .collect()
}
