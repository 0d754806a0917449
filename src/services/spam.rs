//! Comment text checks
//!
//! [`sanitize`] cleans user text before storage. [`detect_spam`] scores a
//! handful of heuristics and [`validate_comment_text`] applies the full
//! rule set used when a comment is posted or edited.

use once_cell::sync::Lazy;
use regex::Regex;

/// Spam when at least this many heuristics match
const SPAM_THRESHOLD: usize = 2;

/// A run this long counts toward the spam score
const SPAM_RUN: usize = 6;

/// A run this long rejects the comment outright
const REPETITION_RUN: usize = 11;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://[a-z0-9$\-_@.&+]+").expect("valid url regex"));

static SPAM_WORDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(viagra|casino|lottery|winner|prize|congratulations|click here)\b")
        .expect("valid spam words regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Why comment text was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommentTextError {
    #[error("Comment cannot be empty")]
    Empty,

    #[error("Comment must be at least {0} characters long")]
    TooShort(usize),

    #[error("Comment cannot exceed {0} characters")]
    TooLong(usize),

    #[error("Comment appears to contain spam content")]
    Spam,

    #[error("Comment contains excessive repeated characters")]
    Repetition,

    #[error("Please avoid excessive use of capital letters")]
    ExcessiveCaps,
}

/// Strip tags, escape HTML and collapse whitespace
pub fn sanitize(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, "");
    let escaped = crate::services::markdown::html_escape(&stripped);
    escaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length of the longest run of one repeated character (newlines break runs)
fn longest_run(text: &str, case_insensitive: bool) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;

    for c in text.chars() {
        let c = if case_insensitive {
            c.to_lowercase().next().unwrap_or(c)
        } else {
            c
        };
        if c != '\n' && previous == Some(c) {
            current += 1;
        } else {
            current = 1;
        }
        previous = (c != '\n').then_some(c);
        longest = longest.max(current);
    }

    longest
}

/// Number of spam heuristics `text` triggers
pub fn spam_score(text: &str) -> usize {
    [
        URL_RE.is_match(text),
        longest_run(text, true) >= SPAM_RUN,
        SPAM_WORDS_RE.is_match(text),
        text.contains("!!!"),
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count()
}

pub fn detect_spam(text: &str) -> bool {
    spam_score(text) >= SPAM_THRESHOLD
}

/// Sanitize and check comment text, returning what should be stored
pub fn validate_comment_text(
    text: &str,
    min_length: usize,
    max_length: usize,
) -> Result<String, CommentTextError> {
    let clean = sanitize(text);
    let length = clean.chars().count();

    if clean.is_empty() {
        return Err(CommentTextError::Empty);
    }
    if length < min_length {
        return Err(CommentTextError::TooShort(min_length));
    }
    if length > max_length {
        return Err(CommentTextError::TooLong(max_length));
    }
    if detect_spam(&clean) {
        return Err(CommentTextError::Spam);
    }
    if longest_run(&clean, false) >= REPETITION_RUN {
        return Err(CommentTextError::Repetition);
    }
    if length > 50 {
        let upper = clean.chars().filter(|c| c.is_uppercase()).count();
        if upper as f64 / length as f64 > 0.7 {
            return Err(CommentTextError::ExcessiveCaps);
        }
    }

    Ok(clean)
}
