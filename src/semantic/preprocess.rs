//! Text preparation for embedding input.
//!
//! Tasks embed their title and description together. The combined text is
//! trimmed and truncated, and a hash of it is kept next to the stored
//! vector so unchanged tasks are not re-embedded.

/// Maximum embedding input length (characters, not tokens)
const MAX_INPUT_LENGTH: usize = 512;

/// Suffix appended when input is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Build the embedding input for a task from its title and description.
///
/// Returns `None` when both fields are empty after trimming, which is the
/// "nothing to embed" case upstream.
pub fn embedding_input(title: &str, description: &str) -> Option<String> {
    let title = title.trim();
    let description = description.trim();

    let combined = match (title.is_empty(), description.is_empty()) {
        (true, true) => return None,
        (false, true) => title.to_string(),
        (true, false) => description.to_string(),
        (false, false) => format!("{title} - {description}"),
    };

    Some(truncate(&combined))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_INPUT_LENGTH {
        return text.to_string();
    }

    let kept: String = text
        .chars()
        .take(MAX_INPUT_LENGTH - TRUNCATION_SUFFIX.len())
        .collect();
    format!("{kept}{TRUNCATION_SUFFIX}")
}

/// Hash of the embedding input, used for change detection: a task whose
/// prepared text hashes the same as the stored vector's hash does not need
/// re-embedding.
pub fn content_hash(text: &str) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.trim().hash(&mut hasher);
    hasher.finish()
}
