//! Mention detection.

/// Case-insensitive substring matcher for the watched username.
///
/// No tokenization: `"@bob"`, `"BOB!"` and `"bobby"` all match `bob`.
#[derive(Debug, Clone)]
pub struct MentionMatcher {
    needle: String,
}

impl MentionMatcher {
    pub fn new(username: &str) -> Self {
        Self {
            needle: username.trim().to_lowercase(),
        }
    }

    pub fn username(&self) -> &str {
        &self.needle
    }

    pub fn is_match(&self, text: &str) -> bool {
        !self.needle.is_empty() && text.to_lowercase().contains(&self.needle)
    }
}
