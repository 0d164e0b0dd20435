use regex::Regex;
use serde::Serialize;

/// Classification of a tag key. Determines whether the key can be copied
/// into a document as-is, routed into a sub-structure, or has to be
/// quarantined under a "tag:" prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCategory {
    Lower,
    LowerColon,
    Problemchars,
    Other,
}

impl KeyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyCategory::Lower => "lower",
            KeyCategory::LowerColon => "lower_colon",
            KeyCategory::Problemchars => "problemchars",
            KeyCategory::Other => "other",
        }
    }
}

pub struct KeyClassifier {
    lower: Regex,
    lower_colon: Regex,
    problemchars: Regex,
}

impl KeyClassifier {
    pub fn new() -> KeyClassifier {
        KeyClassifier {
            lower: Regex::new(r"^[a-z_]*$").unwrap(),
            lower_colon: Regex::new(r"^[a-z_]*:[a-z_]*$").unwrap(),
            problemchars: Regex::new("[=+/&<>;'\"?%#$@,. \t\r\n]").unwrap(),
        }
    }

    /// Patterns are checked in this order; the first hit wins. The order is
    /// load-bearing for report compatibility even where the patterns cannot
    /// overlap.
    pub fn classify(&self, key: &str) -> KeyCategory {
        if self.lower.is_match(key) {
            KeyCategory::Lower
        } else if self.lower_colon.is_match(key) {
            KeyCategory::LowerColon
        } else if self.problemchars.is_match(key) {
            KeyCategory::Problemchars
        } else {
            KeyCategory::Other
        }
    }
}

impl Default for KeyClassifier {
    fn default() -> Self {
        KeyClassifier::new()
    }
}
