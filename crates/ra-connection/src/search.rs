//! Name search options shared by both backends.

use serde::{Deserialize, Serialize};

/// How `FindObject` compares object names against the pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Compare case-sensitively.
    pub case_sensitive: bool,
    /// Require the whole name to equal the pattern instead of containing it.
    pub whole_name: bool,
}

impl SearchOptions {
    pub fn matches(&self, name: &str, pattern: &str) -> bool {
        if self.case_sensitive {
            if self.whole_name {
                name == pattern
            } else {
                name.contains(pattern)
            }
        } else {
            let name = name.to_lowercase();
            let pattern = pattern.to_lowercase();
            if self.whole_name {
                name == pattern
            } else {
                name.contains(&pattern)
            }
        }
    }

    /// Wire form: `c` for case-sensitive, `w` for whole-name.
    pub fn to_flags(&self) -> String {
        let mut flags = String::new();
        if self.case_sensitive {
            flags.push('c');
        }
        if self.whole_name {
            flags.push('w');
        }
        flags
    }

    pub fn from_flags(flags: &str) -> Self {
        Self {
            case_sensitive: flags.contains('c'),
            whole_name: flags.contains('w'),
        }
    }
}
