//! Line-ending conversion rules.
//!
//! Whether a file is text is decided by its name alone: an exact-name table
//! and a suffix table. File contents are never inspected.

use serde::{Deserialize, Serialize};

/// Name-based table of text files eligible for CRLF conversion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextRules {
    /// Suffixes (without the dot) of text files, compared case-insensitively.
    pub suffixes: Vec<String>,
    /// Exact file names of text files.
    pub names: Vec<String>,
}

impl Default for TextRules {
    fn default() -> Self {
        let suffixes = [
            "l", "v", "a", "e", "txt", "con", "func", "cset", "vset", "fset", "ls", "csv", "py",
            "html",
        ];
        let names = ["specifications", "description", "Makefile", "anim", "view"];
        Self {
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
            names: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TextRules {
    /// Rules under which nothing is text.
    pub fn none() -> Self {
        Self {
            suffixes: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Whether a file with this name is converted.
    ///
    /// `name` may be a full path; only the part after the last `/` or `\`
    /// is considered.
    pub fn is_text(&self, name: &str) -> bool {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        if self.names.iter().any(|n| n == base) {
            return true;
        }
        match base.rsplit_once('.') {
            Some((stem, suffix)) if !stem.is_empty() => self
                .suffixes
                .iter()
                .any(|s| s.eq_ignore_ascii_case(suffix)),
            _ => false,
        }
    }
}

/// Convert bare LF line endings to CRLF. Existing CRLF pairs are kept.
pub fn to_crlf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 16);
    let mut prev = 0u8;
    for &b in data {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}

/// Convert CRLF line endings to LF. Lone CRs are kept.
pub fn to_lf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn suffix_table_decides() {
        let rules = TextRules::default();
        assert!(rules.is_text("plant.l"));
        assert!(rules.is_text("PLANT.L"));
        assert!(rules.is_text("/store/ext/fern/view.v"));
        assert!(!rules.is_text("leaf.rgb"));
        assert!(!rules.is_text("noext"));
    }

    #[test]
    fn exact_names_decide() {
        let rules = TextRules::default();
        assert!(rules.is_text("specifications"));
        assert!(rules.is_text("C:\\oofs\\ext\\fern\\description"));
        assert!(!rules.is_text("specification"));
    }

    #[test]
    fn dotfile_has_no_suffix() {
        let rules = TextRules {
            suffixes: vec!["l".into()],
            names: vec![],
        };
        assert!(!rules.is_text(".l"));
    }

    #[test]
    fn none_matches_nothing() {
        assert!(!TextRules::none().is_text("plant.l"));
    }

    #[test]
    fn crlf_conversion() {
        assert_eq!(to_crlf(b"a\nb\n"), b"a\r\nb\r\n");
        assert_eq!(to_crlf(b"a\r\nb"), b"a\r\nb");
        assert_eq!(to_lf(b"a\r\nb\r\n"), b"a\nb\n");
        assert_eq!(to_lf(b"a\rb"), b"a\rb");
        assert_eq!(to_crlf(b""), b"");
    }

    proptest! {
        #[test]
        fn lf_survives_crlf_roundtrip(s in "[a-z\n]{0,200}") {
            let back = to_lf(&to_crlf(s.as_bytes()));
            prop_assert_eq!(back, s.as_bytes().to_vec());
        }
    }
}
