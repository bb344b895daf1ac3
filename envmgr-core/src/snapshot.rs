//! Ordered key-value container shared by every backend.

use crate::ParseError;
use indexmap::IndexMap;
use indexmap::map::{IntoIter, Iter};

/// The full contents of one environment file (one project, one environment,
/// one value type) as read from a backend.
///
/// Keys are unique and keep the order in which the backend returned them.
/// Writing an existing key overwrites it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: IndexMap<String, String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Removes `key` while keeping the relative order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> Iter<'_, String, String> {
        self.entries.iter()
    }

    /// Builds a snapshot from an unordered map, sorting by key so output is
    /// stable between runs.
    pub fn from_unordered<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: IndexMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        entries.sort_keys();
        Self { entries }
    }

    /// Parses unsectioned INI text (`key = value` per line).
    ///
    /// Blank lines and lines starting with `#` or `;` are skipped. Keys and
    /// values are trimmed and a value wrapped in matching quotes is unwrapped.
    /// Section headers are rejected since only the default section is
    /// addressable.
    pub fn parse_ini(text: &str) -> Result<Self, ParseError> {
        let mut snapshot = Snapshot::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') {
                return Err(ParseError::Syntax {
                    line: line_no,
                    message: format!("section headers are not supported: {}", line),
                });
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ParseError::Syntax {
                    line: line_no,
                    message: "expected <key>=<value>".to_string(),
                });
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ParseError::Syntax {
                    line: line_no,
                    message: "empty key".to_string(),
                });
            }

            snapshot.insert(key, unquote(value.trim()));
        }

        Ok(snapshot)
    }

    /// Checks that every entry survives [`Snapshot::to_ini_string`] followed
    /// by [`Snapshot::parse_ini`] unchanged.
    pub fn validate(&self) -> Result<(), ParseError> {
        for (key, value) in &self.entries {
            validate_entry(key, value)?;
        }
        Ok(())
    }

    /// Serializes to the INI text form stored in object storage: one
    /// `key=value` per line, no blank lines, no spaces around `=`.
    pub fn to_ini_string(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{}={}", key, quote_if_needed(value)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn validate_entry(key: &str, value: &str) -> Result<(), ParseError> {
    let invalid = |message: &str| -> Result<(), ParseError> {
        Err(ParseError::InvalidEntry {
            key: key.to_string(),
            message: message.to_string(),
        })
    };

    if key.is_empty() {
        return invalid("empty key");
    }
    if key.trim() != key {
        return invalid("leading or trailing whitespace");
    }
    if key.contains(['=', '\n', '\r']) {
        return invalid("keys cannot contain '=' or line breaks");
    }
    if key.starts_with(['#', ';', '[']) {
        return invalid("keys cannot start with '#', ';' or '['");
    }
    if value.contains(['\n', '\r']) {
        return invalid("values cannot contain line breaks");
    }
    Ok(())
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn quote_if_needed(value: &str) -> String {
    let needs_quotes =
        value.trim() != value || value.starts_with('"') || value.starts_with('\'');
    if needs_quotes {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (key, value) in iter {
            snapshot.insert(key, value);
        }
        snapshot
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, String);
    type IntoIter = IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a String, &'a String);
    type IntoIter = Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ini_trims_and_skips_noise() {
        let text = "\n# comment\nFOO = 1\n; another\n\n  BAR=two words  \nURL=http://x/?a=b\n";
        let snapshot = Snapshot::parse_ini(text).unwrap();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("FOO"), Some("1"));
        assert_eq!(snapshot.get("BAR"), Some("two words"));
        assert_eq!(snapshot.get("URL"), Some("http://x/?a=b"));
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["FOO", "BAR", "URL"]);
    }

    #[test]
    fn test_parse_ini_unquotes_values() {
        let snapshot = Snapshot::parse_ini("A=\"quoted value\"\nB='single'\nC=\"unbalanced").unwrap();
        assert_eq!(snapshot.get("A"), Some("quoted value"));
        assert_eq!(snapshot.get("B"), Some("single"));
        assert_eq!(snapshot.get("C"), Some("\"unbalanced"));
    }

    #[test]
    fn test_parse_ini_later_duplicate_overwrites() {
        let snapshot = Snapshot::parse_ini("A=1\nB=2\nA=3").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("A"), Some("3"));
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_parse_ini_reports_line_numbers() {
        match Snapshot::parse_ini("A=1\nnot a pair\n") {
            Err(ParseError::Syntax { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected syntax error, got {:?}", other),
        }

        match Snapshot::parse_ini("=value") {
            Err(ParseError::Syntax { line, message }) => {
                assert_eq!(line, 1);
                assert!(message.contains("empty key"));
            }
            other => panic!("Expected syntax error, got {:?}", other),
        }

        assert!(Snapshot::parse_ini("[prod]\nA=1").is_err());
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let snapshot = Snapshot::parse_ini("EMPTY=").unwrap();
        assert_eq!(snapshot.get("EMPTY"), Some(""));
        assert_eq!(snapshot.to_ini_string(), "EMPTY=");
    }

    #[test]
    fn test_to_ini_string_normalizes_whitespace() {
        let snapshot = Snapshot::parse_ini("  FOO   =   bar  \n\n\nBAZ=qux\n").unwrap();
        assert_eq!(snapshot.to_ini_string(), "FOO=bar\nBAZ=qux");
    }

    #[test]
    fn test_ini_round_trip_keeps_awkward_values() {
        let original = Snapshot::from_iter([
            ("PLAIN", "value"),
            ("PADDED", "  spaced  "),
            ("QUOTED", "\"already quoted\""),
            ("LEADING_QUOTE", "'half"),
            ("EQUALS", "a=b=c"),
            ("HASH", "abc#def"),
            ("EMPTY", ""),
        ]);

        let parsed = Snapshot::parse_ini(&original.to_ini_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_validate_rejects_entries_ini_cannot_hold() {
        let bad = [
            ("[oops", "1"),
            ("#HIDDEN", "x"),
            (";NOTE", "x"),
            ("A=B", "c"),
            ("", "x"),
            (" PADDED", "x"),
            ("MULTI\nLINE", "x"),
            ("NL", "a\nb"),
            ("CR", "a\rb"),
        ];

        for (key, value) in bad {
            let snapshot = Snapshot::from_iter([("LOG_LEVEL", "warn"), (key, value)]);
            match snapshot.validate() {
                Err(ParseError::InvalidEntry { key: rejected, .. }) => assert_eq!(rejected, key),
                other => panic!("Expected {:?}={:?} to be rejected, got {:?}", key, value, other),
            }
        }
    }

    #[test]
    fn test_validated_snapshot_round_trips() {
        let snapshot = Snapshot::from_iter([
            ("LOG_LEVEL", "warn"),
            ("oops]", "1"),
            ("MID#HASH", "x"),
            ("URL", "http://x/?a=b#frag"),
            ("PADDED", "  spaced  "),
        ]);

        snapshot.validate().unwrap();
        let parsed = Snapshot::parse_ini(&snapshot.to_ini_string()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_from_unordered_sorts_keys() {
        let snapshot = Snapshot::from_unordered(vec![("b", "2"), ("c", "3"), ("a", "1")]);
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut snapshot = Snapshot::from_iter([("A", "1"), ("B", "2"), ("C", "3")]);
        assert_eq!(snapshot.remove("B"), Some("2".to_string()));
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["A", "C"]);
        assert_eq!(snapshot.remove("B"), None);
    }
}
