//! The command list embedded in a bug's whiteboard as `[marker:a,b=c]`.
//!
//! The whiteboard text is the only storage: a [`CommandMap`] is parsed from
//! it and written back through [`CommandMap::apply`], never edited in place.

use std::fmt;

/// Ordered set of commands, each optionally carrying a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandMap {
    entries: Vec<(String, Option<String>)>,
}

/// Byte range of the first `[marker:...]` block: (block start, contents
/// start, contents end, block end).
fn locate(marker: &str, text: &str) -> Option<(usize, usize, usize, usize)> {
    let open = format!("[{marker}:");
    let start = text.find(&open)?;
    let contents = start + open.len();
    match text[contents..].find(']') {
        Some(offset) => Some((start, contents, contents + offset, contents + offset + 1)),
        None => Some((start, contents, text.len(), text.len())),
    }
}

impl CommandMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the first `[marker:...]` block in `text`. A missing block yields
    /// an empty map. Repeated keys keep their first position and last value.
    pub fn parse(marker: &str, text: &str) -> Self {
        let mut map = Self::new();
        let Some((_, from, to, _)) = locate(marker, text) else {
            return map;
        };
        for token in text[from..to].split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some((key, value)) => map.insert(key, Some(value.to_string())),
                None => map.insert(token, None),
            }
        }
        map
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Value of `key`, if present and carrying one.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Insert or replace a command. Replacing keeps the original position.
    pub fn insert(&mut self, key: &str, value: Option<String>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Remove a command. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Serialize the block contents, e.g. `confirmed,origRev=abc`.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={v}"),
                None => k.clone(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Write this map back into `text`: the first existing block is rewritten,
    /// otherwise one is appended. An empty map removes every block.
    pub fn apply(&self, marker: &str, text: &str) -> String {
        if self.is_empty() {
            let mut out = text.to_string();
            while let Some((start, _, _, end)) = locate(marker, &out) {
                out.replace_range(start..end, "");
            }
            return out;
        }

        let block = format!("[{marker}:{}]", self.serialize());
        match locate(marker, text) {
            Some((start, _, _, end)) => {
                let mut out = text.to_string();
                out.replace_range(start..end, &block);
                out
            }
            None => format!("{text}{block}"),
        }
    }
}

impl fmt::Display for CommandMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_keys_and_values() {
        let map = CommandMap::parse("bugmon", "[fuzzblocker][bugmon:confirmed,origRev=abc123]");
        assert!(map.contains("confirmed"));
        assert_eq!(map.value("confirmed"), None);
        assert_eq!(map.value("origRev"), Some("abc123"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn missing_marker_is_empty() {
        assert!(CommandMap::parse("bugmon", "[fuzzblocker]").is_empty());
        assert!(CommandMap::parse("bugmon", "").is_empty());
    }

    #[test]
    fn other_markers_are_ignored() {
        let map = CommandMap::parse("bugmon", "[triage:bisect][bugmon:verify]");
        assert!(map.contains("verify"));
        assert!(!map.contains("bisect"));
    }

    #[test]
    fn apply_rewrites_existing_block() {
        let text = "[sec-high][bugmon:confirm][keep]";
        let mut map = CommandMap::parse("bugmon", text);
        map.remove("confirm");
        map.insert("confirmed", None);
        assert_eq!(map.apply("bugmon", text), "[sec-high][bugmon:confirmed][keep]");
    }

    #[test]
    fn apply_appends_when_absent() {
        let mut map = CommandMap::new();
        map.insert("bisected", None);
        assert_eq!(map.apply("bugmon", "[sec-high]"), "[sec-high][bugmon:bisected]");
    }

    #[test]
    fn empty_map_strips_marker_entirely() {
        let text = "[sec-high][bugmon:confirm] trailing";
        assert_eq!(CommandMap::new().apply("bugmon", text), "[sec-high] trailing");
    }

    #[test]
    fn insert_keeps_position() {
        let mut map = CommandMap::parse("bugmon", "[bugmon:a,b,c]");
        map.insert("a", Some("1".into()));
        assert_eq!(map.serialize(), "a=1,b,c");
    }

    #[test]
    fn unterminated_block_is_closed_on_write() {
        let text = "[bugmon:verify";
        let mut map = CommandMap::parse("bugmon", text);
        assert!(map.contains("verify"));
        map.insert("verified", None);
        assert_eq!(map.apply("bugmon", text), "[bugmon:verify,verified]");
    }

    fn command_map() -> impl Strategy<Value = CommandMap> {
        prop::collection::vec(
            (
                "[a-zA-Z][a-zA-Z0-9_-]{0,10}",
                prop::option::of("[a-zA-Z0-9._-]{1,12}"),
            ),
            0..6,
        )
        .prop_map(|pairs| {
            let mut map = CommandMap::new();
            for (key, value) in pairs {
                map.insert(&key, value);
            }
            map
        })
    }

    proptest! {
        #[test]
        fn serialized_map_parses_back(
            map in command_map(),
            prefix in "[a-z \\[\\]-]{0,20}",
        ) {
            // The surrounding text must not already hold a marker block.
            prop_assume!(!prefix.contains("[bugmon:"));
            let text = map.apply("bugmon", &prefix);
            prop_assert_eq!(CommandMap::parse("bugmon", &text), map.clone());
            if map.is_empty() {
                prop_assert!(!text.contains("[bugmon:"));
            }
        }
    }
}
