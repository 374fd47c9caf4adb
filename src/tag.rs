//! Key/value markers attached to address records.
//!
//! Tags travel on the wire as plain strings, either `key=value` or a bare
//! `key`. Internally they are kept in a [`TagSet`]: insertion ordered and
//! unique by key, where a later entry for an existing key replaces its value
//! in place.
//!
//! One key is reserved: [`MACHINE_ID`] marks an address as owned by
//! infrastructure. Such addresses are hidden from tenant-facing listings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reserved tag key binding an address to a machine
pub const MACHINE_ID: &str = "ipledger.io/machine-id";

/// A single key with an optional value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    key: String,
    value: Option<String>,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// A tag that carries only a key
    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Parse the wire form. Splits at the first `=`; without one the whole
    /// string is the key.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('=') {
            Some((key, value)) => Tag::new(key, value),
            None => Tag::flag(raw),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => f.write_str(&self.key),
        }
    }
}

impl FromStr for Tag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Tag::parse(s))
    }
}

/// Ordered, key-unique collection of tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from wire strings, merging duplicate keys (last wins)
    pub fn from_strings<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = TagSet::new();
        for tag in raw {
            set.insert(Tag::parse(tag.as_ref()));
        }
        set
    }

    /// Build a set from wire strings, refusing duplicate keys.
    ///
    /// Returns the first repeated key on failure.
    pub fn from_strings_strict<I, S>(raw: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = TagSet::new();
        for tag in raw {
            let tag = Tag::parse(tag.as_ref());
            if set.contains_key(tag.key()) {
                return Err(tag.key);
            }
            set.tags.push(tag);
        }
        Ok(set)
    }

    /// Insert a tag, replacing the value of an existing tag with the same key.
    ///
    /// Returns the replaced tag, if any.
    pub fn insert(&mut self, tag: Tag) -> Option<Tag> {
        match self.tags.iter_mut().find(|t| t.key == tag.key) {
            Some(existing) => Some(std::mem::replace(existing, tag)),
            None => {
                self.tags.push(tag);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Tag> {
        let pos = self.tags.iter().position(|t| t.key == key)?;
        Some(self.tags.remove(pos))
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.key == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// True if every tag of `other` is present here with the same value
    pub fn contains_all(&self, other: &TagSet) -> bool {
        other.iter().all(|tag| self.contains(tag))
    }

    /// The machine an address is bound to
    pub fn machine_id(&self) -> Option<&str> {
        self.get(MACHINE_ID).and_then(Tag::value)
    }

    /// Whether the set carries the reserved machine ownership tag
    pub fn is_machine_bound(&self) -> bool {
        self.contains_key(MACHINE_ID)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Wire form of every tag, in set order
    pub fn to_strings(&self) -> Vec<String> {
        self.tags.iter().map(Tag::to_string).collect()
    }
}

impl From<Vec<String>> for TagSet {
    fn from(raw: Vec<String>) -> Self {
        TagSet::from_strings(raw)
    }
}

impl From<TagSet> for Vec<String> {
    fn from(set: TagSet) -> Self {
        set.to_strings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!(Tag::parse("env=prod"), Tag::new("env", "prod"));
        assert_eq!(Tag::parse("a=b=c"), Tag::new("a", "b=c"));
        assert_eq!(Tag::parse("pinned"), Tag::flag("pinned"));
        assert_eq!(Tag::parse("empty="), Tag::new("empty", ""));

        for raw in ["env=prod", "pinned", "empty=", "a=b=c"] {
            assert_eq!(Tag::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_later_entries_win_in_place() {
        let set = TagSet::from_strings(["a=1", "b=2", "a=3"]);
        assert_eq!(set.to_strings(), vec!["a=3", "b=2"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_strict_rejects_duplicates() {
        assert_eq!(
            TagSet::from_strings_strict(["a=1", "b", "a=2"]),
            Err("a".to_string())
        );
        let set = TagSet::from_strings_strict(["a=1", "b"]).unwrap();
        assert_eq!(set.to_strings(), vec!["a=1", "b"]);
    }

    #[test]
    fn test_machine_binding() {
        let mut set = TagSet::from_strings(["env=prod"]);
        assert!(!set.is_machine_bound());
        assert_eq!(set.machine_id(), None);

        set.insert(Tag::new(MACHINE_ID, "m-1"));
        set.insert(Tag::new(MACHINE_ID, "m-2"));
        assert!(set.is_machine_bound());
        assert_eq!(set.machine_id(), Some("m-2"));
        assert_eq!(set.len(), 2);

        set.remove(MACHINE_ID);
        assert!(!set.is_machine_bound());
    }

    #[test]
    fn test_contains_all() {
        let set = TagSet::from_strings(["a=1", "b=2", "c"]);
        assert!(set.contains_all(&TagSet::from_strings(["a=1", "c"])));
        assert!(!set.contains_all(&TagSet::from_strings(["a=2"])));
        assert!(set.contains_all(&TagSet::new()));
    }

    #[test]
    fn test_serde_uses_wire_strings() {
        let set = TagSet::from_strings(["a=1", "b"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["a=1","b"]"#);
        let back: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
