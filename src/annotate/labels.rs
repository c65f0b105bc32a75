use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::frame::LabelRef;

/// Per-topic mapping from label key to display text
///
/// Keys are compared as strings, so a numeric defect type `3` and a
/// configured key `"3"` match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(HashMap<String, String>);

/// A label ready to be drawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLabel<'a> {
    pub text: Cow<'a, str>,
    /// False when a key had no entry and the raw key is used instead
    pub resolved: bool,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.0.insert(key.into(), text.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve a label reference, falling back to the raw key
    pub fn resolve<'a>(&'a self, label: &'a LabelRef) -> ResolvedLabel<'a> {
        match label {
            LabelRef::Text(text) => ResolvedLabel {
                text: Cow::Borrowed(text.as_str()),
                resolved: true,
            },
            LabelRef::Key(key) => match self.get(key) {
                Some(text) => ResolvedLabel {
                    text: Cow::Borrowed(text),
                    resolved: true,
                },
                None => ResolvedLabel {
                    text: Cow::Borrowed(key.as_str()),
                    resolved: false,
                },
            },
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_key_and_fallback() {
        let labels: LabelMap = [("5", "Crack")].into_iter().collect();

        let hit = LabelRef::Key("5".to_string());
        let resolved = labels.resolve(&hit);
        assert_eq!(resolved.text, "Crack");
        assert!(resolved.resolved);

        let miss = LabelRef::Key("6".to_string());
        let fallback = labels.resolve(&miss);
        assert_eq!(fallback.text, "6");
        assert!(!fallback.resolved);
    }

    #[test]
    fn test_literal_text_bypasses_map() {
        let labels = LabelMap::new();
        let text = LabelRef::Text("person".to_string());
        assert_eq!(labels.resolve(&text).text, "person");
    }

    #[test]
    fn test_deserialize_from_object() {
        let labels: LabelMap = serde_json::from_str(r#"{"0": "MISSING", "1": "SHORT"}"#).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("1"), Some("SHORT"));
    }
}
