//! # Relation Classifier
//!
//! Maps a statement's text to the kind of symmetric relationship its
//! mentions establish. Classifiers are pure and infallible: anything they
//! cannot decide falls back to `RelationshipKind::DEFAULT`.

use crate::RelationshipKind;
use serde::{Deserialize, Serialize};

/// Black-box text -> relationship kind function.
pub trait RelationClassifier: Send + Sync {
    /// Classify a statement text. Must not fail.
    fn classify(&self, text: &str) -> RelationshipKind;
}

/// Classifier that always yields the generic `ASSOCIATED_WITH` kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl RelationClassifier for DefaultClassifier {
    fn classify(&self, _text: &str) -> RelationshipKind {
        RelationshipKind::default()
    }
}

/// A single keyword rule: if the text contains `keyword`, the kind is `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub kind: String,
}

/// Ordered keyword rules, matched case-insensitively. First match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordClassifier {
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    #[must_use]
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// Append a rule, builder style.
    #[must_use]
    pub fn with_rule(mut self, keyword: &str, kind: &str) -> Self {
        self.rules.push(KeywordRule {
            keyword: keyword.to_string(),
            kind: kind.to_string(),
        });
        self
    }
}

impl RelationClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> RelationshipKind {
        let haystack = text.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| !rule.keyword.is_empty())
            .find(|rule| haystack.contains(&rule.keyword.to_lowercase()))
            .map(|rule| RelationshipKind(rule.kind.clone()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classifier_is_generic() {
        assert_eq!(
            DefaultClassifier.classify("anything").as_str(),
            RelationshipKind::DEFAULT
        );
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let classifier = KeywordClassifier::default().with_rule("married", "MARRIED_TO");
        let kind = classifier.classify("Married @Anna in Venice on 26.05.2023");
        assert_eq!(kind.as_str(), "MARRIED_TO");
    }

    #[test]
    fn first_matching_rule_wins() {
        let classifier = KeywordClassifier::default()
            .with_rule("works", "WORKS_WITH")
            .with_rule("with", "KNOWS");
        assert_eq!(classifier.classify("works with Bob").as_str(), "WORKS_WITH");
        assert_eq!(classifier.classify("lunch with Bob").as_str(), "KNOWS");
    }

    #[test]
    fn no_match_falls_back_to_default() {
        let classifier = KeywordClassifier::default().with_rule("married", "MARRIED_TO");
        assert_eq!(
            classifier.classify("has a dog").as_str(),
            RelationshipKind::DEFAULT
        );
    }

    #[test]
    fn empty_keyword_never_matches() {
        let classifier = KeywordClassifier::default().with_rule("", "KNOWS");
        assert_eq!(classifier.classify("text").as_str(), RelationshipKind::DEFAULT);
    }
}
