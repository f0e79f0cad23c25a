//! Rule-based intent router.
//!
//! Rules are evaluated in configured order; the first match wins and its
//! named capture groups become the intent's parameters. No match falls back
//! to the reserved `unknown` intent — routing never fails, so every input
//! yields an `Intent` for the planner to work with.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// Reserved intent name returned when no rule matches.
pub const FALLBACK_INTENT: &str = "unknown";

/// A routed instruction: matched rule name plus extracted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Matched rule identifier, or `unknown`.
    pub name: String,
    /// The raw instruction as received.
    pub raw_text: String,
    /// Parameters extracted from the rule's named capture groups.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl Intent {
    /// The fallback intent for unmatched input.
    pub fn unknown(raw_text: impl Into<String>) -> Self {
        Self {
            name: FALLBACK_INTENT.to_string(),
            raw_text: raw_text.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Whether this is the fallback intent.
    pub fn is_unknown(&self) -> bool {
        self.name == FALLBACK_INTENT
    }
}

/// A single routing rule: case-insensitive pattern plus an intent name.
///
/// Named capture groups in the pattern become parameter extractors.
#[derive(Debug, Clone)]
pub struct IntentRule {
    /// Intent name assigned on match.
    pub name: String,
    /// Human-readable pattern source (without the case-insensitivity flag).
    pub pattern: String,
    regex: Regex,
}

impl IntentRule {
    /// Compile a rule. The pattern is matched case-insensitively.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: pattern.to_string(),
            regex: Regex::new(&format!("(?i){pattern}"))?,
        })
    }

    /// Try this rule against an input, extracting named-group parameters.
    fn apply(&self, text: &str) -> Option<Intent> {
        let caps = self.regex.captures(text)?;
        let mut parameters = BTreeMap::new();
        for group in self.regex.capture_names().flatten() {
            if let Some(value) = caps.name(group) {
                parameters.insert(group.to_string(), value.as_str().trim().to_string());
            }
        }
        Some(Intent {
            name: self.name.clone(),
            raw_text: text.to_string(),
            parameters,
        })
    }
}

/// An immutable, versioned snapshot of routing rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Monotonic version, bumped by whoever loads new rules.
    pub version: u32,
    rules: Vec<IntentRule>,
}

impl RuleSet {
    /// Build a rule set from ordered rules.
    pub fn new(version: u32, rules: Vec<IntentRule>) -> Self {
        Self { version, rules }
    }

    /// An empty rule set (everything routes to the fallback).
    pub fn empty() -> Self {
        Self {
            version: 0,
            rules: Vec::new(),
        }
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }
}

/// Routes raw instructions against an atomically-swappable rule set.
pub struct IntentRouter {
    active: RwLock<Arc<RuleSet>>,
}

impl IntentRouter {
    /// Create a router over the given rule set.
    pub fn new(ruleset: RuleSet) -> Self {
        Self {
            active: RwLock::new(Arc::new(ruleset)),
        }
    }

    /// Create a router with the default shipping rules.
    pub fn with_default_rules() -> Self {
        Self::new(crate::intent::rules::default_rules())
    }

    /// Route an instruction to an intent. Never fails: unmatched input
    /// yields the reserved fallback intent with no parameters.
    pub async fn route(&self, text: &str) -> Intent {
        // Clone the Arc out so in-flight routing keeps its snapshot even if
        // load_rules swaps the set concurrently.
        let ruleset = self.active.read().await.clone();

        for rule in ruleset.rules() {
            if let Some(intent) = rule.apply(text) {
                debug!(
                    intent = %intent.name,
                    version = ruleset.version,
                    "Instruction matched rule"
                );
                return intent;
            }
        }

        debug!("No rule matched, falling back to unknown intent");
        Intent::unknown(text)
    }

    /// Replace the active rule set atomically. Concurrent `route` calls see
    /// either the old set or the new one, never a partial mix.
    pub async fn load_rules(&self, ruleset: RuleSet) {
        let version = ruleset.version;
        *self.active.write().await = Arc::new(ruleset);
        debug!(version, "Rule set replaced");
    }

    /// Version of the active rule set.
    pub async fn active_version(&self) -> u32 {
        self.active.read().await.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rules() -> RuleSet {
        RuleSet::new(
            1,
            vec![
                IntentRule::new("open_app", r"^open (?P<app>.+)$").unwrap(),
                IntentRule::new("search_web", r"^search for (?P<query>.+)$").unwrap(),
            ],
        )
    }

    #[tokio::test]
    async fn routes_first_matching_rule() {
        let router = IntentRouter::new(test_rules());
        let intent = router.route("open calculator").await;
        assert_eq!(intent.name, "open_app");
        assert_eq!(intent.parameters.get("app").map(String::as_str), Some("calculator"));
    }

    #[tokio::test]
    async fn matching_is_case_insensitive() {
        let router = IntentRouter::new(test_rules());
        let upper = router.route("OPEN calculator").await;
        let mixed = router.route("open Calculator").await;
        assert_eq!(upper.name, "open_app");
        assert_eq!(mixed.name, "open_app");
    }

    #[tokio::test]
    async fn unmatched_input_falls_back_to_unknown() {
        let router = IntentRouter::new(test_rules());
        let intent = router.route("defragment the moon").await;
        assert!(intent.is_unknown());
        assert!(intent.parameters.is_empty());
        assert_eq!(intent.raw_text, "defragment the moon");
    }

    #[tokio::test]
    async fn empty_rule_set_routes_everything_to_unknown() {
        let router = IntentRouter::new(RuleSet::empty());
        assert!(router.route("open calculator").await.is_unknown());
    }

    #[tokio::test]
    async fn rule_order_decides_ties() {
        let ruleset = RuleSet::new(
            1,
            vec![
                IntentRule::new("first", r"^do (?P<thing>.+)$").unwrap(),
                IntentRule::new("second", r"^do (?P<thing>.+) now$").unwrap(),
            ],
        );
        let router = IntentRouter::new(ruleset);
        let intent = router.route("do dishes now").await;
        assert_eq!(intent.name, "first");
    }

    #[tokio::test]
    async fn load_rules_swaps_atomically() {
        let router = IntentRouter::new(test_rules());
        assert_eq!(router.active_version().await, 1);

        let replacement = RuleSet::new(
            2,
            vec![IntentRule::new("greet", r"^hello (?P<name>\S+)$").unwrap()],
        );
        router.load_rules(replacement).await;

        assert_eq!(router.active_version().await, 2);
        assert!(router.route("open calculator").await.is_unknown());
        let intent = router.route("hello world").await;
        assert_eq!(intent.name, "greet");
        assert_eq!(intent.parameters.get("name").map(String::as_str), Some("world"));
    }

    #[tokio::test]
    async fn extracted_parameters_are_trimmed() {
        let router = IntentRouter::new(RuleSet::new(
            1,
            vec![IntentRule::new("open_app", r"^open\s+(?P<app>.+)$").unwrap()],
        ));
        let intent = router.route("open   terminal ").await;
        assert_eq!(intent.parameters.get("app").map(String::as_str), Some("terminal"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(IntentRule::new("bad", r"(unclosed").is_err());
    }

    #[test]
    fn intent_serde_roundtrip() {
        let mut parameters = BTreeMap::new();
        parameters.insert("app".to_string(), "calculator".to_string());
        let intent = Intent {
            name: "open_app".to_string(),
            raw_text: "open calculator".to_string(),
            parameters,
        };
        let json = serde_json::to_string(&intent).unwrap();
        let parsed: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, intent);
    }
}
