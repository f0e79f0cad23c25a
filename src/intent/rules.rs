//! Default shipping rule set for the intent router.
//!
//! A starting configuration covering common command shapes; deployments load
//! their own rule sets over this via `IntentRouter::load_rules`.

use crate::intent::router::{IntentRule, RuleSet};

/// Build the default rule set.
pub fn default_rules() -> RuleSet {
    let rules = vec![
        IntentRule::new("open_app", r"^open (?P<app>.+)$").unwrap(),
        IntentRule::new(
            "search_web",
            r"^search (?:the web )?for (?P<query>.+)$",
        )
        .unwrap(),
        IntentRule::new(
            "send_message",
            r"^send (?:a )?message to (?P<recipient>\S+)(?: saying (?P<body>.+))?$",
        )
        .unwrap(),
        IntentRule::new("summarize", r"^summari[sz]e (?P<target>.+)$").unwrap(),
        IntentRule::new(
            "schedule_event",
            r"^schedule (?P<event>.+?) (?:at|for) (?P<time>.+)$",
        )
        .unwrap(),
        IntentRule::new("fetch_url", r"^(?:fetch|download) (?P<url>https?://\S+)$").unwrap(),
    ];
    RuleSet::new(1, rules)
}
