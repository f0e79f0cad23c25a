//! Intent routing — pattern rules mapping raw instructions to structured intents.

pub mod router;
pub mod rules;

pub use router::{Intent, IntentRouter, IntentRule, RuleSet};
