//! OpenBox Snort
//!
//! Intrusion detection on an OpenBox processing graph: web traffic is
//! matched against a payload rule file, hits raise a throttled alert and
//! are dropped, everything else is forwarded.

pub mod app;
pub mod config;
pub mod rules;

pub use app::SnortApp;
pub use config::{ConfigWarning, SnortConfig};
pub use rules::{read_rules, RuleFileError, RuleList};
