//! Classification
//!
//! Classifier blocks pick exactly one output port per packet by scanning
//! an ordered rule list and stopping at the first match. Evaluation order
//! is the explicit key `(priority descending, order ascending)`; the last
//! rule in that order is always a catch-all so routing is total.

mod header;
mod matcher;
mod payload;

pub use self::header::{HeaderClassifier, HeaderClassifierRule, HeaderClassifierRuleBuilder, HeaderRuleSet};
pub use self::matcher::{
    is_catch_all_pattern, LiteralMatcher, MatchStrategy, PayloadMatcher, RegexSetMatcher,
    SequentialMatcher,
};
pub use self::payload::RegexClassifier;

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

/// Rule or block priority. Higher values are evaluated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u16);

impl Priority {
    pub const LOW: Priority = Priority(100);
    pub const MEDIUM: Priority = Priority(200);
    pub const HIGH: Priority = Priority(300);

    pub const fn new(level: u16) -> Self {
        Self(level)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LOW => f.write_str("LOW"),
            Self::MEDIUM => f.write_str("MEDIUM"),
            Self::HIGH => f.write_str("HIGH"),
            Self(n) => write!(f, "{}", n),
        }
    }
}

/// Total evaluation order of a rule: sorting ascending by this key yields
/// highest priority first, then lowest order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuleKey(Reverse<Priority>, u32);

impl RuleKey {
    pub fn new(priority: Priority, order: u32) -> Self {
        Self(Reverse(priority), order)
    }
}
