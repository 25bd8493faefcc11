//! Payload matching engines
//!
//! Every engine answers the same question: the lowest index of a pattern
//! found anywhere in the payload. The regex classifier can therefore swap
//! engines without changing a single routing decision.

use crate::error::PatternCompileError;
use aho_corasick::AhoCorasick;
use regex::bytes::{Regex, RegexSet};
use regex_syntax::ParserBuilder;
use serde::{Deserialize, Serialize};

/// Multi-pattern payload matcher
pub trait PayloadMatcher: Send + Sync {
    /// Lowest index of a matching pattern
    fn first_match(&self, payload: &[u8]) -> Option<usize>;

    /// Number of patterns
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name(&self) -> &'static str;
}

/// Matching engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// One regex at a time, stop at the first hit
    Sequential,
    /// Single pass over all patterns
    RegexSet,
    /// Aho-Corasick over plain literals
    Literal,
    /// Literal when every pattern is a plain literal, RegexSet otherwise
    #[default]
    Auto,
}

impl MatchStrategy {
    /// Build a matcher from patterns already validated by [`compile_patterns`]
    pub(crate) fn build(self, patterns: &[String], compiled: Vec<Regex>) -> Box<dyn PayloadMatcher> {
        let all_literal = patterns.iter().all(|p| is_literal(p));

        match self {
            Self::Sequential => Box::new(SequentialMatcher::from_compiled(compiled)),
            Self::Literal | Self::Auto if all_literal => match LiteralMatcher::new(patterns) {
                Some(m) => Box::new(m),
                None => Self::RegexSet.build(patterns, compiled),
            },
            Self::Literal => {
                tracing::debug!("Non-literal patterns present, using regex set");
                Self::RegexSet.build(patterns, compiled)
            }
            Self::RegexSet | Self::Auto => match RegexSet::new(patterns) {
                Ok(set) => Box::new(RegexSetMatcher { set }),
                Err(e) => {
                    tracing::warn!(error = %e, patterns = patterns.len(), "Regex set build failed, matching sequentially");
                    Box::new(SequentialMatcher::from_compiled(compiled))
                }
            },
        }
    }
}

/// Compile every pattern on its own so a failure names its position
pub(crate) fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, PatternCompileError> {
    patterns
        .iter()
        .enumerate()
        .map(|(index, p)| {
            Regex::new(p).map_err(|source| PatternCompileError {
                index,
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Pattern has no regex metacharacters
fn is_literal(pattern: &str) -> bool {
    regex::escape(pattern) == pattern
}

/// A pattern matches every payload when it matches the empty payload and
/// carries no anchor or word-boundary assertion.
pub fn is_catch_all_pattern(pattern: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => is_catch_all_compiled(pattern, &re),
        Err(_) => false,
    }
}

pub(crate) fn is_catch_all_compiled(pattern: &str, re: &Regex) -> bool {
    if !re.is_match(b"") {
        return false;
    }
    // Look-around is read from the parsed pattern, so `[^x]*` still counts
    // and an escaped `\^` is a plain literal
    match ParserBuilder::new().utf8(false).build().parse(pattern) {
        Ok(hir) => hir.properties().look_set().is_empty(),
        Err(_) => false,
    }
}

/// Evaluates patterns in list order with early termination
#[derive(Debug, Clone)]
pub struct SequentialMatcher {
    regexes: Vec<Regex>,
}

impl SequentialMatcher {
    pub fn new(patterns: &[String]) -> Result<Self, PatternCompileError> {
        Ok(Self::from_compiled(compile_patterns(patterns)?))
    }

    fn from_compiled(regexes: Vec<Regex>) -> Self {
        Self { regexes }
    }
}

impl PayloadMatcher for SequentialMatcher {
    #[inline]
    fn first_match(&self, payload: &[u8]) -> Option<usize> {
        self.regexes.iter().position(|re| re.is_match(payload))
    }

    fn len(&self) -> usize {
        self.regexes.len()
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Single-pass multi-pattern matcher
#[derive(Debug, Clone)]
pub struct RegexSetMatcher {
    set: RegexSet,
}

impl RegexSetMatcher {
    pub fn new(patterns: &[String]) -> Result<Self, PatternCompileError> {
        compile_patterns(patterns)?;
        let set = RegexSet::new(patterns).map_err(|source| PatternCompileError {
            index: 0,
            pattern: patterns.join("|"),
            source,
        })?;
        Ok(Self { set })
    }
}

impl PayloadMatcher for RegexSetMatcher {
    #[inline]
    fn first_match(&self, payload: &[u8]) -> Option<usize> {
        self.set.matches(payload).iter().next()
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn name(&self) -> &'static str {
        "regex_set"
    }
}

/// Aho-Corasick over plain literal patterns
#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    ac: AhoCorasick,
    len: usize,
}

impl LiteralMatcher {
    /// `None` if a pattern is not a plain literal or the automaton cannot
    /// be built
    pub fn new(patterns: &[String]) -> Option<Self> {
        if !patterns.iter().all(|p| is_literal(p)) {
            return None;
        }
        let ac = AhoCorasick::new(patterns).ok()?;
        Some(Self { ac, len: patterns.len() })
    }
}

impl PayloadMatcher for LiteralMatcher {
    #[inline]
    fn first_match(&self, payload: &[u8]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for m in self.ac.find_overlapping_iter(payload) {
            let idx = m.pattern().as_usize();
            if best.map_or(true, |b| idx < b) {
                best = Some(idx);
                if idx == 0 {
                    break;
                }
            }
        }
        best
    }

    fn len(&self) -> usize {
        self.len
    }

    fn name(&self) -> &'static str {
        "literal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lowest_index_wins() {
        let patterns = pats(&["needle", "hay", "stack"]);
        let payload = b"haystack with a needle";

        let seq = SequentialMatcher::new(&patterns).unwrap();
        let set = RegexSetMatcher::new(&patterns).unwrap();
        let lit = LiteralMatcher::new(&patterns).unwrap();

        assert_eq!(seq.first_match(payload), Some(0));
        assert_eq!(set.first_match(payload), Some(0));
        assert_eq!(lit.first_match(payload), Some(0));

        assert_eq!(lit.first_match(b"stack then hay"), Some(1));
        assert_eq!(lit.first_match(b"nothing"), None);
    }

    #[test]
    fn test_literal_detection() {
        assert!(is_literal("GET /admin"));
        assert!(!is_literal("abc.*"));
        assert!(LiteralMatcher::new(&pats(&["a+b"])).is_none());
    }

    #[test]
    fn test_auto_picks_engine() {
        let literals = pats(&["foo", "bar"]);
        let m = MatchStrategy::Auto.build(&literals, compile_patterns(&literals).unwrap());
        assert_eq!(m.name(), "literal");

        let regexes = pats(&["fo+", "bar"]);
        let m = MatchStrategy::Auto.build(&regexes, compile_patterns(&regexes).unwrap());
        assert_eq!(m.name(), "regex_set");

        let m = MatchStrategy::Literal.build(&regexes, compile_patterns(&regexes).unwrap());
        assert_eq!(m.name(), "regex_set");
    }

    #[test]
    fn test_compile_error_names_index() {
        let err = compile_patterns(&pats(&["ok", "(unclosed"])).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.pattern, "(unclosed");
    }

    #[test]
    fn test_catch_all_detection() {
        assert!(is_catch_all_pattern(".*"));
        assert!(is_catch_all_pattern("(?s).*"));
        assert!(is_catch_all_pattern(""));
        assert!(!is_catch_all_pattern("^$"));
        assert!(!is_catch_all_pattern("abc"));
        assert!(!is_catch_all_pattern("\\b"));
        assert!(!is_catch_all_pattern("(bad"));
        assert!(!is_catch_all_pattern("(?m)x*$"));
        assert!(!is_catch_all_pattern("\\^"));
        assert!(is_catch_all_pattern("[^x]*"));
        assert!(is_catch_all_pattern("(\\^)?"));
    }
}
