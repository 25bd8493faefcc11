//! Regex (payload) classifier
//!
//! Pattern `i` owns output port `i`. The last pattern must match every
//! payload and owns the pass-through port, so packets no real rule matches
//! are forwarded instead of silently dropped.

use super::matcher::{compile_patterns, is_catch_all_compiled, MatchStrategy, PayloadMatcher};
use super::Priority;
use crate::block::{check_input, Block, BlockKind, Routed};
use crate::error::{Error, GraphValidationError, ProcessError};
use crate::packet::Packet;

/// Payload classifier block: one input, one output per pattern
pub struct RegexClassifier {
    name: String,
    patterns: Vec<String>,
    priority: Priority,
    strategy: MatchStrategy,
    /// Matcher over every pattern except the trailing catch-all
    matcher: Box<dyn PayloadMatcher>,
}

impl RegexClassifier {
    /// Build with the default matching strategy
    pub fn new(
        name: impl Into<String>,
        patterns: Vec<String>,
        priority: Priority,
    ) -> Result<Self, Error> {
        Self::with_strategy(name, patterns, priority, MatchStrategy::default())
    }

    pub fn with_strategy(
        name: impl Into<String>,
        patterns: Vec<String>,
        priority: Priority,
        strategy: MatchStrategy,
    ) -> Result<Self, Error> {
        let name = name.into();
        let mut compiled = compile_patterns(&patterns)?;

        let last = match (patterns.last(), compiled.last()) {
            (Some(p), Some(re)) => is_catch_all_compiled(p, re),
            _ => return Err(GraphValidationError::EmptyRuleSet(name).into()),
        };
        if !last {
            return Err(GraphValidationError::MissingCatchAll(name).into());
        }

        compiled.pop();
        let real = &patterns[..patterns.len() - 1];
        let matcher = strategy.build(real, compiled);

        tracing::debug!(
            block = %name,
            patterns = patterns.len(),
            engine = matcher.name(),
            "Regex classifier built"
        );

        Ok(Self {
            name,
            patterns,
            priority,
            strategy,
            matcher,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Port taken by packets no real rule matches
    pub fn default_port(&self) -> usize {
        self.patterns.len() - 1
    }

    pub fn engine(&self) -> &'static str {
        self.matcher.name()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Output port for a payload
    #[inline]
    pub fn classify(&self, payload: &[u8]) -> usize {
        self.matcher.first_match(payload).unwrap_or_else(|| self.default_port())
    }
}

impl std::fmt::Debug for RegexClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegexClassifier")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("priority", &self.priority)
            .field("engine", &self.matcher.name())
            .finish()
    }
}

impl Block for RegexClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::RegexClassifier
    }

    fn input_ports(&self) -> usize {
        1
    }

    fn output_ports(&self) -> usize {
        self.patterns.len()
    }

    fn process(&mut self, input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        check_input(input_port, 1)?;
        let port = self.classify(packet.payload());
        Ok(vec![Routed::new(port, packet)])
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "pattern": self.patterns,
            "priority": self.priority,
            "strategy": self.strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_port_per_pattern() {
        let rc = RegexClassifier::new("rc", pats(&["abc.*", "xyz", ".*"]), Priority::HIGH).unwrap();

        assert_eq!(rc.output_ports(), 3);
        assert_eq!(rc.classify(b"abcdef"), 0);
        assert_eq!(rc.classify(b"xyz"), 1);
        assert_eq!(rc.classify(b"hello"), 2);
    }

    #[test]
    fn test_every_strategy_agrees() {
        let patterns = pats(&["GET /admin", "passwd", "cmd\\.exe", ".*"]);
        let payloads: [&[u8]; 5] = [b"GET /admin HTTP/1.1", b"cat /etc/passwd", b"run cmd.exe", b"cmdxexe", b""];

        let strategies = [
            MatchStrategy::Sequential,
            MatchStrategy::RegexSet,
            MatchStrategy::Literal,
            MatchStrategy::Auto,
        ];
        let expected = [0, 1, 2, 3, 3];

        for strategy in strategies {
            let rc = RegexClassifier::with_strategy("rc", patterns.clone(), Priority::HIGH, strategy).unwrap();
            for (payload, want) in payloads.iter().zip(expected) {
                assert_eq!(rc.classify(payload), want, "{:?} on {:?}", strategy, payload);
            }
        }
    }

    #[test]
    fn test_literal_engine_for_plain_rules() {
        let rc = RegexClassifier::new("rc", pats(&["evil", "worse", ".*"]), Priority::HIGH).unwrap();
        assert_eq!(rc.engine(), "literal");
        assert_eq!(rc.classify(b"worse than evil"), 0);
    }

    #[test]
    fn test_only_catch_all() {
        let rc = RegexClassifier::new("rc", pats(&[".*"]), Priority::HIGH).unwrap();
        assert_eq!(rc.output_ports(), 1);
        assert_eq!(rc.classify(b"anything"), 0);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = RegexClassifier::new("rc", pats(&["ok", "[unclosed", ".*"]), Priority::HIGH).unwrap_err();
        match err {
            Error::Pattern(e) => assert_eq!(e.index, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_catch_all_rejected() {
        let err = RegexClassifier::new("rc", pats(&["abc", "xyz"]), Priority::HIGH).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphValidationError::MissingCatchAll(_))));

        let err = RegexClassifier::new("rc", vec![], Priority::HIGH).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphValidationError::EmptyRuleSet(_))));
    }

    #[test]
    fn test_routes_packet_payload() {
        use crate::packet::PacketBuilder;

        let mut rc = RegexClassifier::new("rc", pats(&["attack", ".*"]), Priority::HIGH).unwrap();
        let out = rc.process(0, PacketBuilder::tcp().payload(b"an attack payload").build()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].port, 0);
    }
}
