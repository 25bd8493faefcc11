//! Header classifier
//!
//! Exact-match classification over parsed header fields.

use super::{Priority, RuleKey};
use crate::block::{check_input, Block, BlockKind, Routed};
use crate::error::{GraphValidationError, NoMatchingRuleError, ProcessError};
use crate::header::HeaderMatch;
use crate::packet::{Packet, PacketHeaders};
use serde::Serialize;

/// One header classification rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderClassifierRule {
    pub header_match: HeaderMatch,
    pub priority: Priority,
    pub order: u32,
    /// Output port; defaults to the rule's position in the declared list
    pub output_port: Option<usize>,
}

impl HeaderClassifierRule {
    pub fn builder() -> HeaderClassifierRuleBuilder {
        HeaderClassifierRuleBuilder::default()
    }

    #[inline]
    pub fn is_catch_all(&self) -> bool {
        self.header_match.is_catch_all()
    }
}

/// Builder for [`HeaderClassifierRule`]
#[derive(Debug, Default)]
pub struct HeaderClassifierRuleBuilder {
    header_match: HeaderMatch,
    priority: Priority,
    order: u32,
    output_port: Option<usize>,
}

impl HeaderClassifierRuleBuilder {
    pub fn header_match(mut self, m: HeaderMatch) -> Self {
        self.header_match = m;
        self
    }

    pub fn priority(mut self, p: Priority) -> Self {
        self.priority = p;
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn output_port(mut self, port: usize) -> Self {
        self.output_port = Some(port);
        self
    }

    pub fn build(self) -> HeaderClassifierRule {
        HeaderClassifierRule {
            header_match: self.header_match,
            priority: self.priority,
            order: self.order,
            output_port: self.output_port,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CompiledRule {
    #[serde(skip)]
    key: RuleKey,
    priority: Priority,
    order: u32,
    port: usize,
    #[serde(rename = "match")]
    header_match: HeaderMatch,
}

/// Rules sorted into evaluation order
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct HeaderRuleSet {
    rules: Vec<CompiledRule>,
}

impl HeaderRuleSet {
    /// Sort rules by `(priority desc, order asc)`. Rules with identical keys
    /// keep their declaration sequence.
    pub fn new(rules: Vec<HeaderClassifierRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .enumerate()
            .map(|(idx, r)| CompiledRule {
                key: RuleKey::new(r.priority, r.order),
                priority: r.priority,
                order: r.order,
                port: r.output_port.unwrap_or(idx),
                header_match: r.header_match,
            })
            .collect();
        compiled.sort_by_key(|r| r.key);
        Self { rules: compiled }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of output ports the rules address
    pub fn port_count(&self) -> usize {
        self.rules.iter().map(|r| r.port.saturating_add(1)).max().unwrap_or(0)
    }

    /// Require exactly one catch-all, ranked after every exact rule, and
    /// ports that leave room for a port count
    pub fn validate(&self, owner: &str) -> Result<(), GraphValidationError> {
        if self.rules.is_empty() {
            return Err(GraphValidationError::EmptyRuleSet(owner.to_string()));
        }
        if let Some(r) = self.rules.iter().find(|r| r.port.checked_add(1).is_none()) {
            return Err(GraphValidationError::RulePortOutOfRange {
                block: owner.to_string(),
                port: r.port,
            });
        }

        let catch_alls = self.rules.iter().filter(|r| r.header_match.is_catch_all()).count();
        match catch_alls {
            0 => Err(GraphValidationError::MissingCatchAll(owner.to_string())),
            1 if self.rules[self.rules.len() - 1].header_match.is_catch_all() => Ok(()),
            1 => Err(GraphValidationError::MissingCatchAll(owner.to_string())),
            _ => Err(GraphValidationError::MultipleCatchAll(owner.to_string())),
        }
    }

    /// Output port of the first matching rule
    #[inline]
    pub fn classify(&self, headers: &PacketHeaders) -> Result<usize, NoMatchingRuleError> {
        self.rules
            .iter()
            .find(|r| r.header_match.matches(headers))
            .map(|r| r.port)
            .ok_or(NoMatchingRuleError)
    }
}

/// Header classifier block: one input, one output per addressed port
#[derive(Debug)]
pub struct HeaderClassifier {
    name: String,
    rules: HeaderRuleSet,
    priority: Priority,
    output_ports: usize,
}

impl HeaderClassifier {
    pub fn new(
        name: impl Into<String>,
        rules: Vec<HeaderClassifierRule>,
        priority: Priority,
    ) -> Result<Self, GraphValidationError> {
        let name = name.into();
        let rules = HeaderRuleSet::new(rules);
        rules.validate(&name)?;
        let output_ports = rules.port_count();

        tracing::debug!(block = %name, rules = rules.len(), ports = output_ports, "Header classifier built");

        Ok(Self {
            name,
            rules,
            priority,
            output_ports,
        })
    }

    pub fn rules(&self) -> &HeaderRuleSet {
        &self.rules
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl Block for HeaderClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::HeaderClassifier
    }

    fn input_ports(&self) -> usize {
        1
    }

    fn output_ports(&self) -> usize {
        self.output_ports
    }

    fn process(&mut self, input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        check_input(input_port, 1)?;
        let port = self.rules.classify(packet.headers())?;
        Ok(vec![Routed::new(port, packet)])
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "priority": self.priority,
            "rules": self.rules,
        })
    }
}
