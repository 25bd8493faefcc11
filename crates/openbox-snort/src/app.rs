//! Snort application
//!
//! ```text
//! [input] ─► [HeaderClassifier] ─0 (tcp src 80)─► [RegexClassifier] ─0..n-2─► [Alert] ─► [Discard]
//!                               └1──────────────► [output] ◄─────── n-1 ───┘
//! ```
//!
//! Web traffic is inspected; a rule hit raises an alert and is dropped,
//! everything else is forwarded to the output.

use crate::config::{ConfigWarning, SnortConfig};
use crate::rules::{read_rules, RuleFileError};
use crossbeam::channel::Sender;
use openbox_core::blocks::{ChannelNotifier, Notification};
use openbox_core::{
    Alert, AlertConfig, Block, BoxApplication, Connector, Discard, FromDevice, FromDump, HeaderClassifier,
    HeaderClassifierRule, HeaderField, HeaderMatch, InstanceInfo, PacketSink, PacketSource, Priority,
    ProcessingGraph, RegexClassifier, Result, Severity, Statement, StaticTopology, ToDevice, ToDump,
    TopologyResolver, TransportPort,
};

pub const APP_NAME: &str = "Snort";

pub const FROM_DEVICE: &str = "FromDevice_Snort";
pub const FROM_DUMP: &str = "FromDump_Snort";
pub const TO_DEVICE: &str = "ToDevice_Snort";
pub const TO_DUMP: &str = "ToDump_Snort";
pub const HEADER_CLASSIFIER: &str = "HeaderClassifier_Snort";
pub const REGEX_CLASSIFIER: &str = "RegexClassifier_Snort";
pub const ALERT: &str = "Alert_Snort";
pub const DISCARD: &str = "Discard_Snort";

const ALERT_MESSAGE: &str = "Alert from Snort";

/// Intrusion detection application
pub struct SnortApp {
    config: SnortConfig,
    topology: Box<dyn TopologyResolver>,
    config_warnings: Vec<ConfigWarning>,
    rule_warning: Option<RuleFileError>,
    source: Option<Box<dyn PacketSource>>,
    sink: Option<Box<dyn PacketSink>>,
    alerts: Option<Sender<Notification>>,
    instances: Vec<InstanceInfo>,
}

impl SnortApp {
    pub fn new(config: SnortConfig) -> Self {
        config.log_summary();
        Self {
            config,
            topology: Box::new(StaticTopology::open()),
            config_warnings: Vec::new(),
            rule_warning: None,
            source: None,
            sink: None,
            alerts: None,
            instances: Vec::new(),
        }
    }

    /// Keep the warnings produced while loading the configuration
    pub fn with_config_warnings(mut self, warnings: Vec<ConfigWarning>) -> Self {
        self.config_warnings = warnings;
        self
    }

    pub fn with_topology(mut self, topology: impl TopologyResolver + 'static) -> Self {
        self.topology = Box::new(topology);
        self
    }

    /// Bind the capture or replay handle of the input block
    pub fn with_source(mut self, source: impl PacketSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Bind the transmit or dump handle of the output block
    pub fn with_sink(mut self, sink: impl PacketSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Deliver alerts to a collector instead of the log
    pub fn with_alert_channel(mut self, sender: Sender<Notification>) -> Self {
        self.alerts = Some(sender);
        self
    }

    pub fn config(&self) -> &SnortConfig {
        &self.config
    }

    pub fn config_warnings(&self) -> &[ConfigWarning] {
        &self.config_warnings
    }

    /// Set when the last graph build could not read the rule file
    pub fn rule_warning(&self) -> Option<&RuleFileError> {
        self.rule_warning.as_ref()
    }

    pub fn instances(&self) -> &[InstanceInfo] {
        &self.instances
    }

    /// Assemble the processing graph from the configuration and rule file
    pub fn build_graph(&mut self) -> Result<ProcessingGraph> {
        let rules = read_rules(&self.config.rule_file);
        let regex_rules = rules.patterns;
        self.rule_warning = rules.warning;

        let header_rules = vec![
            HeaderClassifierRule::builder()
                .header_match(
                    HeaderMatch::builder()
                        .exact(HeaderField::TcpSrc, TransportPort(80))
                        .build()?,
                )
                .priority(Priority::HIGH)
                .order(0)
                .build(),
            HeaderClassifierRule::builder()
                .header_match(HeaderMatch::any())
                .priority(Priority::MEDIUM)
                .order(1)
                .build(),
        ];

        let from: Box<dyn Block> = match (self.config.in_use_ifc, self.source.take()) {
            (true, Some(src)) => Box::new(FromDevice::new(FROM_DEVICE, &self.config.in_ifc, true, true).with_source(src)),
            (true, None) => Box::new(FromDevice::new(FROM_DEVICE, &self.config.in_ifc, true, true)),
            (false, Some(src)) => Box::new(FromDump::new(FROM_DUMP, &self.config.in_dump, false, true).with_source(src)),
            (false, None) => Box::new(FromDump::new(FROM_DUMP, &self.config.in_dump, false, true)),
        };
        let to: Box<dyn Block> = match (self.config.out_use_ifc, self.sink.take()) {
            (true, Some(sink)) => Box::new(ToDevice::new(TO_DEVICE, &self.config.out_ifc).with_sink(sink)),
            (true, None) => Box::new(ToDevice::new(TO_DEVICE, &self.config.out_ifc)),
            (false, Some(sink)) => Box::new(ToDump::new(TO_DUMP, &self.config.out_dump).with_sink(sink)),
            (false, None) => Box::new(ToDump::new(TO_DUMP, &self.config.out_dump)),
        };
        let from_name = from.name().to_string();
        let to_name = to.name().to_string();

        let classify = HeaderClassifier::new(HEADER_CLASSIFIER, header_rules, Priority::HIGH)?;
        let regex = RegexClassifier::new(REGEX_CLASSIFIER, regex_rules, Priority::HIGH)?;
        let default_port = regex.default_port();

        let mut builder = ProcessingGraph::builder()
            .boxed_block(from)
            .boxed_block(to)
            .block(regex)
            .block(classify)
            .block(Discard::new(DISCARD))
            .connector(Connector::new(&from_name, 0, HEADER_CLASSIFIER))
            .connector(Connector::new(HEADER_CLASSIFIER, 0, REGEX_CLASSIFIER))
            .connector(Connector::new(HEADER_CLASSIFIER, 1, &to_name));

        let post_regex = if self.config.alert {
            let alert = Alert::new(
                ALERT,
                AlertConfig {
                    message: ALERT_MESSAGE.into(),
                    severity: Severity::Medium,
                    max_per_window: 1,
                    window_ms: 1000,
                    attach_packet: true,
                    ..Default::default()
                },
            );
            let alert = match self.alerts.clone() {
                Some(tx) => alert.with_notifier(ChannelNotifier::new(tx)),
                None => alert,
            };
            builder = builder.block(alert).connector(Connector::new(ALERT, 0, DISCARD));
            ALERT
        } else {
            DISCARD
        };

        for port in 0..default_port {
            builder = builder.connector(Connector::new(REGEX_CLASSIFIER, port, post_regex));
        }
        // Unmatched payloads are forwarded, not dropped
        builder = builder.connector(Connector::new(REGEX_CLASSIFIER, default_port, &to_name));

        Ok(builder.root(from_name).build()?)
    }
}

impl BoxApplication for SnortApp {
    fn name(&self) -> &str {
        APP_NAME
    }

    fn statements(&mut self) -> Result<Vec<Statement>> {
        let location = self.topology.resolve(self.config.segment)?;
        let graph = self.build_graph()?;
        Ok(vec![Statement::new(location, graph)])
    }

    fn handle_app_start(&mut self) {
        tracing::info!(app = APP_NAME, "Got app start event");
    }

    fn handle_instance_up(&mut self, instance: &InstanceInfo) {
        tracing::info!(app = APP_NAME, location = %instance.location, blocks = instance.blocks, "Instance up");
        self.instances.push(instance.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openbox_core::{launch, Executor, JsonDeployer, LocalDeployer, MemorySink, MemorySource, PacketBuilder};
    use std::io::Write;

    fn rule_file(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", lines).unwrap();
        file
    }

    fn config(rules: &tempfile::NamedTempFile) -> SnortConfig {
        SnortConfig {
            rule_file: rules.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_graph_shape_with_alert() {
        let rules = rule_file("passwd\nroot\n");
        let mut app = SnortApp::new(config(&rules));
        let graph = app.build_graph().unwrap();

        assert_eq!(graph.root_name(), FROM_DEVICE);
        assert_eq!(graph.len(), 6);
        let regex = graph.index_of(REGEX_CLASSIFIER).unwrap();
        let alert = graph.index_of(ALERT).unwrap();
        let to = graph.index_of(TO_DEVICE).unwrap();
        assert_eq!(graph.successors(regex, 0)[0].block, alert);
        assert_eq!(graph.successors(regex, 1)[0].block, alert);
        assert_eq!(graph.successors(regex, 2)[0].block, to);
        assert!(app.rule_warning().is_none());
    }

    #[test]
    fn test_graph_without_alert_uses_dumps() {
        let rules = rule_file("passwd\n");
        let mut app = SnortApp::new(SnortConfig {
            alert: false,
            in_use_ifc: false,
            out_use_ifc: false,
            ..config(&rules)
        });
        let graph = app.build_graph().unwrap();

        assert_eq!(graph.root_name(), FROM_DUMP);
        assert!(graph.block_by_name(ALERT).is_none());
        assert!(graph.block_by_name(TO_DUMP).is_some());
        let regex = graph.index_of(REGEX_CLASSIFIER).unwrap();
        assert_eq!(graph.successors(regex, 0)[0].block, graph.index_of(DISCARD).unwrap());
    }

    #[test]
    fn test_missing_rule_file_forwards_everything() {
        let dir = tempfile::tempdir().unwrap();
        let out = MemorySink::new();
        let mut app = SnortApp::new(SnortConfig {
            rule_file: dir.path().join("missing.txt"),
            ..Default::default()
        })
        .with_sink(out.clone());

        let graph = app.build_graph().unwrap();
        assert!(app.rule_warning().is_some());
        let regex = graph.block_by_name(REGEX_CLASSIFIER).unwrap();
        assert_eq!(regex.output_ports(), 1);

        let mut exec = Executor::new(graph);
        for payload in ["GET /etc/passwd", "hello"] {
            let trace = exec.process(PacketBuilder::tcp().src_port(80).payload(payload).build());
            assert_eq!(trace.ports_at(REGEX_CLASSIFIER), Some(&[0][..]));
            assert!(trace.consumed_at(TO_DEVICE));
        }
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_web_rule_hit_alerts_and_drops() {
        let rules = rule_file("passwd\n");
        let (tx, rx) = crossbeam::channel::bounded(8);
        let out = MemorySink::new();
        let mut app = SnortApp::new(config(&rules)).with_sink(out.clone()).with_alert_channel(tx);
        let mut exec = Executor::new(app.build_graph().unwrap());

        let hit = exec.process(PacketBuilder::tcp().src_port(80).payload("GET /etc/passwd").build());
        assert_eq!(hit.visited(), vec![FROM_DEVICE, HEADER_CLASSIFIER, REGEX_CLASSIFIER, ALERT, DISCARD]);

        let miss = exec.process(PacketBuilder::tcp().src_port(80).payload("GET /index.html").build());
        assert!(miss.consumed_at(TO_DEVICE));

        let other = exec.process(PacketBuilder::tcp().src_port(443).payload("passwd").build());
        assert_eq!(other.visited(), vec![FROM_DEVICE, HEADER_CLASSIFIER, TO_DEVICE]);

        let alerts: Vec<_> = rx.try_iter().collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, ALERT_MESSAGE);
        assert!(alerts[0].excerpt.is_some());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_launch_local() {
        let rules = rule_file("attack\n");
        let packets = vec![
            PacketBuilder::tcp().src_port(80).payload("attack").build(),
            PacketBuilder::tcp().src_port(80).payload("benign").build(),
            PacketBuilder::udp().src_port(53).build(),
        ];
        let out = MemorySink::new();
        let mut app = SnortApp::new(config(&rules))
            .with_source(MemorySource::new(packets))
            .with_sink(out.clone());

        let mut deployments = launch(&mut app, &mut LocalDeployer::default()).unwrap();
        assert_eq!(app.instances().len(), 1);
        assert_eq!(app.instances()[0].location.segment(), 220);

        let dep = &mut deployments[0];
        dep.wait_ingress();
        let report = dep.shutdown();
        assert_eq!(report.completed, 3);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_launch_json_descriptor() {
        let rules = rule_file("a\nb\nc\n");
        let mut app = SnortApp::new(config(&rules));
        let mut deployer = JsonDeployer::new(Vec::new());

        let descs = launch(&mut app, &mut deployer).unwrap();
        let desc = &descs[0];

        assert_eq!(desc.root, FROM_DEVICE);
        let regex = desc.blocks.iter().find(|b| b.name == REGEX_CLASSIFIER).unwrap();
        assert_eq!(regex.output_ports, 4);
        // 3 fixed + alert->discard + 4 regex ports
        assert_eq!(desc.connectors.len(), 8);

        let written: serde_json::Value = serde_json::from_slice(&deployer.into_inner()).unwrap();
        assert_eq!(written["root"], FROM_DEVICE);
        assert_eq!(written["connectors"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_unknown_segment_fails() {
        let rules = rule_file("");
        let mut app = SnortApp::new(config(&rules)).with_topology(StaticTopology::new());

        assert!(app.statements().is_err());
    }
}
