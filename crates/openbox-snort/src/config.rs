//! Snort configuration
//!
//! TOML file with per-key fallbacks. A missing file, a file that does not
//! parse, or a single bad value never stops the application; each one falls
//! back to the default and yields a [`ConfigWarning`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "snort.toml";
pub const DEFAULT_SEGMENT: u32 = 220;

/// Non-fatal configuration problem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    #[error("cannot load configuration from {path}: {reason}; using defaults")]
    Unreadable { path: PathBuf, reason: String },

    #[error("cannot parse configuration {path}: {reason}; using defaults")]
    Malformed { path: PathBuf, reason: String },

    #[error("cannot parse segment {0:?}; using default segment {}", DEFAULT_SEGMENT)]
    InvalidSegment(String),

    #[error("invalid value {value} for {key}; using default")]
    InvalidValue { key: &'static str, value: String },
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnortConfig {
    /// Network segment to deploy at
    pub segment: u32,
    pub in_ifc: String,
    pub out_ifc: String,
    pub in_dump: String,
    pub out_dump: String,
    /// Read from `in_ifc` rather than `in_dump`
    pub in_use_ifc: bool,
    /// Write to `out_ifc` rather than `out_dump`
    pub out_use_ifc: bool,
    pub alert: bool,
    pub rule_file: PathBuf,
}

impl Default for SnortConfig {
    fn default() -> Self {
        Self {
            segment: DEFAULT_SEGMENT,
            in_ifc: "eth0".into(),
            out_ifc: "eth0".into(),
            in_dump: "in_dump.pcap".into(),
            out_dump: "out_dump.pcap".into(),
            in_use_ifc: true,
            out_use_ifc: true,
            alert: true,
            rule_file: PathBuf::from("snort_rules.txt"),
        }
    }
}

impl SnortConfig {
    /// Load from a TOML file, falling back per key
    pub fn load(path: impl AsRef<Path>) -> (Self, Vec<ConfigWarning>) {
        let path = path.as_ref();
        let (config, warnings) = match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) => (
                Self::default(),
                vec![ConfigWarning::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }],
            ),
        };

        for w in &warnings {
            tracing::warn!(path = %path.display(), "{}", w);
        }
        (config, warnings)
    }

    /// Parse TOML text. `origin` only names the source in warnings.
    pub fn parse(content: &str, origin: &Path) -> (Self, Vec<ConfigWarning>) {
        let table: toml::Table = match toml::from_str(content) {
            Ok(t) => t,
            Err(e) => {
                return (
                    Self::default(),
                    vec![ConfigWarning::Malformed {
                        path: origin.to_path_buf(),
                        reason: e.to_string(),
                    }],
                )
            }
        };

        let mut config = Self::default();
        let mut warnings = Vec::new();

        if let Some(v) = table.get("segment") {
            match parse_segment(v) {
                Some(seg) => config.segment = seg,
                None => warnings.push(ConfigWarning::InvalidSegment(display_value(v))),
            }
        }

        let strings = [
            ("in_ifc", &mut config.in_ifc),
            ("out_ifc", &mut config.out_ifc),
            ("in_dump", &mut config.in_dump),
            ("out_dump", &mut config.out_dump),
        ];
        for (key, slot) in strings {
            if let Some(v) = table.get(key) {
                match v.as_str() {
                    Some(s) => *slot = s.to_string(),
                    None => warnings.push(ConfigWarning::InvalidValue {
                        key,
                        value: display_value(v),
                    }),
                }
            }
        }

        let flags = [
            ("in_use_ifc", &mut config.in_use_ifc),
            ("out_use_ifc", &mut config.out_use_ifc),
            ("alert", &mut config.alert),
        ];
        for (key, slot) in flags {
            if let Some(v) = table.get(key) {
                match parse_flag(v) {
                    Some(b) => *slot = b,
                    None => warnings.push(ConfigWarning::InvalidValue {
                        key,
                        value: display_value(v),
                    }),
                }
            }
        }

        if let Some(v) = table.get("rule_file") {
            match v.as_str() {
                Some(s) => config.rule_file = PathBuf::from(s),
                None => warnings.push(ConfigWarning::InvalidValue {
                    key: "rule_file",
                    value: display_value(v),
                }),
            }
        }

        (config, warnings)
    }

    /// Capture interface or dump file, whichever is selected
    pub fn input(&self) -> &str {
        if self.in_use_ifc {
            &self.in_ifc
        } else {
            &self.in_dump
        }
    }

    /// Transmit interface or dump file, whichever is selected
    pub fn output(&self) -> &str {
        if self.out_use_ifc {
            &self.out_ifc
        } else {
            &self.out_dump
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(segment = self.segment, "Snort is running on segment {}", self.segment);
        tracing::info!(input = self.input(), use_ifc = self.in_use_ifc, "[->] Input");
        tracing::info!(output = self.output(), use_ifc = self.out_use_ifc, "[<-] Output");
        tracing::info!(alert = self.alert, "[!!] Alert is {}", if self.alert { "on" } else { "off" });
        tracing::info!(rule_file = %self.rule_file.display(), "[>|] Rule file path");
    }
}

/// Integer, or a string holding one
fn parse_segment(v: &toml::Value) -> Option<u32> {
    match v {
        toml::Value::Integer(i) => u32::try_from(*i).ok(),
        toml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean, or a string spelling one
fn parse_flag(v: &toml::Value) -> Option<bool> {
    match v {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        toml::Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn display_value(v: &toml::Value) -> String {
    match v {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = SnortConfig::load(dir.path().join("absent.toml"));

        assert_eq!(config, SnortConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], ConfigWarning::Unreadable { .. }));
    }

    #[test]
    fn test_load_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "segment = 7\nin_use_ifc = false\nin_dump = \"trace.pcap\"\nalert = \"false\"\nrule_file = \"rules/web.txt\""
        )
        .unwrap();

        let (config, warnings) = SnortConfig::load(file.path());

        assert!(warnings.is_empty());
        assert_eq!(config.segment, 7);
        assert_eq!(config.input(), "trace.pcap");
        assert_eq!(config.output(), "eth0");
        assert!(!config.alert);
        assert_eq!(config.rule_file, PathBuf::from("rules/web.txt"));
    }

    #[test]
    fn test_bad_segment_falls_back() {
        let (config, warnings) = SnortConfig::parse("segment = \"edge-7\"\nout_ifc = \"eth3\"", Path::new("inline"));

        assert_eq!(config.segment, DEFAULT_SEGMENT);
        assert_eq!(config.out_ifc, "eth3");
        assert_eq!(warnings, vec![ConfigWarning::InvalidSegment("edge-7".into())]);
    }

    #[test]
    fn test_string_segment_accepted() {
        let (config, warnings) = SnortConfig::parse("segment = \"221\"", Path::new("inline"));
        assert_eq!(config.segment, 221);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let (config, warnings) = SnortConfig::parse("segment = [", Path::new("broken.toml"));

        assert_eq!(config, SnortConfig::default());
        assert!(matches!(warnings[0], ConfigWarning::Malformed { .. }));
    }

    #[test]
    fn test_bad_flag_keeps_default() {
        let (config, warnings) = SnortConfig::parse("alert = 3", Path::new("inline"));

        assert!(config.alert);
        assert_eq!(
            warnings,
            vec![ConfigWarning::InvalidValue {
                key: "alert",
                value: "3".into()
            }]
        );
    }
}
