//! Rule file loading
//!
//! One payload regex per line, in evaluation order. The catch-all `.*` is
//! always appended, so an unreadable file degrades to "forward everything".

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Appended after the file's rules
pub const CATCH_ALL: &str = ".*";

/// Rule file could not be read. Non-fatal.
#[derive(Error, Debug)]
#[error("cannot read rules from {path}: {source}")]
pub struct RuleFileError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Loaded rules, catch-all included
#[derive(Debug)]
pub struct RuleList {
    pub patterns: Vec<String>,
    pub warning: Option<RuleFileError>,
}

impl RuleList {
    /// Rules read from the file, catch-all excluded
    pub fn loaded(&self) -> usize {
        self.patterns.len() - 1
    }
}

/// Read rules from `path`. Blank lines are skipped.
pub fn read_rules(path: impl AsRef<Path>) -> RuleList {
    let path = path.as_ref();
    let (mut patterns, warning) = match std::fs::read_to_string(path) {
        Ok(content) => (
            content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
            None,
        ),
        Err(source) => {
            let err = RuleFileError {
                path: path.to_path_buf(),
                source,
            };
            tracing::error!(error = %err, "Error while reading rules, continuing with the default rule only");
            (Vec::new(), Some(err))
        }
    };

    patterns.push(CATCH_ALL.to_string());
    tracing::debug!(path = %path.display(), rules = patterns.len() - 1, "Rules loaded");

    RuleList { patterns, warning }
}
