//! Alert block
//!
//! Pass-through block that raises a notification for every packet it sees.
//! Only notifications are throttled; packets are always forwarded.

use crate::block::{check_input, Block, BlockKind, Routed};
use crate::error::ProcessError;
use crate::packet::Packet;
use chrono::{DateTime, Utc};
use crossbeam::channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Alert severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

/// Notification raised by an alert block
#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub timestamp: DateTime<Utc>,
    /// Emitting block
    pub block: String,
    pub message: String,
    pub severity: Severity,
    /// Notifications emitted by this block so far, this one included
    pub sequence: u64,
    /// Notifications throttled since the previous one was emitted
    pub suppressed: u64,
    /// Hex excerpt of the packet, when enabled
    pub excerpt: Option<String>,
}

/// Notification delivery
pub trait AlertNotifier: Send {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the structured log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl AlertNotifier for LogNotifier {
    fn notify(&self, n: Notification) {
        tracing::warn!(
            block = %n.block,
            severity = ?n.severity,
            sequence = n.sequence,
            suppressed = n.suppressed,
            excerpt = n.excerpt.as_deref().unwrap_or(""),
            "{}",
            n.message
        );
    }
}

/// Hands notifications to a collector over a bounded channel. A full
/// channel loses the notification, never the packet.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<Notification>) -> Self {
        Self { sender }
    }
}

impl AlertNotifier for ChannelNotifier {
    fn notify(&self, n: Notification) {
        match self.sender.try_send(n) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                tracing::debug!(block = %n.block, "Alert channel full, notification lost");
            }
            Err(TrySendError::Disconnected(n)) => {
                tracing::debug!(block = %n.block, "Alert collector gone, notification lost");
            }
        }
    }
}

/// Fixed-window notification limiter: at most `max` per `window`.
/// `max == 0` disables throttling.
#[derive(Debug, Clone)]
pub struct NotificationLimiter {
    max: u32,
    window: Duration,
    window_start: Option<Instant>,
    count: u32,
}

impl NotificationLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            window_start: None,
            count: 0,
        }
    }

    /// Take one slot in the window containing `now`
    pub fn allow(&mut self, now: Instant) -> bool {
        if self.max == 0 {
            return true;
        }

        let expired = match self.window_start {
            Some(start) => now.saturating_duration_since(start) >= self.window,
            None => true,
        };
        if expired {
            self.window_start = Some(now);
            self.count = 0;
        }

        if self.count < self.max {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub message: String,
    pub severity: Severity,
    /// Notifications allowed per window (0 = unlimited)
    pub max_per_window: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Attach a hex excerpt of the packet
    pub attach_packet: bool,
    /// Bytes of packet in the excerpt
    pub excerpt_len: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            message: "Alert".into(),
            severity: Severity::Medium,
            max_per_window: 1,
            window_ms: 1000,
            attach_packet: false,
            excerpt_len: 64,
        }
    }
}

/// Alert block: one input, one output
pub struct Alert {
    name: String,
    config: AlertConfig,
    limiter: NotificationLimiter,
    notifier: Box<dyn AlertNotifier>,
    emitted: u64,
    suppressed: u64,
    suppressed_since_emit: u64,
}

impl Alert {
    pub fn new(name: impl Into<String>, config: AlertConfig) -> Self {
        let limiter = NotificationLimiter::new(config.max_per_window, Duration::from_millis(config.window_ms));
        Self {
            name: name.into(),
            config,
            limiter,
            notifier: Box::new(LogNotifier),
            emitted: 0,
            suppressed: 0,
            suppressed_since_emit: 0,
        }
    }

    pub fn with_notifier(mut self, notifier: impl AlertNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Notifications emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Notifications throttled so far
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Process at an explicit instant
    pub fn process_at(&mut self, packet: Packet, now: Instant) -> Vec<Routed> {
        if self.limiter.allow(now) {
            self.emitted += 1;
            let excerpt = self.config.attach_packet.then(|| {
                let n = packet.len().min(self.config.excerpt_len);
                hex::encode(&packet.data()[..n])
            });
            self.notifier.notify(Notification {
                timestamp: Utc::now(),
                block: self.name.clone(),
                message: self.config.message.clone(),
                severity: self.config.severity,
                sequence: self.emitted,
                suppressed: self.suppressed_since_emit,
                excerpt,
            });
            self.suppressed_since_emit = 0;
        } else {
            self.suppressed += 1;
            self.suppressed_since_emit += 1;
        }

        vec![Routed::new(0, packet)]
    }
}

impl Block for Alert {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Alert
    }

    fn input_ports(&self) -> usize {
        1
    }

    fn output_ports(&self) -> usize {
        1
    }

    fn process(&mut self, input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        check_input(input_port, 1)?;
        Ok(self.process_at(packet, Instant::now()))
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }
}
