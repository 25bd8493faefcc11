//! Built-in blocks

mod alert;
mod sink;
mod source;

pub use alert::{
    Alert, AlertConfig, AlertNotifier, ChannelNotifier, LogNotifier, Notification, NotificationLimiter, Severity,
};
pub use sink::{Discard, ToDevice, ToDump};
pub use source::{FromDevice, FromDump};
