use serde::Serialize;

/// Identifier of a device group, supplied by callers.
pub type GroupId = String;

/// Identifier of a device within its group, supplied by callers.
pub type DeviceId = String;

/// Caller-chosen correlation id, echoed back in replies so multiple
/// in-flight requests can be told apart.
pub type RequestId = u64;

/// Per-device outcome of a collect-all query.
///
/// A degraded device never fails the query as a whole; it just shows up
/// here as `Unavailable`, `Lost` or `TimedOut`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reading {
    /// The device answered with its last recorded value.
    Value { value: f64 },
    /// The device answered but had no recorded value yet.
    Unavailable,
    /// The device stopped before answering.
    Lost,
    /// The deadline fired before the device answered or stopped.
    TimedOut,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("mailbox closed for {0}")]
    MailboxClosed(&'static str),

    #[error("request dropped without a reply")]
    RequestDropped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}
