use thiserror::Error;

/// Top-level error type for envplay.
#[derive(Debug, Error)]
pub enum EnvplayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid interval_ms: {0} (must be > 0)")]
    InvalidInterval(u64),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors raised by a transport while moving bytes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Outcome of a failed call routed through the call serializer.
///
/// Clone so that a single connection-level failure can be handed to every
/// queued and future caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The channel reported an error. Sticky.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The channel closed. Sticky.
    #[error("connection closed")]
    TransportClosed,

    /// The remote tagged its reply as an error. Scoped to one call.
    #[error("remote error: {0}")]
    Remote(String),

    /// The reply body could not be parsed. Scoped to one call.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The request could not be handed to the transport. Scoped to one call.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The request could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl CallError {
    /// Whether this error poisons the connection for every later call.
    pub const fn is_connection_level(&self) -> bool {
        matches!(self, Self::TransportFailure(_) | Self::TransportClosed)
    }
}

/// Misuse of the episode play/pause lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("already playing")]
    AlreadyPlaying,

    #[error("not playing")]
    NotPlaying,

    #[error("episode is closed")]
    Closed,
}

/// Session-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{action} is not allowed in state {state}")]
    ActionNotAllowed {
        state: &'static str,
        action: &'static str,
    },

    #[error("{0}")]
    Call(#[from] CallError),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Episode(#[from] LifecycleError),
}
