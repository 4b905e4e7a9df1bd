use std::io;

/// Errors the relay engine itself distinguishes.
///
/// Concrete transports, filters and injectors may fail in ways this crate
/// does not know about; those are expected to be mapped to
/// [`ProxyError::Transport`] or [`ProxyError::Io`] at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Enumeration of the downstream device failed during `SETUP`.
    #[error("device enumeration failed: {0}")]
    EnumerationFailed(String),

    /// The upstream host transport could not be connected.
    #[error("host connection failed: {0}")]
    HostConnectFailed(String),

    /// A control request could not be forwarded to its destination.
    #[error("control request forwarding failed: {0}")]
    ControlForwardingFailed(String),

    /// An endpoint address fell outside the 0..=15 range USB allows.
    #[error("invalid endpoint number {0}")]
    InvalidEndpointNumber(u8),

    /// A setup packet's wire representation was malformed.
    #[error("invalid setup packet")]
    InvalidSetupPacket,

    /// A filter or injector panicked or otherwise failed unrecoverably.
    #[error("filter or injector failed: {0}")]
    PluginFailed(String),

    /// A named plugin factory was not found in the registry.
    #[error("no plugin registered under the name {0:?}")]
    PluginNotFound(String),

    /// A transport reported a fatal, non-timeout I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Wraps a `std::io::Error` surfaced by a transport implementation.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, ProxyError>;
