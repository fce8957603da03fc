//! Unified error types for the provisioning daemon.
//!
//! Every subsystem has its own error enum; all of them convert into the
//! top-level [`Error`] so the daemon's startup path can propagate with `?`.
//! Wire-level failures are *not* Rust errors: they travel to the peer as
//! [`RpcError`](crate::rpc::message::RpcError) objects.

use std::io;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level daemon error
// ---------------------------------------------------------------------------

/// Every fallible library operation funnels into this type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is invalid or could not be loaded.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// Method registration failed during startup.
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    /// A service failed to initialise.
    #[error("service: {0}")]
    Service(#[from] ServiceError),
    /// The link-layer transport failed.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// The WiFi station could not be driven.
    #[error("wifi: {0}")]
    Connectivity(#[from] ConnectivityError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The config file is not valid TOML for [`DaemonConfig`](crate::config::DaemonConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field failed range validation.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two services tried to claim the same method name.
    #[error("method `{method}` already registered by `{existing}`, rejected for `{attempted}`")]
    DuplicateMethod {
        method: String,
        existing: String,
        attempted: String,
    },
    /// A service listed a method name but returned no handler for it.
    #[error("service `{service}` advertised `{method}` without a handler")]
    MissingHandler { service: String, method: String },
    /// Method names must be non-empty.
    #[error("service `{service}` advertised an empty method name")]
    EmptyMethodName { service: String },
}

// ---------------------------------------------------------------------------
// Service errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
    /// `init` rejected its configuration.
    #[error("service `{service}` failed to initialise: {reason}")]
    Init { service: String, reason: String },
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    /// No peer is connected (or it already went away).
    #[error("no client connected")]
    NotConnected,
    /// Outbound document exceeds the frame limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    /// GATT fragment arrived out of order.
    #[error("fragment sequence error (expected {expected}, got {got})")]
    SequenceError { expected: u8, got: u8 },
    /// GATT reassembly would exceed the frame limit.
    #[error("reassembly buffer overflow")]
    ReassemblyOverflow,
    /// Fragment shorter than its header.
    #[error("malformed fragment of {0} bytes")]
    MalformedFragment(usize),
    /// MTU too small to carry any payload.
    #[error("MTU {0} too small for fragmentation")]
    MtuTooSmall(usize),
    /// Underlying socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Connectivity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectivityError {
    #[error("no WiFi credentials configured")]
    NoCredentials,
    #[error("SSID invalid (must be 1-32 printable ASCII bytes)")]
    InvalidSsid,
    #[error("password invalid (must be 8-64 bytes for WPA2, or empty for open)")]
    InvalidPassword,
    #[error("association with `{0}` failed")]
    ConnectionFailed(String),
    #[error("already connected to AP")]
    AlreadyConnected,
    #[error("not associated with any AP")]
    NotConnected,
    #[error("no IP address after {0} s")]
    AddressTimeout(u32),
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
