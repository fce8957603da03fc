//! bleconfd: JSON-RPC provisioning daemon for a single Bluetooth peer.
//!
//! The library holds everything except process bootstrap, so the
//! dispatcher, transports and services can be driven from integration
//! tests with mock clients.

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod connection;
pub mod error;
pub mod rpc;
pub mod services;

pub use error::{Error, Result};
