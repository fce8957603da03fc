//! Daemon configuration parameters
//!
//! All tunable parameters for the provisioning daemon.
//! Values come from a TOML file; every field has a default so a missing
//! or partial file is still a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default location of the config file when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "bleconfd.toml";

/// Upper bound accepted for `rpc.max_frame_size`.
const FRAME_SIZE_CEILING: usize = 64 * 1024;

/// Core daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub rpc: RpcConfig,
    pub transport: TransportConfig,
    pub wifi: WifiConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Largest JSON document accepted or emitted, in bytes
    pub max_frame_size: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 4096,
        }
    }
}

/// Which link layer the connection manager listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Length-prefixed frames over TCP (development / RFCOMM bridge).
    Tcp,
    /// Simulated GATT peer, for hosts without a Bluetooth stack.
    GattSim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Socket address for the TCP listener
    pub listen_addr: String,
    /// Interval between non-blocking accept polls (milliseconds)
    pub accept_poll_ms: u64,
    /// Negotiated ATT MTU assumed for GATT peers
    pub gatt_mtu: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Tcp,
            listen_addr: "127.0.0.1:7420".into(),
            accept_poll_ms: 50,
            gatt_mtu: 185,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Station interface to provision
    pub interface: String,
    /// Give up on association after this many seconds
    pub connect_timeout_secs: u32,
    /// Simulation only: make every association attempt fail
    pub simulate_failure: bool,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".into(),
            connect_timeout_secs: 30,
            simulate_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub model: String,
    pub manufacturer: String,
    pub serial_number: String,
    /// Bluetooth adapter MAC, `AA:BB:CC:DD:EE:FF`
    pub mac: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: "generic".into(),
            manufacturer: "unknown".into(),
            serial_number: String::new(),
            mac: "DE:AD:BE:EF:CA:FE".into(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Like [`from_path`](Self::from_path), but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_path(path)
        } else {
            log::warn!("Config: {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.max_frame_size == 0 || self.rpc.max_frame_size > FRAME_SIZE_CEILING {
            return Err(ConfigError::Invalid {
                field: "rpc.max_frame_size",
                reason: format!("must be within 1..={FRAME_SIZE_CEILING}"),
            });
        }
        if self.transport.accept_poll_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.accept_poll_ms",
                reason: "must be non-zero".into(),
            });
        }
        if self.transport.gatt_mtu < 23 {
            return Err(ConfigError::Invalid {
                field: "transport.gatt_mtu",
                reason: "ATT MTU is at least 23".into(),
            });
        }
        if self.wifi.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "wifi.connect_timeout_secs",
                reason: "must be non-zero".into(),
            });
        }
        parse_mac(&self.device.mac).ok_or_else(|| ConfigError::Invalid {
            field: "device.mac",
            reason: format!("`{}` is not of the form AA:BB:CC:DD:EE:FF", self.device.mac),
        })?;
        Ok(())
    }

    /// The configured MAC as raw bytes. Only meaningful after [`validate`](Self::validate).
    pub fn mac_bytes(&self) -> Option<[u8; 6]> {
        parse_mac(&self.device.mac)
    }
}

/// Parse `AA:BB:CC:DD:EE:FF` (either case) into six bytes.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for byte in &mut mac {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}
