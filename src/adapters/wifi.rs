//! WiFi station-mode adapter.
//!
//! Defines [`ConnectivityPort`], the boundary between the provisioning
//! service and whatever drives the station interface, plus [`SimWifi`],
//! the host implementation used when no supplicant is available.
//!
//! The provisioning worker walks a port through
//! `set_credentials → connect → acquire_ip`; each step blocks until it
//! succeeds or fails.

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use log::{info, warn};

use super::utils::is_printable_ascii;
use crate::config::WifiConfig;
use crate::error::ConnectivityError;

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

pub trait ConnectivityPort: Send {
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
    /// Associate with the configured AP.
    fn connect(&mut self) -> Result<(), ConnectivityError>;
    /// Wait up to `timeout_secs` for an address on the associated link.
    fn acquire_ip(&mut self, timeout_secs: u32) -> Result<Ipv4Addr, ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn rssi(&self) -> Option<i8>;
    fn ip_address(&self) -> Option<Ipv4Addr>;
    /// SSID of the last accepted credentials, empty if none.
    fn ssid(&self) -> &str;
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

pub fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConnectivityError::InvalidSsid);
    }
    if !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Simulated station
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Down,
    Associated,
    Up(Ipv4Addr),
}

/// In-process station that associates after a fixed latency.
pub struct SimWifi {
    interface: String,
    state: LinkState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    latency: Duration,
    fail_association: bool,
    fail_dhcp: bool,
    attempts: u32,
}

impl SimWifi {
    pub fn new(config: &WifiConfig) -> Self {
        Self {
            interface: config.interface.clone(),
            state: LinkState::Down,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            latency: Duration::from_millis(100),
            fail_association: config.simulate_failure,
            fail_dhcp: false,
            attempts: 0,
        }
    }

    /// Time each blocking step takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Associate normally but never obtain an address.
    pub fn with_dhcp_failure(mut self) -> Self {
        self.fail_dhcp = true;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl ConnectivityPort for SimWifi {
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state != LinkState::Down {
            return Err(ConnectivityError::AlreadyConnected);
        }

        self.attempts = self.attempts.wrapping_add(1);
        info!("WiFi(sim): {} associating with '{}' (attempt {})", self.interface, self.ssid, self.attempts);
        thread::sleep(self.latency);

        if self.fail_association {
            warn!("WiFi(sim): simulated association failure");
            return Err(ConnectivityError::ConnectionFailed(self.ssid.to_string()));
        }
        self.state = LinkState::Associated;
        Ok(())
    }

    fn acquire_ip(&mut self, timeout_secs: u32) -> Result<Ipv4Addr, ConnectivityError> {
        match self.state {
            LinkState::Down => Err(ConnectivityError::NotConnected),
            LinkState::Up(ip) => Ok(ip),
            LinkState::Associated => {
                thread::sleep(self.latency);
                if self.fail_dhcp {
                    warn!("WiFi(sim): no DHCP lease on {}", self.interface);
                    return Err(ConnectivityError::AddressTimeout(timeout_secs));
                }
                let ip = Ipv4Addr::new(192, 168, 4, 10 + (self.attempts % 200) as u8);
                self.state = LinkState::Up(ip);
                info!("WiFi(sim): {} got {}", self.interface, ip);
                Ok(ip)
            }
        }
    }

    fn disconnect(&mut self) {
        if self.state != LinkState::Down {
            info!("WiFi(sim): {} disconnected", self.interface);
        }
        self.state = LinkState::Down;
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Up(_))
    }

    fn rssi(&self) -> Option<i8> {
        if self.state == LinkState::Down {
            return None;
        }
        let oscillation = ((self.attempts % 12) as i8) - 6;
        Some(-60_i8.saturating_add(oscillation))
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        match self.state {
            LinkState::Up(ip) => Some(ip),
            _ => None,
        }
    }

    fn ssid(&self) -> &str {
        &self.ssid
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
