//! WiFi provisioning status codes.
//!
//! These values travel over the air (JSON `state` fields and the
//! Provision-state GATT characteristic) and must stay bit-exact.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ProvisionStatus {
    AwaitingConfiguration = 0x0101,
    ProcessingConfiguration = 0x0102,
    Connecting = 0x0103,
    Connected = 0x0104,
    AcquiringIp = 0x0105,
    IpAcquired = 0x0106,
    SetupComplete = 0x09ff,
    UnknownError = 0x0a01,
    DecryptError = 0x0a02,
    MalformedConfiguration = 0x0a03,
    AcquireIpTimeout = 0x0a04,
}

impl ProvisionStatus {
    pub const ALL: [ProvisionStatus; 11] = [
        Self::AwaitingConfiguration,
        Self::ProcessingConfiguration,
        Self::Connecting,
        Self::Connected,
        Self::AcquiringIp,
        Self::IpAcquired,
        Self::SetupComplete,
        Self::UnknownError,
        Self::DecryptError,
        Self::MalformedConfiguration,
        Self::AcquireIpTimeout,
    ];

    pub const fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::AwaitingConfiguration => "Awaiting WiFi configuration",
            Self::ProcessingConfiguration => "Processing WiFi configuration",
            Self::Connecting => "Connecting to WiFi",
            Self::Connected => "Successfully connected to WiFi",
            Self::AcquiringIp => "Acquiring IP address",
            Self::IpAcquired => "IP address acquired",
            Self::SetupComplete => "Setup complete",
            Self::UnknownError => "Unknown error",
            Self::DecryptError => "Error decrypting WiFi configuration",
            Self::MalformedConfiguration => "Malformed WiFi configuration",
            Self::AcquireIpTimeout => "Acquire IP timeout",
        }
    }

    /// Error codes live in the `0x0a00` block.
    pub const fn is_error(self) -> bool {
        self.code() & 0xff00 == 0x0a00
    }

    /// No further transition follows without a new request.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::SetupComplete) || self.is_error()
    }
}

impl fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} ({})", self.code(), self.description())
    }
}
