//! Device identity derived from the Bluetooth adapter MAC address.
//!
//! Produces a stable, human-readable device ID in the form `BC-XXYYZZ`
//! (last 3 bytes of the 6-byte MAC in uppercase hex). This ID is:
//! - Deterministic across restarts (taken from `[device].mac`)
//! - Used as BLE advertising local name (`bleconfd-xxyyzz`)
//! - Reported by `dev-info-get` as `deviceId`

use core::fmt::Write;

/// Fixed-size device ID string: "BC-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Derive the short device ID from the last 3 MAC bytes.
/// Format: `BC-XXYYZZ` (e.g., `BC-EFCAFE`).
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "BC-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// Derive the advertised hostname from the last 3 MAC bytes.
/// Format: `bleconfd-xxyyzz` (lowercase).
pub fn hostname(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::<24>::new();
    let _ = write!(name, "bleconfd-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

/// Render `mac` as `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(mac: &MacAddress) -> heapless::String<17> {
    let mut s = heapless::String::<17>::new();
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            let _ = s.push(':');
        }
        let _ = write!(s, "{:02X}", b);
    }
    s
}
