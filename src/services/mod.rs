//! Built-in RPC services.
//!
//! | Service       | Methods                                           |
//! |---------------|---------------------------------------------------|
//! | `device-info` | `dev-info-get`                                    |
//! | `wifi`        | `wifi-get-status`, `wifi-connect`,                |
//! |               | `wifi-disconnect`, `wifi-status-codes`            |

pub mod device_info;
pub mod status;
pub mod wifi;

use crate::adapters::wifi::SimWifi;
use crate::config::DaemonConfig;
use crate::rpc::service::RpcService;

/// The services every daemon registers, in registration order.
pub fn builtin_services(config: &DaemonConfig) -> Vec<Box<dyn RpcService>> {
    vec![
        Box::new(device_info::DeviceInfoService::new()),
        Box::new(wifi::WifiService::new(Box::new(SimWifi::new(&config.wifi)))),
    ]
}
