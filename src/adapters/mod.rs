//! Adapters: concrete transports and platform ports.
//!
//! | Adapter         | Implements         | Connects to                  |
//! |-----------------|--------------------|------------------------------|
//! | `gatt`          | ConnectedClient    | BLE GATT write/notify        |
//! |                 | Listener           | Simulated central (host)     |
//! | `stream_client` | ConnectedClient    | Length-prefixed TCP stream   |
//! | `tcp_listener`  | Listener           | `std::net::TcpListener`      |
//! | `wifi`          | ConnectivityPort   | Simulated WiFi station       |
//! | `device_id`     | (helpers)          | Adapter MAC → identity       |

pub mod device_id;
pub mod gatt;
pub mod stream_client;
pub mod tcp_listener;
pub(super) mod utils;
pub mod wifi;
