//! Transport-agnostic JSON-RPC 2.0 subsystem.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         RPC Stack                            │
//! │                                                              │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//! │  │ Transport │──▶│   Wire   │──▶│  Queue   │──▶│  Server  │  │
//! │  │  (trait)  │   │ (decode) │   │ (FIFO)   │   │(dispatch)│  │
//! │  └───────────┘   └──────────┘   └──────────┘   └────┬─────┘  │
//! │        ▲                                            │        │
//! │        │         ┌──────────┐   ┌──────────┐        ▼        │
//! │        └─────────│ Outbound │◀──│ Notifier │◀── RpcService   │
//! │                  └──────────┘   └──────────┘   (registry)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stream transports additionally use [`codec`] for length-prefix framing.

pub mod codec;
pub mod message;
pub mod outbound;
pub mod queue;
pub mod registry;
pub mod server;
pub mod service;
pub mod transport;
pub mod wire;

pub use message::{Notification, Request, Response, RpcError};
pub use registry::{MethodRegistry, RpcMethod};
pub use server::{DispatchHandle, RpcServer, ServerStats};
pub use service::{Notifier, RpcService};
pub use transport::{ConnectedClient, DataHandler, Listener};
