//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one subsystem through
//! the public API, with a recording client standing in for the Bluetooth
//! peer. Everything runs on the host; no radio required.

mod dispatch_tests;
mod mock_client;
mod notification_tests;
mod provisioning_flow_tests;
mod shutdown_tests;
