//! Fuzz target: `wire::decode`
//!
//! Every input must decode to a request or to a Parse-Error /
//! Invalid-Request carrying at most a scalar id.
//!
//! cargo fuzz run fuzz_wire_decode

#![no_main]

use bleconfd::rpc::message::{INVALID_REQUEST, PARSE_ERROR};
use bleconfd::rpc::wire;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    match wire::decode(data) {
        Ok(req) => assert!(!req.method.is_empty()),
        Err(e) => {
            assert!(e.error.code == PARSE_ERROR || e.error.code == INVALID_REQUEST);
            if let Some(id) = e.id {
                assert!(matches!(id, Value::Null | Value::Number(_) | Value::String(_)));
            }
        }
    }
});
