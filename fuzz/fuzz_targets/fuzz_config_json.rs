//! Fuzz target for reader configuration parsing.
//!
//! Tests that JSON config parsing handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rb_bag::BagConfig;

fuzz_target!(|data: &[u8]| {
    // Try to parse as JSON - should never panic, only return an error
    let _ = serde_json::from_slice::<BagConfig>(data);
});
