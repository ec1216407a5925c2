//! Fuzz target for `.msg` and `.srv` definition parsing.
//!
//! Tests that definition parsing handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rb_msg::{parse_definition, Registry};

fuzz_target!(|data: &str| {
    let _ = parse_definition("fuzz_msgs/msg/Input", data);

    let mut registry = Registry::with_builtins();
    let _ = registry.register_service_definition("fuzz_msgs/srv/Input", data);
});
