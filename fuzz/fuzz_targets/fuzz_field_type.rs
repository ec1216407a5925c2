//! Fuzz target for field type strings (`int32[<=5]`, `sequence<string, 3>`).
//!
//! Tests that `FieldType::parse` handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rb_msg::FieldType;

fuzz_target!(|data: &str| {
    if let Ok(field_type) = FieldType::parse(data) {
        let _ = field_type.to_string();
    }
    let _ = FieldType::parse_in(data, Some("fuzz_msgs"));
});
