//! Fuzz target for CDR payload decoding.
//!
//! Feeds arbitrary bodies behind a valid encapsulation header into the
//! decoder for a schema that exercises strings, sequences, fixed arrays and
//! nested messages. Decoding must fail with an error, never panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rb_msg::{flatten, message_to_dict, CdrDeserializer, MessageDeserializer, Registry};

#[derive(Debug, Arbitrary)]
struct Input {
    big_endian: bool,
    body: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut registry = Registry::with_builtins();
    let Ok(schema) = registry.register_definition(
        "fuzz_msgs/msg/Sample",
        "std_msgs/Header header\nbool flag\nint16[<=4] window\nstring[] labels\n\
         uint8[] blob\nfloat64[3] xyz\nbuiltin_interfaces/Duration[] spans\n",
    ) else {
        return;
    };

    let mut data = vec![0x00, u8::from(!input.big_endian), 0x00, 0x00];
    data.extend_from_slice(&input.body);

    let decoder = CdrDeserializer::new(&registry);
    if let Ok(message) = decoder.deserialize(&data, &schema) {
        let _ = flatten(&message_to_dict(&message));
    }
});
