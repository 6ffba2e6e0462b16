#![no_main]

use libfuzzer_sys::fuzz_target;
use relaymls_core::core_mls::SerializedMessage;

fuzz_target!(|data: &[u8]| {
    // The encoding is canonical: anything that parses re-encodes to the input
    if let Ok(message) = SerializedMessage::from_bytes(data) {
        let reencoded = message.to_bytes().expect("parsed message re-encodes");
        assert_eq!(reencoded, data);
    }
});
