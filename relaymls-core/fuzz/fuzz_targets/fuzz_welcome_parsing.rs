#![no_main]

use libfuzzer_sys::fuzz_target;
use relaymls_core::core_mls::WelcomeArtifact;

fuzz_target!(|data: &[u8]| {
    if let Ok(welcome) = WelcomeArtifact::from_bytes(data) {
        let reencoded = welcome.to_bytes().expect("parsed welcome re-encodes");
        assert_eq!(reencoded, data);
    }
});
