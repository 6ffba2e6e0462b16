#![no_main]

use libfuzzer_sys::fuzz_target;
use relaymls_core::core_mls::{KeyPackage, RustCryptoProvider};

fuzz_target!(|data: &[u8]| {
    // Parsing never panics, and whatever parses must survive verification
    // and re-encoding
    if let Ok(key_package) = KeyPackage::decode(data) {
        let _ = key_package.verify(&RustCryptoProvider::new());
        let _ = key_package.encode();
    }
});
