#![no_main]

use libfuzzer_sys::fuzz_target;
use relaymls_core::core_mls::{NostrGroupData, NostrGroupDataRecord};

fuzz_target!(|data: &[u8]| {
    // Binary extension payload
    if let Ok(group_data) = NostrGroupData::decode(data) {
        let record = NostrGroupDataRecord::from(&group_data);
        let _ = record.to_json();
    }

    // JSON interchange form
    if let Ok(json) = std::str::from_utf8(data) {
        if let Ok(record) = NostrGroupDataRecord::from_json(json) {
            let _ = NostrGroupData::try_from(&record);
        }
    }
});
