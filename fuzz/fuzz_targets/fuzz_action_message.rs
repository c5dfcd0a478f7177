#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Outbound action shape: the server parses these, but a hostile or
    // confused peer could echo them back on a broadcast topic.
    let _ = serde_json::from_slice::<gridline_client::protocol::ActionMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(action) = serde_json::from_str::<gridline_client::protocol::ActionMessage>(s) {
            // Round-trip must not panic.
            let _ = serde_json::to_string(&action);
        }
    }
});
