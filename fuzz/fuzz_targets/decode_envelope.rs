#![no_main]

use libfuzzer_sys::fuzz_target;
use prf_envelope::{get_version, inspect, Envelope};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let _ = get_version(s);
    let _ = inspect(s);
    if let Ok(envelope) = Envelope::decode(s) {
        // Anything that decodes must survive a re-encode.
        let again = Envelope::decode(&envelope.encode()).expect("re-encoded envelope decodes");
        assert_eq!(again, envelope);
    }
});
