#![no_main]

use libfuzzer_sys::fuzz_target;
use prf_envelope::{KeyMaterial, VersionRouter};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the key material length, the rest is the envelope.
    let key_len = (data[0] as usize % 64) + 1;
    let key = KeyMaterial::from_bytes(vec![data[0]; key_len]);
    let envelope = String::from_utf8_lossy(&data[1..]);

    let router = VersionRouter::new();
    let _ = router.decrypt(&envelope, &key);
    let _ = router.extract_parts(&envelope);
});
