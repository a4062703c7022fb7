#![no_main]

use ilpatch::{
    assembly::{decode_body, encode_body},
    metadata::Module,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = decode_body(data) {
        let _ = encode_body(&body, &Module::new("fuzz.dll"), false);
    }
});
