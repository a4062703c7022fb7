#![no_main]

use ilpatch::metadata::Module;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(module) = Module::from_mem(data.to_vec()) {
        let _ = module.to_bytes();
    }
});
