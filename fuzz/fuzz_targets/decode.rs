#![no_main]

use classweave::unit::{decode, encode, ClassHierarchy, DecodeMode, EncodeOptions, SymbolPool};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let symbols = SymbolPool::new();
    for mode in [DecodeMode::Minimal, DecodeMode::Full] {
        if let Ok(unit) = decode(data, mode, &symbols) {
            let _ = encode(&unit, &EncodeOptions::default(), &ClassHierarchy::default());
        }
    }
});
