#![no_main]

use classweave::delta::{apply_delta, DeltaBundle};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.len() / 2;
    let _ = apply_delta(&data[..split], &data[split..]);
    let _ = DeltaBundle::read_from(data);
});
