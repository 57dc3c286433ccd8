//! Decoding and re-encoding whole units through the public codec.

mod common;

use classweave::unit::{
    decode, encode, ClassHierarchy, DecodeMode, EncodeOptions, Insn, SymbolPool,
};
use common::*;

fn reencode(bytes: &[u8], mode: DecodeMode) -> Vec<u8> {
    let symbols = SymbolPool::new();
    let unit = decode(bytes, mode, &symbols).unwrap();
    encode(&unit, &EncodeOptions::default(), &ClassHierarchy::default()).unwrap()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn minimal_roundtrip_is_byte_identical() {
    for unit in [alpha(), worker()] {
        let bytes = unit.bytes().unwrap();
        assert_eq!(reencode(&bytes, DecodeMode::Minimal), bytes);
    }
}

#[test]
fn full_roundtrip_reaches_a_fixpoint() {
    let original = worker().bytes().unwrap();
    let once = reencode(&original, DecodeMode::Full);
    let twice = reencode(&once, DecodeMode::Full);
    assert_eq!(once, twice);

    let symbols = SymbolPool::new();
    let unit = decode(&twice, DecodeMode::Full, &symbols).unwrap();
    let code = unit.routine("sum", "(I)I").unwrap().code().unwrap();
    assert_eq!(code.handlers.len(), 1);
    assert!(code
        .insns
        .iter()
        .any(|insn| matches!(insn, Insn::Jump { .. })));
}

#[test]
fn frames_follow_the_version() {
    let modern = worker().version(52).bytes().unwrap();
    assert!(contains(&modern, b"StackMapTable"));

    let legacy = worker().version(49).bytes().unwrap();
    assert!(!contains(&legacy, b"StackMapTable"));
    assert_eq!(reencode(&legacy, DecodeMode::Full), reencode(&reencode(&legacy, DecodeMode::Full), DecodeMode::Full));
}

#[test]
fn truncated_units_are_rejected() {
    let bytes = worker().bytes().unwrap();
    let symbols = SymbolPool::new();
    for cut in (0..bytes.len()).step_by(7) {
        assert!(decode(&bytes[..cut], DecodeMode::Minimal, &symbols).is_err(), "prefix {cut}");
        assert!(decode(&bytes[..cut], DecodeMode::Full, &symbols).is_err(), "prefix {cut}");
    }
}
