//! Fuzz target: GATT `Reassembler::push`
//!
//! Treats the input as a sequence of length-prefixed fragments (one length
//! byte each). Reassembly may reject fragments but must never panic or
//! return a document larger than its limit.
//!
//! cargo fuzz run fuzz_gatt_reassembly

#![no_main]

use bleconfd::adapters::gatt::Reassembler;
use libfuzzer_sys::fuzz_target;

const MAX_DOC: usize = 512;

fuzz_target!(|data: &[u8]| {
    let mut r = Reassembler::new(MAX_DOC);
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let n = usize::from(len).min(tail.len());
        let (frag, next) = tail.split_at(n);
        if let Ok(Some(doc)) = r.push(frag) {
            assert!(doc.len() <= MAX_DOC);
        }
        rest = next;
    }
});
