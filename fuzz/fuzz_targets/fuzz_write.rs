#![no_main]

use jfif_io::{read_one, write_one, BufStream, SegmentRegistry};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Whatever parses must reserialize without panicking, and a segment that
    // parsed cleanly must not fail validation on the way back out.
    let mut stream = BufStream::new(Cursor::new(data.to_vec()));
    if let Ok(Some(metadata)) = read_one(&mut stream, SegmentRegistry::built_in()) {
        let mut out = Vec::new();
        let _ = write_one(&mut out, &metadata);
    }
});
