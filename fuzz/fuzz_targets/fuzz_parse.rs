#![no_main]

use jfif_io::{read_all, BufStream, SegmentRegistry};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary bytes must never panic, only return errors.
    let mut stream = BufStream::new(Cursor::new(data.to_vec()));
    if let Ok(all) = read_all(&mut stream, SegmentRegistry::built_in()) {
        for metadata in &all {
            for segment in metadata {
                let _ = segment.key();
                let _ = segment.validate_and_compute_body_length();
            }
            let _ = jfif_io::exif::exif_data(metadata);
        }
    }
});
