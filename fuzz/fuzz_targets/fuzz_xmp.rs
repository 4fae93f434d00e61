#![no_main]

use jfif_io::xmp::{self, XmpDeserializeOptions, XmpSerializeOptions};
use jfif_io::{JfifMetadata, Segment};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary text through the XMP codec must never panic.
    if let Ok(text) = std::str::from_utf8(data) {
        let mut metadata = JfifMetadata::new();
        metadata.push(Segment::Soi);
        metadata.push(Segment::Eoi);

        let tight = XmpSerializeOptions {
            max_base_utf8_bytes: 128,
            max_portion_utf8_bytes: 256,
        };
        for options in [XmpSerializeOptions::default(), tight] {
            let mut scratch = metadata.clone();
            if xmp::set_xmp_string(&mut scratch, Some(text), &options).is_ok() {
                let _ = xmp::xmp_string(&scratch, &XmpDeserializeOptions::default());
                let lenient = XmpDeserializeOptions {
                    throw_on_invalid_samples: false,
                };
                let _ = xmp::xmp_string(&scratch, &lenient);
            }
        }
    }
});
