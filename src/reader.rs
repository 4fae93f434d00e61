//! Segment reader
//!
//! Reads one segment at a time: marker indicator, marker (skipping 0xFF fill
//! bytes), then, depending on the registry mapping, the 16-bit length field,
//! the NUL-terminated body identifier, and the typed body read.

use crate::error::{Error, Result};
use crate::length::SegmentLength;
use crate::marker;
use crate::registry::SegmentRegistry;
use crate::segments::{GenericSegment, Segment};
use crate::stream::{BufStream, NulBehavior};
use log::trace;
use std::io::Read;

/// Report whether the next two buffered bytes are an SOI marker, without
/// consuming them
///
/// Returns false when fewer than two bytes are available, which is how the
/// file-level reader detects a clean end between back-to-back streams.
pub fn probe_for_start_of_image<R: Read>(stream: &mut BufStream<R>) -> Result<bool> {
    if !stream.ensure_buffered(2)? {
        return Ok(false);
    }
    Ok(stream.peek(2)? == [marker::INDICATOR, marker::SOI])
}

/// Read one complete segment from the stream
pub fn read_segment<R: Read>(
    stream: &mut BufStream<R>,
    registry: &SegmentRegistry,
) -> Result<Segment> {
    let indicator = stream.read_u8()?;
    if indicator != marker::INDICATOR {
        return Err(Error::ExpectedMarkerIndicator { found: indicator });
    }

    // Consecutive 0xFF bytes are legal fill before the marker code.
    let mut code = stream.read_u8()?;
    while code == marker::INDICATOR {
        code = stream.read_u8()?;
    }

    if let Some(descriptor) = registry.lookup_no_identifier(code) {
        let mut segment = (descriptor.build)();
        if !descriptor.has_length {
            trace!("read segment {}", segment.key());
            return Ok(segment);
        }
        let total = stream.read_u16_be()?;
        let length = SegmentLength::new(code, total, total.saturating_sub(2))?;
        segment.read_body(stream, length)?;
        trace!("read segment {} ({} byte body)", segment.key(), length.remaining());
        return Ok(segment);
    }

    let total = stream.read_u16_be()?;
    let mut length = SegmentLength::new(code, total, total.saturating_sub(2))?;

    let mut segment = if registry.has_identifier(code) {
        let (identifier, consumed) =
            stream.read_ascii_string(length.remaining(), NulBehavior::Stop)?;
        length = length.sub(consumed)?;
        match registry.lookup_identifier(code, &identifier) {
            Some(descriptor) => (descriptor.build)(),
            None => Segment::Generic(GenericSegment::new(code, Some(identifier))),
        }
    } else {
        Segment::Generic(GenericSegment::new(code, None))
    };

    segment.read_body(stream, length)?;
    trace!("read segment {} ({} byte body)", segment.key(), length.remaining());
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(bytes: &[u8]) -> BufStream<Cursor<Vec<u8>>> {
        BufStream::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_probe() {
        let mut s = stream(&[0xFF, 0xD8]);
        assert!(probe_for_start_of_image(&mut s).unwrap());
        // Probing does not consume.
        assert!(probe_for_start_of_image(&mut s).unwrap());

        let mut s = stream(&[0xFF, 0xD9]);
        assert!(!probe_for_start_of_image(&mut s).unwrap());

        let mut s = stream(&[0xFF]);
        assert!(!probe_for_start_of_image(&mut s).unwrap());
    }

    #[test]
    fn test_read_soi_has_no_length() {
        let mut s = stream(&[0xFF, 0xD8]);
        let segment = read_segment(&mut s, SegmentRegistry::built_in()).unwrap();
        assert!(matches!(segment, Segment::Soi));
    }

    #[test]
    fn test_fill_bytes_before_marker_are_skipped() {
        let mut s = stream(&[0xFF, 0xFF, 0xFF, 0xD9]);
        let segment = read_segment(&mut s, SegmentRegistry::built_in()).unwrap();
        assert!(matches!(segment, Segment::Eoi));
    }

    #[test]
    fn test_missing_indicator() {
        let mut s = stream(&[0x00, 0xD8]);
        let err = read_segment(&mut s, SegmentRegistry::built_in()).unwrap_err();
        assert!(matches!(
            err,
            Error::ExpectedMarkerIndicator { found: 0x00 }
        ));
    }

    #[test]
    fn test_known_identifier_constructs_typed_segment() {
        let mut bytes = vec![0xFF, 0xE1, 0x00, 0x0A];
        bytes.extend_from_slice(b"Exif\0\0");
        bytes.extend_from_slice(&[0xAB, 0xCD]);
        let mut s = stream(&bytes);
        let segment = read_segment(&mut s, SegmentRegistry::built_in()).unwrap();
        let exif = segment.as_exif_app1().expect("typed Exif segment");
        assert_eq!(exif.data, vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_unknown_identifier_falls_back_to_generic() {
        let mut bytes = vec![0xFF, 0xE1, 0x00, 0x09];
        bytes.extend_from_slice(b"Acme\0");
        bytes.extend_from_slice(&[0x01, 0x02]);
        let mut s = stream(&bytes);
        let segment = read_segment(&mut s, SegmentRegistry::built_in()).unwrap();
        let generic = segment.as_generic().expect("generic fallback");
        assert_eq!(generic.identifier(), Some("Acme"));
        assert_eq!(generic.data, vec![0x01, 0x02]);
    }

    #[test]
    fn test_marker_without_identifier_mappings_is_generic() {
        // DQT has no registry entry at all; body is opaque.
        let bytes = [0xFF, 0xDB, 0x00, 0x05, 0x01, 0x02, 0x03];
        let mut s = stream(&bytes);
        let segment = read_segment(&mut s, SegmentRegistry::built_in()).unwrap();
        let generic = segment.as_generic().expect("generic fallback");
        assert_eq!(generic.marker(), marker::DQT);
        assert_eq!(generic.identifier(), None);
        assert_eq!(generic.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_body_segment() {
        // Declared length 2 reads zero body bytes.
        let bytes = [0xFF, 0xFE, 0x00, 0x02];
        let mut s = stream(&bytes);
        let segment = read_segment(&mut s, SegmentRegistry::built_in()).unwrap();
        assert!(segment.as_generic().unwrap().data.is_empty());
    }

    #[test]
    fn test_truncated_stream_is_eos() {
        let bytes = [0xFF, 0xDB, 0x00, 0x10, 0x01];
        let mut s = stream(&bytes);
        let err = read_segment(&mut s, SegmentRegistry::built_in()).unwrap_err();
        assert!(err.is_eos());
    }
}
