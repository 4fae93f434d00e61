//! Segment writer
//!
//! Emits marker indicator, marker, optional length field, optional
//! identifier, the typed body, and any out-of-band trailer. The length field
//! is computed from the validated body length and refuses to overflow its
//! 16 bits.

use crate::error::{Error, Result};
use crate::marker;
use crate::segments::Segment;
use byteorder::{BigEndian, WriteBytesExt};
use log::trace;
use std::io::Write;

/// Write one complete segment, including any out-of-band payload
pub fn write_segment<W: Write>(writer: &mut W, segment: &Segment) -> Result<()> {
    let key = segment.key();

    if !segment.has_length() {
        writer.write_u8(marker::INDICATOR)?;
        writer.write_u8(key.marker())?;
        segment.write_out_of_band(writer)?;
        trace!("wrote segment {key}");
        return Ok(());
    }

    let body_len = segment.validate_and_compute_body_length()?;
    let total = 2 + key.identifier_len_with_nul() + body_len;
    if total > 0xFFFF {
        return Err(Error::OversizedSegment {
            marker: marker::label(key.marker()),
            total,
        });
    }

    writer.write_u8(marker::INDICATOR)?;
    writer.write_u8(key.marker())?;
    writer.write_u16::<BigEndian>(total as u16)?;
    if let Some(identifier) = key.identifier() {
        writer.write_all(identifier.as_bytes())?;
        writer.write_u8(0)?;
    }
    segment.write_body(writer)?;
    segment.write_out_of_band(writer)?;
    trace!("wrote segment {key} ({body_len} byte body)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{ExifApp1Segment, JfifApp0Segment, Segment, SosComponent, SosSegment};

    #[test]
    fn test_write_soi() {
        let mut out = Vec::new();
        write_segment(&mut out, &Segment::Soi).unwrap();
        assert_eq!(out, vec![0xFF, 0xD8]);
    }

    #[test]
    fn test_write_exif_includes_identifier_and_pad() {
        let segment: Segment = ExifApp1Segment {
            data: vec![0xAB, 0xCD],
        }
        .into();
        let mut out = Vec::new();
        write_segment(&mut out, &segment).unwrap();

        let mut expected = vec![0xFF, 0xE1, 0x00, 0x0A];
        expected.extend_from_slice(b"Exif\0\0");
        expected.extend_from_slice(&[0xAB, 0xCD]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_write_sos_places_payload_after_body() {
        let segment: Segment = SosSegment {
            components: vec![SosComponent {
                component_id: 1,
                dc_table: 0,
                ac_table: 0,
            }],
            spectral_start: 0,
            spectral_end: 63,
            approximation_high: 0,
            approximation_low: 0,
            entropy_data: vec![0x01, 0x02, 0xFF, 0x00, 0x03, 0xFF, 0xD0, 0x04],
        }
        .into();
        let mut out = Vec::new();
        write_segment(&mut out, &segment).unwrap();

        let expected = vec![
            0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, // framed body
            0x01, 0x02, 0xFF, 0x00, 0x03, 0xFF, 0xD0, 0x04, // out-of-band payload
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_oversized_segment_is_rejected() {
        let segment: Segment = JfifApp0Segment {
            thumbnail_width: 200,
            thumbnail_height: 200,
            thumbnail_rgb: vec![0; 3 * 200 * 200],
            ..Default::default()
        }
        .into();
        let mut out = Vec::new();
        let err = write_segment(&mut out, &segment).unwrap_err();
        assert!(matches!(err, Error::OversizedSegment { .. }));
    }
}
