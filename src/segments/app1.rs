//! APP1 segments: EXIF carrier, XMP packet, and Extended-XMP portions

use crate::error::{Error, Result};
use crate::length::SegmentLength;
use crate::marker;
use crate::segments::SegmentKey;
use crate::stream::{BufStream, NulBehavior};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Read, Write};

/// Identifier carried in the body of the EXIF APP1 segment
pub const EXIF_IDENTIFIER: &str = "Exif";

/// Identifier carried in the body of the XMP APP1 segment
pub const XMP_IDENTIFIER: &str = "http://ns.adobe.com/xap/1.0/";

/// Identifier carried in the body of the Extended-XMP APP1 segment
pub const EXTENDED_XMP_IDENTIFIER: &str = "http://ns.adobe.com/xmp/extension/";

/// Largest EXIF payload one APP1 segment can carry: 0xFFFF minus the length
/// field and the "Exif" identifier with its NUL and pad bytes
pub const MAX_EXIF_PAYLOAD: usize = 0xFFFF - 2 - 6;

/// APP1 "Exif" segment
///
/// On the wire the identifier is followed by one NUL pad byte, then the
/// opaque EXIF bytes; tag-level parsing is out of scope here.
#[derive(Debug, Clone, Default)]
pub struct ExifApp1Segment {
    /// Opaque EXIF payload bytes
    pub data: Vec<u8>,
}

impl ExifApp1Segment {
    pub(crate) const SEGMENT_KEY: SegmentKey =
        SegmentKey::with_static_identifier(marker::APP1, EXIF_IDENTIFIER);

    pub(crate) fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        let pad = stream.read_u8()?;
        let length = length.sub1()?;
        if pad != 0 {
            return Err(Error::InvalidSegment(format!(
                "expected NUL pad byte after Exif identifier, found 0x{pad:02X}"
            )));
        }
        self.data.resize(length.remaining(), 0);
        stream.read_exact(&mut self.data)
    }

    pub(crate) fn validate_and_compute_body_length(&self) -> Result<usize> {
        if self.data.len() > MAX_EXIF_PAYLOAD {
            return Err(Error::InvalidSegment(format!(
                "Exif payload of {} bytes exceeds the {MAX_EXIF_PAYLOAD} byte segment limit",
                self.data.len()
            )));
        }
        Ok(1 + self.data.len())
    }

    pub(crate) fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(0)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

/// APP1 XMP segment holding a single UTF-8 packet string
#[derive(Debug, Clone, Default)]
pub struct XmpApp1Segment {
    /// The XMP packet, possibly still wearing its `<?xpacket?>` wrapper
    pub packet: Option<String>,
}

impl XmpApp1Segment {
    pub(crate) const SEGMENT_KEY: SegmentKey =
        SegmentKey::with_static_identifier(marker::APP1, XMP_IDENTIFIER);

    pub(crate) fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        let mut bytes = vec![0u8; length.remaining()];
        stream.read_exact(&mut bytes)?;
        let packet = String::from_utf8(bytes).map_err(|_| {
            Error::InvalidSegment("APP1 XMP payload is not valid UTF-8".to_string())
        })?;
        self.packet = Some(packet);
        Ok(())
    }

    pub(crate) fn validate_and_compute_body_length(&self) -> Result<usize> {
        match &self.packet {
            Some(packet) => Ok(packet.len()),
            None => Err(Error::InvalidSegment(
                "XMP segment has no packet set".to_string(),
            )),
        }
    }

    pub(crate) fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        if let Some(packet) = &self.packet {
            writer.write_all(packet.as_bytes())?;
        }
        Ok(())
    }
}

/// APP1 Extended-XMP portion segment
///
/// All portions of one extended document share an MD5 fingerprint over the
/// full document bytes and address their slice with an absolute offset.
#[derive(Debug, Clone, Default)]
pub struct ExtendedXmpApp1Segment {
    /// MD5 digest of the complete extended document
    pub fingerprint: [u8; 16],
    /// Total byte length of the complete extended document
    pub full_length: u32,
    /// Offset of this portion within the complete document
    pub starting_offset: u32,
    /// This portion's bytes
    pub portion: Vec<u8>,
}

impl ExtendedXmpApp1Segment {
    pub(crate) const SEGMENT_KEY: SegmentKey =
        SegmentKey::with_static_identifier(marker::APP1, EXTENDED_XMP_IDENTIFIER);

    /// The fingerprint as 32 uppercase hex digits, the form it takes on the
    /// wire and in the `xmpNote:HasExtendedXMP` attribute
    pub fn fingerprint_hex(&self) -> String {
        fingerprint_to_hex(&self.fingerprint)
    }

    pub(crate) fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        let length = length.sub(32)?;
        let (hex, _) = stream.read_ascii_string(32, NulBehavior::TrimTrailing)?;
        self.fingerprint = fingerprint_from_hex(&hex)?;
        self.full_length = stream.read_u32_be()?;
        let length = length.sub(4)?;
        self.starting_offset = stream.read_u32_be()?;
        let length = length.sub(4)?;
        self.portion.resize(length.remaining(), 0);
        stream.read_exact(&mut self.portion)
    }

    pub(crate) fn validate_and_compute_body_length(&self) -> Result<usize> {
        Ok(32 + 4 + 4 + self.portion.len())
    }

    pub(crate) fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.fingerprint_hex().as_bytes())?;
        writer.write_u32::<BigEndian>(self.full_length)?;
        writer.write_u32::<BigEndian>(self.starting_offset)?;
        writer.write_all(&self.portion)?;
        Ok(())
    }
}

/// Encode an MD5 digest as 32 uppercase hex digits
pub(crate) fn fingerprint_to_hex(fingerprint: &[u8; 16]) -> String {
    let mut hex = String::with_capacity(32);
    for byte in fingerprint {
        use std::fmt::Write as _;
        let _ = write!(hex, "{byte:02X}");
    }
    hex
}

/// Parse 32 ASCII hex digits into an MD5 digest
pub(crate) fn fingerprint_from_hex(hex: &str) -> Result<[u8; 16]> {
    let bytes = hex.as_bytes();
    if bytes.len() != 32 {
        return Err(Error::BadExtendedXmp(format!(
            "fingerprint \"{hex}\" is not 32 hex digits"
        )));
    }
    let mut fingerprint = [0u8; 16];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let hi = hex_value(pair[0])?;
        let lo = hex_value(pair[1])?;
        fingerprint[i] = hi << 4 | lo;
    }
    Ok(fingerprint)
}

fn hex_value(digit: u8) -> Result<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => Err(Error::BadExtendedXmp(format!(
            "fingerprint contains non-hex byte 0x{digit:02X}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn body_stream(bytes: &[u8]) -> (BufStream<Cursor<Vec<u8>>>, SegmentLength) {
        let length =
            SegmentLength::new(marker::APP1, (bytes.len() + 2) as u16, bytes.len() as u16).unwrap();
        (BufStream::new(Cursor::new(bytes.to_vec())), length)
    }

    #[test]
    fn test_exif_read_requires_pad_byte() {
        let (mut stream, length) = body_stream(&[0x01, 0xAA]);
        let mut seg = ExifApp1Segment::default();
        assert!(seg.read_body(&mut stream, length).is_err());

        let (mut stream, length) = body_stream(&[0x00, 0xAA, 0xBB]);
        let mut seg = ExifApp1Segment::default();
        seg.read_body(&mut stream, length).unwrap();
        assert_eq!(seg.data, vec![0xAA, 0xBB]);
        assert_eq!(seg.validate_and_compute_body_length().unwrap(), 3);
    }

    #[test]
    fn test_exif_payload_limit() {
        let seg = ExifApp1Segment {
            data: vec![0; MAX_EXIF_PAYLOAD],
        };
        assert!(seg.validate_and_compute_body_length().is_ok());

        let seg = ExifApp1Segment {
            data: vec![0; MAX_EXIF_PAYLOAD + 1],
        };
        assert!(seg.validate_and_compute_body_length().is_err());
    }

    #[test]
    fn test_xmp_requires_packet_for_write() {
        let seg = XmpApp1Segment::default();
        assert!(seg.validate_and_compute_body_length().is_err());

        let seg = XmpApp1Segment {
            packet: Some("<x/>".to_string()),
        };
        assert_eq!(seg.validate_and_compute_body_length().unwrap(), 4);
    }

    #[test]
    fn test_xmp_read_rejects_invalid_utf8() {
        let (mut stream, length) = body_stream(&[0xFF, 0xFE, 0x00]);
        let mut seg = XmpApp1Segment::default();
        assert!(seg.read_body(&mut stream, length).is_err());
    }

    #[test]
    fn test_extended_xmp_round_trip() {
        let mut body = Vec::new();
        body.extend_from_slice(b"00112233445566778899AABBCCDDEEFF");
        body.extend_from_slice(&[0x00, 0x00, 0x01, 0x00]); // full_length = 256
        body.extend_from_slice(&[0x00, 0x00, 0x00, 0x40]); // offset = 64
        body.extend_from_slice(&[1, 2, 3]);

        let (mut stream, length) = body_stream(&body);
        let mut seg = ExtendedXmpApp1Segment::default();
        seg.read_body(&mut stream, length).unwrap();

        assert_eq!(seg.fingerprint_hex(), "00112233445566778899AABBCCDDEEFF");
        assert_eq!(seg.full_length, 256);
        assert_eq!(seg.starting_offset, 64);
        assert_eq!(seg.portion, vec![1, 2, 3]);
        assert_eq!(
            seg.validate_and_compute_body_length().unwrap(),
            body.len()
        );

        let mut out = Vec::new();
        seg.write_body(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn test_extended_xmp_rejects_bad_hex() {
        let mut body = Vec::new();
        body.extend_from_slice(b"00112233445566778899AABBCCDDEEZZ");
        body.extend_from_slice(&[0; 8]);
        let (mut stream, length) = body_stream(&body);
        let mut seg = ExtendedXmpApp1Segment::default();
        let err = seg.read_body(&mut stream, length).unwrap_err();
        assert!(matches!(err, Error::BadExtendedXmp(_)));
    }

    #[test]
    fn test_fingerprint_hex_parse_lowercase() {
        let fp = fingerprint_from_hex("00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(fingerprint_to_hex(&fp), "00112233445566778899AABBCCDDEEFF");
    }
}
