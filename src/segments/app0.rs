//! APP0 segments: the JFIF file header and the JFXX extension thumbnail

use crate::error::{Error, Result};
use crate::length::SegmentLength;
use crate::marker;
use crate::segments::SegmentKey;
use crate::stream::BufStream;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Read, Write};

/// Identifier carried in the body of the JFIF APP0 segment
pub const JFIF_IDENTIFIER: &str = "JFIF";

/// Identifier carried in the body of the JFXX APP0 segment
pub const JFXX_IDENTIFIER: &str = "JFXX";

/// Units for the JFIF pixel density fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DensityUnits {
    /// No units; density fields specify the pixel aspect ratio
    #[default]
    None,
    /// Dots per inch
    PixelsPerInch,
    /// Dots per centimeter
    PixelsPerCm,
}

impl DensityUnits {
    fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DensityUnits::None),
            1 => Ok(DensityUnits::PixelsPerInch),
            2 => Ok(DensityUnits::PixelsPerCm),
            _ => Err(Error::UnrecognizedVariant {
                what: "pixel density units",
                value,
            }),
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            DensityUnits::None => 0,
            DensityUnits::PixelsPerInch => 1,
            DensityUnits::PixelsPerCm => 2,
        }
    }
}

/// APP0 "JFIF" file header segment
#[derive(Debug, Clone, Default)]
pub struct JfifApp0Segment {
    /// JFIF version, major part
    pub version_major: u8,
    /// JFIF version, minor part
    pub version_minor: u8,
    /// Meaning of the density fields
    pub density_units: DensityUnits,
    /// Horizontal pixel density
    pub horizontal_density: u16,
    /// Vertical pixel density
    pub vertical_density: u16,
    /// Embedded thumbnail width in pixels
    pub thumbnail_width: u8,
    /// Embedded thumbnail height in pixels
    pub thumbnail_height: u8,
    /// Raw RGB thumbnail bytes, exactly `3 * width * height` of them
    pub thumbnail_rgb: Vec<u8>,
}

impl JfifApp0Segment {
    pub(crate) const SEGMENT_KEY: SegmentKey =
        SegmentKey::with_static_identifier(marker::APP0, JFIF_IDENTIFIER);

    pub(crate) fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        self.version_major = stream.read_u8()?;
        let length = length.sub1()?;
        self.version_minor = stream.read_u8()?;
        let length = length.sub1()?;
        self.density_units = DensityUnits::from_wire(stream.read_u8()?)?;
        let length = length.sub1()?;
        self.horizontal_density = stream.read_u16_be()?;
        let length = length.sub(2)?;
        self.vertical_density = stream.read_u16_be()?;
        let length = length.sub(2)?;
        self.thumbnail_width = stream.read_u8()?;
        let length = length.sub1()?;
        self.thumbnail_height = stream.read_u8()?;
        let length = length.sub1()?;

        let rgb_len = 3 * self.thumbnail_width as usize * self.thumbnail_height as usize;
        let length = length.sub(rgb_len)?;
        self.thumbnail_rgb.resize(rgb_len, 0);
        stream.read_exact(&mut self.thumbnail_rgb)?;

        stream.skip(length.remaining())
    }

    pub(crate) fn validate_and_compute_body_length(&self) -> Result<usize> {
        let expected = 3 * self.thumbnail_width as usize * self.thumbnail_height as usize;
        if self.thumbnail_rgb.len() != expected {
            return Err(Error::ShapeMismatch(format!(
                "JFIF thumbnail holds {} RGB bytes for {}x{} pixels, expected {expected}",
                self.thumbnail_rgb.len(),
                self.thumbnail_width,
                self.thumbnail_height
            )));
        }
        Ok(9 + self.thumbnail_rgb.len())
    }

    pub(crate) fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.version_major)?;
        writer.write_u8(self.version_minor)?;
        writer.write_u8(self.density_units.to_wire())?;
        writer.write_u16::<BigEndian>(self.horizontal_density)?;
        writer.write_u16::<BigEndian>(self.vertical_density)?;
        writer.write_u8(self.thumbnail_width)?;
        writer.write_u8(self.thumbnail_height)?;
        writer.write_all(&self.thumbnail_rgb)?;
        Ok(())
    }
}

/// JFXX thumbnail format tag for a nested JPEG stream
pub const JFXX_FORMAT_JPEG: u8 = 0x10;
/// JFXX thumbnail format tag for one-byte palettized pixels
pub const JFXX_FORMAT_PALETTE: u8 = 0x11;
/// JFXX thumbnail format tag for three-byte RGB pixels
pub const JFXX_FORMAT_RGB: u8 = 0x13;

/// The three JFXX thumbnail encodings, exactly one of which a segment holds
///
/// The variant itself carries the invariant that the payload matches the
/// format tag, so no "exactly one of three buffers is set" check is needed.
#[derive(Debug, Clone)]
pub enum JfxxThumbnail {
    /// A nested SOI..EOI JPEG stream; `data` holds the bytes between the two
    /// markers
    Jpeg {
        /// Bytes between the nested SOI and EOI
        data: Vec<u8>,
    },
    /// One byte per pixel indexing into a 768-byte RGB palette
    Palette {
        /// Thumbnail width in pixels
        width: u8,
        /// Thumbnail height in pixels
        height: u8,
        /// 256 RGB triples
        palette: Vec<u8>,
        /// `width * height` palette indices
        indices: Vec<u8>,
    },
    /// Three bytes per pixel
    Rgb {
        /// Thumbnail width in pixels
        width: u8,
        /// Thumbnail height in pixels
        height: u8,
        /// `3 * width * height` RGB bytes
        rgb: Vec<u8>,
    },
}

impl JfxxThumbnail {
    /// The on-wire format tag for this variant
    pub fn format_tag(&self) -> u8 {
        match self {
            JfxxThumbnail::Jpeg { .. } => JFXX_FORMAT_JPEG,
            JfxxThumbnail::Palette { .. } => JFXX_FORMAT_PALETTE,
            JfxxThumbnail::Rgb { .. } => JFXX_FORMAT_RGB,
        }
    }
}

impl Default for JfxxThumbnail {
    fn default() -> Self {
        JfxxThumbnail::Jpeg { data: Vec::new() }
    }
}

/// APP0 "JFXX" extension segment holding a thumbnail
#[derive(Debug, Clone, Default)]
pub struct JfxxApp0Segment {
    /// The thumbnail payload
    pub thumbnail: JfxxThumbnail,
}

impl JfxxApp0Segment {
    pub(crate) const SEGMENT_KEY: SegmentKey =
        SegmentKey::with_static_identifier(marker::APP0, JFXX_IDENTIFIER);

    pub(crate) fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        let format = stream.read_u8()?;
        let length = length.sub1()?;

        match format {
            JFXX_FORMAT_JPEG => {
                let mut soi = [0u8; 2];
                stream.read_exact(&mut soi)?;
                let length = length.sub(2)?;
                if soi != [marker::INDICATOR, marker::SOI] {
                    return Err(Error::InvalidSegment(
                        "JFXX JPEG thumbnail does not start with SOI".to_string(),
                    ));
                }

                let mut data = Vec::new();
                let outcome = stream.scan(&mut data, 2, Some(length.remaining()), |window| {
                    window
                        .windows(2)
                        .position(|pair| pair == [marker::INDICATOR, marker::EOI])
                })?;
                if !outcome.is_positive_match {
                    return Err(Error::InvalidSegment(
                        "JFXX JPEG thumbnail has no EOI within the declared segment length"
                            .to_string(),
                    ));
                }
                let length = length.sub(outcome.bytes_read)?;
                stream.skip(2)?;
                let length = length.sub(2)?;
                self.thumbnail = JfxxThumbnail::Jpeg { data };
                stream.skip(length.remaining())
            }
            JFXX_FORMAT_PALETTE => {
                let width = stream.read_u8()?;
                let height = stream.read_u8()?;
                let length = length.sub(2)?;
                let mut palette = vec![0u8; 768];
                stream.read_exact(&mut palette)?;
                let length = length.sub(768)?;
                let index_len = width as usize * height as usize;
                let mut indices = vec![0u8; index_len];
                stream.read_exact(&mut indices)?;
                let length = length.sub(index_len)?;
                self.thumbnail = JfxxThumbnail::Palette {
                    width,
                    height,
                    palette,
                    indices,
                };
                stream.skip(length.remaining())
            }
            JFXX_FORMAT_RGB => {
                let width = stream.read_u8()?;
                let height = stream.read_u8()?;
                let length = length.sub(2)?;
                let rgb_len = 3 * width as usize * height as usize;
                let mut rgb = vec![0u8; rgb_len];
                stream.read_exact(&mut rgb)?;
                let length = length.sub(rgb_len)?;
                self.thumbnail = JfxxThumbnail::Rgb { width, height, rgb };
                stream.skip(length.remaining())
            }
            value => Err(Error::UnrecognizedVariant {
                what: "JFXX thumbnail format",
                value,
            }),
        }
    }

    pub(crate) fn validate_and_compute_body_length(&self) -> Result<usize> {
        match &self.thumbnail {
            JfxxThumbnail::Jpeg { data } => Ok(1 + 2 + data.len() + 2),
            JfxxThumbnail::Palette {
                width,
                height,
                palette,
                indices,
            } => {
                if palette.len() != 768 {
                    return Err(Error::ShapeMismatch(format!(
                        "JFXX palette holds {} bytes, expected 768",
                        palette.len()
                    )));
                }
                let expected = *width as usize * *height as usize;
                if indices.len() != expected {
                    return Err(Error::ShapeMismatch(format!(
                        "JFXX palettized thumbnail holds {} index bytes for {width}x{height} \
                         pixels, expected {expected}",
                        indices.len()
                    )));
                }
                Ok(1 + 2 + 768 + indices.len())
            }
            JfxxThumbnail::Rgb { width, height, rgb } => {
                let expected = 3 * *width as usize * *height as usize;
                if rgb.len() != expected {
                    return Err(Error::ShapeMismatch(format!(
                        "JFXX RGB thumbnail holds {} bytes for {width}x{height} pixels, \
                         expected {expected}",
                        rgb.len()
                    )));
                }
                Ok(1 + 2 + rgb.len())
            }
        }
    }

    pub(crate) fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.thumbnail.format_tag())?;
        match &self.thumbnail {
            JfxxThumbnail::Jpeg { data } => {
                writer.write_u8(marker::INDICATOR)?;
                writer.write_u8(marker::SOI)?;
                writer.write_all(data)?;
                writer.write_u8(marker::INDICATOR)?;
                writer.write_u8(marker::EOI)?;
            }
            JfxxThumbnail::Palette {
                width,
                height,
                palette,
                indices,
            } => {
                writer.write_u8(*width)?;
                writer.write_u8(*height)?;
                writer.write_all(palette)?;
                writer.write_all(indices)?;
            }
            JfxxThumbnail::Rgb { width, height, rgb } => {
                writer.write_u8(*width)?;
                writer.write_u8(*height)?;
                writer.write_all(rgb)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn body_stream(bytes: &[u8]) -> (BufStream<Cursor<Vec<u8>>>, SegmentLength) {
        let length =
            SegmentLength::new(marker::APP0, (bytes.len() + 2) as u16, bytes.len() as u16).unwrap();
        (BufStream::new(Cursor::new(bytes.to_vec())), length)
    }

    #[test]
    fn test_jfif_read_and_validate() {
        // 1x2 thumbnail, 6 RGB bytes.
        let body = [
            0x07, 0x08, 0x01, 0x12, 0x34, 0x56, 0x78, 0x01, 0x02, 0x01, 0x02, 0x03, 0x04, 0x05,
            0x06,
        ];
        let (mut stream, length) = body_stream(&body);
        let mut seg = JfifApp0Segment::default();
        seg.read_body(&mut stream, length).unwrap();

        assert_eq!(seg.version_major, 7);
        assert_eq!(seg.version_minor, 8);
        assert_eq!(seg.density_units, DensityUnits::PixelsPerInch);
        assert_eq!(seg.horizontal_density, 0x1234);
        assert_eq!(seg.vertical_density, 0x5678);
        assert_eq!(seg.thumbnail_rgb, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(seg.validate_and_compute_body_length().unwrap(), 15);

        let mut out = Vec::new();
        seg.write_body(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn test_jfif_truncated_thumbnail_underruns() {
        // Declares a 2x2 thumbnail but the length field covers no RGB bytes.
        let body = [0x01, 0x02, 0x00, 0x00, 0x01, 0x00, 0x01, 0x02, 0x02];
        let (mut stream, length) = body_stream(&body);
        let mut seg = JfifApp0Segment::default();
        let err = seg.read_body(&mut stream, length).unwrap_err();
        assert!(matches!(err, Error::LengthUnderrun { .. }));
    }

    #[test]
    fn test_jfif_shape_mismatch() {
        let seg = JfifApp0Segment {
            thumbnail_width: 2,
            thumbnail_height: 1,
            thumbnail_rgb: vec![0; 5],
            ..Default::default()
        };
        assert!(matches!(
            seg.validate_and_compute_body_length(),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_jfxx_unknown_format() {
        let (mut stream, length) = body_stream(&[0x12]);
        let mut seg = JfxxApp0Segment::default();
        let err = seg.read_body(&mut stream, length).unwrap_err();
        assert!(matches!(
            err,
            Error::UnrecognizedVariant {
                what: "JFXX thumbnail format",
                value: 0x12
            }
        ));
    }

    #[test]
    fn test_jfxx_jpeg_thumbnail_round_trip() {
        // format, SOI, two data bytes (one a stuffed FF), EOI.
        let body = [0x10, 0xFF, 0xD8, 0xAB, 0xCD, 0xFF, 0xD9];
        let (mut stream, length) = body_stream(&body);
        let mut seg = JfxxApp0Segment::default();
        seg.read_body(&mut stream, length).unwrap();

        match &seg.thumbnail {
            JfxxThumbnail::Jpeg { data } => assert_eq!(data, &vec![0xAB, 0xCD]),
            other => panic!("wrong variant: {other:?}"),
        }
        assert_eq!(seg.validate_and_compute_body_length().unwrap(), body.len());

        let mut out = Vec::new();
        seg.write_body(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn test_jfxx_jpeg_thumbnail_missing_eoi() {
        let body = [0x10, 0xFF, 0xD8, 0xAB, 0xCD];
        let (mut stream, length) = body_stream(&body);
        let mut seg = JfxxApp0Segment::default();
        assert!(seg.read_body(&mut stream, length).is_err());
    }

    #[test]
    fn test_jfxx_rgb_round_trip() {
        let mut body = vec![0x13, 0x02, 0x01];
        body.extend_from_slice(&[10, 20, 30, 40, 50, 60]);
        let (mut stream, length) = body_stream(&body);
        let mut seg = JfxxApp0Segment::default();
        seg.read_body(&mut stream, length).unwrap();

        let mut out = Vec::new();
        seg.write_body(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn test_jfxx_palette_shape_mismatch() {
        let seg = JfxxApp0Segment {
            thumbnail: JfxxThumbnail::Palette {
                width: 2,
                height: 2,
                palette: vec![0; 768],
                indices: vec![0; 3],
            },
        };
        assert!(matches!(
            seg.validate_and_compute_body_length(),
            Err(Error::ShapeMismatch(_))
        ));
    }
}
