//! Typed segment representations
//!
//! Each built-in segment kind is a plain struct with the fields of its wire
//! body; [`Segment`] is the tagged union over them plus a generic fallback
//! for markers the registry has no mapping for. Shared behavior (key,
//! length-field presence, body read/validate/write) is dispatched through
//! inherent methods on the enum.

pub mod app0;
pub mod app1;
pub mod generic;
pub mod sos;

use crate::error::Result;
use crate::length::SegmentLength;
use crate::marker;
use crate::stream::BufStream;
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};

pub use self::app0::{DensityUnits, JfifApp0Segment, JfxxApp0Segment, JfxxThumbnail};
pub use self::app1::{ExifApp1Segment, ExtendedXmpApp1Segment, XmpApp1Segment};
pub use self::generic::GenericSegment;
pub use self::sos::{SosComponent, SosSegment};

/// Identity of a segment: its marker plus the optional ASCII identifier that
/// namespaces markers with multiple conventional uses (chiefly APP0/APP1)
///
/// Two keys are equal iff both fields are equal; a key with no identifier
/// matches only segments that carry none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    marker: u8,
    identifier: Option<Cow<'static, str>>,
}

impl SegmentKey {
    /// Key for the SOI segment
    pub const SOI: SegmentKey = SegmentKey::no_identifier(marker::SOI);
    /// Key for the EOI segment
    pub const EOI: SegmentKey = SegmentKey::no_identifier(marker::EOI);
    /// Key for the SOS segment
    pub const SOS: SegmentKey = SegmentKey::no_identifier(marker::SOS);

    /// Key for a marker with no body identifier
    pub const fn no_identifier(marker: u8) -> Self {
        Self {
            marker,
            identifier: None,
        }
    }

    /// Key for a marker namespaced by a static identifier
    pub const fn with_static_identifier(marker: u8, identifier: &'static str) -> Self {
        Self {
            marker,
            identifier: Some(Cow::Borrowed(identifier)),
        }
    }

    /// Key for a marker namespaced by a runtime identifier
    pub fn with_identifier(marker: u8, identifier: impl Into<String>) -> Self {
        Self {
            marker,
            identifier: Some(Cow::Owned(identifier.into())),
        }
    }

    /// The marker code
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// The identifier, if this key carries one
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Serialized length of the identifier including its NUL terminator, or
    /// zero when the key has none
    pub(crate) fn identifier_len_with_nul(&self) -> usize {
        self.identifier().map(|id| id.len() + 1).unwrap_or(0)
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identifier() {
            Some(id) => write!(f, "{} \"{}\"", marker::label(self.marker), id),
            None => write!(f, "{}", marker::label(self.marker)),
        }
    }
}

/// A typed segment that knows its own key and framing shape at compile time
///
/// Implemented by every built-in segment struct; caller-defined segments
/// implement it to participate in the registry and the typed container
/// operations. [`GenericSegment`] does not implement it because its key is
/// only known at runtime.
pub trait TypedSegment: Sized + Into<Segment> {
    /// The key this segment type is stored and looked up under
    const KEY: SegmentKey;

    /// Whether the on-wire encoding carries a 16-bit length field
    const HAS_LENGTH: bool;

    /// Borrow this type out of a [`Segment`], if it is the right variant
    fn from_segment(segment: &Segment) -> Option<&Self>;

    /// Mutably borrow this type out of a [`Segment`]
    fn from_segment_mut(segment: &mut Segment) -> Option<&mut Self>;
}

/// One segment of a JFIF stream
#[derive(Debug, Clone)]
pub enum Segment {
    /// Start of image; no length, no body
    Soi,
    /// End of image; no length, no body
    Eoi,
    /// APP0 "JFIF" file header
    JfifApp0(JfifApp0Segment),
    /// APP0 "JFXX" extension thumbnail
    JfxxApp0(JfxxApp0Segment),
    /// APP1 "Exif" payload carrier
    ExifApp1(ExifApp1Segment),
    /// APP1 XMP packet
    XmpApp1(XmpApp1Segment),
    /// APP1 Extended-XMP portion
    ExtendedXmpApp1(ExtendedXmpApp1Segment),
    /// Start of scan plus the entropy-coded payload that follows it
    Sos(SosSegment),
    /// Any marker the registry has no mapping for
    Generic(GenericSegment),
}

impl Segment {
    /// The key identifying this segment
    pub fn key(&self) -> SegmentKey {
        match self {
            Segment::Soi => SegmentKey::SOI,
            Segment::Eoi => SegmentKey::EOI,
            Segment::JfifApp0(_) => JfifApp0Segment::KEY,
            Segment::JfxxApp0(_) => JfxxApp0Segment::KEY,
            Segment::ExifApp1(_) => ExifApp1Segment::KEY,
            Segment::XmpApp1(_) => XmpApp1Segment::KEY,
            Segment::ExtendedXmpApp1(_) => ExtendedXmpApp1Segment::KEY,
            Segment::Sos(_) => SegmentKey::SOS,
            Segment::Generic(seg) => seg.key(),
        }
    }

    /// The marker code of this segment
    pub fn marker(&self) -> u8 {
        self.key().marker()
    }

    /// Whether the on-wire encoding carries a 16-bit length field
    pub fn has_length(&self) -> bool {
        !matches!(self, Segment::Soi | Segment::Eoi)
    }

    /// Consume exactly `length.remaining()` body bytes from the stream and
    /// populate this segment's fields
    pub fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        match self {
            Segment::Soi | Segment::Eoi => Ok(()),
            Segment::JfifApp0(seg) => seg.read_body(stream, length),
            Segment::JfxxApp0(seg) => seg.read_body(stream, length),
            Segment::ExifApp1(seg) => seg.read_body(stream, length),
            Segment::XmpApp1(seg) => seg.read_body(stream, length),
            Segment::ExtendedXmpApp1(seg) => seg.read_body(stream, length),
            Segment::Sos(seg) => seg.read_body(stream, length),
            Segment::Generic(seg) => seg.read_body(stream, length),
        }
    }

    /// Check internal consistency and return the serialized body length in
    /// bytes (after any identifier)
    pub fn validate_and_compute_body_length(&self) -> Result<usize> {
        match self {
            Segment::Soi | Segment::Eoi => Ok(0),
            Segment::JfifApp0(seg) => seg.validate_and_compute_body_length(),
            Segment::JfxxApp0(seg) => seg.validate_and_compute_body_length(),
            Segment::ExifApp1(seg) => seg.validate_and_compute_body_length(),
            Segment::XmpApp1(seg) => seg.validate_and_compute_body_length(),
            Segment::ExtendedXmpApp1(seg) => seg.validate_and_compute_body_length(),
            Segment::Sos(seg) => seg.validate_and_compute_body_length(),
            Segment::Generic(seg) => seg.validate_and_compute_body_length(),
        }
    }

    /// Write the segment body (everything after marker, length, identifier)
    pub fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Segment::Soi | Segment::Eoi => Ok(()),
            Segment::JfifApp0(seg) => seg.write_body(writer),
            Segment::JfxxApp0(seg) => seg.write_body(writer),
            Segment::ExifApp1(seg) => seg.write_body(writer),
            Segment::XmpApp1(seg) => seg.write_body(writer),
            Segment::ExtendedXmpApp1(seg) => seg.write_body(writer),
            Segment::Sos(seg) => seg.write_body(writer),
            Segment::Generic(seg) => seg.write_body(writer),
        }
    }

    /// Write the out-of-band payload that follows the framed segment, if this
    /// segment type owns one (only SOS does)
    pub fn write_out_of_band<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Segment::Sos(seg) => seg.write_out_of_band(writer),
            _ => Ok(()),
        }
    }
}

macro_rules! segment_variant {
    ($ty:ident, $variant:ident, $as_ref:ident, $as_mut:ident) => {
        impl From<$ty> for Segment {
            fn from(seg: $ty) -> Self {
                Segment::$variant(seg)
            }
        }

        impl TypedSegment for $ty {
            const KEY: SegmentKey = $ty::SEGMENT_KEY;
            const HAS_LENGTH: bool = true;

            fn from_segment(segment: &Segment) -> Option<&Self> {
                match segment {
                    Segment::$variant(seg) => Some(seg),
                    _ => None,
                }
            }

            fn from_segment_mut(segment: &mut Segment) -> Option<&mut Self> {
                match segment {
                    Segment::$variant(seg) => Some(seg),
                    _ => None,
                }
            }
        }

        impl Segment {
            /// Borrow the typed segment if this is the matching variant
            pub fn $as_ref(&self) -> Option<&$ty> {
                $ty::from_segment(self)
            }

            /// Mutably borrow the typed segment if this is the matching variant
            pub fn $as_mut(&mut self) -> Option<&mut $ty> {
                $ty::from_segment_mut(self)
            }
        }
    };
}

segment_variant!(JfifApp0Segment, JfifApp0, as_jfif_app0, as_jfif_app0_mut);
segment_variant!(JfxxApp0Segment, JfxxApp0, as_jfxx_app0, as_jfxx_app0_mut);
segment_variant!(ExifApp1Segment, ExifApp1, as_exif_app1, as_exif_app1_mut);
segment_variant!(XmpApp1Segment, XmpApp1, as_xmp_app1, as_xmp_app1_mut);
segment_variant!(
    ExtendedXmpApp1Segment,
    ExtendedXmpApp1,
    as_extended_xmp_app1,
    as_extended_xmp_app1_mut
);
segment_variant!(SosSegment, Sos, as_sos, as_sos_mut);

impl From<GenericSegment> for Segment {
    fn from(seg: GenericSegment) -> Self {
        Segment::Generic(seg)
    }
}

impl Segment {
    /// Borrow the generic segment if this is the fallback variant
    pub fn as_generic(&self) -> Option<&GenericSegment> {
        match self {
            Segment::Generic(seg) => Some(seg),
            _ => None,
        }
    }

    /// Mutably borrow the generic segment if this is the fallback variant
    pub fn as_generic_mut(&mut self) -> Option<&mut GenericSegment> {
        match self {
            Segment::Generic(seg) => Some(seg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality() {
        assert_eq!(SegmentKey::SOI, SegmentKey::no_identifier(marker::SOI));
        assert_ne!(SegmentKey::SOI, SegmentKey::EOI);
        assert_eq!(
            SegmentKey::with_identifier(marker::APP0, "JFIF"),
            JfifApp0Segment::KEY
        );
        // A key without identifier never matches one with.
        assert_ne!(
            SegmentKey::no_identifier(marker::APP0),
            JfifApp0Segment::KEY
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(SegmentKey::SOI.to_string(), "SOI");
        assert_eq!(ExifApp1Segment::KEY.to_string(), "APP1 \"Exif\"");
    }

    #[test]
    fn test_has_length() {
        assert!(!Segment::Soi.has_length());
        assert!(!Segment::Eoi.has_length());
        assert!(Segment::Sos(SosSegment::default()).has_length());
    }

    #[test]
    fn test_typed_downcast() {
        let seg: Segment = ExifApp1Segment::default().into();
        assert!(seg.as_exif_app1().is_some());
        assert!(seg.as_xmp_app1().is_none());
        assert!(ExifApp1Segment::from_segment(&seg).is_some());
        assert!(XmpApp1Segment::from_segment(&seg).is_none());
    }
}
