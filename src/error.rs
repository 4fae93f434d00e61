//! Error types for jfif-io

use std::io;

/// Result type for jfif-io operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while framing, editing, or transcoding JFIF metadata
///
/// Transport failures (including end-of-stream) surface as [`Error::Io`] and
/// bubble up unchanged from the underlying stream; everything else is a
/// domain failure with a human-readable message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the underlying byte stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A byte where the 0xFF marker indicator was required held something else
    #[error("expected marker indicator 0xFF, found 0x{found:02X}")]
    ExpectedMarkerIndicator {
        /// The byte actually read
        found: u8,
    },

    /// A segment body tried to consume more bytes than its length field permits
    #[error("expected more header length in segment {marker}")]
    LengthUnderrun {
        /// Human-readable marker label (e.g. "APP1")
        marker: &'static str,
    },

    /// Serialization would produce a total segment length above 65535
    #[error("segment {marker} serializes to {total} bytes, exceeding the 65535 length limit")]
    OversizedSegment {
        /// Human-readable marker label
        marker: &'static str,
        /// The total length that was computed
        total: usize,
    },

    /// An enumerated wire value outside its defined set
    #[error("unrecognized {what} 0x{value:02X}")]
    UnrecognizedVariant {
        /// What kind of value was being decoded
        what: &'static str,
        /// The offending byte
        value: u8,
    },

    /// Buffers disagree with their declared dimensions
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Extended-XMP portions are not contiguous, do not sum to the announced
    /// full length, or fail MD5 verification
    #[error("invalid extended XMP: {0}")]
    BadExtendedXmp(String),

    /// The XMP document root is not `<x:xmpmeta>` with exactly one `<rdf:RDF>` child
    #[error("invalid XMP root: {0}")]
    BadXmpRoot(String),

    /// A segment found at a key is not of the expected concrete type
    #[error("segment at {key} is not of the expected type")]
    TypeMismatch {
        /// Display form of the segment key that was looked up
        key: String,
    },

    /// Invalid segment state or registry misuse
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    /// XML parsing error (from quick-xml)
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    /// True if this error is an end-of-stream transport failure
    pub fn is_eos(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

pub(crate) fn eos(context: &str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, context.to_string()))
}
