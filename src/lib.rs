//! Reading, editing, and writing JFIF container metadata.
//!
//! This crate models a .JPG file as what it is at the container level: a
//! sequence of marker segments wrapping an entropy-coded payload. It parses
//! that sequence byte-accurately into typed segments, lets you edit the
//! ordered segment list, and writes it back byte-accurately. On top of the
//! framing engine sit two codecs: one that splits and joins EXIF payloads
//! across APP1 segments, and one that implements Adobe's Extended-XMP
//! split/merge protocol, MD5 fingerprints included.
//!
//! # Design Principles
//!
//! - **Byte-accurate**: a parsed stream reserializes to the same bytes
//! - **Permissive**: segment order is yours; no JFIF ordering rules are
//!   enforced and caller-authored invalid sequences are allowed
//! - **Typed segments**: built-in markers decode into structs, everything
//!   else lands in a generic fallback; caller types can join the registry
//!
//! # Quick Start
//!
//! ```
//! use jfif_io::{read_one, write_one, BufStream, SegmentRegistry};
//! use std::io::Cursor;
//!
//! # fn main() -> jfif_io::Result<()> {
//! // A minimal JFIF stream: SOI then EOI.
//! let bytes = vec![0xFF, 0xD8, 0xFF, 0xD9];
//! let mut stream = BufStream::new(Cursor::new(bytes.clone()));
//!
//! let metadata = read_one(&mut stream, SegmentRegistry::built_in())?
//!     .expect("starts with SOI");
//! assert_eq!(metadata.len(), 2);
//!
//! // Round-trips byte for byte.
//! let mut out = Vec::new();
//! write_one(&mut out, &metadata)?;
//! assert_eq!(out, bytes);
//! # Ok(())
//! # }
//! ```
//!
//! # Metadata Codecs
//!
//! ```
//! use jfif_io::{exif, xmp, JfifMetadata, Segment};
//!
//! # fn main() -> jfif_io::Result<()> {
//! let mut metadata = JfifMetadata::new();
//! metadata.push(Segment::Soi);
//! metadata.push(Segment::Eoi);
//!
//! // EXIF bytes are split across segments as needed.
//! exif::set_exif_data(&mut metadata, Some(&[0x4D, 0x4D, 0x00, 0x2A]), None)?;
//! assert_eq!(exif::exif_data(&metadata), Some(vec![0x4D, 0x4D, 0x00, 0x2A]));
//!
//! // XMP documents too large for one segment become Extended XMP.
//! let xmp = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
//!   <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
//!     <rdf:Description rdf:about=""/>
//!   </rdf:RDF>
//! </x:xmpmeta>"#;
//! xmp::set_xmp_string(&mut metadata, Some(xmp), &Default::default())?;
//! assert!(xmp::xmp_string(&metadata, &Default::default())?.is_some());
//! # Ok(())
//! # }
//! ```

mod error;
mod file;
mod length;
mod metadata;
mod reader;
mod registry;
mod stream;
mod writer;

pub mod exif;
pub mod marker;
pub mod segments;
pub mod xmp;

pub use error::{Error, Result};
pub use file::{read_all, read_one, write_all, write_one};
pub use length::SegmentLength;
pub use metadata::JfifMetadata;
pub use reader::{probe_for_start_of_image, read_segment};
pub use registry::{SegmentDescriptor, SegmentRegistry};
pub use segments::{
    DensityUnits, ExifApp1Segment, ExtendedXmpApp1Segment, GenericSegment, JfifApp0Segment,
    JfxxApp0Segment, JfxxThumbnail, Segment, SegmentKey, SosComponent, SosSegment, TypedSegment,
    XmpApp1Segment,
};
pub use stream::{BufStream, NulBehavior, ScanOutcome};
pub use writer::write_segment;
