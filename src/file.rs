//! File-level read and write
//!
//! A byte source may hold one JFIF stream or several back-to-back (embedded
//! thumbnails, grayscale variants). `read_one` consumes exactly one stream;
//! `read_all` keeps going until the SOI probe comes up empty.

use crate::error::Result;
use crate::metadata::JfifMetadata;
use crate::reader::{probe_for_start_of_image, read_segment};
use crate::registry::SegmentRegistry;
use crate::segments::Segment;
use crate::stream::BufStream;
use crate::writer::write_segment;
use log::trace;
use std::io::{Read, Write};

/// Read one JFIF stream from the source
///
/// Returns `None` without consuming anything when the source does not start
/// with SOI (or has fewer than two bytes left). A source that starts a
/// stream but ends before EOI surfaces an end-of-stream failure.
pub fn read_one<R: Read>(
    stream: &mut BufStream<R>,
    registry: &SegmentRegistry,
) -> Result<Option<JfifMetadata>> {
    if !probe_for_start_of_image(stream)? {
        return Ok(None);
    }

    let mut metadata = JfifMetadata::new();
    loop {
        let segment = read_segment(stream, registry)?;
        let is_eoi = matches!(segment, Segment::Eoi);
        metadata.push(segment);
        if is_eoi {
            break;
        }
    }
    trace!("read stream with {} segments", metadata.len());
    Ok(Some(metadata))
}

/// Read every back-to-back JFIF stream in the source
pub fn read_all<R: Read>(
    stream: &mut BufStream<R>,
    registry: &SegmentRegistry,
) -> Result<Vec<JfifMetadata>> {
    let mut all = Vec::new();
    while let Some(metadata) = read_one(stream, registry)? {
        all.push(metadata);
    }
    Ok(all)
}

/// Write one JFIF stream, segment by segment, in container order
pub fn write_one<W: Write>(writer: &mut W, metadata: &JfifMetadata) -> Result<()> {
    for segment in metadata {
        write_segment(writer, segment)?;
    }
    Ok(())
}

/// Write several JFIF streams back-to-back
pub fn write_all<W: Write>(writer: &mut W, metadatas: &[JfifMetadata]) -> Result<()> {
    for metadata in metadatas {
        write_one(writer, metadata)?;
    }
    Ok(())
}
