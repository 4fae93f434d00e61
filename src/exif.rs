//! EXIF payload splitting and joining
//!
//! EXIF bytes larger than one APP1 segment are carried across several
//! back-to-back APP1 "Exif" segments. This codec concatenates them on read
//! and redistributes a new payload over existing segments on write, creating
//! and removing segments as the chunk count changes. The bytes themselves
//! stay opaque; tag-level parsing is out of scope.

use crate::error::{Error, Result};
use crate::metadata::JfifMetadata;
use crate::segments::{
    ExifApp1Segment, JfifApp0Segment, JfxxApp0Segment, Segment, SegmentKey, TypedSegment,
};
use log::debug;

pub use crate::segments::app1::MAX_EXIF_PAYLOAD;

/// Concatenate the payloads of every APP1 "Exif" segment, in order
///
/// Segments with empty payloads are skipped. Returns `None` when no segment
/// contributes any bytes.
pub fn exif_data(metadata: &JfifMetadata) -> Option<Vec<u8>> {
    let mut data = Vec::new();
    for (_, segment) in metadata.find_all_typed::<ExifApp1Segment>() {
        data.extend_from_slice(&segment.data);
    }
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

/// Distribute an EXIF payload over APP1 "Exif" segments
///
/// `None` or empty input removes every EXIF segment. Otherwise the payload
/// is split into chunks of `max_bytes_per_segment` (default: the largest a
/// segment can carry); the first chunk lands in the existing first EXIF
/// segment or a new one placed after the last of {JFIF APP0, JFXX APP0,
/// SOI}, later chunks reuse immediately following EXIF segments where they
/// exist, and leftover EXIF segments past the last chunk are removed.
/// Surrounding non-EXIF segments keep their positions.
pub fn set_exif_data(
    metadata: &mut JfifMetadata,
    exif: Option<&[u8]>,
    max_bytes_per_segment: Option<usize>,
) -> Result<()> {
    let max = max_bytes_per_segment.unwrap_or(MAX_EXIF_PAYLOAD);
    if max == 0 || max > MAX_EXIF_PAYLOAD {
        return Err(Error::InvalidSegment(format!(
            "max_bytes_per_segment must be between 1 and {MAX_EXIF_PAYLOAD}, got {max}"
        )));
    }

    let exif = match exif {
        None | Some([]) => {
            metadata.remove_all(&ExifApp1Segment::KEY);
            return Ok(());
        }
        Some(exif) => exif,
    };

    let preceding = [JfifApp0Segment::KEY, JfxxApp0Segment::KEY];
    let mut position = 0;
    for (chunk_index, chunk) in exif.chunks(max).enumerate() {
        if chunk_index == 0 {
            let (index, created) = metadata.get_or_create::<ExifApp1Segment>(false, &preceding)?;
            debug!(
                "exif chunk 0 ({} bytes) -> segment {index}{}",
                chunk.len(),
                if created { " (created)" } else { "" }
            );
            position = index;
        } else {
            position += 1;
            let reuse = matches!(metadata.get(position), Some(Segment::ExifApp1(_)));
            if !reuse {
                metadata.insert_at(position, ExifApp1Segment::default());
            }
            debug!("exif chunk {chunk_index} ({} bytes) -> segment {position}", chunk.len());
        }
        let segment = metadata.typed_mut::<ExifApp1Segment>(position)?;
        segment.data.clear();
        segment.data.extend_from_slice(chunk);
    }

    remove_exif_after(metadata, position);
    Ok(())
}

/// Remove every EXIF segment stored at an index greater than `position`
fn remove_exif_after(metadata: &mut JfifMetadata, position: usize) {
    let key: SegmentKey = ExifApp1Segment::KEY;
    let mut index = metadata.len();
    while index > position + 1 {
        index -= 1;
        if metadata.get(index).is_some_and(|segment| segment.key() == key) {
            metadata.remove_at(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::XmpApp1Segment;

    fn meta_with_exif(payloads: &[&[u8]]) -> JfifMetadata {
        let mut meta = JfifMetadata::new();
        meta.push(Segment::Soi);
        for payload in payloads {
            meta.push(ExifApp1Segment {
                data: payload.to_vec(),
            });
        }
        meta.push(Segment::Eoi);
        meta
    }

    fn collect_exif(meta: &JfifMetadata) -> Vec<Vec<u8>> {
        meta.find_all_typed::<ExifApp1Segment>()
            .map(|(_, segment)| segment.data.clone())
            .collect()
    }

    #[test]
    fn test_deserialize_concatenates_in_order() {
        let meta = meta_with_exif(&[&[1, 2], &[], &[3]]);
        assert_eq!(exif_data(&meta), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_deserialize_none_when_empty() {
        let meta = meta_with_exif(&[]);
        assert_eq!(exif_data(&meta), None);

        let meta = meta_with_exif(&[&[]]);
        assert_eq!(exif_data(&meta), None);
    }

    #[test]
    fn test_set_none_removes_all() {
        let mut meta = meta_with_exif(&[&[1], &[2]]);
        set_exif_data(&mut meta, None, None).unwrap();
        assert_eq!(meta.find_first_index(&ExifApp1Segment::KEY), None);
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn test_split_and_truncate() {
        // Three existing segments, seven bytes, four per segment: the third
        // segment disappears.
        let mut meta = meta_with_exif(&[&[0; 3], &[0; 1], &[0; 2]]);
        set_exif_data(
            &mut meta,
            Some(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]),
            Some(4),
        )
        .unwrap();

        assert_eq!(
            collect_exif(&meta),
            vec![vec![0x11, 0x22, 0x33, 0x44], vec![0x55, 0x66, 0x77]]
        );
        // SOI and EOI keep their places around the pair.
        assert_eq!(meta.len(), 4);
        assert!(matches!(meta.get(0), Some(Segment::Soi)));
        assert!(matches!(meta.get(3), Some(Segment::Eoi)));
    }

    #[test]
    fn test_grow_inserts_adjacent_segments() {
        let mut meta = meta_with_exif(&[&[0; 2]]);
        set_exif_data(&mut meta, Some(&[1, 2, 3, 4, 5]), Some(2)).unwrap();
        assert_eq!(
            collect_exif(&meta),
            vec![vec![1, 2], vec![3, 4], vec![5]]
        );
    }

    #[test]
    fn test_create_lands_after_app0() {
        let mut meta = JfifMetadata::new();
        meta.push(Segment::Soi);
        meta.push(JfifApp0Segment::default());
        meta.push(XmpApp1Segment::default());
        meta.push(Segment::Eoi);

        set_exif_data(&mut meta, Some(&[9]), None).unwrap();
        // After JFIF APP0, before the XMP segment.
        assert!(meta.get(2).unwrap().as_exif_app1().is_some());
    }

    #[test]
    fn test_exact_boundary_single_segment() {
        let mut meta = meta_with_exif(&[]);
        let payload = vec![0xAA; MAX_EXIF_PAYLOAD];
        set_exif_data(&mut meta, Some(&payload), None).unwrap();
        assert_eq!(collect_exif(&meta).len(), 1);

        let payload = vec![0xAA; MAX_EXIF_PAYLOAD + 1];
        set_exif_data(&mut meta, Some(&payload), None).unwrap();
        let chunks = collect_exif(&meta);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), MAX_EXIF_PAYLOAD);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn test_round_trip() {
        let mut meta = meta_with_exif(&[]);
        let payload: Vec<u8> = (0..=255).collect();
        set_exif_data(&mut meta, Some(&payload), Some(100)).unwrap();
        assert_eq!(exif_data(&meta), Some(payload));
    }
}
