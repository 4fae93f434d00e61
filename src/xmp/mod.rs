//! Adobe XMP and Extended-XMP codec
//!
//! An XMP document rides in a single APP1 segment when it fits. When it does
//! not, the Extended-XMP convention applies: content is moved out of the
//! base packet into a companion document, the companion is serialized and
//! fingerprinted with MD5, split into offset-addressed portions that each
//! fit a segment, and the base advertises the companion through an
//! `xmpNote:HasExtendedXMP` attribute carrying the fingerprint. This module
//! implements both directions: reassembling and merging portions on read,
//! and the greedy base-shrinking split on write.

pub mod dom;

use crate::error::{Error, Result};
use crate::metadata::JfifMetadata;
use crate::segments::app1::{fingerprint_to_hex, EXTENDED_XMP_IDENTIFIER, XMP_IDENTIFIER};
use crate::segments::{
    ExifApp1Segment, ExtendedXmpApp1Segment, JfifApp0Segment, JfxxApp0Segment, TypedSegment,
    XmpApp1Segment,
};
use self::dom::{XmlDocument, XmlElement, XmlName, XmlNode};
use log::{debug, warn};
use std::collections::HashMap;

/// Namespace of the `x:xmpmeta` document root
pub const X_NS: &str = "adobe:ns:meta/";
/// RDF syntax namespace
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
/// Namespace of the `xmpNote:HasExtendedXMP` pointer attribute
pub const XMP_NOTE_NS: &str = "http://ns.adobe.com/xmp/note/";

const XAP_IMG_NS: &str = "http://ns.adobe.com/xap/1.0/g/img/";
const CAMERA_RAW_NS: &str = "http://ns.adobe.com/camera-raw-settings/1.0/";
const PHOTOSHOP_NS: &str = "http://ns.adobe.com/photoshop/1.0/";

const HAS_EXTENDED_XMP: &str = "HasExtendedXMP";

/// Toolkit name written into `x:xmptk` on serialized documents
pub const XMP_TOOLKIT: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Largest UTF-8 base packet that fits one APP1 segment: 0xFFFF minus the
/// length field, the XMP identifier with its NUL, and a two-byte alignment
/// margin (the Adobe-stated 65502-byte maximum)
pub const MAX_XMP_BASE_BYTES: usize = 0xFFFF - 2 - (XMP_IDENTIFIER.len() + 1) - 2;

/// Largest portion one Extended-XMP segment can carry: 0xFFFF minus the
/// length field, the extension identifier with its NUL, the 32-digit
/// fingerprint, the two u32 length/offset fields, and the alignment margin
pub const MAX_XMP_PORTION_BYTES: usize =
    0xFFFF - 2 - (EXTENDED_XMP_IDENTIFIER.len() + 1) - 32 - 8 - 2;

/// Options for [`xmp_string`]
#[derive(Debug, Clone)]
pub struct XmpDeserializeOptions {
    /// Fail on malformed Extended-XMP groups instead of dropping them
    pub throw_on_invalid_samples: bool,
}

impl Default for XmpDeserializeOptions {
    fn default() -> Self {
        Self {
            throw_on_invalid_samples: true,
        }
    }
}

/// Options for [`set_xmp_string`]
#[derive(Debug, Clone)]
pub struct XmpSerializeOptions {
    /// UTF-8 size the base packet must shrink to before it is stored
    pub max_base_utf8_bytes: usize,
    /// UTF-8 size cap for each Extended-XMP portion
    pub max_portion_utf8_bytes: usize,
}

impl Default for XmpSerializeOptions {
    fn default() -> Self {
        Self {
            max_base_utf8_bytes: MAX_XMP_BASE_BYTES,
            max_portion_utf8_bytes: MAX_XMP_PORTION_BYTES,
        }
    }
}

/// Return the content between the `<?xpacket begin?>` and `<?xpacket end?>`
/// processing instructions, trimmed; input without a wrapper is returned
/// trimmed as-is
fn strip_xpacket(packet: &str) -> &str {
    let Some(begin) = packet.find("<?xpacket begin") else {
        return packet.trim();
    };
    let Some(pi_close) = packet[begin..].find("?>") else {
        return packet.trim();
    };
    let content_start = begin + pi_close + 2;
    match packet[content_start..].find("<?xpacket end") {
        Some(end) => packet[content_start..content_start + end].trim(),
        None => packet[content_start..].trim(),
    }
}

fn element_at_mut(parent: &mut XmlElement, index: usize) -> Result<&mut XmlElement> {
    match parent.children.get_mut(index) {
        Some(XmlNode::Element(element)) => Ok(element),
        _ => Err(Error::InvalidSegment(
            "expected an element node in the XMP tree".to_string(),
        )),
    }
}

/// Index of the sole `rdf:RDF` child under an `x:xmpmeta` root
fn rdf_index(root: &XmlElement) -> Result<usize> {
    if !(root.name.ns.as_deref() == Some(X_NS) && root.name.local == "xmpmeta") {
        return Err(Error::BadXmpRoot(format!(
            "root element is <{}>, expected <x:xmpmeta>",
            root.name.qualified()
        )));
    }
    let elements: Vec<usize> = root
        .children
        .iter()
        .enumerate()
        .filter_map(|(index, node)| match node {
            XmlNode::Element(_) => Some(index),
            XmlNode::Text(_) => None,
        })
        .collect();
    let rdf_children = root.child_indexes(Some(RDF_NS), "RDF");
    if elements.len() != 1 || rdf_children.len() != 1 {
        return Err(Error::BadXmpRoot(
            "<x:xmpmeta> must have exactly one <rdf:RDF> child".to_string(),
        ));
    }
    Ok(rdf_children[0])
}

// ---------------------------------------------------------------------------
// Deserialization
// ---------------------------------------------------------------------------

struct ExtendedGroup<'a> {
    fingerprint: [u8; 16],
    full_length: u32,
    consistent_length: bool,
    portions: Vec<(u32, &'a [u8])>,
}

/// Read the XMP document out of a metadata container
///
/// Returns the base packet body (xpacket wrapper stripped) when no extended
/// portions exist, otherwise the base document with every verified extended
/// companion merged back into its description. Malformed extended groups
/// fail the call, or are dropped with a warning when
/// `throw_on_invalid_samples` is off.
pub fn xmp_string(
    metadata: &JfifMetadata,
    options: &XmpDeserializeOptions,
) -> Result<Option<String>> {
    let Some((_, base)) = metadata.find_first::<XmpApp1Segment>()? else {
        return Ok(None);
    };
    let body = strip_xpacket(base.packet.as_deref().unwrap_or(""));
    if body.is_empty() {
        return Ok(None);
    }

    // Group extended portions by fingerprint, in first-seen order.
    let mut groups: Vec<ExtendedGroup<'_>> = Vec::new();
    for (_, segment) in metadata.find_all_typed::<ExtendedXmpApp1Segment>() {
        match groups
            .iter_mut()
            .find(|group| group.fingerprint == segment.fingerprint)
        {
            Some(group) => {
                if group.full_length != segment.full_length {
                    group.consistent_length = false;
                }
                group.portions.push((segment.starting_offset, &segment.portion));
            }
            None => groups.push(ExtendedGroup {
                fingerprint: segment.fingerprint,
                full_length: segment.full_length,
                consistent_length: true,
                portions: vec![(segment.starting_offset, &segment.portion)],
            }),
        }
    }

    let mut extended_docs: HashMap<String, String> = HashMap::new();
    for group in groups {
        let hex = fingerprint_to_hex(&group.fingerprint);
        match assemble_group(&group) {
            Ok(document) => {
                extended_docs.insert(hex, document);
            }
            Err(error) if options.throw_on_invalid_samples => return Err(error),
            Err(error) => {
                warn!("dropping extended XMP group {hex}: {error}");
            }
        }
    }

    if extended_docs.is_empty() {
        return Ok(Some(body.to_string()));
    }

    let mut doc = XmlDocument::parse(body)?;
    merge_extended(&mut doc.root, &extended_docs)?;
    doc.root.optimize_namespaces();
    Ok(Some(doc.root.serialize_string()?))
}

/// Ceiling on a reassembled extended document, so a forged length field
/// cannot demand a multi-gigabyte allocation
const MAX_EXTENDED_XMP_BYTES: u32 = 100 * 1024 * 1024;

/// Verify one fingerprint group and return its decoded document body
fn assemble_group(group: &ExtendedGroup<'_>) -> Result<String> {
    let hex = fingerprint_to_hex(&group.fingerprint);
    if !group.consistent_length {
        return Err(Error::BadExtendedXmp(format!(
            "portions of {hex} disagree on the full length"
        )));
    }
    if group.full_length > MAX_EXTENDED_XMP_BYTES {
        return Err(Error::BadExtendedXmp(format!(
            "declared length {} of {hex} exceeds the {MAX_EXTENDED_XMP_BYTES} byte ceiling",
            group.full_length
        )));
    }

    let mut portions = group.portions.clone();
    portions.sort_by_key(|(offset, _)| *offset);

    let full_length = group.full_length as usize;
    let mut buffer = vec![0u8; full_length];
    let mut cursor = 0usize;
    for (offset, bytes) in &portions {
        let offset = *offset as usize;
        if offset != cursor {
            return Err(Error::BadExtendedXmp(format!(
                "portions of {hex} are not contiguous: expected offset {cursor}, found {offset}"
            )));
        }
        if offset + bytes.len() > full_length {
            return Err(Error::BadExtendedXmp(format!(
                "portion of {hex} at offset {offset} overruns the declared length {full_length}"
            )));
        }
        buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
        cursor = offset + bytes.len();
    }
    if cursor != full_length {
        return Err(Error::BadExtendedXmp(format!(
            "portions of {hex} cover {cursor} of {full_length} declared bytes"
        )));
    }

    let digest = md5::compute(&buffer);
    if digest.0 != group.fingerprint {
        return Err(Error::BadExtendedXmp(format!(
            "MD5 over the assembled portions is {}, expected {hex}",
            fingerprint_to_hex(&digest.0)
        )));
    }

    let document = String::from_utf8(buffer).map_err(|_| {
        Error::BadExtendedXmp(format!("assembled document {hex} is not valid UTF-8"))
    })?;
    Ok(strip_xpacket(&document).to_string())
}

/// Merge each referenced extended companion into its base description
fn merge_extended(root: &mut XmlElement, extended_docs: &HashMap<String, String>) -> Result<()> {
    // The base may be a bare rdf:RDF or a full x:xmpmeta document.
    let rdf = if root.name.ns.as_deref() == Some(RDF_NS) && root.name.local == "RDF" {
        root
    } else {
        let index = rdf_index(root)?;
        element_at_mut(root, index)?
    };

    for index in rdf.child_indexes(Some(RDF_NS), "Description") {
        let description = element_at_mut(rdf, index)?;
        let Some(fingerprint) = description
            .attribute(Some(XMP_NOTE_NS), HAS_EXTENDED_XMP)
            .map(str::to_string)
        else {
            continue;
        };
        let Some(extended_body) = extended_docs.get(&fingerprint) else {
            continue;
        };

        let mut extended = XmlDocument::parse(extended_body)?;
        let extended_rdf_index = rdf_index(&extended.root)?;
        let extended_rdf = element_at_mut(&mut extended.root, extended_rdf_index)?;
        let descriptions = extended_rdf.child_indexes(Some(RDF_NS), "Description");
        let Some(&extended_description_index) = descriptions.first() else {
            continue;
        };
        let extended_description = element_at_mut(extended_rdf, extended_description_index)?;

        debug!("merging extended XMP {fingerprint} into base description");
        for attr in extended_description.attributes.drain(..) {
            if !attr.is_namespace_decl() {
                description.set_attribute(attr.name, &attr.value);
            }
        }
        for child in extended_description.children.drain(..) {
            if matches!(child, XmlNode::Element(_)) {
                description.append_child(child);
            }
        }
        description.remove_attribute(Some(XMP_NOTE_NS), HAS_EXTENDED_XMP);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// One companion document under construction, paired with the child index of
/// the base description it drains
struct CompanionDoc {
    description_index: usize,
    root: XmlElement,
}

enum MoveItem {
    Attribute(usize),
    Child(usize),
}

/// Store an XMP document into a metadata container, splitting into
/// Extended-XMP portions when the base outgrows its segment
///
/// `None` or an empty document removes the XMP and Extended-XMP segments.
/// The base segment is created after the last of {JFIF APP0, JFXX APP0,
/// APP1 EXIF, SOI} (an existing one is not repositioned); portion segments
/// follow it immediately, in order.
pub fn set_xmp_string(
    metadata: &mut JfifMetadata,
    xmp: Option<&str>,
    options: &XmpSerializeOptions,
) -> Result<()> {
    metadata.remove_all(&ExtendedXmpApp1Segment::KEY);

    let body = xmp.map(strip_xpacket).unwrap_or("");
    if body.is_empty() {
        metadata.remove_all(&XmpApp1Segment::KEY);
        return Ok(());
    }

    let mut doc = XmlDocument::parse(body)?;
    let rdf = rdf_index(&doc.root)?;

    doc.root.ensure_namespace("x", X_NS);
    doc.root.ensure_namespace("rdf", RDF_NS);
    doc.root
        .set_attribute(XmlName::prefixed("x", "xmptk", X_NS), XMP_TOOLKIT);

    {
        let rdf_element = element_at_mut(&mut doc.root, rdf)?;
        for index in rdf_element.child_indexes(Some(RDF_NS), "Description") {
            let description = element_at_mut(rdf_element, index)?;
            while description
                .remove_attribute(Some(XMP_NOTE_NS), HAS_EXTENDED_XMP)
                .is_some()
            {}
        }
    }
    doc.root.optimize_namespaces();

    // Greedy extraction: move content into per-description companions until
    // the base fits or nothing movable remains.
    let mut companions: Vec<CompanionDoc> = Vec::new();
    while doc.root.utf8_len() > options.max_base_utf8_bytes {
        if !move_one(&mut doc.root, rdf, &mut companions)? {
            warn!(
                "XMP base is {} bytes and nothing movable remains; segment write will fail",
                doc.root.utf8_len()
            );
            break;
        }
        doc.root.optimize_namespaces();
        for companion in &mut companions {
            companion.root.optimize_namespaces();
        }
    }

    // Fingerprint each companion and point its description at it.
    let mut portions: Vec<([u8; 16], Vec<u8>)> = Vec::new();
    for companion in &mut companions {
        companion.root.optimize_namespaces();
        let bytes = companion.root.serialize_utf8()?;
        let digest = md5::compute(&bytes);
        let hex = fingerprint_to_hex(&digest.0);
        debug!(
            "extended XMP companion: {} bytes, fingerprint {hex}",
            bytes.len()
        );

        let rdf_element = element_at_mut(&mut doc.root, rdf)?;
        let description = element_at_mut(rdf_element, companion.description_index)?;
        description.set_attribute(
            XmlName::prefixed("xmpNote", HAS_EXTENDED_XMP, XMP_NOTE_NS),
            &hex,
        );
        portions.push((digest.0, bytes));
    }
    doc.root.optimize_namespaces();
    let packet = doc.root.serialize_string()?;

    let preceding = [
        JfifApp0Segment::KEY,
        JfxxApp0Segment::KEY,
        ExifApp1Segment::KEY,
    ];
    let (base_index, _) = metadata.get_or_create::<XmpApp1Segment>(false, &preceding)?;
    metadata.typed_mut::<XmpApp1Segment>(base_index)?.packet = Some(packet);

    let mut insert_at = base_index + 1;
    for (fingerprint, bytes) in portions {
        let full_length = bytes.len() as u32;
        let mut offset = 0u32;
        for chunk in bytes.chunks(options.max_portion_utf8_bytes) {
            metadata.insert_at(
                insert_at,
                ExtendedXmpApp1Segment {
                    fingerprint,
                    full_length,
                    starting_offset: offset,
                    portion: chunk.to_vec(),
                },
            );
            insert_at += 1;
            offset += chunk.len() as u32;
        }
    }
    Ok(())
}

/// Move one attribute or element out of some base description into its
/// companion document; returns false when nothing movable remains
fn move_one(
    root: &mut XmlElement,
    rdf: usize,
    companions: &mut Vec<CompanionDoc>,
) -> Result<bool> {
    let rdf_element = element_at_mut(root, rdf)?;
    let Some((description_index, item)) = next_move(rdf_element)? else {
        return Ok(false);
    };

    let companion_index = match companions
        .iter()
        .position(|companion| companion.description_index == description_index)
    {
        Some(index) => index,
        None => {
            // First move from this description: create the companion
            // skeleton and leave a placeholder pointer; the real fingerprint
            // replaces it once the companion is serialized.
            let description = element_at_mut(rdf_element, description_index)?;
            description.set_attribute(
                XmlName::prefixed("xmpNote", HAS_EXTENDED_XMP, XMP_NOTE_NS),
                &"0".repeat(32),
            );
            companions.push(CompanionDoc {
                description_index,
                root: companion_skeleton(),
            });
            companions.len() - 1
        }
    };

    let description = element_at_mut(rdf_element, description_index)?;
    match item {
        MoveItem::Attribute(index) => {
            let attr = description.attributes.remove(index);
            let target = companion_description(&mut companions[companion_index].root)?;
            target.set_attribute(attr.name, &attr.value);
        }
        MoveItem::Child(index) => {
            let moved = description.remove_child(index);
            let target = companion_description(&mut companions[companion_index].root)?;
            target.append_child(moved);
        }
    }
    Ok(true)
}

/// Pick the next item to extract, in the order the XMP specification
/// recommends: thumbnails, then camera-raw settings, then photoshop history,
/// then whatever single attribute or element is largest
fn next_move(rdf_element: &XmlElement) -> Result<Option<(usize, MoveItem)>> {
    let descriptions = rdf_element.child_indexes(Some(RDF_NS), "Description");

    let strategies: [(&str, Option<&str>); 3] = [
        (XAP_IMG_NS, Some("Thumbnails")),
        (CAMERA_RAW_NS, None),
        (PHOTOSHOP_NS, Some("History")),
    ];
    for (ns, local) in strategies {
        for &description_index in &descriptions {
            let Some(XmlNode::Element(description)) =
                rdf_element.children.get(description_index)
            else {
                continue;
            };
            for (child_index, node) in description.children.iter().enumerate() {
                let XmlNode::Element(element) = node else {
                    continue;
                };
                if element.name.ns.as_deref() == Some(ns)
                    && local.map_or(true, |name| element.name.local == name)
                {
                    return Ok(Some((description_index, MoveItem::Child(child_index))));
                }
            }
        }
    }

    // Largest attribute or child element across all descriptions, both
    // competing on serialized UTF-8 size.
    let mut best: Option<(usize, MoveItem, usize)> = None;
    for &description_index in &descriptions {
        let Some(XmlNode::Element(description)) = rdf_element.children.get(description_index)
        else {
            continue;
        };
        for (attr_index, attr) in description.attributes.iter().enumerate() {
            if attr.is_namespace_decl()
                || (attr.name.ns.as_deref() == Some(XMP_NOTE_NS)
                    && attr.name.local == HAS_EXTENDED_XMP)
            {
                continue;
            }
            let size = attr.utf8_len();
            if best.as_ref().map_or(true, |(_, _, largest)| size > *largest) {
                best = Some((description_index, MoveItem::Attribute(attr_index), size));
            }
        }
        for (child_index, node) in description.children.iter().enumerate() {
            let XmlNode::Element(element) = node else {
                continue;
            };
            let size = element.utf8_len();
            if best.as_ref().map_or(true, |(_, _, largest)| size > *largest) {
                best = Some((description_index, MoveItem::Child(child_index), size));
            }
        }
    }
    Ok(best.map(|(description_index, item, _)| (description_index, item)))
}

/// Bare `<x:xmpmeta><rdf:RDF><rdf:Description/></rdf:RDF></x:xmpmeta>`
/// skeleton with the toolkit attribute
fn companion_skeleton() -> XmlElement {
    let mut root = XmlElement::new(XmlName::prefixed("x", "xmpmeta", X_NS));
    root.ensure_namespace("x", X_NS);
    root.ensure_namespace("rdf", RDF_NS);
    root.set_attribute(XmlName::prefixed("x", "xmptk", X_NS), XMP_TOOLKIT);

    let mut rdf = XmlElement::new(XmlName::prefixed("rdf", "RDF", RDF_NS));
    let mut description = XmlElement::new(XmlName::prefixed("rdf", "Description", RDF_NS));
    description.set_attribute(XmlName::prefixed("rdf", "about", RDF_NS), "");
    rdf.append_child(XmlNode::Element(description));
    root.append_child(XmlNode::Element(rdf));
    root
}

/// The `rdf:Description` inside a companion skeleton
fn companion_description(root: &mut XmlElement) -> Result<&mut XmlElement> {
    let rdf = rdf_index(root)?;
    let rdf_element = element_at_mut(root, rdf)?;
    let descriptions = rdf_element.child_indexes(Some(RDF_NS), "Description");
    let index = *descriptions.first().ok_or_else(|| {
        Error::InvalidSegment("companion document lost its description".to_string())
    })?;
    element_at_mut(rdf_element, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::Segment;

    fn minimal_xmp(attrs: &str) -> String {
        format!(
            r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="{RDF_NS}"><rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/" {attrs}/></rdf:RDF></x:xmpmeta>"#
        )
    }

    fn fresh_meta() -> JfifMetadata {
        let mut meta = JfifMetadata::new();
        meta.push(Segment::Soi);
        meta.push(JfifApp0Segment::default());
        meta.push(Segment::Eoi);
        meta
    }

    #[test]
    fn test_strip_xpacket() {
        let wrapped = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n<x/>\n<?xpacket end=\"w\"?>";
        assert_eq!(strip_xpacket(wrapped), "<x/>");
        assert_eq!(strip_xpacket("  <x/>  "), "<x/>");
        assert_eq!(strip_xpacket(""), "");
    }

    #[test]
    fn test_round_trip_small_document() {
        let mut meta = fresh_meta();
        let xmp = minimal_xmp(r#"dc:title="hello""#);
        set_xmp_string(&mut meta, Some(&xmp), &XmpSerializeOptions::default()).unwrap();

        // Fits the base: no extended segments.
        assert_eq!(
            meta.find_first_index(&ExtendedXmpApp1Segment::KEY),
            None
        );
        // Base lands after the JFIF APP0.
        assert!(meta.get(2).unwrap().as_xmp_app1().is_some());

        let output = xmp_string(&meta, &XmpDeserializeOptions::default())
            .unwrap()
            .unwrap();
        assert!(output.contains(r#"dc:title="hello""#));
        assert!(output.contains(XMP_TOOLKIT));
    }

    #[test]
    fn test_remove_with_none() {
        let mut meta = fresh_meta();
        let xmp = minimal_xmp(r#"dc:title="hello""#);
        set_xmp_string(&mut meta, Some(&xmp), &XmpSerializeOptions::default()).unwrap();
        set_xmp_string(&mut meta, None, &XmpSerializeOptions::default()).unwrap();

        assert_eq!(meta.find_first_index(&XmpApp1Segment::KEY), None);
        assert_eq!(
            xmp_string(&meta, &XmpDeserializeOptions::default()).unwrap(),
            None
        );
    }

    #[test]
    fn test_bad_root_is_rejected() {
        let mut meta = fresh_meta();
        let err = set_xmp_string(
            &mut meta,
            Some("<wrong/>"),
            &XmpSerializeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadXmpRoot(_)));

        let two_children = format!(
            r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="{RDF_NS}"/><rdf:RDF xmlns:rdf="{RDF_NS}"/></x:xmpmeta>"#
        );
        let err = set_xmp_string(
            &mut meta,
            Some(&two_children),
            &XmpSerializeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadXmpRoot(_)));
    }

    #[test]
    fn test_split_produces_verified_portions() {
        let mut meta = fresh_meta();
        let big = "A".repeat(4000);
        let xmp = minimal_xmp(&format!(r#"dc:one="{big}" dc:two="{big}""#));
        let options = XmpSerializeOptions {
            max_base_utf8_bytes: 512,
            max_portion_utf8_bytes: 1000,
        };
        set_xmp_string(&mut meta, Some(&xmp), &options).unwrap();

        let (_, base) = meta.find_first::<XmpApp1Segment>().unwrap().unwrap();
        let packet = base.packet.as_deref().unwrap();
        assert!(packet.len() <= 512);
        assert!(packet.contains(HAS_EXTENDED_XMP));

        let portions: Vec<_> = meta
            .find_all_typed::<ExtendedXmpApp1Segment>()
            .map(|(_, segment)| segment.clone())
            .collect();
        assert!(portions.len() > 1);

        // Offsets are contiguous and the MD5 over the concatenation matches.
        let full_length = portions[0].full_length as usize;
        let mut assembled = Vec::new();
        for portion in &portions {
            assert_eq!(portion.starting_offset as usize, assembled.len());
            assert!(portion.portion.len() <= 1000);
            assembled.extend_from_slice(&portion.portion);
        }
        assert_eq!(assembled.len(), full_length);
        assert_eq!(md5::compute(&assembled).0, portions[0].fingerprint);
    }

    #[test]
    fn test_split_then_merge_recovers_content() {
        let mut meta = fresh_meta();
        let big = "B".repeat(3000);
        let xmp = minimal_xmp(&format!(r#"dc:one="{big}" dc:two="tiny""#));
        let options = XmpSerializeOptions {
            max_base_utf8_bytes: 600,
            max_portion_utf8_bytes: 800,
        };
        set_xmp_string(&mut meta, Some(&xmp), &options).unwrap();

        let output = xmp_string(&meta, &XmpDeserializeOptions::default())
            .unwrap()
            .unwrap();
        assert!(output.contains(&format!(r#"dc:one="{big}""#)));
        assert!(output.contains(r#"dc:two="tiny""#));
        // The pointer attribute is consumed by the merge.
        assert!(!output.contains(HAS_EXTENDED_XMP));
    }

    #[test]
    fn test_invalid_group_throws_or_skips() {
        let mut meta = fresh_meta();
        let xmp = minimal_xmp(r#"dc:title="t""#);
        set_xmp_string(&mut meta, Some(&xmp), &XmpSerializeOptions::default()).unwrap();

        // A stray portion whose MD5 cannot match.
        meta.push(ExtendedXmpApp1Segment {
            fingerprint: [0xAB; 16],
            full_length: 3,
            starting_offset: 0,
            portion: vec![1, 2, 3],
        });

        let err = xmp_string(&meta, &XmpDeserializeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::BadExtendedXmp(_)));

        let lenient = XmpDeserializeOptions {
            throw_on_invalid_samples: false,
        };
        let output = xmp_string(&meta, &lenient).unwrap().unwrap();
        assert!(output.contains(r#"dc:title="t""#));
    }

    #[test]
    fn test_greedy_moves_thumbnails_first() {
        let big = "C".repeat(2000);
        let xmp = format!(
            r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="{RDF_NS}"><rdf:Description rdf:about="" xmlns:xapGImg="{XAP_IMG_NS}" xmlns:dc="http://purl.org/dc/elements/1.1/" dc:keep="{big}"><xapGImg:Thumbnails>{big}</xapGImg:Thumbnails></rdf:Description></rdf:RDF></x:xmpmeta>"#
        );
        let mut meta = fresh_meta();
        // Budget large enough that moving the thumbnail alone suffices.
        let options = XmpSerializeOptions {
            max_base_utf8_bytes: 2600,
            max_portion_utf8_bytes: MAX_XMP_PORTION_BYTES,
        };
        set_xmp_string(&mut meta, Some(&xmp), &options).unwrap();

        let (_, base) = meta.find_first::<XmpApp1Segment>().unwrap().unwrap();
        let packet = base.packet.as_deref().unwrap();
        // The big attribute stayed; the thumbnail element moved out.
        assert!(packet.contains("dc:keep"));
        assert!(!packet.contains("Thumbnails"));
    }
}
