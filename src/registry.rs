//! Segment-type registry
//!
//! Maps a marker (and, for namespaced markers, a body identifier) to a
//! factory for the typed segment the reader should construct. Each
//! registration draws its key and framing shape from constants on the
//! segment type itself, so the table is explicit; no runtime type
//! introspection is involved.

use crate::error::{Error, Result};
use crate::marker;
use crate::segments::{
    ExifApp1Segment, ExtendedXmpApp1Segment, JfifApp0Segment, JfxxApp0Segment, Segment,
    SegmentKey, SosSegment, TypedSegment, XmpApp1Segment,
};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Everything the reader needs to know to frame and construct one segment
/// type
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    /// Key the type registers under
    pub key: SegmentKey,
    /// Whether the wire encoding carries a 16-bit length field
    pub has_length: bool,
    /// Construct an empty segment ready for `read_body`
    pub build: fn() -> Segment,
}

impl SegmentDescriptor {
    /// Descriptor for a typed segment, drawn from its constants
    pub fn of<T: TypedSegment + Default>() -> Self {
        Self {
            key: T::KEY,
            has_length: T::HAS_LENGTH,
            build: build_default::<T>,
        }
    }
}

fn build_default<T: TypedSegment + Default>() -> Segment {
    T::default().into()
}

/// Registry of segment types, keyed by marker and optional identifier
///
/// A marker hosts either one identifier-less mapping or any number of
/// identifier mappings, never both; registering across that line fails
/// unless `override_existing` is passed. Once frozen the registry refuses
/// further mutation and can be shared freely across readers.
#[derive(Debug, Default)]
pub struct SegmentRegistry {
    no_identifier: HashMap<u8, SegmentDescriptor>,
    with_identifier: HashMap<u8, HashMap<String, SegmentDescriptor>>,
    frozen: bool,
}

impl SegmentRegistry {
    /// Create an empty, unfrozen registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unfrozen registry pre-populated with the built-in segment
    /// types, for callers who want to add their own
    pub fn with_built_ins() -> Self {
        let mut registry = Self::new();
        for descriptor in [
            SegmentDescriptor {
                key: SegmentKey::SOI,
                has_length: false,
                build: || Segment::Soi,
            },
            SegmentDescriptor {
                key: SegmentKey::EOI,
                has_length: false,
                build: || Segment::Eoi,
            },
            SegmentDescriptor::of::<JfifApp0Segment>(),
            SegmentDescriptor::of::<JfxxApp0Segment>(),
            SegmentDescriptor::of::<ExifApp1Segment>(),
            SegmentDescriptor::of::<XmpApp1Segment>(),
            SegmentDescriptor::of::<ExtendedXmpApp1Segment>(),
            SegmentDescriptor::of::<SosSegment>(),
        ] {
            registry
                .register(descriptor, false)
                .expect("built-in registrations cannot collide");
        }
        registry
    }

    /// The frozen default registry holding all built-in segment types
    pub fn built_in() -> &'static SegmentRegistry {
        static BUILT_IN: OnceLock<SegmentRegistry> = OnceLock::new();
        BUILT_IN.get_or_init(|| {
            let mut registry = SegmentRegistry::with_built_ins();
            registry.freeze();
            registry
        })
    }

    /// Register a segment type
    ///
    /// Fails if the registry is frozen, if the exact key is already mapped,
    /// or if the registration would make a marker host both identifier and
    /// identifier-less mappings; `override_existing` lifts the latter two by
    /// discarding whatever was there.
    pub fn register(
        &mut self,
        descriptor: SegmentDescriptor,
        override_existing: bool,
    ) -> Result<()> {
        if self.frozen {
            return Err(Error::InvalidSegment(
                "segment registry is frozen".to_string(),
            ));
        }

        let code = descriptor.key.marker();
        match descriptor.key.identifier() {
            None => {
                if !override_existing {
                    if self.no_identifier.contains_key(&code) {
                        return Err(Error::InvalidSegment(format!(
                            "marker {} is already registered",
                            marker::label(code)
                        )));
                    }
                    if self.with_identifier.contains_key(&code) {
                        return Err(Error::InvalidSegment(format!(
                            "marker {} already hosts identifier mappings and cannot also map \
                             without one",
                            marker::label(code)
                        )));
                    }
                }
                self.with_identifier.remove(&code);
                self.no_identifier.insert(code, descriptor);
            }
            Some(identifier) => {
                if !override_existing {
                    if self.no_identifier.contains_key(&code) {
                        return Err(Error::InvalidSegment(format!(
                            "marker {} is already registered without an identifier and cannot \
                             also map one",
                            marker::label(code)
                        )));
                    }
                    if self
                        .with_identifier
                        .get(&code)
                        .is_some_and(|map| map.contains_key(identifier))
                    {
                        return Err(Error::InvalidSegment(format!(
                            "{} is already registered",
                            descriptor.key
                        )));
                    }
                }
                self.no_identifier.remove(&code);
                let identifier = identifier.to_string();
                self.with_identifier
                    .entry(code)
                    .or_default()
                    .insert(identifier, descriptor);
            }
        }
        Ok(())
    }

    /// Make the registry immutable
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// True once [`freeze`](Self::freeze) has been called
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Look up the mapping for a marker with no body identifier
    pub fn lookup_no_identifier(&self, code: u8) -> Option<&SegmentDescriptor> {
        self.no_identifier.get(&code)
    }

    /// Look up the mapping for a marker/identifier pair
    pub fn lookup_identifier(&self, code: u8, identifier: &str) -> Option<&SegmentDescriptor> {
        self.with_identifier.get(&code)?.get(identifier)
    }

    /// True iff at least one identifier mapping exists for the marker
    pub fn has_identifier(&self, code: u8) -> bool {
        self.with_identifier.contains_key(&code)
    }
}
