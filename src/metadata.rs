//! Ordered segment container
//!
//! A [`JfifMetadata`] is the in-memory model of one JFIF stream: an ordered
//! list of segments with find/remove/get-or-create/insert-after operations
//! keyed by [`SegmentKey`]. Order is authoritative and duplicate keys are
//! permitted; no JFIF ordering rules are enforced, so callers can author
//! sequences a decoder would reject.

use crate::error::{Error, Result};
use crate::segments::{Segment, SegmentKey, TypedSegment};

/// Ordered list of segments making up one JFIF stream
#[derive(Debug, Clone, Default)]
pub struct JfifMetadata {
    segments: Vec<Segment>,
}

impl JfifMetadata {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True if the container holds no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Borrow the segment at `index`
    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Mutably borrow the segment at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Segment> {
        self.segments.get_mut(index)
    }

    /// Iterate over all segments in order
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Append a segment at the end
    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.segments.push(segment.into());
    }

    /// Insert a segment at an exact position
    pub fn insert_at(&mut self, index: usize, segment: impl Into<Segment>) {
        self.segments.insert(index, segment.into());
    }

    /// Remove and return the segment at `index`
    pub fn remove_at(&mut self, index: usize) -> Segment {
        self.segments.remove(index)
    }

    /// Iterate over segments matching `key`, in position order
    pub fn find_all<'a>(
        &'a self,
        key: &'a SegmentKey,
    ) -> impl Iterator<Item = (usize, &'a Segment)> {
        self.segments
            .iter()
            .enumerate()
            .filter(move |(_, segment)| segment.key() == *key)
    }

    /// Index of the first segment matching `key`
    pub fn find_first_index(&self, key: &SegmentKey) -> Option<usize> {
        self.segments
            .iter()
            .position(|segment| segment.key() == *key)
    }

    /// Typed segments matching `T`'s key, in position order
    pub fn find_all_typed<'a, T: TypedSegment + 'a>(&'a self) -> impl Iterator<Item = (usize, &'a T)> {
        self.segments
            .iter()
            .enumerate()
            .filter_map(|(index, segment)| T::from_segment(segment).map(|typed| (index, typed)))
    }

    /// First segment stored under `T`'s key
    ///
    /// Fails with a type mismatch if the segment at that key is not actually
    /// a `T` (e.g. a caller pushed a generic segment bearing the same key).
    pub fn find_first<T: TypedSegment>(&self) -> Result<Option<(usize, &T)>> {
        match self.find_first_index(&T::KEY) {
            None => Ok(None),
            Some(index) => match T::from_segment(&self.segments[index]) {
                Some(typed) => Ok(Some((index, typed))),
                None => Err(Error::TypeMismatch {
                    key: T::KEY.to_string(),
                }),
            },
        }
    }

    /// Mutable variant of [`find_first`](Self::find_first)
    pub fn find_first_mut<T: TypedSegment>(&mut self) -> Result<Option<(usize, &mut T)>> {
        match self.find_first_index(&T::KEY) {
            None => Ok(None),
            Some(index) => match T::from_segment_mut(&mut self.segments[index]) {
                Some(typed) => Ok(Some((index, typed))),
                None => Err(Error::TypeMismatch {
                    key: T::KEY.to_string(),
                }),
            },
        }
    }

    /// Mutably borrow the typed segment at a known index
    pub fn typed_mut<T: TypedSegment>(&mut self, index: usize) -> Result<&mut T> {
        let segment = self
            .segments
            .get_mut(index)
            .ok_or_else(|| Error::TypeMismatch {
                key: T::KEY.to_string(),
            })?;
        T::from_segment_mut(segment).ok_or_else(|| Error::TypeMismatch {
            key: T::KEY.to_string(),
        })
    }

    /// The insertion point after the last segment matching any of `keys`
    ///
    /// Scans from the end; returns that segment's index plus one, or zero
    /// when no segment matches.
    pub fn get_index_after(&self, keys: &[SegmentKey]) -> usize {
        for (index, segment) in self.segments.iter().enumerate().rev() {
            let key = segment.key();
            if keys.iter().any(|candidate| *candidate == key) {
                return index + 1;
            }
        }
        0
    }

    fn index_after_with_soi(&self, preceding_keys: &[SegmentKey]) -> usize {
        let mut keys = Vec::with_capacity(preceding_keys.len() + 1);
        keys.extend_from_slice(preceding_keys);
        keys.push(SegmentKey::SOI);
        self.get_index_after(&keys)
    }

    /// Insert a segment after the last occurrence of any of `preceding_keys`
    ///
    /// SOI is always implicitly part of the preceding set, so an inserted
    /// segment lands after a present SOI. Returns the insertion index.
    pub fn insert(&mut self, segment: impl Into<Segment>, preceding_keys: &[SegmentKey]) -> usize {
        let index = self.index_after_with_soi(preceding_keys);
        self.segments.insert(index, segment.into());
        index
    }

    /// Find the first `T`, creating one if absent
    ///
    /// A created segment is inserted after the last of `preceding_keys` (SOI
    /// implicitly included). When `reposition` is true and an existing
    /// segment sits strictly before that insertion point, it is moved there;
    /// one already at or past the point stays put. Returns the segment's
    /// index and whether it was created.
    pub fn get_or_create<T: TypedSegment + Default>(
        &mut self,
        reposition: bool,
        preceding_keys: &[SegmentKey],
    ) -> Result<(usize, bool)> {
        match self.find_first::<T>()? {
            None => {
                let index = self.index_after_with_soi(preceding_keys);
                self.segments.insert(index, T::default().into());
                Ok((index, true))
            }
            Some((index, _)) => {
                let target = self.index_after_with_soi(preceding_keys);
                if reposition && index < target {
                    let segment = self.segments.remove(index);
                    // The removal shifted everything after `index` left.
                    let target = target - 1;
                    self.segments.insert(target, segment);
                    Ok((target, false))
                } else {
                    Ok((index, false))
                }
            }
        }
    }

    /// Remove every segment matching `key`; returns how many were removed
    pub fn remove_all(&mut self, key: &SegmentKey) -> usize {
        let before = self.segments.len();
        self.segments.retain(|segment| segment.key() != *key);
        before - self.segments.len()
    }

    /// Remove the first segment matching `key`; returns whether one existed
    pub fn remove_first(&mut self, key: &SegmentKey) -> bool {
        match self.find_first_index(key) {
            Some(index) => {
                self.segments.remove(index);
                true
            }
            None => false,
        }
    }
}

impl<'a> IntoIterator for &'a JfifMetadata {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}
