//! Generic fallback segment for markers without a registry mapping

use crate::error::Result;
use crate::length::SegmentLength;
use crate::segments::SegmentKey;
use crate::stream::BufStream;
use std::io::{Read, Write};

/// A segment with a length field whose body the library does not interpret
///
/// Constructed by the reader for any marker (or marker/identifier pair) the
/// registry has no mapping for. The identifier, when present, was discovered
/// on the wire and is reproduced on write.
#[derive(Debug, Clone)]
pub struct GenericSegment {
    marker: u8,
    identifier: Option<String>,
    /// Opaque body bytes (after the identifier, when one is present)
    pub data: Vec<u8>,
}

impl GenericSegment {
    /// Create an empty generic segment for a marker
    pub fn new(marker: u8, identifier: Option<String>) -> Self {
        Self {
            marker,
            identifier,
            data: Vec::new(),
        }
    }

    /// The marker code
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// The discovered identifier, if any
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// The key this segment is stored under
    pub fn key(&self) -> SegmentKey {
        match &self.identifier {
            Some(id) => SegmentKey::with_identifier(self.marker, id.clone()),
            None => SegmentKey::no_identifier(self.marker),
        }
    }

    pub(crate) fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        self.data.resize(length.remaining(), 0);
        stream.read_exact(&mut self.data)
    }

    pub(crate) fn validate_and_compute_body_length(&self) -> Result<usize> {
        Ok(self.data.len())
    }

    pub(crate) fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker;

    #[test]
    fn test_key_reflects_identifier() {
        let plain = GenericSegment::new(marker::DQT, None);
        assert_eq!(plain.key(), SegmentKey::no_identifier(marker::DQT));

        let named = GenericSegment::new(marker::APP2, Some("ICC_PROFILE".to_string()));
        assert_eq!(
            named.key(),
            SegmentKey::with_identifier(marker::APP2, "ICC_PROFILE")
        );
    }
}
