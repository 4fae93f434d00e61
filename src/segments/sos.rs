//! Start-of-scan segment and its out-of-band entropy-coded payload

use crate::error::{eos, Error, Result};
use crate::length::SegmentLength;
use crate::marker;
use crate::segments::SegmentKey;
use crate::stream::BufStream;
use byteorder::WriteBytesExt;
use std::io::{Read, Write};

/// One scan component: its identifier and the huffman tables it selects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SosComponent {
    /// Scan component selector
    pub component_id: u8,
    /// DC huffman table index (must fit a nibble)
    pub dc_table: u8,
    /// AC huffman table index (must fit a nibble)
    pub ac_table: u8,
}

/// SOS segment: the scan header plus the entropy-coded bytes that follow it
///
/// The entropy payload is out-of-band: it sits after the length-bounded
/// segment body and ends implicitly at the next real marker. Literal 0xFF
/// payload bytes are stuffed as `0xFF 0x00`, and restart markers
/// `0xFF 0xD0..0xD7` belong to the payload.
#[derive(Debug, Clone, Default)]
pub struct SosSegment {
    /// Per-component table selections, in scan order
    pub components: Vec<SosComponent>,
    /// First DCT coefficient included in the scan
    pub spectral_start: u8,
    /// Last DCT coefficient included in the scan
    pub spectral_end: u8,
    /// Successive-approximation bit position high (must fit a nibble)
    pub approximation_high: u8,
    /// Successive-approximation bit position low (must fit a nibble)
    pub approximation_low: u8,
    /// The entropy-coded payload, stored exactly as it appears on the wire
    pub entropy_data: Vec<u8>,
}

/// Find the first 0xFF in the window that is followed by a real marker byte,
/// i.e. anything but a stuffing 0x00 or a restart marker
fn find_real_marker(window: &[u8]) -> Option<usize> {
    window.windows(2).position(|pair| {
        pair[0] == marker::INDICATOR && pair[1] != marker::STUFFING && !marker::is_restart(pair[1])
    })
}

impl SosSegment {
    pub(crate) const SEGMENT_KEY: SegmentKey = SegmentKey::SOS;

    pub(crate) fn read_body<R: Read>(
        &mut self,
        stream: &mut BufStream<R>,
        length: SegmentLength,
    ) -> Result<()> {
        let component_count = stream.read_u8()?;
        let mut length = length.sub1()?;

        self.components.clear();
        for _ in 0..component_count {
            let component_id = stream.read_u8()?;
            let tables = stream.read_u8()?;
            length = length.sub(2)?;
            self.components.push(SosComponent {
                component_id,
                dc_table: tables >> 4,
                ac_table: tables & 0x0F,
            });
        }

        self.spectral_start = stream.read_u8()?;
        self.spectral_end = stream.read_u8()?;
        let approximation = stream.read_u8()?;
        length = length.sub(3)?;
        self.approximation_high = approximation >> 4;
        self.approximation_low = approximation & 0x0F;

        // Residual padding inside the declared length.
        stream.skip(length.remaining())?;

        self.entropy_data.clear();
        let outcome = stream.scan(&mut self.entropy_data, 2, None, find_real_marker)?;
        if !outcome.is_positive_match {
            return Err(eos("stream ended inside the entropy-coded payload"));
        }
        Ok(())
    }

    pub(crate) fn validate_and_compute_body_length(&self) -> Result<usize> {
        if self.components.len() > 255 {
            return Err(Error::InvalidSegment(format!(
                "SOS declares {} components, more than the count byte can hold",
                self.components.len()
            )));
        }
        for component in &self.components {
            if component.dc_table > 0x0F || component.ac_table > 0x0F {
                return Err(Error::InvalidSegment(format!(
                    "SOS component {} table indices {}/{} overflow their nibbles",
                    component.component_id, component.dc_table, component.ac_table
                )));
            }
        }
        if self.approximation_high > 0x0F || self.approximation_low > 0x0F {
            return Err(Error::InvalidSegment(format!(
                "SOS successive approximation {}/{} overflows its nibbles",
                self.approximation_high, self.approximation_low
            )));
        }
        if let Some(at) = find_real_marker(&self.entropy_data) {
            return Err(Error::InvalidSegment(format!(
                "entropy payload contains an unescaped marker at offset {at}; it would collide \
                 with framing when reserialized"
            )));
        }
        // A trailing lone 0xFF would also swallow the next marker indicator.
        if self.entropy_data.last() == Some(&marker::INDICATOR) {
            return Err(Error::InvalidSegment(
                "entropy payload ends with a bare 0xFF".to_string(),
            ));
        }
        Ok(1 + 2 * self.components.len() + 3)
    }

    pub(crate) fn write_body<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.components.len() as u8)?;
        for component in &self.components {
            writer.write_u8(component.component_id)?;
            writer.write_u8(component.dc_table << 4 | component.ac_table)?;
        }
        writer.write_u8(self.spectral_start)?;
        writer.write_u8(self.spectral_end)?;
        writer.write_u8(self.approximation_high << 4 | self.approximation_low)?;
        Ok(())
    }

    pub(crate) fn write_out_of_band<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.entropy_data)?;
        Ok(())
    }
}
