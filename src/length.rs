//! Per-segment length accounting
//!
//! Every segment with a length field carries a 16-bit total that includes the
//! two length bytes themselves but excludes the marker and its indicator.
//! [`SegmentLength`] tracks that total plus the bytes still unread in the
//! body, and refuses to be over-drawn. It is passed by value through body
//! readers so helpers can always report how much of the body is left.

use crate::error::{Error, Result};
use crate::marker;

/// Length accounting for the segment currently being read
///
/// Invariants: `remaining <= total` and `total >= 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLength {
    marker: u8,
    total: u16,
    remaining: u16,
}

impl SegmentLength {
    /// Create a new accumulator for the given marker
    pub fn new(marker: u8, total: u16, remaining: u16) -> Result<Self> {
        if total < 2 {
            return Err(Error::InvalidSegment(format!(
                "segment {} declares a length of {total}, below the 2-byte minimum",
                marker::label(marker)
            )));
        }
        if remaining > total {
            return Err(Error::InvalidSegment(format!(
                "segment {} has {remaining} bytes remaining out of {total} total",
                marker::label(marker)
            )));
        }
        Ok(Self {
            marker,
            total,
            remaining,
        })
    }

    /// The marker this accumulator belongs to
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// The on-wire length field value, inclusive of its own two bytes
    pub fn total(&self) -> u16 {
        self.total
    }

    /// Bytes still unread in the segment body
    pub fn remaining(&self) -> usize {
        self.remaining as usize
    }

    /// Account for `n` consumed body bytes
    pub fn sub(self, n: usize) -> Result<Self> {
        if n > self.remaining as usize {
            return Err(Error::LengthUnderrun {
                marker: marker::label(self.marker),
            });
        }
        Ok(Self {
            remaining: self.remaining - n as u16,
            ..self
        })
    }

    /// Account for a single consumed body byte
    pub fn sub1(self) -> Result<Self> {
        self.sub(1)
    }
}
