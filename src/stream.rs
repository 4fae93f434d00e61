//! Buffered byte stream adapter
//!
//! The framing engine consumes a small contract on top of any
//! [`std::io::Read`]: big-endian integer reads, exact-length reads, skips,
//! NUL-aware ASCII string reads, a bounded scan-for-predicate used to copy
//! out-of-band payloads, and a non-consuming two-byte probe. [`BufStream`]
//! provides that contract with an internal lookahead buffer.
//!
//! The write side needs no adapter: segments are written straight to any
//! [`std::io::Write`] with [`byteorder::WriteBytesExt`].

use crate::error::{eos, Error, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read};

/// How [`BufStream::read_ascii_string`] treats NUL bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NulBehavior {
    /// Stop at the first NUL; the NUL is consumed but not returned
    Stop,
    /// Read exactly `max_bytes` and trim trailing NUL bytes from the value
    TrimTrailing,
}

/// Result of a [`BufStream::scan`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// True if the predicate reported a match before the scan ended
    pub is_positive_match: bool,
    /// Bytes copied into the sink, excluding the matched prefix
    pub bytes_read: usize,
}

/// Threshold above which consumed bytes are compacted out of the buffer
const COMPACT_AT: usize = 8192;

/// A buffered reader with the lookahead primitives the segment framer needs
///
/// At least two bytes of lookahead are guaranteed when the source can supply
/// them, which is what marker probing requires.
#[derive(Debug)]
pub struct BufStream<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> BufStream<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    /// Unwrap the underlying source, discarding any buffered lookahead
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Pull from the source until at least `want` bytes are buffered or the
    /// source is exhausted
    fn fill_at_least(&mut self, want: usize) -> io::Result<()> {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos > COMPACT_AT {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let mut chunk = [0u8; 4096];
        while !self.eof && self.available() < want {
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// True iff at least `n` bytes are available without further blocking
    /// reads failing short
    pub fn ensure_buffered(&mut self, n: usize) -> Result<bool> {
        self.fill_at_least(n)?;
        Ok(self.available() >= n)
    }

    /// Look at the next `n` bytes without consuming them
    ///
    /// Fails with an end-of-stream error if fewer than `n` bytes remain.
    pub fn peek(&mut self, n: usize) -> Result<&[u8]> {
        self.fill_at_least(n)?;
        if self.available() < n {
            return Err(eos("stream ended while peeking"));
        }
        Ok(&self.buf[self.pos..self.pos + n])
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.pos += n;
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(ReadBytesExt::read_u8(self)?)
    }

    /// Read a big-endian u16
    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(ReadBytesExt::read_u16::<BigEndian>(self)?)
    }

    /// Read a big-endian u32
    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(ReadBytesExt::read_u32::<BigEndian>(self)?)
    }

    /// Fill `out` exactly
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        Ok(io::Read::read_exact(self, out)?)
    }

    /// Discard exactly `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        let from_buf = n.min(self.available());
        self.consume(from_buf);
        let mut left = n - from_buf;
        let mut chunk = [0u8; 4096];
        while left > 0 {
            let take = left.min(chunk.len());
            io::Read::read_exact(&mut self.inner, &mut chunk[..take])?;
            left -= take;
        }
        Ok(())
    }

    /// Read an ASCII string of at most `max_bytes`
    ///
    /// Returns the decoded string and the number of bytes consumed from the
    /// stream (for [`NulBehavior::Stop`] the consumed count includes the
    /// terminating NUL, which is not part of the returned value).
    pub fn read_ascii_string(
        &mut self,
        max_bytes: usize,
        nul: NulBehavior,
    ) -> Result<(String, usize)> {
        let mut bytes = Vec::new();
        let mut consumed = 0usize;
        match nul {
            NulBehavior::Stop => {
                while consumed < max_bytes {
                    let b = self.read_u8()?;
                    consumed += 1;
                    if b == 0 {
                        break;
                    }
                    bytes.push(b);
                }
            }
            NulBehavior::TrimTrailing => {
                bytes.resize(max_bytes, 0);
                self.read_exact(&mut bytes)?;
                consumed = max_bytes;
                while bytes.last() == Some(&0) {
                    bytes.pop();
                }
            }
        }
        let value = String::from_utf8(bytes).map_err(|_| {
            Error::InvalidSegment("identifier string is not valid ASCII".to_string())
        })?;
        Ok((value, consumed))
    }

    /// Stream bytes into `sink` until `predicate` reports a match
    ///
    /// The predicate sees the buffered lookahead window and returns the index
    /// at which its match starts; everything before that index is copied to
    /// the sink and consumed, while the matched bytes stay buffered for the
    /// caller to read. A predicate must only report a match it can fully see,
    /// so `min_match_len` tail bytes are retained across refills.
    ///
    /// `max_bytes` bounds how far the scan may look from the current
    /// position. If the source ends or the bound is reached without a match,
    /// every examined byte is copied to the sink and the outcome is negative.
    pub fn scan<P>(
        &mut self,
        sink: &mut Vec<u8>,
        min_match_len: usize,
        max_bytes: Option<usize>,
        predicate: P,
    ) -> Result<ScanOutcome>
    where
        P: Fn(&[u8]) -> Option<usize>,
    {
        let mut copied = 0usize;
        loop {
            let budget = match max_bytes {
                Some(m) => {
                    let left = m - copied;
                    if left == 0 {
                        return Ok(ScanOutcome {
                            is_positive_match: false,
                            bytes_read: copied,
                        });
                    }
                    Some(left)
                }
                None => None,
            };

            self.fill_at_least(min_match_len.max(1))?;
            let avail = self.available();
            if avail == 0 {
                return Ok(ScanOutcome {
                    is_positive_match: false,
                    bytes_read: copied,
                });
            }

            let window_len = match budget {
                Some(b) => avail.min(b),
                None => avail,
            };
            let window = &self.buf[self.pos..self.pos + window_len];
            if let Some(i) = predicate(window) {
                sink.extend_from_slice(&window[..i]);
                self.consume(i);
                return Ok(ScanOutcome {
                    is_positive_match: true,
                    bytes_read: copied + i,
                });
            }

            let at_end = (self.eof && window_len == avail) || budget == Some(window_len);
            let flush = if at_end {
                window_len
            } else {
                // Keep a potential match prefix for the next refill.
                window_len.saturating_sub(min_match_len.saturating_sub(1))
            };
            sink.extend_from_slice(&self.buf[self.pos..self.pos + flush]);
            self.consume(flush);
            copied += flush;

            if at_end {
                return Ok(ScanOutcome {
                    is_positive_match: false,
                    bytes_read: copied,
                });
            }
        }
    }
}

impl<R: Read> Read for BufStream<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.available() == 0 {
            if self.eof {
                return Ok(0);
            }
            // Large reads bypass the buffer entirely.
            if out.len() >= 4096 {
                return self.inner.read(out);
            }
            self.fill_at_least(1)?;
            if self.available() == 0 {
                return Ok(0);
            }
        }
        let n = self.available().min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.consume(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(bytes: &[u8]) -> BufStream<Cursor<Vec<u8>>> {
        BufStream::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_integer_reads() {
        let mut s = stream(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(s.read_u8().unwrap(), 0x01);
        assert_eq!(s.read_u16_be().unwrap(), 0x0203);
        assert_eq!(s.read_u32_be().unwrap(), 0x04050607);
        assert!(s.read_u8().is_err());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut s = stream(&[0xFF, 0xD8, 0x10]);
        assert_eq!(s.peek(2).unwrap(), &[0xFF, 0xD8]);
        assert_eq!(s.peek(2).unwrap(), &[0xFF, 0xD8]);
        assert_eq!(s.read_u8().unwrap(), 0xFF);
    }

    #[test]
    fn test_ensure_buffered_at_end() {
        let mut s = stream(&[0x42]);
        assert!(s.ensure_buffered(1).unwrap());
        assert!(!s.ensure_buffered(2).unwrap());
        assert_eq!(s.read_u8().unwrap(), 0x42);
        assert!(!s.ensure_buffered(1).unwrap());
    }

    #[test]
    fn test_skip() {
        let mut s = stream(&[1, 2, 3, 4, 5]);
        s.skip(3).unwrap();
        assert_eq!(s.read_u8().unwrap(), 4);
        assert!(s.skip(2).is_err());
    }

    #[test]
    fn test_ascii_stop_at_nul() {
        let mut s = stream(b"JFIF\0\x01\x02");
        let (value, consumed) = s.read_ascii_string(7, NulBehavior::Stop).unwrap();
        assert_eq!(value, "JFIF");
        assert_eq!(consumed, 5);
        assert_eq!(s.read_u8().unwrap(), 0x01);
    }

    #[test]
    fn test_ascii_stop_hits_max() {
        let mut s = stream(b"Exif\0rest");
        let (value, consumed) = s.read_ascii_string(3, NulBehavior::Stop).unwrap();
        assert_eq!(value, "Exi");
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_ascii_trim_trailing() {
        let mut s = stream(b"ABCD\0\0\0!");
        let (value, consumed) = s.read_ascii_string(7, NulBehavior::TrimTrailing).unwrap();
        assert_eq!(value, "ABCD");
        assert_eq!(consumed, 7);
        assert_eq!(s.read_u8().unwrap(), b'!');
    }

    #[test]
    fn test_scan_finds_match_and_leaves_it_buffered() {
        let mut s = stream(&[0x01, 0x02, 0xFF, 0xD9, 0x55]);
        let mut sink = Vec::new();
        let outcome = s
            .scan(&mut sink, 2, None, |w| {
                w.windows(2).position(|p| p == [0xFF, 0xD9])
            })
            .unwrap();
        assert!(outcome.is_positive_match);
        assert_eq!(outcome.bytes_read, 2);
        assert_eq!(sink, vec![0x01, 0x02]);
        // The matched marker is still unconsumed.
        assert_eq!(s.read_u8().unwrap(), 0xFF);
        assert_eq!(s.read_u8().unwrap(), 0xD9);
    }

    #[test]
    fn test_scan_negative_at_eof_copies_everything() {
        let mut s = stream(&[0x01, 0xFF]);
        let mut sink = Vec::new();
        let outcome = s
            .scan(&mut sink, 2, None, |w| {
                w.windows(2).position(|p| p == [0xFF, 0xD9])
            })
            .unwrap();
        assert!(!outcome.is_positive_match);
        assert_eq!(sink, vec![0x01, 0xFF]);
    }

    #[test]
    fn test_scan_respects_max_bytes() {
        let mut s = stream(&[0x01, 0x02, 0x03, 0xFF, 0xD9]);
        let mut sink = Vec::new();
        let outcome = s
            .scan(&mut sink, 2, Some(2), |w| {
                w.windows(2).position(|p| p == [0xFF, 0xD9])
            })
            .unwrap();
        assert!(!outcome.is_positive_match);
        assert_eq!(outcome.bytes_read, 2);
        assert_eq!(sink, vec![0x01, 0x02]);
        // Unexamined bytes are still readable.
        assert_eq!(s.read_u8().unwrap(), 0x03);
    }

    #[test]
    fn test_scan_match_across_refill_boundary() {
        // Force a refill boundary right between 0xFF and 0xD9 by using a
        // source that yields one byte per read call.
        struct OneByte(Vec<u8>, usize);
        impl Read for OneByte {
            fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
                if self.1 >= self.0.len() || out.is_empty() {
                    return Ok(0);
                }
                out[0] = self.0[self.1];
                self.1 += 1;
                Ok(1)
            }
        }
        let mut s = BufStream::new(OneByte(vec![0x10, 0xFF, 0xD9], 0));
        let mut sink = Vec::new();
        let outcome = s
            .scan(&mut sink, 2, None, |w| {
                w.windows(2).position(|p| p == [0xFF, 0xD9])
            })
            .unwrap();
        assert!(outcome.is_positive_match);
        assert_eq!(sink, vec![0x10]);
    }
}
