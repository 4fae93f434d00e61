//! JPEG marker codes and labels
//!
//! A marker is the 8-bit code that follows the 0xFF indicator byte on the
//! wire. Markers are kept as plain `u8` so caller-defined segments can use
//! codes outside the named set.

/// The marker indicator byte that precedes every marker on the wire
pub const INDICATOR: u8 = 0xFF;

/// Byte-stuffing escape: 0xFF 0x00 encodes a literal 0xFF in entropy data
pub const STUFFING: u8 = 0x00;

pub const TEM: u8 = 0x01;
pub const SOF0: u8 = 0xC0;
pub const DHT: u8 = 0xC4;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;
pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const DQT: u8 = 0xDB;
pub const DRI: u8 = 0xDD;
pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const APP2: u8 = 0xE2;
pub const APP11: u8 = 0xEB;
pub const APP15: u8 = 0xEF;
pub const COM: u8 = 0xFE;

/// True for the restart markers RST0..RST7, which appear inside the entropy
/// stream rather than between segments
pub fn is_restart(marker: u8) -> bool {
    (RST0..=RST7).contains(&marker)
}

/// Get a human-readable label for a JPEG marker
pub fn label(marker: u8) -> &'static str {
    match marker {
        0x01 => "TEM",
        0xC0 => "SOF0",
        0xC1 => "SOF1",
        0xC2 => "SOF2",
        0xC3 => "SOF3",
        0xC4 => "DHT",
        0xD0 => "RST0",
        0xD1 => "RST1",
        0xD2 => "RST2",
        0xD3 => "RST3",
        0xD4 => "RST4",
        0xD5 => "RST5",
        0xD6 => "RST6",
        0xD7 => "RST7",
        0xD8 => "SOI",
        0xD9 => "EOI",
        0xDA => "SOS",
        0xDB => "DQT",
        0xDD => "DRI",
        0xE0 => "APP0",
        0xE1 => "APP1",
        0xE2 => "APP2",
        0xE3 => "APP3",
        0xE4 => "APP4",
        0xE5 => "APP5",
        0xE6 => "APP6",
        0xE7 => "APP7",
        0xE8 => "APP8",
        0xE9 => "APP9",
        0xEA => "APP10",
        0xEB => "APP11",
        0xEC => "APP12",
        0xED => "APP13",
        0xEE => "APP14",
        0xEF => "APP15",
        0xFE => "COM",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(label(SOI), "SOI");
        assert_eq!(label(APP1), "APP1");
        assert_eq!(label(0x42), "OTHER");
    }

    #[test]
    fn test_restart_range() {
        assert!(is_restart(0xD0));
        assert!(is_restart(0xD7));
        assert!(!is_restart(0xD8));
        assert!(!is_restart(0xCF));
    }
}
