//! Fixed-width and variable-length integers, text payloads and the restricted integer types.
//!
//! All readers take a `&mut &[u8]` and advance it past the bytes they consume.

use crate::prelude::*;
use encoding_rs::WINDOWS_1252;

pub(crate) trait SplitChecked: Sized {
    fn split_checked(&mut self, at: usize) -> Option<Self>;
}
impl<'a> SplitChecked for &'a [u8] {
    #[inline]
    fn split_checked(&mut self, at: usize) -> Option<&'a [u8]> {
        if at > self.len() {
            None
        } else {
            let (extracted, remainder) = self.split_at(at);
            *self = remainder;
            Some(extracted)
        }
    }
}

#[inline]
pub(crate) fn read_slice<'a>(raw: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    raw.split_checked(len)
        .ok_or(err_truncated!("unexpected eof"))
}

#[inline]
pub(crate) fn read_u8(raw: &mut &[u8]) -> Result<u8> {
    Ok(read_slice(raw, 1)?[0])
}

#[inline]
pub(crate) fn read_u16(raw: &mut &[u8]) -> Result<u16> {
    let buf = read_slice(raw, 2)?;
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

#[inline]
pub(crate) fn read_u24(raw: &mut &[u8]) -> Result<u24> {
    let buf = read_slice(raw, 3)?;
    Ok(u24::new(u32::from_be_bytes([0, buf[0], buf[1], buf[2]])))
}

#[inline]
pub(crate) fn read_u32(raw: &mut &[u8]) -> Result<u32> {
    let buf = read_slice(raw, 4)?;
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Read a MIDI data byte, which must have its top bit clear.
///
/// Without the `strict` feature, the top bit is silently discarded.
#[inline]
pub(crate) fn read_u7(raw: &mut &[u8]) -> Result<u7> {
    let byte = read_u8(raw)?;
    if cfg!(feature = "strict") {
        u7::try_from(byte).ok_or(err_track!("data byte with top bit set"))
    } else {
        Ok(u7::from(byte))
    }
}

/// Read a variable-length quantity: big-endian groups of 7 bits, where the top bit of each byte
/// signals that another byte follows.
pub(crate) fn read_varlen(raw: &mut &[u8]) -> Result<u28> {
    let mut int: u32 = 0;
    for _ in 0..4 {
        let byte = read_u8(raw)?;
        int <<= 7;
        int |= (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            //At most 4 reads of 7 bits each, so the value fits in 28 bits
            return Ok(u28::new(int));
        }
    }
    if cfg!(feature = "strict") {
        bail!(err_track!("varlen integer larger than 4 bytes"))
    } else {
        //Use the 4 bytes as-is
        log::debug!("varlen integer larger than 4 bytes, truncating to 28 bits");
        Ok(u28::new(int))
    }
}

/// Reads a slice represented in the input as a varlen `len` followed by `len` bytes.
pub(crate) fn read_varlen_slice<'a>(raw: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = read_varlen(raw)?.as_int();
    read_slice(raw, len as usize)
}

pub(crate) fn write_varlen<W: Write>(out: &mut W, int: u28) -> WriteResult<W> {
    let mut int = int.as_int();
    //Fill the buffer back to front, starting with the only byte without a continuation bit
    let mut buf = [0; 4];
    let mut start = 3;
    buf[start] = (int & 0x7F) as u8;
    int >>= 7;
    while int != 0 {
        start -= 1;
        buf[start] = 0x80 | (int & 0x7F) as u8;
        int >>= 7;
    }
    out.write(&buf[start..])
}

/// Write a slice represented as a varlen length followed by the raw bytes.
pub(crate) fn write_varlen_slice<W: Write>(out: &mut W, data: &[u8]) -> WriteResult<W> {
    let len = u32::try_from(data.len())
        .ok()
        .and_then(u28::try_from)
        .ok_or_else(|| W::invalid_input("varlen slice exceeds 28 bits"))?;
    write_varlen(out, len)?;
    out.write(data)
}

/// Decode text stored in a meta event.
///
/// SMF files do not declare a text encoding, so a single fixed encoding is assumed: Windows-1252,
/// which is a superset of ASCII and maps every byte to a character.
pub(crate) fn decode_text(raw: &[u8]) -> String {
    let (text, _had_errors) = WINDOWS_1252.decode_without_bom_handling(raw);
    text.into_owned()
}

/// Encode text into the bytes stored in a meta event, the inverse of `decode_text`.
pub(crate) fn encode_text(text: &str) -> Cow<'_, [u8]> {
    let (bytes, _encoding, unmappable) = WINDOWS_1252.encode(text);
    if unmappable {
        log::debug!("text {:?} has characters outside of windows-1252", text);
    }
    bytes
}

/// Exotically-sized integers used by the MIDI standard.
macro_rules! restricted_int {
    {$(#[$attr:meta])* $name:ident : $inner:tt => $bits:expr} => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
        #[repr(transparent)]
        #[allow(non_camel_case_types)]
        pub struct $name($inner);
        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            //Out of range values are rejected instead of masked
            fn deserialize<D: serde::Deserializer<'de>>(de: D) -> StdResult<$name, D::Error> {
                let raw = <$inner as serde::Deserialize>::deserialize(de)?;
                $name::try_from(raw).ok_or_else(|| {
                    serde::de::Error::custom(concat!(stringify!($name), " value out of range"))
                })
            }
        }
        impl From<$inner> for $name {
            /// Lossy conversion, loses the top bits.
            #[inline]
            fn from(raw: $inner) -> $name {
                $name::new(raw)
            }
        }
        impl From<$name> for $inner {
            #[inline]
            fn from(restricted: $name) -> $inner {
                restricted.0
            }
        }
        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
        impl $name {
            const MASK: $inner = (1 << $bits) - 1;

            /// The largest value representable in this many bits.
            #[inline]
            pub const fn max_value() -> $name {
                $name(Self::MASK)
            }

            /// Wrap a raw integer, discarding any bits out of range.
            #[inline]
            pub const fn new(raw: $inner) -> $name {
                $name(raw & Self::MASK)
            }

            /// Wrap a raw integer, or return `None` if it has bits out of range.
            #[inline]
            pub const fn try_from(raw: $inner) -> Option<$name> {
                if raw <= Self::MASK {
                    Some($name(raw))
                } else {
                    None
                }
            }

            /// The raw integer, always within range.
            #[inline]
            pub const fn as_int(self) -> $inner {
                self.0
            }
        }
        impl PartialEq<$inner> for $name {
            fn eq(&self, rhs: &$inner) -> bool {
                self.as_int() == *rhs
            }
        }
        impl PartialOrd<$inner> for $name {
            fn partial_cmp(&self, rhs: &$inner) -> Option<core::cmp::Ordering> {
                Some(self.as_int().cmp(rhs))
            }
        }
    };
}
restricted_int! {
    /// A 4-bit integer type, used for MIDI channels.
    ///
    /// Wraps the `u8` type and ensures that the top 4 bits are always zero.
    u4: u8 => 4
}
restricted_int! {
    /// A 7-bit integer type, used for MIDI data bytes.
    ///
    /// Wraps the `u8` type and ensures that the top bit is always zero.
    u7: u8 => 7
}
restricted_int! {
    /// A 14-bit integer type, used for pitch bend values.
    ///
    /// Wraps the `u16` type and ensures that the top two bits are always zero.
    u14: u16 => 14
}
restricted_int! {
    /// A 15-bit integer type, used for the ticks per quarter note division.
    ///
    /// Wraps the `u16` type and ensures that the top bit is always zero.
    u15: u16 => 15
}
restricted_int! {
    /// A 24-bit integer type, used for tempo in microseconds per quarter note.
    ///
    /// Wraps the `u32` type and ensures that the top 8 bits are always zero.
    u24: u32 => 24
}
restricted_int! {
    /// A 28-bit integer type, the range of variable-length quantities.
    u28: u32 => 28
}

/// The frame rate of an SMPTE time.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fps {
    /// 24 frames per second.
    Fps24,
    /// 25 frames per second.
    Fps25,
    /// NTSC drop-frame, `30 / 1.001` frames per second.
    Fps29,
    /// 30 frames per second.
    Fps30,
}
impl Fps {
    /// Decode the 2-bit frame rate code. Higher bits are ignored.
    #[inline]
    pub fn from_code(code: u8) -> Fps {
        match code & 0b11 {
            0 => Fps::Fps24,
            1 => Fps::Fps25,
            2 => Fps::Fps29,
            _ => Fps::Fps30,
        }
    }

    /// The 2-bit frame rate code.
    #[inline]
    pub fn as_code(self) -> u8 {
        match self {
            Fps::Fps24 => 0,
            Fps::Fps25 => 1,
            Fps::Fps29 => 2,
            Fps::Fps30 => 3,
        }
    }

    /// Frames per second, rounded down.
    #[inline]
    pub fn as_int(self) -> u8 {
        match self {
            Fps::Fps24 => 24,
            Fps::Fps25 => 25,
            Fps::Fps29 => 29,
            Fps::Fps30 => 30,
        }
    }

    /// Exact frames per second.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Fps::Fps24 => 24.0,
            Fps::Fps25 => 25.0,
            Fps::Fps29 => 30.0 / 1.001,
            Fps::Fps30 => 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varlen(int: u32) -> Vec<u8> {
        let mut out = Vec::new();
        write_varlen(&mut out, u28::new(int)).unwrap();
        out
    }

    #[test]
    fn varlen_known_encodings() {
        let cases: &[(u32, &[u8])] = &[
            (0x00, &[0x00]),
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (0x2000, &[0xC0, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x1F_FFFF, &[0xFF, 0xFF, 0x7F]),
            (0x20_0000, &[0x81, 0x80, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for &(int, bytes) in cases {
            assert_eq!(encode_varlen(int), bytes, "encoding {:#x}", int);
            let mut raw = bytes;
            assert_eq!(read_varlen(&mut raw).unwrap().as_int(), int, "decoding {:#x}", int);
            assert!(raw.is_empty());
        }
    }

    #[test]
    fn varlen_roundtrip_boundaries() {
        let mut int: u32 = 1;
        while int <= 0x0FFF_FFFF {
            for near in [int - 1, int, int + 1] {
                let near = near.min(0x0FFF_FFFF);
                let bytes = encode_varlen(near);
                let mut raw = &bytes[..];
                assert_eq!(read_varlen(&mut raw).unwrap().as_int(), near);
                assert!(raw.is_empty());
            }
            int <<= 1;
        }
    }

    #[test]
    fn varlen_stops_at_first_clear_byte() {
        let mut raw: &[u8] = &[0x81, 0x00, 0x90];
        assert_eq!(read_varlen(&mut raw).unwrap().as_int(), 0x80);
        assert_eq!(raw, &[0x90]);
    }

    #[test]
    fn varlen_truncated() {
        let mut raw: &[u8] = &[0x81, 0x80];
        let err = read_varlen(&mut raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
    }

    #[test]
    #[cfg(feature = "strict")]
    fn varlen_too_long_strict() {
        let mut raw: &[u8] = &[0x81, 0x80, 0x80, 0x80, 0x00];
        let err = read_varlen(&mut raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedTrack);
    }

    #[test]
    fn fixed_width_reads() {
        let mut raw: &[u8] = &[0x12, 0x34, 0x07, 0xA1, 0x20, 0xDE, 0xAD, 0xBE, 0xEF, 0x01];
        assert_eq!(read_u16(&mut raw).unwrap(), 0x1234);
        assert_eq!(read_u24(&mut raw).unwrap().as_int(), 500_000);
        assert_eq!(read_u32(&mut raw).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_u8(&mut raw).unwrap(), 0x01);
        assert_eq!(read_u8(&mut raw).unwrap_err().kind(), ErrorKind::Truncated);
    }

    #[test]
    fn text_covers_every_byte() {
        let all = (0..=255u8).collect::<Vec<_>>();
        let text = decode_text(&all);
        assert_eq!(&encode_text(&text)[..], &all[..]);
    }

    #[test]
    fn fps_codes() {
        for code in 0..4u8 {
            let fps = Fps::from_code(code);
            assert_eq!(fps.as_code(), code);
            assert_eq!(fps.as_int(), fps.as_f64() as u8);
        }
        assert_eq!(Fps::from_code(0b110), Fps::Fps29);
        assert_eq!(Fps::Fps29.as_int(), 29);
    }
}
