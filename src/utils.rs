//! Byte-level helpers shared by the codec and the transport.
//!
//! - [`hex_dump`] renders frames for trace logging.
//! - [`FrameReader`] is a bounds-checked view over a received frame: every
//!   accessor returns `None` when the field lies beyond the received length.
//!
//! # Example
//!
//! ```
//! use orvibo_s20::utils::FrameReader;
//!
//! let frame = [0x10, 0x27, 0xC0, 0xA8, 0x01, 0x14];
//! let reader = FrameReader::new(&frame);
//!
//! assert_eq!(reader.u16_le(0), Some(10000));
//! assert_eq!(reader.ipv4_be(2).map(|ip| ip.to_string()), Some("192.168.1.20".into()));
//! assert_eq!(reader.u32_le(4), None);
//! ```

use std::net::Ipv4Addr;

/// Bytes per hex dump row.
pub const HEX_DUMP_WIDTH: usize = 16;

/// Formats bytes as a hex dump, 16 per row, followed by the printable ASCII.
///
/// Rows are indented by `indent` spaces and prefixed with their offset.
///
/// # Example
///
/// ```
/// use orvibo_s20::utils::hex_dump;
///
/// let dump = hex_dump(b"hd\x00\x06qa", 0);
/// assert!(dump.starts_with("0000: 68 64 00 06 71 61 "));
/// assert!(dump.ends_with("  hd..qa\n"));
/// ```
pub fn hex_dump(data: &[u8], indent: usize) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 16);
    for (row, chunk) in data.chunks(HEX_DUMP_WIDTH).enumerate() {
        out.push_str(&format!("{:indent$}{:04x}:", "", row * HEX_DUMP_WIDTH, indent = indent));
        for b in chunk {
            out.push_str(&format!(" {:02x}", b));
        }
        for _ in chunk.len()..HEX_DUMP_WIDTH {
            out.push_str("   ");
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

/// Returns a copy of `bytes` in reverse order.
#[inline]
pub fn reversed<const N: usize>(bytes: [u8; N]) -> [u8; N] {
    let mut out = bytes;
    out.reverse();
    out
}

/// Bounds-checked, read-only view over a received frame.
///
/// Multi-byte counters are least-significant byte first; IPv4 addresses are
/// in dotted-quad (most significant first) order.
#[derive(Debug, Clone, Copy)]
pub struct FrameReader<'a> {
    data: &'a [u8],
}

impl<'a> FrameReader<'a> {
    /// Wraps a received frame.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of received bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns whether `size` bytes at `offset` were received.
    #[inline]
    pub fn has(&self, offset: usize, size: usize) -> bool {
        offset
            .checked_add(size)
            .is_some_and(|end| end <= self.data.len())
    }

    /// Returns `size` bytes at `offset`.
    pub fn slice(&self, offset: usize, size: usize) -> Option<&'a [u8]> {
        if self.has(offset, size) {
            Some(&self.data[offset..offset + size])
        } else {
            None
        }
    }

    /// Returns a fixed-size field at `offset`.
    pub fn bytes<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.slice(offset, N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
    }

    /// Returns one byte.
    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Returns a little-endian 16-bit counter.
    pub fn u16_le(&self, offset: usize) -> Option<u16> {
        self.bytes::<2>(offset).map(u16::from_le_bytes)
    }

    /// Returns a little-endian 32-bit counter.
    pub fn u32_le(&self, offset: usize) -> Option<u32> {
        self.bytes::<4>(offset).map(u32::from_le_bytes)
    }

    /// Returns an IPv4 address stored most significant octet first.
    pub fn ipv4_be(&self, offset: usize) -> Option<Ipv4Addr> {
        self.bytes::<4>(offset).map(Ipv4Addr::from)
    }
}
