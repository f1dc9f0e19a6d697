//! S20 frame header and operation codes.
//!
//! Every frame exchanged with an S20 device, in either direction, starts
//! with the same 6-byte header:
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0-1 | Magic | Always `"hd"` |
//! | 2-3 | Length | Total frame length, big-endian, header included |
//! | 4-5 | Opcode | Two ASCII characters selecting the operation |
//!
//! The length field is the only big-endian counter in the protocol; all
//! counters inside the payload are least-significant byte first.
//!
//! # Example
//!
//! ```
//! use orvibo_s20::{FrameHeader, OpCode};
//!
//! let header = FrameHeader::new(OpCode::SUBSCRIBE, 30);
//! assert_eq!(header.to_bytes(), *b"hd\x00\x1ecl");
//!
//! let parsed = FrameHeader::from_bytes(&header.to_bytes()).unwrap();
//! assert_eq!(parsed.opcode, OpCode::SUBSCRIBE);
//! assert_eq!(parsed.length, 30);
//! ```

use std::fmt;

use crate::error::{OrviboError, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 6;

/// Frame magic ("hd").
pub const MAGIC: [u8; 2] = *b"hd";

/// Two-character ASCII operation code at offset 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode(pub [u8; 2]);

impl OpCode {
    /// Subscribe ("cl").
    pub const SUBSCRIBE: OpCode = OpCode(*b"cl");
    /// Switch control ("dc").
    pub const CONTROL: OpCode = OpCode(*b"dc");
    /// Heartbeat ("hb").
    pub const HEARTBEAT: OpCode = OpCode(*b"hb");
    /// Global discovery ("qa").
    pub const GLOBAL_DISCOVERY: OpCode = OpCode(*b"qa");
    /// Unit discovery ("qg").
    pub const UNIT_DISCOVERY: OpCode = OpCode(*b"qg");
    /// Read table ("rt").
    pub const READ_TABLE: OpCode = OpCode(*b"rt");
    /// Switch state report ("sf").
    pub const SWITCH_STATE: OpCode = OpCode(*b"sf");
    /// Write table ("tm").
    pub const WRITE_TABLE: OpCode = OpCode(*b"tm");

    /// Returns the raw opcode bytes.
    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

/// Frame header (6 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Magic bytes, `"hd"` on every well-formed frame.
    pub magic: [u8; 2],
    /// Declared total frame length.
    pub length: u16,
    /// Operation code.
    pub opcode: OpCode,
}

impl FrameHeader {
    /// Creates a header with the standard magic.
    pub fn new(opcode: OpCode, length: u16) -> Self {
        Self {
            magic: MAGIC,
            length,
            opcode,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let len = self.length.to_be_bytes();
        [
            self.magic[0],
            self.magic[1],
            len[0],
            len[1],
            self.opcode.0[0],
            self.opcode.0[1],
        ]
    }

    /// Parses a header from the start of a frame.
    ///
    /// The magic is not validated; callers that care use [`has_magic`](Self::has_magic).
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::InvalidResponse` if fewer than 6 bytes are supplied.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::FrameHeader;
    ///
    /// assert!(FrameHeader::from_bytes(b"hd\x00").is_err());
    /// ```
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(OrviboError::invalid_response(format!(
                "header too short: expected {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        Ok(Self {
            magic: [data[0], data[1]],
            length: u16::from_be_bytes([data[2], data[3]]),
            opcode: OpCode([data[4], data[5]]),
        })
    }

    /// Returns whether the magic is `"hd"`.
    pub fn has_magic(&self) -> bool {
        self.magic == MAGIC
    }
}

/// Writes the big-endian total length into bytes 2-3 of a frame.
///
/// Frames shorter than the header are left untouched.
pub(crate) fn stamp_length(frame: &mut [u8]) {
    if frame.len() >= HEADER_SIZE {
        let len = (frame.len() as u16).to_be_bytes();
        frame[2] = len[0];
        frame[3] = len[1];
    }
}
