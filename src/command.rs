//! Outgoing frames: tasks, templates and write-table derivation.
//!
//! Each [`Task`] selects a fixed-size template. [`Task::encode`] copies the
//! template, patches the target hardware address into it and stamps the
//! total length into the header.
//!
//! | Task | Opcode | Size | Address slots | Task-specific bytes |
//! |------|--------|------|---------------|---------------------|
//! | Global discovery | `qa` | 6 | none | - |
//! | Unit discovery | `qg` | 18 | @6 | - |
//! | Subscribe | `cl` | 30 | @6, reversed @18 | - |
//! | Heartbeat | `hb` | 22 | @6 | - |
//! | Switch off/on | `dc` | 23 | @6 | value @22 |
//! | Read table | `rt` | 29 | @6 | table @22, version @24 |
//!
//! Write-table frames have no template. They are derived from a captured
//! table-4 read-table reply with [`derive_write_table`], expressed as an
//! [`Edit`] script over the immutable input.
//!
//! # Example
//!
//! ```
//! use orvibo_s20::{FrameHeader, HardwareAddress, OpCode, Task};
//!
//! let mac = HardwareAddress::new([0xac, 0xcf, 0x23, 0x12, 0x34, 0x56]);
//! let frame = Task::SwitchOn.encode(Some(mac)).unwrap();
//!
//! let header = FrameHeader::from_bytes(&frame).unwrap();
//! assert_eq!(header.opcode, OpCode::CONTROL);
//! assert_eq!(header.length as usize, frame.len());
//! assert_eq!(frame[22], 1);
//! ```

use std::fmt;

use crate::device::{DeviceName, HardwareAddress, Password, DEVICE_NAME_LEN, PASSWORD_LEN};
use crate::error::{OrviboError, Result};
use crate::header::{stamp_length, FrameHeader, OpCode};
use crate::response::{ResponseSet, RT_NAME_OFFSET, RT_PASSWORD_OFFSET, RT_TABLE_OFFSET};
use crate::utils::{reversed, FrameReader};

/// Space fill following the hardware address slot.
const FILL: [u8; 6] = [0x20; 6];

/// Switch value byte in the control template.
const SWITCH_VALUE_OFFSET: usize = 22;

/// Table number byte in the read-table template.
const READ_TABLE_TABLE: usize = 22;

/// Table version byte in the read-table template.
const READ_TABLE_VERSION: usize = 24;

/// Socket parameter table.
pub const SOCKET_TABLE: u8 = 4;

/// Name offset in a derived write-table frame.
pub const WT_NAME_OFFSET: usize = RT_NAME_OFFSET - WT_SHRINK;

/// Password offset in a derived write-table frame.
pub const WT_PASSWORD_OFFSET: usize = RT_PASSWORD_OFFSET - WT_SHRINK;

/// Bytes removed when deriving a write-table frame from a read-table reply.
const WT_SHRINK: usize = 3;

/// One protocol operation.
///
/// The numeric codes are stable and match [`Task::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Global discovery sent to the broadcast address.
    GlobalDiscoveryBroadcast,
    /// Global discovery sent to one address.
    GlobalDiscovery,
    /// Discovery of one known device.
    UnitDiscovery,
    /// Subscribe; required before switching or reading tables.
    Subscribe,
    /// Heartbeat.
    Heartbeat,
    /// Switch off.
    SwitchOff,
    /// Switch on.
    SwitchOn,
    /// Read the socket parameter table.
    ReadTableSocket,
    /// Read the timing table.
    ReadTableTiming,
    /// Write the socket parameter table (frame is derived, never encoded).
    WriteTableSocket,
    /// Write the timing table (no known frame layout).
    WriteTableTiming,
}

impl Task {
    /// All tasks in code order.
    pub const ALL: [Task; 11] = [
        Task::GlobalDiscoveryBroadcast,
        Task::GlobalDiscovery,
        Task::UnitDiscovery,
        Task::Subscribe,
        Task::Heartbeat,
        Task::SwitchOff,
        Task::SwitchOn,
        Task::ReadTableSocket,
        Task::ReadTableTiming,
        Task::WriteTableSocket,
        Task::WriteTableTiming,
    ];

    /// Returns the numeric task code (0..=10).
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a task by numeric code.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::UnsupportedTask` for codes above 10.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::Task;
    ///
    /// assert_eq!(Task::from_code(3).unwrap(), Task::Subscribe);
    /// assert!(Task::from_code(11).is_err());
    /// ```
    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| OrviboError::UnsupportedTask {
                task: format!("code {}", code),
            })
    }

    /// Returns the operation code of the frame this task sends.
    pub fn opcode(self) -> OpCode {
        match self {
            Task::GlobalDiscoveryBroadcast | Task::GlobalDiscovery => OpCode::GLOBAL_DISCOVERY,
            Task::UnitDiscovery => OpCode::UNIT_DISCOVERY,
            Task::Subscribe => OpCode::SUBSCRIBE,
            Task::Heartbeat => OpCode::HEARTBEAT,
            Task::SwitchOff | Task::SwitchOn => OpCode::CONTROL,
            Task::ReadTableSocket | Task::ReadTableTiming => OpCode::READ_TABLE,
            Task::WriteTableSocket | Task::WriteTableTiming => OpCode::WRITE_TABLE,
        }
    }

    /// Returns the response categories that satisfy this task.
    pub fn required(self) -> ResponseSet {
        match self {
            Task::GlobalDiscoveryBroadcast | Task::GlobalDiscovery => ResponseSet::QA,
            Task::UnitDiscovery => ResponseSet::QG,
            Task::Subscribe => ResponseSet::CL,
            Task::Heartbeat => ResponseSet::HB,
            Task::SwitchOff | Task::SwitchOn => ResponseSet::DC,
            Task::ReadTableSocket | Task::ReadTableTiming => ResponseSet::RT,
            Task::WriteTableSocket | Task::WriteTableTiming => ResponseSet::TM,
        }
    }

    /// Returns whether the frame goes to the broadcast address.
    pub fn is_broadcast(self) -> bool {
        self == Task::GlobalDiscoveryBroadcast
    }

    /// Returns whether the frame carries the target's hardware address.
    pub fn is_addressed(self) -> bool {
        !matches!(self, Task::GlobalDiscoveryBroadcast | Task::GlobalDiscovery)
    }

    /// Returns whether the frame is supplied by the caller instead of encoded.
    pub fn is_write_table(self) -> bool {
        matches!(self, Task::WriteTableSocket | Task::WriteTableTiming)
    }

    /// Builds the outgoing frame for this task.
    ///
    /// Without a target the address slots stay zeroed and, for switching,
    /// the value byte is left at zero.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::UnsupportedTask` for the write-table tasks.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::Task;
    ///
    /// let frame = Task::GlobalDiscoveryBroadcast.encode(None).unwrap();
    /// assert_eq!(frame, b"hd\x00\x06qa");
    /// ```
    pub fn encode(self, target: Option<HardwareAddress>) -> Result<Vec<u8>> {
        let slot = target.map(|mac| mac.octets()).unwrap_or_default();

        let mut frame = Vec::with_capacity(32);
        frame.extend_from_slice(&FrameHeader::new(self.opcode(), 0).to_bytes());

        match self {
            Task::GlobalDiscoveryBroadcast | Task::GlobalDiscovery => {}
            Task::UnitDiscovery => {
                frame.extend_from_slice(&slot);
                frame.extend_from_slice(&FILL);
            }
            Task::Subscribe => {
                frame.extend_from_slice(&slot);
                frame.extend_from_slice(&FILL);
                frame.extend_from_slice(&reversed(slot));
                frame.extend_from_slice(&FILL);
            }
            Task::Heartbeat => {
                frame.extend_from_slice(&slot);
                frame.extend_from_slice(&FILL);
                frame.extend_from_slice(&[0; 4]);
            }
            Task::SwitchOff | Task::SwitchOn => {
                frame.extend_from_slice(&slot);
                frame.extend_from_slice(&FILL);
                frame.extend_from_slice(&[0; 5]);
                if target.is_some() {
                    frame[SWITCH_VALUE_OFFSET] = u8::from(self == Task::SwitchOn);
                }
            }
            Task::ReadTableSocket | Task::ReadTableTiming => {
                // Timing reads use the socket table selector as well; no
                // other selector is known to produce a reply.
                frame.extend_from_slice(&slot);
                frame.extend_from_slice(&FILL);
                frame.extend_from_slice(&[0; 11]);
                frame[READ_TABLE_TABLE] = SOCKET_TABLE;
                frame[READ_TABLE_VERSION] = 0;
            }
            Task::WriteTableSocket | Task::WriteTableTiming => {
                return Err(OrviboError::UnsupportedTask {
                    task: format!("{} (frame must be derived from a read-table reply)", self),
                });
            }
        }

        stamp_length(&mut frame);
        Ok(frame)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Task::GlobalDiscoveryBroadcast | Task::GlobalDiscovery => "GLOB DISC",
            Task::UnitDiscovery => "UNIT DISC",
            Task::Subscribe => "SUBSCRIBE",
            Task::Heartbeat => "HEARTBEAT",
            Task::SwitchOff => "SWITCH OFF",
            Task::SwitchOn => "SWITCH ON",
            Task::ReadTableSocket => "RT-SOCKET",
            Task::ReadTableTiming => "RT-TIMING",
            Task::WriteTableSocket => "WT-SOCKET",
            Task::WriteTableTiming => "WT-TIMING",
        })
    }
}

/// One step of a frame edit script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Remove `len` bytes starting at `at`.
    Delete {
        /// Start offset.
        at: usize,
        /// Number of bytes removed.
        len: usize,
    },
    /// Overwrite bytes starting at `at`.
    Patch {
        /// Start offset.
        at: usize,
        /// Replacement bytes.
        bytes: Vec<u8>,
    },
}

impl Edit {
    fn end(&self) -> usize {
        match self {
            Edit::Delete { at, len } => at + len,
            Edit::Patch { at, bytes } => at + bytes.len(),
        }
    }
}

/// Applies an edit script to a copy of `input`.
///
/// Edits run in order; offsets of later edits refer to the buffer as left by
/// earlier ones.
///
/// # Errors
///
/// Returns `OrviboError::InvalidParameter` if an edit reaches past the end
/// of the buffer.
///
/// # Example
///
/// ```
/// use orvibo_s20::command::{apply_edits, Edit};
///
/// let out = apply_edits(b"abcdef", &[
///     Edit::Delete { at: 1, len: 2 },
///     Edit::Patch { at: 0, bytes: b"X".to_vec() },
/// ]).unwrap();
/// assert_eq!(out, b"Xdef");
/// ```
pub fn apply_edits(input: &[u8], edits: &[Edit]) -> Result<Vec<u8>> {
    let mut out = input.to_vec();
    for edit in edits {
        if edit.end() > out.len() {
            return Err(OrviboError::invalid_parameter(
                "edit",
                format!("{:?} exceeds frame length {}", edit, out.len()),
            ));
        }
        match edit {
            Edit::Delete { at, len } => {
                out.drain(*at..*at + *len);
            }
            Edit::Patch { at, bytes } => {
                out[*at..*at + bytes.len()].copy_from_slice(bytes);
            }
        }
    }
    Ok(out)
}

/// New values for a socket table write.
///
/// An empty string requests the factory value: the all-`0xFF` name pattern
/// or the password `"888888"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableUpdate {
    /// New device name field.
    pub name: Option<DeviceName>,
    /// New password field.
    pub password: Option<Password>,
}

impl TableUpdate {
    /// Validates and pads the requested values.
    ///
    /// # Errors
    ///
    /// Returns an error if neither value is given, or a value exceeds its
    /// field width (16 bytes for the name, 12 for the password).
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::TableUpdate;
    ///
    /// let update = TableUpdate::new(Some("Lamp"), None).unwrap();
    /// assert_eq!(update.name.unwrap().display(), "Lamp");
    ///
    /// assert!(TableUpdate::new(None, None).is_err());
    /// assert!(TableUpdate::new(None, Some("far-too-long-pw")).is_err());
    /// ```
    pub fn new(name: Option<&str>, password: Option<&str>) -> Result<Self> {
        if name.is_none() && password.is_none() {
            return Err(OrviboError::invalid_parameter(
                "set",
                "a new name or password is required",
            ));
        }

        let name = name
            .map(|n| {
                if n.is_empty() {
                    Ok(DeviceName::FACTORY)
                } else {
                    DeviceName::from_text(n)
                }
            })
            .transpose()?;
        let password = password
            .map(|p| {
                if p.is_empty() {
                    Ok(Password::factory())
                } else {
                    Password::from_text(p)
                }
            })
            .transpose()?;

        Ok(Self { name, password })
    }

    /// Returns the edit script turning a read-table reply of `declared_len`
    /// bytes into the write-table frame.
    ///
    /// Byte 18 is dropped, then the two bytes originally at 26-27. The
    /// grouping of those bytes is reverse-engineered and unverified for
    /// values above 255; offsets are kept as observed on real devices.
    pub fn edits(&self, declared_len: u16) -> Vec<Edit> {
        let length = declared_len.saturating_sub(WT_SHRINK as u16);
        let mut edits = vec![
            Edit::Delete { at: 18, len: 1 },
            Edit::Delete { at: 25, len: 2 },
            Edit::Patch {
                at: 2,
                bytes: length.to_be_bytes().to_vec(),
            },
            Edit::Patch {
                at: 4,
                bytes: OpCode::WRITE_TABLE.as_bytes().to_vec(),
            },
        ];
        if let Some(name) = &self.name {
            edits.push(Edit::Patch {
                at: WT_NAME_OFFSET,
                bytes: name.0.to_vec(),
            });
        }
        if let Some(password) = &self.password {
            edits.push(Edit::Patch {
                at: WT_PASSWORD_OFFSET,
                bytes: password.0.to_vec(),
            });
        }
        edits
    }

    /// Checks a post-write read-table reply against the requested values.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::WriteNotConfirmed` flagging each requested
    /// field that the reply does not carry.
    pub fn confirm(&self, reply: &[u8]) -> Result<()> {
        let reader = FrameReader::new(reply);

        let name_missing = self.name.is_some_and(|name| {
            reader.bytes::<DEVICE_NAME_LEN>(RT_NAME_OFFSET) != Some(name.0)
        });
        let password_missing = self.password.is_some_and(|password| {
            reader.bytes::<PASSWORD_LEN>(RT_PASSWORD_OFFSET) != Some(password.0)
        });

        if name_missing || password_missing {
            return Err(OrviboError::WriteNotConfirmed {
                name: name_missing,
                password: password_missing,
            });
        }
        Ok(())
    }
}

/// Derives a write-table frame from a captured table-4 read-table reply.
///
/// The result is three bytes shorter than the input, carries opcode `"tm"`
/// and holds the new name at offset 67 and the new password at offset 55.
///
/// # Errors
///
/// Returns `OrviboError::InvalidResponse` if `reply` is not a table-4
/// read-table frame long enough to hold the name field.
///
/// # Example
///
/// ```
/// use orvibo_s20::command::{derive_write_table, TableUpdate, WT_NAME_OFFSET};
///
/// let mut rt = vec![0u8; 108];
/// rt[..6].copy_from_slice(b"hd\x00\x6crt");
/// rt[23] = 4;
///
/// let update = TableUpdate::new(Some("Lamp"), None).unwrap();
/// let wt = derive_write_table(&rt, &update).unwrap();
///
/// assert_eq!(&wt[4..6], b"tm");
/// assert_eq!(wt.len(), 105);
/// assert_eq!(&wt[WT_NAME_OFFSET..WT_NAME_OFFSET + 16], b"Lamp            ");
/// ```
pub fn derive_write_table(reply: &[u8], update: &TableUpdate) -> Result<Vec<u8>> {
    let header = FrameHeader::from_bytes(reply)?;
    if header.opcode != OpCode::READ_TABLE {
        return Err(OrviboError::invalid_response(format!(
            "expected a read-table frame, got \"{}\"",
            header.opcode
        )));
    }

    let reader = FrameReader::new(reply);
    match reader.u16_le(RT_TABLE_OFFSET) {
        Some(table) if table == u16::from(SOCKET_TABLE) => {}
        Some(table) => {
            return Err(OrviboError::invalid_response(format!(
                "expected table {}, got table {}",
                SOCKET_TABLE, table
            )))
        }
        None => return Err(OrviboError::invalid_response("table number not present")),
    }
    if !reader.has(RT_NAME_OFFSET, DEVICE_NAME_LEN) {
        return Err(OrviboError::invalid_response(format!(
            "read-table frame too short for a write: {} bytes",
            reply.len()
        )));
    }

    apply_edits(reply, &update.edits(header.length))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> HardwareAddress {
        HardwareAddress::new([0xac, 0xcf, 0x23, 0x12, 0x34, 0x56])
    }

    /// 108-byte table-4 read-table reply with name "Old name" and password "888888".
    fn canned_rt() -> Vec<u8> {
        let mut rt = vec![0u8; 108];
        rt[..6].copy_from_slice(b"hd\x00\x6crt");
        rt[6..12].copy_from_slice(&mac().octets());
        rt[12..18].copy_from_slice(&FILL);
        rt[18] = 0xAA;
        rt[23] = 4;
        rt[26] = 0xBB;
        rt[27] = 0xCC;
        rt[28] = 0x1C;
        rt[RT_PASSWORD_OFFSET..RT_PASSWORD_OFFSET + 12].copy_from_slice(b"888888      ");
        rt[RT_NAME_OFFSET..RT_NAME_OFFSET + 16].copy_from_slice(b"Old name        ");
        rt
    }

    #[test]
    fn test_task_codes() {
        for (i, task) in Task::ALL.iter().enumerate() {
            assert_eq!(task.code() as usize, i);
            assert_eq!(Task::from_code(i as u8).unwrap(), *task);
        }
        assert!(Task::from_code(11).is_err());
        assert_eq!(Task::WriteTableTiming.code(), 10);
    }

    #[test]
    fn test_encode_lengths() {
        let cases = [
            (Task::GlobalDiscoveryBroadcast, 6, "qa"),
            (Task::GlobalDiscovery, 6, "qa"),
            (Task::UnitDiscovery, 18, "qg"),
            (Task::Subscribe, 30, "cl"),
            (Task::Heartbeat, 22, "hb"),
            (Task::SwitchOff, 23, "dc"),
            (Task::SwitchOn, 23, "dc"),
            (Task::ReadTableSocket, 29, "rt"),
            (Task::ReadTableTiming, 29, "rt"),
        ];
        for (task, len, op) in cases {
            let frame = task.encode(Some(mac())).unwrap();
            assert_eq!(frame.len(), len, "{}", task);
            assert_eq!(&frame[..2], b"hd");
            assert_eq!(u16::from_be_bytes([frame[2], frame[3]]) as usize, len);
            assert_eq!(&frame[4..6], op.as_bytes());
        }
    }

    #[test]
    fn test_encode_subscribe() {
        let frame = Task::Subscribe.encode(Some(mac())).unwrap();
        assert_eq!(
            hex::encode(&frame),
            "6864001e636caccf23123456202020202020563412\
             23cfac202020202020"
                .replace(char::is_whitespace, "")
        );
    }

    #[test]
    fn test_encode_switch() {
        let on = Task::SwitchOn.encode(Some(mac())).unwrap();
        let off = Task::SwitchOff.encode(Some(mac())).unwrap();
        assert_eq!(on[22], 1);
        assert_eq!(off[22], 0);
        assert_eq!(&on[6..12], &mac().octets());
        assert_eq!(&on[12..18], &FILL);

        let untargeted = Task::SwitchOn.encode(None).unwrap();
        assert_eq!(untargeted[22], 0);
        assert_eq!(&untargeted[6..12], &[0; 6]);
    }

    #[test]
    fn test_encode_read_table() {
        let socket = Task::ReadTableSocket.encode(Some(mac())).unwrap();
        let timing = Task::ReadTableTiming.encode(Some(mac())).unwrap();
        assert_eq!(socket[22], 4);
        assert_eq!(socket[24], 0);
        assert_eq!(socket, timing);
    }

    #[test]
    fn test_encode_write_table_unsupported() {
        assert!(matches!(
            Task::WriteTableSocket.encode(Some(mac())),
            Err(OrviboError::UnsupportedTask { .. })
        ));
        assert!(Task::WriteTableTiming.encode(None).is_err());
    }

    #[test]
    fn test_required_and_broadcast() {
        assert_eq!(Task::Subscribe.required(), ResponseSet::CL);
        assert_eq!(Task::SwitchOn.required(), ResponseSet::DC);
        assert_eq!(Task::WriteTableSocket.required(), ResponseSet::TM);
        assert!(Task::GlobalDiscoveryBroadcast.is_broadcast());
        assert!(!Task::GlobalDiscovery.is_broadcast());
        assert!(!Task::GlobalDiscovery.is_addressed());
        assert!(Task::UnitDiscovery.is_addressed());
    }

    #[test]
    fn test_apply_edits_out_of_range() {
        let result = apply_edits(b"abc", &[Edit::Delete { at: 2, len: 2 }]);
        assert!(result.is_err());
    }

    #[test]
    fn test_derive_write_table_name() {
        let rt = canned_rt();
        let update = TableUpdate::new(Some("Lamp"), None).unwrap();
        let wt = derive_write_table(&rt, &update).unwrap();

        assert_eq!(&wt[4..6], b"tm");
        assert_eq!(wt.len(), rt.len() - 3);
        assert_eq!(u16::from_be_bytes([wt[2], wt[3]]), 108 - 3);
        assert_eq!(&wt[WT_NAME_OFFSET..WT_NAME_OFFSET + 16], b"Lamp            ");
        // Password carried over unchanged.
        assert_eq!(&wt[WT_PASSWORD_OFFSET..WT_PASSWORD_OFFSET + 12], b"888888      ");
    }

    #[test]
    fn test_derive_write_table_shifts() {
        let rt = canned_rt();
        let update = TableUpdate::new(None, Some("pw")).unwrap();
        let wt = derive_write_table(&rt, &update).unwrap();

        // Byte 18 dropped: original 19..26 moves to 18..25.
        assert_eq!(&wt[6..12], &rt[6..12]);
        assert_eq!(wt[22], rt[23]);
        assert!(!wt.contains(&0xAA));
        // Bytes 26-27 dropped: original 28 moves to 25.
        assert!(!wt.contains(&0xBB));
        assert!(!wt.contains(&0xCC));
        assert_eq!(wt[25], 0x1C);
        assert_eq!(&wt[WT_PASSWORD_OFFSET..WT_PASSWORD_OFFSET + 12], b"pw          ");
        assert_eq!(&wt[WT_NAME_OFFSET..WT_NAME_OFFSET + 16], b"Old name        ");
    }

    #[test]
    fn test_derive_write_table_factory_values() {
        let rt = canned_rt();
        let update = TableUpdate::new(Some(""), Some("")).unwrap();
        let wt = derive_write_table(&rt, &update).unwrap();
        assert_eq!(&wt[WT_NAME_OFFSET..WT_NAME_OFFSET + 16], &[0xFF; 16]);
        assert_eq!(&wt[WT_PASSWORD_OFFSET..WT_PASSWORD_OFFSET + 12], b"888888      ");
    }

    #[test]
    fn test_derive_write_table_literal_unset_name() {
        let update = TableUpdate::new(Some("(unset)"), None).unwrap();
        let wt = derive_write_table(&canned_rt(), &update).unwrap();
        assert_eq!(&wt[WT_NAME_OFFSET..WT_NAME_OFFSET + 16], b"(unset)         ");
    }

    #[test]
    fn test_derive_write_table_rejects() {
        let update = TableUpdate::new(Some("Lamp"), None).unwrap();

        let mut wrong_op = canned_rt();
        wrong_op[4..6].copy_from_slice(b"qa");
        assert!(derive_write_table(&wrong_op, &update).is_err());

        let mut wrong_table = canned_rt();
        wrong_table[23] = 3;
        assert!(derive_write_table(&wrong_table, &update).is_err());

        let short = &canned_rt()[..80];
        assert!(derive_write_table(short, &update).is_err());
    }

    #[test]
    fn test_confirm() {
        let update = TableUpdate::new(Some("Lamp"), Some("pw")).unwrap();

        let mut reply = canned_rt();
        assert!(matches!(
            update.confirm(&reply),
            Err(OrviboError::WriteNotConfirmed {
                name: true,
                password: true
            })
        ));

        reply[RT_NAME_OFFSET..RT_NAME_OFFSET + 16].copy_from_slice(b"Lamp            ");
        assert!(matches!(
            update.confirm(&reply),
            Err(OrviboError::WriteNotConfirmed {
                name: false,
                password: true
            })
        ));

        reply[RT_PASSWORD_OFFSET..RT_PASSWORD_OFFSET + 12].copy_from_slice(b"pw          ");
        assert!(update.confirm(&reply).is_ok());

        // A name-only update ignores the password field.
        let name_only = TableUpdate::new(Some("Lamp"), None).unwrap();
        assert!(name_only.confirm(&reply).is_ok());
        // Truncated reply cannot confirm.
        assert!(name_only.confirm(&reply[..80]).is_err());
    }
}
