//! Incoming frames: length-gated decoding.
//!
//! Devices often send less than the full layout of a reply. Every field is
//! read through [`FrameReader`](crate::utils::FrameReader) and is `None`
//! when the frame ends before it; a short frame is never an error.
//!
//! # Reply layouts
//!
//! | Opcode | Category | Fields (offset) |
//! |--------|----------|-----------------|
//! | `cl` | CL | hardware address @6, state @23 |
//! | `dc` | DC | - |
//! | `hb` | HB | - |
//! | `qa` | QA | hardware address @7, device time @37, state @41 |
//! | `qg` | QG | hardware address @7, device time @37, state @41 |
//! | `rt` | RT | hardware address @6, [`TableHeader`] @23, [`SocketTable`] @34 |
//! | `sf` | SF | hardware address @6, new state @22 |
//! | `tm` | TM | hardware address @6 |
//!
//! A `qa` frame shorter than 13 bytes is the echo of our own broadcast
//! query and does not count as a reply.
//!
//! # Example
//!
//! ```
//! use orvibo_s20::{Response, ResponseKind, ResponseSet, SwitchState};
//!
//! let mut frame = vec![0u8; 24];
//! frame[..6].copy_from_slice(b"hd\x00\x18cl");
//! frame[6..12].copy_from_slice(&[0xac, 0xcf, 0x23, 0x12, 0x34, 0x56]);
//! frame[23] = 1;
//!
//! let response = Response::decode(&frame).unwrap();
//! assert_eq!(response.kind, ResponseKind::Subscribe);
//! assert_eq!(response.kind.category(), ResponseSet::CL);
//! assert_eq!(response.reported_state, Some(SwitchState::On));
//! ```

use std::fmt;
use std::net::Ipv4Addr;
use std::ops::{BitOr, BitOrAssign};

use crate::device::{
    DeviceName, DeviceTime, DeviceType, HardwareAddress, Password, SwitchState, DEVICE_NAME_LEN,
    PASSWORD_LEN,
};
use crate::error::{OrviboError, Result};
use crate::header::{FrameHeader, OpCode};
use crate::utils::FrameReader;

/// Table number offset in a read-table reply.
pub const RT_TABLE_OFFSET: usize = 23;

/// Password offset in a table-4 read-table reply.
pub const RT_PASSWORD_OFFSET: usize = 58;

/// Name offset in a table-4 read-table reply.
pub const RT_NAME_OFFSET: usize = 70;

/// Smallest `qa` frame that is a real reply rather than an echoed query.
const QA_MIN_REPLY: usize = 13;

/// Set of observed response categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResponseSet(u32);

impl ResponseSet {
    /// No responses.
    pub const EMPTY: ResponseSet = ResponseSet(0);
    /// Subscribe acknowledgement.
    pub const CL: ResponseSet = ResponseSet(0x01);
    /// Switch control acknowledgement.
    pub const DC: ResponseSet = ResponseSet(0x02);
    /// Heartbeat acknowledgement.
    pub const HB: ResponseSet = ResponseSet(0x04);
    /// Global discovery reply.
    pub const QA: ResponseSet = ResponseSet(0x08);
    /// Unit discovery reply.
    pub const QG: ResponseSet = ResponseSet(0x10);
    /// Read-table reply.
    pub const RT: ResponseSet = ResponseSet(0x20);
    /// Switch state report.
    pub const SF: ResponseSet = ResponseSet(0x40);
    /// Write-table acknowledgement.
    pub const TM: ResponseSet = ResponseSet(0x80);
    /// Unrecognized opcode.
    pub const UNKNOWN: ResponseSet = ResponseSet(0x8000_0000);

    const NAMES: [(ResponseSet, &'static str); 9] = [
        (Self::CL, "cl"),
        (Self::DC, "dc"),
        (Self::HB, "hb"),
        (Self::QA, "qa"),
        (Self::QG, "qg"),
        (Self::RT, "rt"),
        (Self::SF, "sf"),
        (Self::TM, "tm"),
        (Self::UNKNOWN, "??"),
    ];

    /// Returns the raw bitmask.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns whether no category is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns whether every category in `required` is set.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::ResponseSet;
    ///
    /// let seen = ResponseSet::CL | ResponseSet::SF;
    /// assert!(seen.contains_all(ResponseSet::CL));
    /// assert!(!seen.contains_all(ResponseSet::CL | ResponseSet::RT));
    /// ```
    pub fn contains_all(self, required: ResponseSet) -> bool {
        self.0 & required.0 == required.0
    }

    /// Adds the categories in `other`.
    pub fn insert(&mut self, other: ResponseSet) {
        self.0 |= other.0;
    }
}

impl BitOr for ResponseSet {
    type Output = ResponseSet;

    fn bitor(self, rhs: Self) -> Self {
        ResponseSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResponseSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ResponseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (set, name) in Self::NAMES {
            if self.contains_all(set) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Kind of a received frame, by opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `cl`
    Subscribe,
    /// `dc`
    Control,
    /// `hb`
    Heartbeat,
    /// `qa` long enough to be a reply.
    GlobalDiscovery,
    /// `qa` too short to be a reply: our own query, looped back.
    DiscoveryEcho,
    /// `qg`
    UnitDiscovery,
    /// `rt`
    ReadTable,
    /// `sf`
    SwitchState,
    /// `tm`
    WriteTable,
    /// Any other opcode.
    Unknown(OpCode),
}

impl ResponseKind {
    /// Returns the category this kind contributes to a task's response set.
    pub fn category(self) -> ResponseSet {
        match self {
            ResponseKind::Subscribe => ResponseSet::CL,
            ResponseKind::Control => ResponseSet::DC,
            ResponseKind::Heartbeat => ResponseSet::HB,
            ResponseKind::GlobalDiscovery => ResponseSet::QA,
            ResponseKind::DiscoveryEcho => ResponseSet::EMPTY,
            ResponseKind::UnitDiscovery => ResponseSet::QG,
            ResponseKind::ReadTable => ResponseSet::RT,
            ResponseKind::SwitchState => ResponseSet::SF,
            ResponseKind::WriteTable => ResponseSet::TM,
            ResponseKind::Unknown(_) => ResponseSet::UNKNOWN,
        }
    }
}

/// Read-table header fields, all little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableHeader {
    /// Table number @23.
    pub table: Option<u16>,
    /// Unidentified word @25.
    pub unknown: Option<u16>,
    /// Record length @28.
    pub record_length: Option<u16>,
    /// Record number @30.
    pub record_number: Option<u16>,
    /// Table version @32.
    pub version: Option<u16>,
}

impl TableHeader {
    fn decode(reader: &FrameReader<'_>) -> Self {
        Self {
            table: reader.u16_le(RT_TABLE_OFFSET),
            unknown: reader.u16_le(25),
            record_length: reader.u16_le(28),
            record_number: reader.u16_le(30),
            version: reader.u16_le(32),
        }
    }
}

/// Socket parameter block (table 4) of a read-table reply.
///
/// Counters are little-endian; IPv4 addresses are in dotted-quad order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SocketTable {
    /// Device UID.
    pub uid: Option<[u8; 12]>,
    /// Hardware address, reversed and space padded.
    pub reversed_hardware_address: Option<[u8; 12]>,
    /// Remote password.
    pub password: Option<Password>,
    /// Device name.
    pub name: Option<DeviceName>,
    /// Icon code.
    pub device_type: Option<DeviceType>,
    /// Hardware version.
    pub hardware_version: Option<u32>,
    /// Firmware version.
    pub firmware_version: Option<u32>,
    /// Radio module firmware version.
    pub radio_firmware_version: Option<u32>,
    /// Server port.
    pub server_port: Option<u16>,
    /// Server address.
    pub server_address: Option<Ipv4Addr>,
    /// Remote port.
    pub remote_port: Option<u16>,
    /// Remote server name, trailing NULs and blanks removed.
    pub remote_name: Option<String>,
    /// Device's own address.
    pub local_address: Option<Ipv4Addr>,
    /// Gateway.
    pub gateway: Option<Ipv4Addr>,
    /// Netmask.
    pub netmask: Option<Ipv4Addr>,
    /// DHCP enabled.
    pub dhcp: Option<bool>,
    /// Answers global discovery.
    pub discoverable: Option<bool>,
    /// Timezone configured.
    pub timezone_set: Option<bool>,
    /// Timezone offset in hours.
    pub timezone: Option<i8>,
    /// Countdown status word.
    pub countdown_status: Option<u16>,
    /// Countdown in seconds.
    pub countdown_seconds: Option<u16>,
}

impl SocketTable {
    fn decode(reader: &FrameReader<'_>) -> Self {
        let flag = |offset| reader.u8_at(offset).map(|b| b != 0);
        Self {
            uid: reader.bytes::<12>(34),
            reversed_hardware_address: reader.bytes::<12>(46),
            password: reader.bytes::<PASSWORD_LEN>(RT_PASSWORD_OFFSET).map(Password),
            name: reader.bytes::<DEVICE_NAME_LEN>(RT_NAME_OFFSET).map(DeviceName),
            device_type: reader.u16_le(86).map(|code| DeviceType(code as i16)),
            hardware_version: reader.u32_le(88),
            firmware_version: reader.u32_le(92),
            radio_firmware_version: reader.u32_le(96),
            server_port: reader.u16_le(100),
            server_address: reader.ipv4_be(102),
            remote_port: reader.u16_le(106),
            remote_name: reader.slice(108, 40).map(|raw| {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
            }),
            local_address: reader.ipv4_be(148),
            gateway: reader.ipv4_be(152),
            netmask: reader.ipv4_be(156),
            dhcp: flag(160),
            discoverable: flag(161),
            timezone_set: flag(162),
            timezone: reader.u8_at(163).map(|b| b as i8),
            countdown_status: reader.u16_le(164),
            countdown_seconds: reader.u16_le(166),
        }
    }

    /// Returns whether any field was present.
    pub fn is_empty(&self) -> bool {
        self.uid.is_none()
    }
}

/// A decoded incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Frame kind.
    pub kind: ResponseKind,
    /// Number of bytes received.
    pub received: usize,
    /// Length declared in the header.
    pub declared_length: u16,
    /// Sender's hardware address.
    pub hardware_address: Option<HardwareAddress>,
    /// State reported by subscribe and discovery replies.
    pub reported_state: Option<SwitchState>,
    /// State announced by a switch state report; takes precedence.
    pub new_state: Option<SwitchState>,
    /// Device clock from discovery replies.
    pub device_time: Option<DeviceTime>,
    /// Read-table header.
    pub table_header: Option<TableHeader>,
    /// Table-4 parameter block.
    pub socket_table: Option<SocketTable>,
}

impl Response {
    /// Decodes a received frame.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::InvalidResponse` only if the frame is shorter
    /// than the 6-byte header. Missing trailing fields are left as `None`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(data)?;
        let reader = FrameReader::new(data);

        let mut response = Response {
            kind: ResponseKind::Unknown(header.opcode),
            received: data.len(),
            declared_length: header.length,
            hardware_address: None,
            reported_state: None,
            new_state: None,
            device_time: None,
            table_header: None,
            socket_table: None,
        };

        let mac_at = |offset| reader.bytes::<6>(offset).map(HardwareAddress);
        let state_at = |offset| reader.u8_at(offset).map(SwitchState::from_wire);

        match header.opcode {
            OpCode::SUBSCRIBE => {
                response.kind = ResponseKind::Subscribe;
                response.hardware_address = mac_at(6);
                response.reported_state = state_at(23);
            }
            OpCode::CONTROL => response.kind = ResponseKind::Control,
            OpCode::HEARTBEAT => response.kind = ResponseKind::Heartbeat,
            OpCode::GLOBAL_DISCOVERY | OpCode::UNIT_DISCOVERY => {
                response.kind = if header.opcode == OpCode::UNIT_DISCOVERY {
                    ResponseKind::UnitDiscovery
                } else if data.len() >= QA_MIN_REPLY {
                    ResponseKind::GlobalDiscovery
                } else {
                    ResponseKind::DiscoveryEcho
                };
                response.hardware_address = mac_at(7);
                response.device_time = reader.u32_le(37).map(DeviceTime);
                response.reported_state = state_at(41);
            }
            OpCode::READ_TABLE => {
                response.kind = ResponseKind::ReadTable;
                response.hardware_address = mac_at(6);
                let table_header = TableHeader::decode(&reader);
                if table_header.table == Some(4) {
                    let table = SocketTable::decode(&reader);
                    if !table.is_empty() {
                        response.socket_table = Some(table);
                    }
                }
                response.table_header = Some(table_header);
            }
            OpCode::SWITCH_STATE => {
                response.kind = ResponseKind::SwitchState;
                response.hardware_address = mac_at(6);
                response.new_state = state_at(22);
            }
            OpCode::WRITE_TABLE => {
                response.kind = ResponseKind::WriteTable;
                response.hardware_address = mac_at(6);
            }
            _ => {}
        }

        Ok(response)
    }

    /// Returns whether the received byte count matches the declared length.
    pub fn is_complete(&self) -> bool {
        self.received == usize::from(self.declared_length)
    }

    /// Returns whether the frame carries enough to create or update a record.
    ///
    /// That is a state byte for subscribe, discovery and state reports, or
    /// the parameter block for a table-4 read.
    pub fn carries_record_data(&self) -> bool {
        if self.hardware_address.is_none() {
            return false;
        }
        match self.kind {
            ResponseKind::Subscribe
            | ResponseKind::GlobalDiscovery
            | ResponseKind::UnitDiscovery => self.reported_state.is_some(),
            ResponseKind::SwitchState => self.new_state.is_some(),
            ResponseKind::ReadTable => self.socket_table.is_some(),
            _ => false,
        }
    }

    /// Returns the state to record: a state report wins over a reported state.
    pub fn effective_state(&self) -> Option<SwitchState> {
        self.new_state.or(self.reported_state)
    }
}

/// Checks that a frame has the expected opcode.
///
/// # Errors
///
/// Returns `OrviboError::InvalidResponse` on a short frame or a different opcode.
pub fn expect_opcode(data: &[u8], expected: OpCode) -> Result<()> {
    let header = FrameHeader::from_bytes(data)?;
    if header.opcode != expected {
        return Err(OrviboError::invalid_response(format!(
            "expected \"{}\", got \"{}\"",
            expected, header.opcode
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0xac, 0xcf, 0x23, 0x12, 0x34, 0x56];

    fn frame(opcode: &[u8; 2], len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[..2].copy_from_slice(b"hd");
        data[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        data[4..6].copy_from_slice(opcode);
        data
    }

    /// Global discovery reply as sent by a socket, state byte last.
    fn qa_reply(state: u8) -> Vec<u8> {
        let mut data = hex::decode(concat!(
            "6864002a7161",   // hd, length 42, "qa"
            "00",
            "accf23123456",   // hardware address
            "202020202020",
            "56341223cfac",
            "202020202020",
            "534f43303035",   // "SOC005"
            "817eaa83",       // device time, 1 s past the Unix epoch
            "00",
        ))
        .unwrap();
        data[41] = state;
        data
    }

    #[test]
    fn test_response_set_display() {
        assert_eq!(ResponseSet::CL.to_string(), "cl");
        assert_eq!((ResponseSet::CL | ResponseSet::RT).to_string(), "cl|rt");
        assert_eq!(ResponseSet::EMPTY.to_string(), "none");
        assert_eq!(ResponseSet::UNKNOWN.to_string(), "??");
    }

    #[test]
    fn test_response_set_insert() {
        let mut seen = ResponseSet::EMPTY;
        assert!(!seen.contains_all(ResponseSet::QA));
        seen.insert(ResponseSet::QA);
        seen |= ResponseSet::SF;
        assert!(seen.contains_all(ResponseSet::QA | ResponseSet::SF));
        assert_eq!(seen.bits(), 0x48);
        assert!(seen.contains_all(ResponseSet::EMPTY));
    }

    #[test]
    fn test_decode_too_short() {
        assert!(Response::decode(b"hd\x00").is_err());
    }

    #[test]
    fn test_decode_global_discovery() {
        let response = Response::decode(&qa_reply(0)).unwrap();
        assert_eq!(response.kind, ResponseKind::GlobalDiscovery);
        assert_eq!(response.hardware_address, Some(HardwareAddress(MAC)));
        assert_eq!(response.device_time.map(|t| t.unix_seconds()), Some(1));
        assert_eq!(response.reported_state, Some(SwitchState::Off));
        assert!(response.carries_record_data());
        assert!(response.is_complete());
    }

    #[test]
    fn test_decode_discovery_echo() {
        let response = Response::decode(b"hd\x00\x06qa").unwrap();
        assert_eq!(response.kind, ResponseKind::DiscoveryEcho);
        assert!(response.kind.category().is_empty());
        assert!(!response.carries_record_data());
    }

    #[test]
    fn test_decode_discovery_truncated() {
        let data = &qa_reply(1)[..40];
        let response = Response::decode(data).unwrap();
        assert_eq!(response.kind, ResponseKind::GlobalDiscovery);
        assert!(response.hardware_address.is_some());
        assert!(response.device_time.is_none());
        assert!(response.reported_state.is_none());
        assert!(!response.carries_record_data());
        assert!(!response.is_complete());
    }

    #[test]
    fn test_decode_unit_discovery() {
        let mut data = qa_reply(1);
        data[4..6].copy_from_slice(b"qg");
        let response = Response::decode(&data).unwrap();
        assert_eq!(response.kind, ResponseKind::UnitDiscovery);
        assert_eq!(response.kind.category(), ResponseSet::QG);
        assert_eq!(response.reported_state, Some(SwitchState::On));
    }

    #[test]
    fn test_decode_switch_state() {
        let data = hex::decode(concat!(
            "686400177366",
            "accf23123456",
            "202020202020",
            "00000000",
            "01",   // on
        ))
        .unwrap();
        let response = Response::decode(&data).unwrap();
        assert_eq!(response.kind, ResponseKind::SwitchState);
        assert_eq!(response.new_state, Some(SwitchState::On));
        assert_eq!(response.effective_state(), Some(SwitchState::On));
    }

    #[test]
    fn test_decode_unknown() {
        let response = Response::decode(b"hd\x00\x08zz\x01\x02").unwrap();
        assert_eq!(response.kind, ResponseKind::Unknown(OpCode(*b"zz")));
        assert_eq!(response.kind.category(), ResponseSet::UNKNOWN);
    }

    #[test]
    fn test_decode_read_table_truncated() {
        // 25 bytes: table number present, nothing after it.
        let mut data = frame(b"rt", 25);
        data[6..12].copy_from_slice(&MAC);
        data[23] = 4;
        let response = Response::decode(&data).unwrap();
        let header = response.table_header.unwrap();
        assert_eq!(header.table, Some(4));
        assert_eq!(header.unknown, None);
        assert_eq!(header.record_length, None);
        assert_eq!(header.record_number, None);
        assert_eq!(header.version, None);
        assert!(response.socket_table.is_none());
        assert!(!response.carries_record_data());
    }

    #[test]
    fn test_decode_read_table_full() {
        let data = hex::decode(concat!(
            "686400a87274",                                       // hd, length 168, "rt"
            "accf23123456",                                       // hardware address
            "0000000000000000000000",
            "0400",                                               // table 4
            "000000",
            "1c0001000200",                                       // record length, record number, version
            "000000000000000000000000",                           // uid
            "000000000000000000000000",                           // reversed hardware address
            "383838383838202020202020",                           // "888888"
            "4b69746368656e202020202020202020",                   // "Kitchen"
            "0400",                                               // device type
            "000000000302010000000000",                           // hardware, firmware, radio versions
            "1027",                                               // server port 10000
            "2a010203",                                           // server 42.1.2.3
            "0000",                                               // remote port
            "766963656e74657200000000000000000000000000000000",   // "vicenter"
            "00000000000000000000000000000000",
            "c0a80114",                                           // 192.168.1.20
            "0000000000000000",                                   // gateway, netmask
            "010000fb",                                           // dhcp, discoverable, timezone set, -5 h
            "00002c01",                                           // countdown 300 s
        ))
        .unwrap();
        assert_eq!(data.len(), 168);

        let response = Response::decode(&data).unwrap();
        let header = response.table_header.unwrap();
        assert_eq!(header.record_length, Some(0x1C));
        assert_eq!(header.record_number, Some(1));
        assert_eq!(header.version, Some(2));

        let table = response.socket_table.as_ref().unwrap();
        assert!(table.name.unwrap().matches("Kitchen"));
        assert_eq!(table.password.unwrap().display(), "888888");
        assert_eq!(table.device_type, Some(DeviceType(4)));
        assert_eq!(table.firmware_version, Some(0x0001_0203));
        assert_eq!(table.server_port, Some(10000));
        assert_eq!(table.server_address, Some(Ipv4Addr::new(42, 1, 2, 3)));
        assert_eq!(table.remote_name.as_deref(), Some("vicenter"));
        assert_eq!(table.local_address, Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(table.dhcp, Some(true));
        assert_eq!(table.discoverable, Some(false));
        assert_eq!(table.timezone, Some(-5));
        assert_eq!(table.countdown_seconds, Some(300));
        assert!(response.carries_record_data());
    }

    #[test]
    fn test_decode_read_table_other_table() {
        let mut data = frame(b"rt", 120);
        data[23] = 3;
        let response = Response::decode(&data).unwrap();
        assert_eq!(response.table_header.unwrap().table, Some(3));
        assert!(response.socket_table.is_none());
    }

    #[test]
    fn test_expect_opcode() {
        assert!(expect_opcode(b"hd\x00\x06qa", OpCode::GLOBAL_DISCOVERY).is_ok());
        assert!(expect_opcode(b"hd\x00\x06qa", OpCode::READ_TABLE).is_err());
    }
}
