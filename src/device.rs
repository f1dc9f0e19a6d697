//! Device value types and the per-device record.
//!
//! The fixed-width fields here mirror how S20 devices store them in
//! their "table 4" parameter block:
//!
//! | Field | Width | Padding | Factory value |
//! |-------|-------|---------|---------------|
//! | [`DeviceName`] | 16 | spaces | 16 x `0xFF` |
//! | [`Password`] | 12 | spaces | `"888888"` |
//! | [`HardwareAddress`] | 6 | none | burned in |
//!
//! # Example
//!
//! ```
//! use orvibo_s20::{DeviceName, HardwareAddress};
//!
//! let mac: HardwareAddress = "ac:cf:23:12:34:56".parse().unwrap();
//! assert_eq!(mac.reversed().to_string(), "56:34:12:23:cf:ac");
//!
//! let name = DeviceName::from_text("Lamp").unwrap();
//! assert_eq!(name.display(), "Lamp");
//! assert_eq!(DeviceName::FACTORY.display(), "(unset)");
//! ```

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{OrviboError, Result};

/// Hardware address size in bytes.
pub const HARDWARE_ADDRESS_SIZE: usize = 6;

/// Device name field width.
pub const DEVICE_NAME_LEN: usize = 16;

/// Remote password field width.
pub const PASSWORD_LEN: usize = 12;

/// Text shown (and accepted in data files) for the factory name pattern.
pub const UNSET_NAME: &str = "(unset)";

/// Password a device falls back to when reset.
pub const FACTORY_PASSWORD: &str = "888888";

/// Seconds between 1900-01-01 and 1970-01-01, as used by device clocks.
pub const DEVICE_EPOCH_OFFSET: u32 = 0x83AA_7E80;

/// Six-byte device hardware (MAC) address.
///
/// Ordering is a lexicographic byte compare, which is the catalog's
/// hardware-address sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HardwareAddress(pub [u8; HARDWARE_ADDRESS_SIZE]);

impl HardwareAddress {
    /// Creates an address from raw bytes.
    pub fn new(bytes: [u8; HARDWARE_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn octets(&self) -> [u8; HARDWARE_ADDRESS_SIZE] {
        self.0
    }

    /// Returns the address with its byte order reversed.
    ///
    /// Some frames carry the address twice, once forward and once reversed.
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Self(bytes)
    }
}

impl From<[u8; HARDWARE_ADDRESS_SIZE]> for HardwareAddress {
    fn from(bytes: [u8; HARDWARE_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for HardwareAddress {
    type Err = OrviboError;

    /// Parses `xx:xx:xx:xx:xx:xx`; `-` is accepted as a separator too.
    fn from_str(s: &str) -> Result<Self> {
        let bad = |reason: &str| OrviboError::invalid_parameter("hardware address", reason);

        let text = s.as_bytes();
        if !s.is_ascii() || text.len() != HARDWARE_ADDRESS_SIZE * 3 - 1 {
            return Err(bad("expected 17 characters (xx:xx:xx:xx:xx:xx)"));
        }

        let mut bytes = [0u8; HARDWARE_ADDRESS_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            if i > 0 && !matches!(text[i * 3 - 1], b':' | b'-') {
                return Err(bad("octets must be separated by ':' or '-'"));
            }
            let pair = &s[i * 3..i * 3 + 2];
            if !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(bad("invalid hex digit"));
            }
            *byte = u8::from_str_radix(pair, 16).map_err(|_| bad("invalid hex digit"))?;
        }
        Ok(Self(bytes))
    }
}

/// 16-byte device name field.
///
/// Two reserved patterns exist: all `0xFF` is the factory ("unset") name,
/// and all zero means the name was never read from the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceName(pub [u8; DEVICE_NAME_LEN]);

impl DeviceName {
    /// Factory pattern (all `0xFF`).
    pub const FACTORY: DeviceName = DeviceName([0xFF; DEVICE_NAME_LEN]);

    /// Never-read pattern (all zero).
    pub const UNREAD: DeviceName = DeviceName([0; DEVICE_NAME_LEN]);

    /// Builds a space-padded name field.
    ///
    /// The text is taken literally, `"(unset)"` included.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is longer than 16 bytes.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self(pad_field(text, "name")?))
    }

    /// Returns whether this is the factory pattern.
    ///
    /// Like the devices themselves, any `0xFF` before the first NUL marks
    /// the whole name as unset.
    pub fn is_unset(&self) -> bool {
        self.0
            .iter()
            .take_while(|&&b| b != 0)
            .any(|&b| b == 0xFF)
    }

    /// Returns whether the name has never been read.
    pub fn is_unread(&self) -> bool {
        self.0[0] == 0
    }

    /// Returns the name bytes with trailing blanks removed.
    ///
    /// Returns `None` for the factory pattern.
    pub fn trimmed(&self) -> Option<&[u8]> {
        if self.is_unset() {
            return None;
        }
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(DEVICE_NAME_LEN);
        let used = &self.0[..end];
        let len = used.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
        Some(&used[..len])
    }

    /// Returns the name as shown to users.
    ///
    /// `"(unset)"` for the factory pattern, empty for an unread name.
    pub fn display(&self) -> String {
        match self.trimmed() {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => UNSET_NAME.to_string(),
        }
    }

    /// Exact, case-sensitive comparison against the trimmed name.
    ///
    /// An unset or empty name never matches.
    pub fn matches(&self, name: &str) -> bool {
        match self.trimmed() {
            Some(bytes) if !bytes.is_empty() => bytes == name.as_bytes(),
            _ => false,
        }
    }
}

impl Default for DeviceName {
    fn default() -> Self {
        Self::UNREAD
    }
}

impl fmt::Debug for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceName({:?})", self.display())
    }
}

/// 12-byte remote password field, space padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Password(pub [u8; PASSWORD_LEN]);

impl Password {
    /// Builds a space-padded password field.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is longer than 12 bytes.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self(pad_field(text, "password")?))
    }

    /// Returns the factory password field.
    pub fn factory() -> Self {
        let mut field = [b' '; PASSWORD_LEN];
        field[..FACTORY_PASSWORD.len()].copy_from_slice(FACTORY_PASSWORD.as_bytes());
        Self(field)
    }

    /// Returns the password with trailing blanks and NULs removed.
    pub fn display(&self) -> String {
        let len = self
            .0
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.0[..len]).into_owned()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

fn pad_field<const N: usize>(text: &str, parameter: &str) -> Result<[u8; N]> {
    let bytes = text.as_bytes();
    if bytes.len() > N {
        return Err(OrviboError::invalid_parameter(
            parameter,
            format!("must not exceed {} bytes, got {}", N, bytes.len()),
        ));
    }
    let mut field = [b' '; N];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Device type, as reported by the device's icon code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceType(pub i16);

impl DeviceType {
    /// Type not (yet) known.
    pub const UNKNOWN: DeviceType = DeviceType(-1);

    const NAMES: [&'static str; 6] = ["Light", "Fan", "Thermostat", "Switch", "Socket-US", "Socket-AU"];

    /// Returns the category name for known icon codes.
    pub fn name(&self) -> Option<&'static str> {
        usize::try_from(self.0)
            .ok()
            .and_then(|i| Self::NAMES.get(i).copied())
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for DeviceType {
    /// Known codes print their name, unknown prints nothing, anything else
    /// prints the raw code as `?xxxx?`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if *self == Self::UNKNOWN => Ok(()),
            None => write!(f, "?{:04x}?", self.0 as u16),
        }
    }
}

/// Switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SwitchState {
    /// State not known.
    #[default]
    Unknown,
    /// Relay off.
    Off,
    /// Relay on.
    On,
}

impl SwitchState {
    /// Decodes a state byte: 0 is off, `0xFF` (signed -1) is unknown, anything else is on.
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0x00 => Self::Off,
            0xFF => Self::Unknown,
            _ => Self::On,
        }
    }

    /// Returns the tri-state integer form (-1, 0, 1).
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Unknown => -1,
            Self::Off => 0,
            Self::On => 1,
        }
    }

    /// Returns whether the state is known.
    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "???",
            Self::Off => "Off",
            Self::On => "On ",
        })
    }
}

/// Device clock value: seconds since 1900-01-01, as sent in discovery replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceTime(pub u32);

impl DeviceTime {
    /// Converts to Unix seconds.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::DeviceTime;
    ///
    /// assert_eq!(DeviceTime(0x83AA_7E81).unix_seconds(), 1);
    /// ```
    pub fn unix_seconds(&self) -> i64 {
        i64::from(self.0) - i64::from(DEVICE_EPOCH_OFFSET)
    }

    /// Converts to a UTC timestamp.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.unix_seconds(), 0)
    }
}

/// Everything known about one device during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    /// IPv4 address.
    pub address: Ipv4Addr,
    /// UDP port, updated from the server-port field of a read-table reply.
    pub port: u16,
    /// Hardware address, unique per device.
    pub hardware_address: HardwareAddress,
    /// Device name.
    pub name: DeviceName,
    /// Remote password.
    pub password: Password,
    /// Device type.
    pub device_type: DeviceType,
    /// Switch state.
    pub state: SwitchState,
    /// Hardware version word from table 4.
    pub hardware_version: Option<u32>,
    /// Firmware version word from table 4.
    pub firmware_version: Option<u32>,
    /// Radio module firmware version word from table 4.
    pub radio_firmware_version: Option<u32>,
    /// Last device clock value seen in a discovery reply.
    pub last_device_time: Option<DeviceTime>,
    /// Target of the current operation.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub selected: bool,
}

impl DeviceRecord {
    /// Creates a record with unknown type, unknown state and an unread name.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::{DeviceRecord, HardwareAddress, SwitchState, DEFAULT_PORT};
    /// use std::net::Ipv4Addr;
    ///
    /// let record = DeviceRecord::new(
    ///     Ipv4Addr::new(192, 168, 1, 20),
    ///     HardwareAddress::new([0xac, 0xcf, 0x23, 0x00, 0x00, 0x01]),
    /// );
    /// assert_eq!(record.port, DEFAULT_PORT);
    /// assert_eq!(record.state, SwitchState::Unknown);
    /// assert!(record.name.is_unread());
    /// ```
    pub fn new(address: Ipv4Addr, hardware_address: HardwareAddress) -> Self {
        Self {
            address,
            port: crate::transport::DEFAULT_PORT,
            hardware_address,
            name: DeviceName::UNREAD,
            password: Password::default(),
            device_type: DeviceType::UNKNOWN,
            state: SwitchState::Unknown,
            hardware_version: None,
            firmware_version: None,
            radio_firmware_version: None,
            last_device_time: None,
            selected: false,
        }
    }

    /// Sets the name (builder style).
    pub fn with_name(mut self, name: DeviceName) -> Self {
        self.name = name;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_address_parse() {
        let mac: HardwareAddress = "AC-CF-23-0a-0b-0c".parse().unwrap();
        assert_eq!(mac.octets(), [0xac, 0xcf, 0x23, 0x0a, 0x0b, 0x0c]);
        assert_eq!(mac.to_string(), "ac:cf:23:0a:0b:0c");
    }

    #[test]
    fn test_hardware_address_parse_errors() {
        assert!("ac:cf:23:0a:0b".parse::<HardwareAddress>().is_err());
        assert!("ac:cf:23:0a:0b:0g".parse::<HardwareAddress>().is_err());
        assert!("ac.cf.23.0a.0b.0c".parse::<HardwareAddress>().is_err());
        assert!("ac:cf:23:0a:0b:0c:".parse::<HardwareAddress>().is_err());
        assert!("+a:cf:23:0a:0b:0c".parse::<HardwareAddress>().is_err());
        assert!("ac:cf:23:0a:0b:+c".parse::<HardwareAddress>().is_err());
    }

    #[test]
    fn test_hardware_address_order() {
        let a = HardwareAddress::new([0xac, 0xcf, 0x23, 0x00, 0x00, 0x02]);
        let b = HardwareAddress::new([0xac, 0xcf, 0x23, 0x00, 0x01, 0x00]);
        assert!(a < b);
    }

    #[test]
    fn test_name_padding_and_trim() {
        let name = DeviceName::from_text("Desk lamp").unwrap();
        assert_eq!(&name.0[..9], b"Desk lamp");
        assert!(name.0[9..].iter().all(|&b| b == b' '));
        assert_eq!(name.trimmed(), Some(&b"Desk lamp"[..]));
        assert!(name.matches("Desk lamp"));
        assert!(!name.matches("desk lamp"));
        assert!(!name.matches("Desk"));
    }

    #[test]
    fn test_name_too_long() {
        assert!(DeviceName::from_text("seventeen chars!!").is_err());
        assert!(DeviceName::from_text("sixteen chars!!!").is_ok());
    }

    #[test]
    fn test_name_reserved_patterns() {
        assert!(DeviceName::FACTORY.is_unset());
        assert_eq!(DeviceName::FACTORY.display(), "(unset)");
        assert!(!DeviceName::FACTORY.matches("(unset)"));

        assert!(DeviceName::UNREAD.is_unread());
        assert_eq!(DeviceName::UNREAD.display(), "");
        assert!(!DeviceName::UNREAD.matches(""));

        let literal = DeviceName::from_text("(unset)").unwrap();
        assert!(!literal.is_unset());
        assert!(literal.matches("(unset)"));
    }

    #[test]
    fn test_password() {
        let pw = Password::from_text("secret").unwrap();
        assert_eq!(&pw.0, b"secret      ");
        assert_eq!(pw.display(), "secret");
        assert_eq!(&Password::factory().0, b"888888      ");
        assert!(Password::from_text("thirteen-char").is_err());
        assert_eq!(format!("{:?}", pw), "Password(..)");
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(DeviceType(0).to_string(), "Light");
        assert_eq!(DeviceType(4).to_string(), "Socket-US");
        assert_eq!(DeviceType(5).to_string(), "Socket-AU");
        assert_eq!(DeviceType::UNKNOWN.to_string(), "");
        assert_eq!(DeviceType(9).to_string(), "?0009?");
        assert_eq!(DeviceType(-2).to_string(), "?fffe?");
    }

    #[test]
    fn test_switch_state_from_wire() {
        assert_eq!(SwitchState::from_wire(0), SwitchState::Off);
        assert_eq!(SwitchState::from_wire(1), SwitchState::On);
        assert_eq!(SwitchState::from_wire(0xFF), SwitchState::Unknown);
        assert_eq!(SwitchState::On.as_i8(), 1);
        assert_eq!(SwitchState::Unknown.to_string(), "???");
    }

    #[test]
    fn test_device_time_epoch() {
        assert_eq!(DeviceTime(DEVICE_EPOCH_OFFSET).unix_seconds(), 0);
        assert_eq!(DeviceTime(0x83AA_7E81).unix_seconds(), 1);
        let utc = DeviceTime(0x83AA_7E81).to_utc().unwrap();
        assert_eq!(utc.timestamp(), 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_serde() {
        let mut record = DeviceRecord::new(
            Ipv4Addr::new(10, 0, 0, 5),
            HardwareAddress::new([0xac, 0xcf, 0x23, 0x00, 0x00, 0x0a]),
        )
        .with_name(DeviceName::from_text("Lamp").unwrap());
        record.state = SwitchState::On;
        record.selected = true;

        let json = serde_json::to_string(&record).unwrap();
        let back: DeviceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hardware_address, record.hardware_address);
        assert!(back.name.matches("Lamp"));
        assert_eq!(back.state, SwitchState::On);
        assert!(!back.selected);
    }
}
