//! Device data file: a catalog kept on disk.
//!
//! One device per line, `IP MAC name`:
//!
//! ```text
//! # Living room
//! 192.168.1.20   ac:cf:23:00:00:01  >Kitchen lamp<
//! 192.168.1.21   ac:cf:23:00:00:02  Fan
//! 192.168.1.22   ac:cf:23:00:00:03  >(unset)<
//! ```
//!
//! Everything after a `#` is a comment and blank lines are skipped. A name
//! that starts with `>` runs to the next `<` and may contain blanks; any
//! other name is a single token. `(unset)` stands for the factory name. The
//! address may also be a host name.
//!
//! [`save`] writes the listing format, whose header and state columns sit
//! behind `#`, so a saved file loads back unchanged.

use std::io::{BufRead, Write};

use log::{debug, trace};

use crate::catalog::{Catalog, Identifier};
use crate::device::{DeviceName, DeviceRecord, HardwareAddress, DEVICE_NAME_LEN, UNSET_NAME};
use crate::error::{OrviboError, Result};
use crate::listing::{self, CatalogSource, ListingOptions};

/// Reads every record from a device data file.
///
/// # Errors
///
/// Returns `OrviboError::InvalidDataFile` with the 1-based line number for
/// a missing field, an unusable address, a malformed hardware address or a
/// name longer than 16 bytes. Stops at the first bad line.
///
/// # Example
///
/// ```
/// use orvibo_s20::ddf;
///
/// let text = "# devices\n10.0.0.5  ac:cf:23:00:00:0a  >Desk lamp<\n";
/// let records = ddf::load(text.as_bytes()).unwrap();
/// assert_eq!(records.len(), 1);
/// assert!(records[0].name.matches("Desk lamp"));
/// ```
pub fn load<R: BufRead>(reader: R) -> Result<Vec<DeviceRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(record) = parse_line(&line, index + 1)? {
            trace!("line {}: {} {}", index + 1, record.address, record.hardware_address);
            records.push(record);
        }
    }
    debug!("device file: {} record(s)", records.len());
    Ok(records)
}

/// Parses one line; `Ok(None)` for a blank or comment line.
pub fn parse_line(line: &str, line_nr: usize) -> Result<Option<DeviceRecord>> {
    let data = match line.find('#') {
        Some(at) => &line[..at],
        None => line,
    };
    let data = data.trim_start();
    if data.trim_end().is_empty() {
        return Ok(None);
    }

    let (address, rest) = next_token(data);
    let (mac, rest) = next_token(rest);
    if mac.is_empty() {
        return Err(OrviboError::invalid_data_file(line_nr, "MAC address not found"));
    }
    let name = name_field(rest)
        .ok_or_else(|| OrviboError::invalid_data_file(line_nr, "device name not found"))?;

    let numeric = address.bytes().all(|b| b.is_ascii_digit() || b == b'.');
    let identifier = if numeric {
        Identifier::parse(address)
    } else {
        Identifier::resolve(address)
    };
    let address = match identifier {
        Identifier::Address(address) => address,
        Identifier::Name(_) => {
            return Err(OrviboError::invalid_data_file(
                line_nr,
                format!("bad IP address: >{}<", address),
            ))
        }
    };
    let mac: HardwareAddress = mac.parse().map_err(|_| {
        OrviboError::invalid_data_file(line_nr, format!("bad MAC address: >{}<", mac))
    })?;
    if name.len() > DEVICE_NAME_LEN {
        return Err(OrviboError::invalid_data_file(
            line_nr,
            format!("name too long (len = {} > {}): >{}<", name.len(), DEVICE_NAME_LEN, name),
        ));
    }
    let name = if name == UNSET_NAME {
        DeviceName::FACTORY
    } else {
        DeviceName::from_text(name)
            .map_err(|e| OrviboError::invalid_data_file(line_nr, e.to_string()))?
    };

    Ok(Some(DeviceRecord::new(address, mac).with_name(name)))
}

fn next_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], &text[end..]),
        None => (text, ""),
    }
}

fn name_field(text: &str) -> Option<&str> {
    let text = text.trim_start();
    if let Some(quoted) = text.strip_prefix('>') {
        return Some(match quoted.find('<') {
            Some(end) => &quoted[..end],
            None => quoted.trim_end(),
        });
    }
    match next_token(text).0 {
        "" => None,
        token => Some(token),
    }
}

/// Writes the catalog as a device data file.
///
/// # Errors
///
/// Returns an I/O error if writing fails.
pub fn save<W: Write>(out: &mut W, catalog: &Catalog) -> Result<()> {
    let options = ListingOptions::new().source(CatalogSource::DataFile);
    listing::render(out, catalog, &options)?;
    debug!("device file: wrote {} record(s)", catalog.len());
    Ok(())
}
