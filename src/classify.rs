//! Response classifier: applies a decoded frame to the catalog.
//!
//! A frame that carries record data (see
//! [`Response::carries_record_data`]) updates the record with the sender's
//! hardware address, creating it from the source address if it is new.
//! Read-table details overwrite name, password, type, port and versions.
//! A state field is applied only when it is definitive, so a detailed
//! record is never degraded by a bare ping.

use std::net::Ipv4Addr;

use log::{debug, trace};

use crate::catalog::Catalog;
use crate::device::{DeviceRecord, HardwareAddress};
use crate::response::{Response, ResponseKind, ResponseSet};

/// What one classified frame contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Response category observed.
    pub category: ResponseSet,
    /// Record created or updated, if any.
    pub updated: Option<HardwareAddress>,
    /// Whether the record was new.
    pub created: bool,
}

/// Applies `response`, received from `from`, to the catalog.
///
/// # Example
///
/// ```
/// use orvibo_s20::classify::classify;
/// use orvibo_s20::{Catalog, Response, ResponseSet, SortMode, SwitchState};
/// use std::net::Ipv4Addr;
///
/// let mut frame = vec![0u8; 42];
/// frame[..6].copy_from_slice(b"hd\x00\x2aqa");
/// frame[7..13].copy_from_slice(&[0xac, 0xcf, 0x23, 0x00, 0x00, 0x01]);
/// frame[41] = 1;
///
/// let mut catalog = Catalog::new(SortMode::Address);
/// let response = Response::decode(&frame).unwrap();
/// let result = classify(&mut catalog, &response, Ipv4Addr::new(10, 0, 0, 7));
///
/// assert_eq!(result.category, ResponseSet::QA);
/// assert!(result.created);
/// assert_eq!(catalog.records()[0].state, SwitchState::On);
/// ```
pub fn classify(catalog: &mut Catalog, response: &Response, from: Ipv4Addr) -> Classification {
    let category = response.kind.category();
    let mut result = Classification {
        category,
        updated: None,
        created: false,
    };

    if let ResponseKind::Unknown(opcode) = response.kind {
        debug!("unexpected response \"{}\" from {}", opcode, from);
    }

    let mac = match response.hardware_address {
        Some(mac) if response.carries_record_data() => mac,
        _ => {
            trace!("{:?} from {}: no record data", response.kind, from);
            return result;
        }
    };

    if catalog.find_by_hardware_address(&mac).is_none() {
        catalog.insert(DeviceRecord::new(from, mac));
        result.created = true;
    }

    if let Some(record) = catalog.find_by_hardware_address_mut(&mac) {
        apply(record, response);
        result.updated = Some(mac);
    }
    result
}

fn apply(record: &mut DeviceRecord, response: &Response) {
    if let Some(table) = &response.socket_table {
        if let Some(name) = table.name {
            record.name = name;
        }
        if let Some(password) = table.password {
            record.password = password;
        }
        if let Some(device_type) = table.device_type {
            record.device_type = device_type;
        }
        if let Some(port) = table.server_port {
            record.port = port;
        }
        record.hardware_version = table.hardware_version.or(record.hardware_version);
        record.firmware_version = table.firmware_version.or(record.firmware_version);
        record.radio_firmware_version = table
            .radio_firmware_version
            .or(record.radio_firmware_version);
    }

    if let Some(time) = response.device_time {
        record.last_device_time = Some(time);
    }

    match response.effective_state() {
        Some(state) if state.is_known() => {
            if record.state != state {
                debug!("{} state {:?} -> {:?}", record.hardware_address, record.state, state);
            }
            record.state = state;
        }
        _ => {}
    }
}
