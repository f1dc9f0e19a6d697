//! Ordered device catalog.
//!
//! Records are kept in a vector sorted by the run's [`SortMode`]. A
//! secondary index maps hardware addresses to positions, so lookup by
//! hardware address is direct in either mode.
//!
//! # Example
//!
//! ```
//! use orvibo_s20::{Catalog, DeviceRecord, HardwareAddress, SortMode};
//! use std::net::Ipv4Addr;
//!
//! let mut catalog = Catalog::new(SortMode::Address);
//! for (last, mac) in [(5, 1), (1, 2), (9, 3)] {
//!     catalog.insert(DeviceRecord::new(
//!         Ipv4Addr::new(10, 0, 0, last),
//!         HardwareAddress::new([0, 0, 0, 0, 0, mac]),
//!     ));
//! }
//!
//! let order: Vec<String> = catalog.iter().map(|r| r.address.to_string()).collect();
//! assert_eq!(order, ["10.0.0.1", "10.0.0.5", "10.0.0.9"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::str::FromStr;

use log::{debug, warn};

use crate::device::{DeviceRecord, HardwareAddress, SwitchState};
use crate::error::{OrviboError, Result};

/// Catalog ordering, fixed for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortMode {
    /// By IPv4 address, numerically.
    #[default]
    Address,
    /// By hardware address, bytewise.
    HardwareAddress,
}

/// How the caller names a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Network address, given numerically or resolved from a host name.
    Address(Ipv4Addr),
    /// Device name as stored on the device.
    Name(String),
}

impl Identifier {
    /// Interprets `text` as a numeric IPv4 address, else as a device name.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::Identifier;
    /// use std::net::Ipv4Addr;
    ///
    /// assert_eq!(Identifier::parse("10.0.0.5"), Identifier::Address(Ipv4Addr::new(10, 0, 0, 5)));
    /// assert_eq!(Identifier::parse("Lamp"), Identifier::Name("Lamp".into()));
    /// ```
    pub fn parse(text: &str) -> Self {
        match Ipv4Addr::from_str(text) {
            Ok(address) => Identifier::Address(address),
            Err(_) => Identifier::Name(text.to_string()),
        }
    }

    /// Like [`parse`](Self::parse), but tries a DNS lookup before falling
    /// back to a device name. The first IPv4 result is used.
    pub fn resolve(text: &str) -> Self {
        if let Identifier::Address(address) = Self::parse(text) {
            return Identifier::Address(address);
        }
        if text.is_empty() || text.contains(char::is_whitespace) {
            return Identifier::Name(text.to_string());
        }

        let resolved = (text, 0u16).to_socket_addrs().ok().and_then(|mut addrs| {
            addrs.find_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
        });
        match resolved {
            Some(address) => {
                debug!("resolved {} to {}", text, address);
                Identifier::Address(address)
            }
            None => Identifier::Name(text.to_string()),
        }
    }

    /// Returns the address, if this is an address identifier.
    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            Identifier::Address(address) => Some(*address),
            Identifier::Name(_) => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Address(address) => write!(f, "{}", address),
            Identifier::Name(name) => f.write_str(name),
        }
    }
}

/// Aggregate view of the catalog for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSummary {
    /// Number of records in the catalog.
    pub total: usize,
    /// Number of selected records.
    pub matched: usize,
    /// State of the selected record when exactly one is selected.
    pub state: SwitchState,
}

/// Ordered collection of device records.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    mode: SortMode,
    records: Vec<DeviceRecord>,
    by_hardware_address: HashMap<HardwareAddress, usize>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new(mode: SortMode) -> Self {
        Self {
            mode,
            records: Vec::new(),
            by_hardware_address: HashMap::new(),
        }
    }

    /// Returns the sort mode.
    pub fn sort_mode(&self) -> SortMode {
        self.mode
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in sort order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter()
    }

    /// Records as a slice, in sort order.
    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    /// Inserts a record at its sorted position and returns that position.
    ///
    /// A record with the same hardware address is replaced. Among equal
    /// sort keys the newer record goes last.
    pub fn insert(&mut self, record: DeviceRecord) -> usize {
        if let Some(old) = self.by_hardware_address.get(&record.hardware_address).copied() {
            warn!(
                "replacing record for {} ({} -> {})",
                record.hardware_address, self.records[old].address, record.address
            );
            self.records.remove(old);
        }

        let at = match self.mode {
            SortMode::Address => {
                let key = u32::from(record.address);
                self.records
                    .partition_point(|r| u32::from(r.address) <= key)
            }
            SortMode::HardwareAddress => {
                let key = record.hardware_address;
                self.records.partition_point(|r| r.hardware_address <= key)
            }
        };
        debug!("new record {} {} at {}", record.address, record.hardware_address, at);
        self.records.insert(at, record);
        self.reindex();
        at
    }

    fn reindex(&mut self) {
        self.by_hardware_address.clear();
        for (i, record) in self.records.iter().enumerate() {
            self.by_hardware_address.insert(record.hardware_address, i);
        }
    }

    /// First record with the given address.
    pub fn find_by_address(&self, address: Ipv4Addr) -> Option<&DeviceRecord> {
        self.records.iter().find(|r| r.address == address)
    }

    /// Record with the given hardware address.
    pub fn find_by_hardware_address(&self, mac: &HardwareAddress) -> Option<&DeviceRecord> {
        self.by_hardware_address.get(mac).map(|&i| &self.records[i])
    }

    /// Mutable record with the given hardware address.
    pub fn find_by_hardware_address_mut(
        &mut self,
        mac: &HardwareAddress,
    ) -> Option<&mut DeviceRecord> {
        match self.by_hardware_address.get(mac) {
            Some(&i) => self.records.get_mut(i),
            None => None,
        }
    }

    /// First record whose trimmed name equals `name` exactly.
    pub fn find_by_name(&self, name: &str) -> Option<&DeviceRecord> {
        self.records.iter().find(|r| r.name.matches(name))
    }

    /// Marks the record named by `identifier` as selected.
    ///
    /// Returns the record's hardware address.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::DeviceNotFound`, echoing the identifier, if no
    /// record matches.
    pub fn find_and_mark(&mut self, identifier: &Identifier) -> Result<HardwareAddress> {
        let found = match identifier {
            Identifier::Address(address) => self.records.iter_mut().find(|r| r.address == *address),
            Identifier::Name(name) => self.records.iter_mut().find(|r| r.name.matches(name)),
        };
        match found {
            Some(record) => {
                record.selected = true;
                debug!("selected {} ({})", record.hardware_address, identifier);
                Ok(record.hardware_address)
            }
            None => Err(match identifier {
                Identifier::Address(address) => OrviboError::address_not_found(*address),
                Identifier::Name(name) => OrviboError::device_not_found(name.as_str()),
            }),
        }
    }

    /// Clears every record's selected flag.
    pub fn clear_selection(&mut self) {
        for record in &mut self.records {
            record.selected = false;
        }
    }

    /// Selected records, in sort order.
    pub fn selected(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter().filter(|r| r.selected)
    }

    /// Hardware addresses of the records a sweep should visit.
    ///
    /// With `single` set only selected records are visited.
    pub fn sweep_targets(&self, single: bool) -> Vec<HardwareAddress> {
        self.records
            .iter()
            .filter(|r| !single || r.selected)
            .map(|r| r.hardware_address)
            .collect()
    }

    /// Returns counts and the single-device state.
    pub fn summary(&self) -> CatalogSummary {
        let mut selected = self.selected();
        let matched = self.selected().count();
        let state = match (matched, selected.next()) {
            (1, Some(record)) => record.state,
            _ => SwitchState::Unknown,
        };
        CatalogSummary {
            total: self.records.len(),
            matched,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceName;

    fn record(last: u8, mac: [u8; 6]) -> DeviceRecord {
        DeviceRecord::new(Ipv4Addr::new(10, 0, 0, last), HardwareAddress::new(mac))
    }

    fn addresses(catalog: &Catalog) -> Vec<Ipv4Addr> {
        catalog.iter().map(|r| r.address).collect()
    }

    #[test]
    fn test_insert_order_by_address() {
        let expected = vec![
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(10, 0, 0, 9),
        ];
        let orders = [[5, 1, 9], [9, 5, 1], [1, 9, 5]];
        for order in orders {
            let mut catalog = Catalog::new(SortMode::Address);
            for last in order {
                catalog.insert(record(last, [0, 0, 0, 0, 0, last]));
            }
            assert_eq!(addresses(&catalog), expected);
        }
    }

    #[test]
    fn test_insert_order_numeric_not_lexical() {
        let mut catalog = Catalog::new(SortMode::Address);
        catalog.insert(DeviceRecord::new(Ipv4Addr::new(10, 0, 0, 20), HardwareAddress::new([1; 6])));
        catalog.insert(DeviceRecord::new(Ipv4Addr::new(9, 0, 0, 100), HardwareAddress::new([2; 6])));
        catalog.insert(DeviceRecord::new(Ipv4Addr::new(10, 0, 0, 3), HardwareAddress::new([3; 6])));
        assert_eq!(
            addresses(&catalog),
            vec![
                Ipv4Addr::new(9, 0, 0, 100),
                Ipv4Addr::new(10, 0, 0, 3),
                Ipv4Addr::new(10, 0, 0, 20),
            ]
        );
    }

    #[test]
    fn test_insert_order_by_hardware_address() {
        let mut catalog = Catalog::new(SortMode::HardwareAddress);
        catalog.insert(record(1, [0xac, 0xcf, 0x23, 0, 0, 9]));
        catalog.insert(record(2, [0xac, 0xcf, 0x23, 0, 0, 1]));
        catalog.insert(record(3, [0x00, 0xff, 0xff, 0, 0, 5]));
        assert_eq!(
            addresses(&catalog),
            vec![
                Ipv4Addr::new(10, 0, 0, 3),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 1),
            ]
        );
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let mut catalog = Catalog::new(SortMode::Address);
        catalog.insert(record(7, [1; 6]));
        catalog.insert(record(7, [2; 6]));
        let macs: Vec<_> = catalog.iter().map(|r| r.hardware_address).collect();
        assert_eq!(macs, vec![HardwareAddress::new([1; 6]), HardwareAddress::new([2; 6])]);
    }

    #[test]
    fn test_lookup_by_hardware_address_in_address_mode() {
        let mut catalog = Catalog::new(SortMode::Address);
        catalog.insert(record(9, [9; 6]));
        catalog.insert(record(1, [1; 6]));
        catalog.insert(record(5, [5; 6]));

        let found = catalog.find_by_hardware_address(&HardwareAddress::new([9; 6])).unwrap();
        assert_eq!(found.address, Ipv4Addr::new(10, 0, 0, 9));

        catalog
            .find_by_hardware_address_mut(&HardwareAddress::new([1; 6]))
            .unwrap()
            .state = SwitchState::On;
        assert_eq!(catalog.records()[0].state, SwitchState::On);
        assert!(catalog.find_by_hardware_address(&HardwareAddress::new([7; 6])).is_none());
    }

    #[test]
    fn test_insert_replaces_duplicate_hardware_address() {
        let mut catalog = Catalog::new(SortMode::Address);
        catalog.insert(record(1, [1; 6]));
        catalog.insert(record(2, [2; 6]));
        catalog.insert(record(9, [1; 6]));
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.find_by_hardware_address(&HardwareAddress::new([1; 6])).unwrap().address,
            Ipv4Addr::new(10, 0, 0, 9)
        );
        assert_eq!(
            addresses(&catalog),
            vec![Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 9)]
        );
    }

    #[test]
    fn test_find_by_name() {
        let mut catalog = Catalog::new(SortMode::Address);
        catalog.insert(record(1, [1; 6]).with_name(DeviceName::from_text("Lamp").unwrap()));
        catalog.insert(record(2, [2; 6]).with_name(DeviceName::FACTORY));

        assert!(catalog.find_by_name("Lamp").is_some());
        assert!(catalog.find_by_name("lamp").is_none());
        assert!(catalog.find_by_name("La").is_none());
        assert!(catalog.find_by_name("(unset)").is_none());
    }

    #[test]
    fn test_find_and_mark() {
        let mut catalog = Catalog::new(SortMode::Address);
        catalog.insert(record(1, [1; 6]).with_name(DeviceName::from_text("Lamp").unwrap()));
        catalog.insert(record(2, [2; 6]));

        let mac = catalog.find_and_mark(&Identifier::Name("Lamp".into())).unwrap();
        assert_eq!(mac, HardwareAddress::new([1; 6]));
        assert!(catalog.records()[0].selected);
        assert!(!catalog.records()[1].selected);

        let err = catalog
            .find_and_mark(&Identifier::Name("Fan".into()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Device not matched: >Fan<");

        let err = catalog
            .find_and_mark(&Identifier::Address(Ipv4Addr::new(10, 0, 0, 3)))
            .unwrap_err();
        assert_eq!(err.to_string(), "Device not matched: >10.0.0.3<");
    }

    #[test]
    fn test_summary() {
        let mut catalog = Catalog::new(SortMode::Address);
        let mut on = record(1, [1; 6]);
        on.state = SwitchState::On;
        catalog.insert(on);
        catalog.insert(record(2, [2; 6]));

        let summary = catalog.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.state, SwitchState::Unknown);

        catalog
            .find_and_mark(&Identifier::Address(Ipv4Addr::new(10, 0, 0, 1)))
            .unwrap();
        let summary = catalog.summary();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.state, SwitchState::On);

        assert_eq!(catalog.sweep_targets(true), vec![HardwareAddress::new([1; 6])]);
        assert_eq!(catalog.sweep_targets(false).len(), 2);

        catalog.clear_selection();
        assert_eq!(catalog.summary().matched, 0);
    }

    #[test]
    fn test_identifier_parse_and_display() {
        let id = Identifier::parse("192.168.1.20");
        assert_eq!(id.address(), Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(id.to_string(), "192.168.1.20");

        let id = Identifier::resolve("Desk lamp");
        assert_eq!(id, Identifier::Name("Desk lamp".into()));
        assert_eq!(id.address(), None);

        assert_eq!(
            Identifier::resolve("10.1.2.3"),
            Identifier::Address(Ipv4Addr::new(10, 1, 2, 3))
        );
    }
}
