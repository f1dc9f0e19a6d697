//! Device listing.
//!
//! ```text
//! #      orvibo-s20  0.2  --  Devices (probe: 2)          2026-10-17:09:41:07
//! # IP address        MAC address     >Device name<       # State  Type
//! #-----------------------------------------------------------------------
//! 192.168.1.20     ac:cf:23:00:00:01  >Kitchen<           # On     Socket-US
//! ```
//!
//! Header lines start with `#`, so a listing is also a valid device data
//! file (see [`ddf`](crate::ddf)).

use std::io::{self, Write};

use chrono::{Local, NaiveDateTime};

use crate::catalog::Catalog;
use crate::device::DeviceRecord;

const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");
const VERSION_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
const VERSION_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");

/// Column header line.
pub const COLUMN_HEADER: &str =
    "# IP address        MAC address     >Device name<       # State  Type";

const RULE_WIDTH: usize = 71;
const TIME_FORMAT: &str = "%Y-%m-%d:%H:%M:%S";

/// Where the catalog came from, shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogSource {
    /// Discovered on the network.
    #[default]
    Probe,
    /// Loaded from a device data file.
    DataFile,
}

impl CatalogSource {
    fn label(self) -> &'static str {
        match self {
            CatalogSource::Probe => "probe",
            CatalogSource::DataFile => "ddf",
        }
    }
}

/// Listing filters.
///
/// # Example
///
/// ```
/// use orvibo_s20::ListingOptions;
///
/// let options = ListingOptions::new().brief(true).single(true);
/// assert!(options.brief);
/// assert!(!options.quiet);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListingOptions {
    /// Omit the header lines.
    pub brief: bool,
    /// Write nothing.
    pub quiet: bool,
    /// Only selected records.
    pub single: bool,
    /// Append the device clock (UTC) from the last discovery reply.
    pub clock: bool,
    /// Catalog origin for the header.
    pub source: CatalogSource,
}

impl ListingOptions {
    /// Full listing of every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `brief`.
    pub fn brief(mut self, brief: bool) -> Self {
        self.brief = brief;
        self
    }

    /// Sets `quiet`.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Sets `single`.
    pub fn single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }

    /// Sets `clock`.
    pub fn clock(mut self, clock: bool) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the catalog source.
    pub fn source(mut self, source: CatalogSource) -> Self {
        self.source = source;
        self
    }
}

/// Writes the listing, stamped with the local time.
///
/// # Errors
///
/// Returns any error from `out`.
pub fn render<W: Write>(out: &mut W, catalog: &Catalog, options: &ListingOptions) -> io::Result<()> {
    render_at(out, catalog, options, Local::now().naive_local())
}

/// Writes the listing with a fixed header time.
pub fn render_at<W: Write>(
    out: &mut W,
    catalog: &Catalog,
    options: &ListingOptions,
    now: NaiveDateTime,
) -> io::Result<()> {
    if options.quiet {
        return Ok(());
    }
    if !options.brief {
        write_header(out, catalog.len(), options.source, now)?;
    }
    for record in catalog.iter().filter(|r| !options.single || r.selected) {
        let mut line = format_record(record);
        if options.clock {
            if let Some(utc) = record.last_device_time.and_then(|t| t.to_utc()) {
                line.push_str(&format!("  {}Z", utc.format(TIME_FORMAT)));
            }
        }
        writeln!(out, "{}", line)?;
    }
    out.flush()
}

/// Writes the three header lines.
pub fn write_header<W: Write>(
    out: &mut W,
    count: usize,
    source: CatalogSource,
    now: NaiveDateTime,
) -> io::Result<()> {
    let count = format!("({}: {})", source.label(), count);
    writeln!(
        out,
        "#      {} {:>2}.{}  --  Devices {:<18}  {}",
        PROGRAM_NAME,
        VERSION_MAJOR,
        VERSION_MINOR,
        count,
        now.format(TIME_FORMAT)
    )?;
    writeln!(out, "{}", COLUMN_HEADER)?;
    writeln!(out, "#{}", "-".repeat(RULE_WIDTH))
}

/// One device line.
///
/// # Example
///
/// ```
/// use orvibo_s20::listing::format_record;
/// use orvibo_s20::{DeviceName, DeviceRecord, HardwareAddress};
/// use std::net::Ipv4Addr;
///
/// let record = DeviceRecord::new(
///     Ipv4Addr::new(10, 0, 0, 5),
///     HardwareAddress::new([0xac, 0xcf, 0x23, 0x00, 0x00, 0x0a]),
/// )
/// .with_name(DeviceName::from_text("Lamp").unwrap());
///
/// assert_eq!(
///     format_record(&record),
///     "10.0.0.5         ac:cf:23:00:00:0a  >Lamp<              # ???    "
/// );
/// ```
pub fn format_record(record: &DeviceRecord) -> String {
    let name = format!(">{}<", record.name.display());
    format!(
        "{:<15}  {}  {:<18}  # {}    {}",
        record.address.to_string(),
        record.hardware_address,
        name,
        record.state,
        record.device_type
    )
}
