//! High-level client: the operations a user asks for.
//!
//! This module provides the [`Client`] struct, which turns one
//! [`Operation`] into the task sequence that carries it out, runs each task
//! through the [`TaskEngine`] and reports the result.
//!
//! # Operations
//!
//! | Operation | Sequence |
//! |-----------|----------|
//! | [`Operation::List`] | discovery (broadcast, or unicast for an address); unit discovery per device with a device file |
//! | [`Operation::QueryList`] | discovery, then subscribe + read-table per device |
//! | [`Operation::Off`] / [`Operation::On`] | locate, subscribe, switch |
//! | [`Operation::Set`] | locate, subscribe, read-table, write-table, read-table, confirm |
//! | [`Operation::Heartbeat`] | locate, heartbeat |
//!
//! "Locate" is a unicast discovery when the device is named by address,
//! and a full live catalog (broadcast discovery plus query) when it is
//! named by device name and no device file was loaded.
//!
//! # Example
//!
//! ```no_run
//! use orvibo_s20::{Client, ClientConfig, Identifier, ListingOptions, Operation};
//!
//! let mut client = Client::new(ClientConfig::new())?;
//!
//! let report = client.run(&Operation::On, Some(&Identifier::resolve("Desk lamp")))?;
//! client.render(&mut std::io::stdout(), &ListingOptions::new().single(report.single))?;
//!
//! std::process::exit(report.exit_status());
//! # Ok::<(), orvibo_s20::OrviboError>(())
//! ```
//!
//! # Configuration
//!
//! [`ClientConfig`] sets the protocol port, the per-wait timeout, the retry
//! bounds, the broadcast address and the catalog sort order.

use std::io::{BufRead, Write};
use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, info, warn};

use crate::catalog::{Catalog, Identifier, SortMode};
use crate::command::{derive_write_table, TableUpdate, Task};
use crate::ddf;
use crate::device::{DeviceRecord, HardwareAddress, SwitchState};
use crate::engine::{
    RetryPolicy, TaskEngine, TaskOutcome, TaskRequest, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WAIT,
};
use crate::error::{OrviboError, Result};
use crate::listing::{self, CatalogSource, ListingOptions};
use crate::transport::{Transport, UdpTransport, DEFAULT_PORT, DEFAULT_TIMEOUT};

/// Configuration for creating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Protocol UDP port, used both to bind and as destination.
    pub port: u16,
    /// Per-wait receive timeout.
    pub timeout: Duration,
    /// Retries after the first attempt of each task.
    pub max_retries: u32,
    /// Wait between attempts; must be under one second.
    pub retry_wait: Duration,
    /// Destination of broadcast discovery.
    pub broadcast_address: Ipv4Addr,
    /// Catalog ordering.
    pub sort_mode: SortMode,
}

impl ClientConfig {
    /// Creates a configuration with the protocol defaults.
    ///
    /// Port 10000, 500 ms per wait, 4 retries 500 ms apart, broadcast to
    /// 255.255.255.255, catalog sorted by address.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::ClientConfig;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new();
    /// assert_eq!(config.port, 10000);
    /// assert_eq!(config.timeout, Duration::from_millis(500));
    /// assert_eq!(config.max_retries, 4);
    /// ```
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_wait: DEFAULT_RETRY_WAIT,
            broadcast_address: Ipv4Addr::BROADCAST,
            sort_mode: SortMode::Address,
        }
    }

    /// Sets the protocol port (default is 10000).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the per-wait timeout (default is 500 ms).
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::ClientConfig;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new().with_timeout(Duration::from_millis(250));
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries (default is 4, so 5 attempts).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the wait between attempts (default is 500 ms).
    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    /// Sets the broadcast address, e.g. a subnet-directed one.
    pub fn with_broadcast_address(mut self, address: Ipv4Addr) -> Self {
        self.broadcast_address = address;
        self
    }

    /// Sets the catalog sort order.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::{ClientConfig, SortMode};
    ///
    /// let config = ClientConfig::new().with_sort_mode(SortMode::HardwareAddress);
    /// ```
    pub fn with_sort_mode(mut self, sort_mode: SortMode) -> Self {
        self.sort_mode = sort_mode;
        self
    }

    fn validate(&self) -> Result<RetryPolicy> {
        if self.timeout.is_zero() {
            return Err(OrviboError::invalid_parameter("timeout", "must be non-zero"));
        }
        RetryPolicy::new(self.max_retries, self.retry_wait)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// List devices, with as little traffic as possible.
    List,
    /// List devices with details read from each one.
    QueryList,
    /// Switch a device off.
    Off,
    /// Switch a device on.
    On,
    /// Write a new name and/or password. An empty value means factory default;
    /// any other text, `"(unset)"` included, is written literally.
    Set {
        /// New device name.
        name: Option<String>,
        /// New remote password.
        password: Option<String>,
    },
    /// Check that a device answers.
    Heartbeat,
}

impl Operation {
    /// Returns whether the operation needs a device identifier.
    pub fn requires_identifier(&self) -> bool {
        !matches!(self, Operation::List | Operation::QueryList)
    }
}

/// A device that did not complete its part of a sweep.
#[derive(Debug)]
pub struct SweepFailure {
    /// Device.
    pub hardware_address: HardwareAddress,
    /// What went wrong.
    pub error: OrviboError,
}

/// Result of [`Client::run`].
#[derive(Debug)]
pub struct RunReport {
    /// Devices that failed during a multi-device sweep.
    pub failures: Vec<SweepFailure>,
    /// Number of selected devices.
    pub matched: usize,
    /// State of the single selected device.
    pub state: SwitchState,
    /// Whether the run targeted selected devices only.
    pub single: bool,
}

impl RunReport {
    /// Returns whether every device completed.
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Process exit status: 1 on failure, `0x20` for a single device known
    /// off, `0x30` for on, 0 otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::{RunReport, SwitchState};
    ///
    /// let report = RunReport { failures: Vec::new(), matched: 1, state: SwitchState::On, single: true };
    /// assert_eq!(report.exit_status(), 0x30);
    /// ```
    pub fn exit_status(&self) -> i32 {
        if !self.success() {
            return 1;
        }
        match self.state {
            SwitchState::Off => 0x20,
            SwitchState::On => 0x30,
            SwitchState::Unknown => 0,
        }
    }
}

/// S20 client.
///
/// Holds the catalog for one run. Each [`run`](Client::run) clears the
/// selection, so a client can serve several operations in sequence.
///
/// # Example
///
/// ```no_run
/// use orvibo_s20::{Client, ClientConfig, Operation};
///
/// let mut client = Client::new(ClientConfig::new()).unwrap();
/// let report = client.run(&Operation::QueryList, None).unwrap();
/// for record in client.catalog().iter() {
///     println!("{} {} {}", record.address, record.hardware_address, record.name.display());
/// }
/// assert!(report.success());
/// ```
#[derive(Debug)]
pub struct Client<T: Transport = UdpTransport> {
    engine: TaskEngine<T>,
    catalog: Catalog,
    seeded: bool,
    failures: Vec<SweepFailure>,
}

impl Client<UdpTransport> {
    /// Creates a client over UDP.
    ///
    /// No socket is opened until an operation runs.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::InvalidParameter` if the timeout is zero or
    /// the retry wait is one second or more.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = UdpTransport::new(config.port, config.timeout);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Same validation as [`Client::new`].
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let policy = config.validate()?;
        Ok(Self {
            engine: TaskEngine::new(transport, config.port, config.broadcast_address, policy),
            catalog: Catalog::new(config.sort_mode),
            seeded: false,
            failures: Vec::new(),
        })
    }

    /// Returns the catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns whether the catalog was seeded from a device file.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Seeds the catalog with known devices instead of discovering them.
    pub fn seed(&mut self, records: impl IntoIterator<Item = DeviceRecord>) {
        for record in records {
            self.catalog.insert(record);
        }
        self.seeded = true;
    }

    /// Seeds the catalog from a device data file.
    ///
    /// Returns the number of records loaded.
    ///
    /// # Errors
    ///
    /// Returns `OrviboError::InvalidDataFile` on a syntax error and an I/O
    /// error if reading fails.
    pub fn load_device_file<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let records = ddf::load(reader)?;
        let count = records.len();
        self.seed(records);
        info!("loaded {} device(s) from device file", count);
        Ok(count)
    }

    /// Writes the catalog as a device data file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails.
    pub fn save_device_file<W: Write>(&self, out: &mut W) -> Result<()> {
        ddf::save(out, &self.catalog)
    }

    /// Writes the device listing.
    ///
    /// The catalog source in `options` is overridden by how this client
    /// was populated.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails.
    pub fn render<W: Write>(&self, out: &mut W, options: &ListingOptions) -> Result<()> {
        let source = if self.seeded {
            CatalogSource::DataFile
        } else {
            CatalogSource::Probe
        };
        listing::render(out, &self.catalog, &options.source(source))?;
        Ok(())
    }

    /// Runs one operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier matches no device, a required
    /// reply for the targeted device never arrives, a write is not
    /// confirmed, or the transport fails. Failures of individual devices
    /// during a sweep are collected in [`RunReport::failures`] instead.
    pub fn run(&mut self, operation: &Operation, identifier: Option<&Identifier>) -> Result<RunReport> {
        if operation.requires_identifier() && identifier.is_none() {
            return Err(OrviboError::invalid_parameter(
                "identifier",
                "a device address or name is required",
            ));
        }

        self.catalog.clear_selection();
        self.failures.clear();
        debug!("running {:?} for {:?}", operation, identifier);

        match operation {
            Operation::List => self.list(identifier)?,
            Operation::QueryList => self.query_list(identifier)?,
            Operation::Off | Operation::On => {
                let mac = self.locate(identifier)?;
                self.step(Task::Subscribe, mac)?;
                let task = if *operation == Operation::On {
                    Task::SwitchOn
                } else {
                    Task::SwitchOff
                };
                self.step(task, mac)?;
            }
            Operation::Set { name, password } => {
                let update = TableUpdate::new(name.as_deref(), password.as_deref())?;
                let mac = self.locate(identifier)?;
                self.set(mac, &update)?;
            }
            Operation::Heartbeat => {
                let mac = self.locate(identifier)?;
                self.step(Task::Heartbeat, mac)?;
            }
        }

        let summary = self.catalog.summary();
        Ok(RunReport {
            failures: std::mem::take(&mut self.failures),
            matched: summary.matched,
            state: summary.state,
            single: identifier.is_some(),
        })
    }

    fn list(&mut self, identifier: Option<&Identifier>) -> Result<()> {
        if !self.seeded {
            match identifier {
                Some(Identifier::Name(_)) => self.catalog_live()?,
                Some(Identifier::Address(address)) => {
                    self.run_task(&TaskRequest::unicast(Task::GlobalDiscovery, *address))?;
                }
                None => self.broadcast_discovery()?,
            }
        }

        if let Some(identifier) = identifier {
            self.catalog.find_and_mark(identifier)?;
        }

        if self.seeded {
            self.sweep(identifier.is_some(), &[Task::UnitDiscovery])?;
        }
        Ok(())
    }

    fn query_list(&mut self, identifier: Option<&Identifier>) -> Result<()> {
        if !self.seeded {
            if let Some(Identifier::Address(address)) = identifier {
                self.run_task(&TaskRequest::unicast(Task::GlobalDiscovery, *address))?;
                self.catalog.find_and_mark(&Identifier::Address(*address))?;
                return self.sweep(true, &[Task::Subscribe, Task::ReadTableSocket]);
            }
            self.catalog_live()?;
            if let Some(identifier) = identifier {
                self.catalog.find_and_mark(identifier)?;
            }
            return Ok(());
        }

        if let Some(identifier) = identifier {
            self.catalog.find_and_mark(identifier)?;
        }
        self.sweep(identifier.is_some(), &[Task::Subscribe, Task::ReadTableSocket])
    }

    /// Finds and selects the target device, discovering it first if needed.
    fn locate(&mut self, identifier: Option<&Identifier>) -> Result<HardwareAddress> {
        let identifier = identifier
            .ok_or_else(|| OrviboError::invalid_parameter("identifier", "missing"))?;
        match identifier {
            Identifier::Address(address) => {
                self.run_task(&TaskRequest::unicast(Task::GlobalDiscovery, *address))?;
            }
            Identifier::Name(_) => {
                if !self.seeded {
                    self.catalog_live()?;
                }
            }
        }
        self.catalog.find_and_mark(identifier)
    }

    /// Broadcast discovery, then subscribe and read-table on every device.
    fn catalog_live(&mut self) -> Result<()> {
        self.broadcast_discovery()?;
        self.sweep(false, &[Task::Subscribe, Task::ReadTableSocket])
    }

    fn broadcast_discovery(&mut self) -> Result<()> {
        self.run_task(&TaskRequest::broadcast(Task::GlobalDiscoveryBroadcast))?;
        if self.catalog.is_empty() {
            return Err(OrviboError::NoDevicesFound);
        }
        info!("devices found: {}", self.catalog.len());
        Ok(())
    }

    /// Runs `tasks` in order on each device. A device whose step goes
    /// unanswered is recorded and skipped; a transport error ends the sweep.
    fn sweep(&mut self, single: bool, tasks: &[Task]) -> Result<()> {
        for mac in self.catalog.sweep_targets(single) {
            for &task in tasks {
                match self.step(task, mac) {
                    Ok(_) => {}
                    Err(e) if e.is_transport() => return Err(e),
                    Err(e) => {
                        warn!("{}: {}", mac, e);
                        self.failures.push(SweepFailure {
                            hardware_address: mac,
                            error: e,
                        });
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs one task against a catalog device and requires it to be satisfied.
    fn step(&mut self, task: Task, mac: HardwareAddress) -> Result<TaskOutcome> {
        let request = self.request_for(task, mac)?;
        self.run_task(&request)?.into_satisfied()
    }

    fn request_for(&self, task: Task, mac: HardwareAddress) -> Result<TaskRequest> {
        self.catalog
            .find_by_hardware_address(&mac)
            .map(|record| TaskRequest::for_device(task, record))
            .ok_or_else(|| OrviboError::device_not_found(mac.to_string()))
    }

    fn run_task(&mut self, request: &TaskRequest) -> Result<TaskOutcome> {
        self.engine.run(&mut self.catalog, request)
    }

    fn set(&mut self, mac: HardwareAddress, update: &TableUpdate) -> Result<()> {
        self.step(Task::Subscribe, mac)?;

        let request = self.request_for(Task::ReadTableSocket, mac)?.capturing_table();
        let table = self
            .run_task(&request)?
            .into_satisfied()?
            .table
            .ok_or_else(|| OrviboError::invalid_response("no complete read-table reply to modify"))?;

        let frame = derive_write_table(&table, update)?;
        let request = self
            .request_for(Task::WriteTableSocket, mac)?
            .with_frame(frame);
        self.run_task(&request)?.into_satisfied()?;

        let request = self.request_for(Task::ReadTableSocket, mac)?.capturing_table();
        let confirmation = self
            .run_task(&request)?
            .into_satisfied()?
            .table
            .ok_or_else(|| OrviboError::invalid_response("no complete read-table reply to confirm"))?;
        update.confirm(&confirmation)?;
        info!("{}: table written and confirmed", mac);
        Ok(())
    }
}
