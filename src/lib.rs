//! # Orvibo S20 Protocol Library
//!
//! A Rust library for discovering, querying and switching Orvibo S20 smart
//! sockets over their UDP protocol (port 10000).
//!
//! The devices speak a small request/response protocol with no sessions
//! and no delivery guarantee, so every request here is a *task*: a frame,
//! a set of required response kinds, and a bounded number of retries.
//!
//! ## Features
//!
//! - **Discovery** - broadcast or unicast, with unit discovery for known devices
//! - **Query** - subscribe and read the socket table (name, password, type, versions)
//! - **Control** - switch on and off, heartbeat
//! - **Table writes** - set name and password, with read-back confirmation
//! - **Device data file** - keep a catalog on disk instead of probing
//! - **No panics** - all errors returned as `Result<T, OrviboError>`
//!
//! ## Quick Start
//!
//! ```no_run
//! use orvibo_s20::{Client, ClientConfig, Identifier, ListingOptions, Operation};
//!
//! fn main() -> orvibo_s20::Result<()> {
//!     let mut client = Client::new(ClientConfig::new())?;
//!
//!     // Find every socket on the LAN and read its details
//!     client.run(&Operation::QueryList, None)?;
//!     client.render(&mut std::io::stdout(), &ListingOptions::new())?;
//!
//!     // Switch one on, by name
//!     let report = client.run(&Operation::On, Some(&Identifier::resolve("Desk lamp")))?;
//!     println!("state: {}", report.state);
//!
//!     // Rename it
//!     let rename = Operation::Set { name: Some("Reading lamp".into()), password: None };
//!     client.run(&rename, Some(&Identifier::resolve("Desk lamp")))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Tasks
//!
//! | Task | Opcode | Frame | Required response |
//! |------|--------|-------|-------------------|
//! | Global discovery (broadcast / unicast) | `qa` | 6 B | `qa` |
//! | Unit discovery | `qg` | 18 B | `qg` |
//! | Subscribe | `cl` | 30 B | `cl` |
//! | Heartbeat | `hb` | 22 B | `hb` |
//! | Switch off / on | `dc` | 23 B | `dc` |
//! | Read table | `rt` | 29 B | `rt` |
//! | Write table | `tm` | derived from `rt` | `tm` |
//!
//! Each task is sent up to five times (four retries, 500 ms apart) with a
//! 500 ms receive wait, see [`RetryPolicy`] and [`ClientConfig`].
//!
//! ## Lower Layers
//!
//! [`Client`] is built from parts that can be used directly:
//!
//! - [`Task::encode`] and [`Response::decode`] for frames
//! - [`TaskEngine`] to run one task against a [`Catalog`]
//! - [`Transport`] / [`Endpoint`] for the socket, with [`UdpTransport`] as
//!   the real one
//!
//! ```
//! use orvibo_s20::{HardwareAddress, Task};
//!
//! let mac = HardwareAddress::new([0xac, 0xcf, 0x23, 0x12, 0x34, 0x56]);
//! let frame = Task::SwitchOn.encode(Some(mac)).unwrap();
//!
//! assert_eq!(&frame[..6], b"hd\x00\x17dc");
//! assert_eq!(frame[22], 1);
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use orvibo_s20::{Client, ClientConfig, Identifier, Operation, OrviboError};
//!
//! let mut client = Client::new(ClientConfig::new())?;
//!
//! match client.run(&Operation::Heartbeat, Some(&Identifier::parse("192.168.1.20"))) {
//!     Ok(_) => println!("alive"),
//!     Err(OrviboError::RequirementNotMet { attempts, .. }) => {
//!         println!("no answer after {} attempts", attempts);
//!     }
//!     Err(OrviboError::DeviceNotFound { identifier }) => println!("unknown: {}", identifier),
//!     Err(e) => println!("Error: {}", e),
//! }
//! # Ok::<(), OrviboError>(())
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade, one
//! target per module (`orvibo_s20::engine`, `orvibo_s20::transport`, ...).
//! Frames are hex-dumped at `trace` level.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod catalog;
pub mod classify;
mod client;
pub mod command;
pub mod ddf;
mod device;
mod engine;
mod error;
mod header;
pub mod listing;
mod response;
mod transport;
pub mod utils;

// Public re-exports
pub use catalog::{Catalog, CatalogSummary, Identifier, SortMode};
pub use client::{Client, ClientConfig, Operation, RunReport, SweepFailure};
pub use command::{TableUpdate, Task};
pub use device::{
    DeviceName, DeviceRecord, DeviceTime, DeviceType, HardwareAddress, Password, SwitchState,
    DEVICE_EPOCH_OFFSET, DEVICE_NAME_LEN, PASSWORD_LEN,
};
pub use engine::{Destination, RetryPolicy, TaskEngine, TaskOutcome, TaskRequest};
pub use error::{OrviboError, Result};
pub use header::{FrameHeader, OpCode, HEADER_SIZE};
pub use listing::{CatalogSource, ListingOptions};
pub use response::{Response, ResponseKind, ResponseSet, SocketTable, TableHeader};
pub use transport::{
    BroadcastCapability, Endpoint, Transport, UdpEndpoint, UdpTransport, Unrestricted,
    DEFAULT_PORT, DEFAULT_TIMEOUT, MAX_PACKET_SIZE,
};
