//! Example: Listing the sockets on the local network
//!
//! Run with: cargo run --example discover [-- query] [ddf=FILE]
//!
//! This example demonstrates:
//! - Broadcast discovery and a detailed query of every device
//! - Seeding the catalog from a device data file instead
//! - Rendering the listing and saving it back as a data file
//!
//! Set `RUST_LOG=orvibo_s20=debug` (or `trace` for hex dumps) to watch the
//! protocol traffic.

use orvibo_s20::{Client, ClientConfig, ListingOptions, Operation};
use std::fs::File;
use std::io::BufReader;

fn main() -> orvibo_s20::Result<()> {
    env_logger::init();

    let mut query = false;
    let mut ddf = None;
    for arg in std::env::args().skip(1) {
        match arg.strip_prefix("ddf=") {
            Some(path) => ddf = Some(path.to_string()),
            None if arg == "query" => query = true,
            None => eprintln!("ignoring argument: {}", arg),
        }
    }

    // =========================================================================
    // Build the catalog
    // =========================================================================

    let mut client = Client::new(ClientConfig::new())?;
    if let Some(path) = &ddf {
        let count = client.load_device_file(BufReader::new(File::open(path)?))?;
        println!("# {} device(s) from {}", count, path);
    }

    let operation = if query { Operation::QueryList } else { Operation::List };
    let report = client.run(&operation, None)?;

    // =========================================================================
    // Show it
    // =========================================================================

    client.render(&mut std::io::stdout(), &ListingOptions::new().clock(true))?;

    for failure in &report.failures {
        eprintln!("{}: {}", failure.hardware_address, failure.error);
    }

    if query {
        // A queried catalog has names, so it is worth keeping.
        let mut file = File::create("devices.ddf")?;
        client.save_device_file(&mut file)?;
        println!("# saved to devices.ddf");
    }

    std::process::exit(report.exit_status());
}
