//! Example: Switching one socket
//!
//! Run with: cargo run --example switch -- <ip-or-name> on|off|hb
//!
//! This example demonstrates:
//! - Naming a device by address, host name or device name
//! - Switching and heartbeat
//! - Using the run report's exit status (0x20 off, 0x30 on)

use orvibo_s20::{Client, ClientConfig, Identifier, ListingOptions, Operation, OrviboError};
use std::time::Duration;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 {
        eprintln!("usage: switch <ip-or-name> on|off|hb");
        std::process::exit(1);
    }

    let operation = match args[1].as_str() {
        "on" => Operation::On,
        "off" => Operation::Off,
        "hb" => Operation::Heartbeat,
        other => {
            eprintln!("unknown operation: {}", other);
            std::process::exit(1);
        }
    };
    let identifier = Identifier::resolve(&args[0]);

    let status = match switch(&operation, &identifier) {
        Ok(status) => status,
        Err(OrviboError::RequirementNotMet { task, attempts, .. }) => {
            eprintln!("{}: no answer after {} attempt(s)", task, attempts);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(status);
}

fn switch(operation: &Operation, identifier: &Identifier) -> orvibo_s20::Result<i32> {
    // A slower network may need a longer wait per attempt.
    let config = ClientConfig::new().with_timeout(Duration::from_millis(800));
    let mut client = Client::new(config)?;

    let report = client.run(operation, Some(identifier))?;
    client.render(
        &mut std::io::stdout(),
        &ListingOptions::new().brief(true).single(true),
    )?;
    Ok(report.exit_status())
}
