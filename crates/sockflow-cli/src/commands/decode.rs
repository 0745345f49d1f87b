//! `sockflow decode`: turn an export back into connection tables.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use sockflow_netflow::decoder::{DecodedConnections, TrafficSummary, decode, decode_document};
use sockflow_netflow::document::NetflowDocument;
use sockflow_netflow::wire::parse_packet;

use crate::output::{format_ports, print_records};

/// Arguments for the `decode` command.
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Export document to decode.
    pub file: PathBuf,

    /// Treat the file as an RFC 3954 binary packet instead of YAML.
    #[arg(long)]
    pub binary: bool,
}

/// Executes the `decode` command.
///
/// A YAML file without a `netflow_message` section is reported and skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn execute(args: DecodeArgs) -> anyhow::Result<()> {
    let decoded = if args.binary {
        let bytes = std::fs::read(&args.file)
            .with_context(|| format!("failed to read {}", args.file.display()))?;
        decode(&parse_packet(&bytes)?)
    } else {
        let document = NetflowDocument::load(&args.file)?;
        let Some(decoded) = decode_document(&document) else {
            println!("{} is not a NetFlow document.", args.file.display());
            return Ok(());
        };
        decoded
    };

    print_decoded(&decoded);
    Ok(())
}

fn print_decoded(decoded: &DecodedConnections) {
    if decoded.is_empty() {
        println!("No flows found.");
        return;
    }

    println!("Incoming ({}):", decoded.incoming.len());
    print_records(&decoded.incoming);
    println!();
    println!("Outgoing ({}):", decoded.outgoing.len());
    print_records(&decoded.outgoing);
    println!();
    println!("TCP ports: {}", format_ports(&decoded.tcp_ports));
    println!("UDP ports: {}", format_ports(&decoded.udp_ports));

    print_traffic("UDP", &decoded.udp_traffic);
    print_traffic("ICMP", &decoded.icmp_traffic);
}

fn print_traffic(label: &str, traffic: &TrafficSummary) {
    if traffic.connections.is_empty() {
        return;
    }
    println!();
    println!(
        "{label} traffic: {} flows, {} packets",
        traffic.total_connections, traffic.total_packets
    );
    println!(
        "{:<60} {:<16} {:<10} {:<8} {:<20}",
        "CONNECTION", "PROCESS", "DIRECTION", "PACKETS", "LAST SEEN"
    );
    for entry in &traffic.connections {
        println!(
            "{:<60} {:<16} {:<10} {:<8} {:<20}",
            entry.connection,
            entry.process,
            entry.direction.as_str(),
            entry.packet_count,
            entry.last_seen
        );
    }
}
