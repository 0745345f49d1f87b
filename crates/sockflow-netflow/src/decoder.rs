//! Export documents back to connection records.
//!
//! Decoding is lossless only when each flow carries its `meta` sidecar.
//! Without it, addresses come from the rendered flow fields, and an IPv6
//! endpoint that was exported as `0` comes back as `0.0.0.0`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sockflow_common::types::{Direction, Protocol};
use sockflow_track::endpoint::Endpoint;
use sockflow_track::record::{ConnectionRecord, UNKNOWN_PROCESS};

use crate::document::{FlowEntry, NetflowDocument};
use crate::report::FlowExportReport;
use crate::timestamp::{from_epoch, parse_timestamp, switched_window};

/// One row of a per-protocol traffic listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficEntry {
    /// `local -> remote` text.
    pub connection: String,
    /// Owning process.
    pub process: String,
    /// Resolved flow direction.
    pub direction: Direction,
    /// Occurrences folded into the flow.
    pub packet_count: u64,
    /// First switched time, rendered.
    pub first_seen: String,
    /// Last switched time, rendered.
    pub last_seen: String,
}

/// Traffic listing of one protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficSummary {
    /// Flows of the protocol, in document order.
    pub connections: Vec<TrafficEntry>,
    /// Number of flows.
    pub total_connections: usize,
    /// Sum of packet counts.
    pub total_packets: u64,
}

impl TrafficSummary {
    fn push(&mut self, entry: TrafficEntry) {
        self.total_packets = self.total_packets.saturating_add(entry.packet_count);
        self.connections.push(entry);
        self.total_connections = self.connections.len();
    }
}

/// Everything recovered from one export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodedConnections {
    /// Records whose flow was resolved as incoming.
    pub incoming: Vec<ConnectionRecord>,
    /// All other records.
    pub outgoing: Vec<ConnectionRecord>,
    /// Distinct non-zero TCP ports seen in flows.
    pub tcp_ports: Vec<u16>,
    /// Distinct non-zero UDP ports seen in flows.
    pub udp_ports: Vec<u16>,
    /// UDP flows.
    pub udp_traffic: TrafficSummary,
    /// ICMP flows.
    pub icmp_traffic: TrafficSummary,
}

impl DecodedConnections {
    /// All records, incoming first.
    pub fn records(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.incoming.iter().chain(&self.outgoing)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }

    /// Returns whether nothing was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes an in-memory report.
#[must_use]
pub fn decode(report: &FlowExportReport) -> DecodedConnections {
    let flows: Vec<FlowEntry> = report.flows.iter().map(FlowEntry::from_flow).collect();
    decode_flows(&flows, Utc::now())
}

/// Decodes a parsed document, or returns `None` when it has no
/// `netflow_message`.
#[must_use]
pub fn decode_document(document: &NetflowDocument) -> Option<DecodedConnections> {
    let Some(message) = document.netflow_message.as_ref() else {
        tracing::debug!("document has no netflow_message, not decoding");
        return None;
    };
    Some(decode_flows(&message.flows, Utc::now()))
}

/// Decodes rendered flows. `now` anchors the default time window of
/// flows without usable times.
#[must_use]
pub fn decode_flows(flows: &[FlowEntry], now: DateTime<Utc>) -> DecodedConnections {
    let mut decoded = DecodedConnections::default();
    let mut lossy = 0_usize;

    for flow in flows {
        if flow.meta.is_none() {
            lossy += 1;
        }
        let protocol = flow_protocol(flow);
        collect_ports(&mut decoded, flow, protocol);
        match protocol {
            Protocol::Udp => decoded.udp_traffic.push(traffic_entry(flow, true)),
            Protocol::Icmp => decoded.icmp_traffic.push(traffic_entry(flow, false)),
            Protocol::Tcp => {}
        }

        let (record, bucket) = connection_record(flow, protocol, now);
        if bucket == Direction::Incoming {
            decoded.incoming.push(record);
        } else {
            decoded.outgoing.push(record);
        }
    }

    if lossy > 0 {
        tracing::warn!(flows = lossy, "flows without meta decoded from numeric fields");
    }
    tracing::info!(
        incoming = decoded.incoming.len(),
        outgoing = decoded.outgoing.len(),
        "netflow flows decoded"
    );
    decoded
}

fn flow_protocol(flow: &FlowEntry) -> Protocol {
    Protocol::from_number(flow.protocol).unwrap_or_else(|| {
        let name = flow
            .meta
            .as_ref()
            .map_or(flow.protocol_name.as_str(), |m| m.protocol_str.as_str());
        Protocol::from_name(name)
    })
}

/// Resolved direction of the flow, which picks the output bucket.
fn flow_direction(flow: &FlowEntry) -> Direction {
    flow.meta.as_ref().map_or(Direction::Outgoing, |m| m.direction)
}

fn connection_record(
    flow: &FlowEntry,
    protocol: Protocol,
    now: DateTime<Utc>,
) -> (ConnectionRecord, Direction) {
    let bucket = flow_direction(flow);
    let meta = flow.meta.as_ref();

    let (local, remote) = match meta.filter(|m| !m.local_original.is_empty()) {
        Some(m) => (
            Endpoint::parse(&m.local_original),
            Endpoint::parse(&m.remote_original),
        ),
        None => {
            let src = flow_endpoint(&flow.source_address, flow.source_port);
            let dst = flow_endpoint(&flow.destination_address, flow.destination_port);
            if bucket == Direction::Incoming {
                (dst, src)
            } else {
                (src, dst)
            }
        }
    };

    let direction = meta.map_or(Direction::Outgoing, |m| {
        m.original_direction.unwrap_or(m.direction)
    });
    let process = meta
        .map(|m| m.process.trim())
        .filter(|p| !p.is_empty())
        .unwrap_or(UNKNOWN_PROCESS);
    let count = meta
        .map(|m| m.connection_count)
        .filter(|&c| c > 0)
        .unwrap_or(flow.packet_count)
        .max(1);

    let first = from_epoch(flow.first_switched).or_else(|| parse_timestamp(&flow.first_switched_time));
    let last = from_epoch(flow.last_switched).or_else(|| parse_timestamp(&flow.last_switched_time));
    let (first_seen, last_seen) = switched_window(first, last, now);

    let mut record =
        ConnectionRecord::first_observation(local, remote, protocol, direction, process, first_seen);
    record.last_seen = last_seen;
    record.occurrence_count = count;
    record.repair();
    (record, bucket)
}

/// Rebuilds an endpoint from a rendered address and port.
fn flow_endpoint(address: &str, port: u16) -> Endpoint {
    Endpoint::parse(&endpoint_text(address, port))
}

fn endpoint_text(address: &str, port: u16) -> String {
    if address == "*" {
        if port > 0 {
            format!("*:{port}")
        } else {
            "*:*".to_owned()
        }
    } else if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

fn collect_ports(decoded: &mut DecodedConnections, flow: &FlowEntry, protocol: Protocol) {
    let ports = match protocol {
        Protocol::Tcp => &mut decoded.tcp_ports,
        Protocol::Udp => &mut decoded.udp_ports,
        Protocol::Icmp => return,
    };
    for port in [flow.source_port, flow.destination_port] {
        if port > 0 && !ports.contains(&port) {
            ports.push(port);
        }
    }
}

fn traffic_entry(flow: &FlowEntry, with_ports: bool) -> TrafficEntry {
    let connection = match flow.meta.as_ref().filter(|m| !m.local_original.is_empty()) {
        Some(m) => format!("{} -> {}", m.local_original, m.remote_original),
        None if with_ports => format!(
            "{} -> {}",
            endpoint_text(&flow.source_address, flow.source_port),
            endpoint_text(&flow.destination_address, flow.destination_port)
        ),
        None => format!("{} -> {}", flow.source_address, flow.destination_address),
    };
    TrafficEntry {
        connection,
        process: flow
            .meta
            .as_ref()
            .map_or_else(|| UNKNOWN_PROCESS.to_owned(), |m| m.process.clone()),
        direction: flow_direction(flow),
        packet_count: flow.packet_count,
        first_seen: flow.first_switched_time.clone(),
        last_seen: flow.last_switched_time.clone(),
    }
}
