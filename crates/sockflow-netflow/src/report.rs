//! In-memory NetFlow export report.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use sockflow_common::types::{Direction, Protocol};

use crate::template::TemplateRecord;

/// NetFlow v9 packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Always 9.
    pub version: u16,
    /// Template plus data records in the message.
    pub record_count: u16,
    /// Milliseconds since the encoder was created.
    pub sys_uptime_ms: u32,
    /// Export time, seconds since the epoch.
    pub unix_secs: u32,
    /// Per-encoder message counter, starting at 0.
    pub sequence_number: u32,
    /// Observation domain of the exporter.
    pub source_id: u32,
}

/// Export sidecar that makes a flow reversible.
///
/// IPv4-only numeric fields cannot carry IPv6 or placeholder endpoints;
/// these strings can. Strict NetFlow consumers ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMeta {
    /// Resolved direction (`incoming` when the local side serves).
    #[serde(default = "outgoing")]
    pub direction: Direction,
    /// Direction tag of the tracked record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_direction: Option<Direction>,
    /// Owning process.
    #[serde(default = "unknown_process")]
    pub process: String,
    /// Source address text.
    #[serde(default)]
    pub src_addr_str: String,
    /// Destination address text.
    #[serde(default)]
    pub dst_addr_str: String,
    /// Protocol name.
    #[serde(default)]
    pub protocol_str: String,
    /// Occurrence count of the tracked record.
    #[serde(default)]
    pub connection_count: u64,
    /// Whether the local endpoint was judged to be the server.
    #[serde(default)]
    pub is_server_connection: bool,
    /// Local endpoint as tracked.
    #[serde(default)]
    pub local_original: String,
    /// Remote endpoint as tracked.
    #[serde(default)]
    pub remote_original: String,
    /// IP version of the source (`4`, `6`, or `0` when unknown).
    #[serde(default)]
    pub src_ip_version: u8,
    /// IP version of the destination.
    #[serde(default)]
    pub dst_ip_version: u8,
}

const fn outgoing() -> Direction {
    Direction::Outgoing
}

fn unknown_process() -> String {
    sockflow_track::record::UNKNOWN_PROCESS.to_owned()
}

/// One data record of the flow template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    /// `IPV4_SRC_ADDR`, `0` for IPv6 or placeholder sources.
    pub src_addr: u32,
    /// `IPV4_DST_ADDR`, `0` for IPv6 or placeholder destinations.
    pub dst_addr: u32,
    /// `L4_SRC_PORT`.
    pub src_port: u16,
    /// `L4_DST_PORT`.
    pub dst_port: u16,
    /// `PROTOCOL` (IANA number).
    pub protocol: u8,
    /// `IN_PKTS`, the occurrence count.
    pub packet_count: u64,
    /// `IN_BYTES`, an estimate.
    pub byte_count: u64,
    /// `FIRST_SWITCHED`, epoch seconds.
    pub first_switched: i64,
    /// `LAST_SWITCHED`, epoch seconds.
    pub last_switched: i64,
    /// `TCP_FLAGS`.
    pub tcp_flags: u8,
    /// `INPUT_SNMP`.
    pub input_interface: u16,
    /// `OUTPUT_SNMP`.
    pub output_interface: u16,
    /// Reversibility sidecar; absent for externally produced flows.
    pub meta: Option<FlowMeta>,
}

impl FlowRecord {
    /// Protocol name for the `PROTOCOL` field, `protocol_N` when unknown.
    #[must_use]
    pub fn protocol_name(&self) -> String {
        Protocol::from_number(self.protocol)
            .map_or_else(|| format!("protocol_{}", self.protocol), |p| p.as_str().to_owned())
    }
}

/// Aggregates over the flows of one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowStatistics {
    /// Number of flows.
    pub total_flows: u64,
    /// Sum of `IN_BYTES`.
    pub total_bytes: u64,
    /// Sum of `IN_PKTS`.
    pub total_packets: u64,
    /// Seconds since the encoder was created.
    pub flow_duration: f64,
    /// Flow count per protocol name.
    pub protocols: BTreeMap<String, u64>,
}

impl FlowStatistics {
    /// Computes the statistics of `flows`.
    #[must_use]
    pub fn from_flows(flows: &[FlowRecord], flow_duration: f64) -> Self {
        let mut protocols = BTreeMap::new();
        for flow in flows {
            let name = Protocol::from_number(flow.protocol)
                .map_or_else(|| "unknown".to_owned(), |p| p.as_str().to_owned());
            *protocols.entry(name).or_insert(0) += 1;
        }
        Self {
            total_flows: flows.len() as u64,
            total_bytes: flows.iter().map(|f| f.byte_count).fold(0, u64::saturating_add),
            total_packets: flows.iter().map(|f| f.packet_count).fold(0, u64::saturating_add),
            flow_duration,
            protocols,
        }
    }
}

/// Host and session details passed through to the report consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportContext {
    /// Host name of the exporter.
    pub hostname: String,
    /// Operating system details, free-form.
    pub os: serde_yaml::Value,
    /// First measurement of the session.
    pub first_run: String,
    /// Most recent measurement.
    pub last_update: String,
    /// Number of measurement cycles so far.
    pub total_measurements: u64,
    /// Extra system details, free-form.
    pub extended_system_info: serde_yaml::Value,
    /// Session timing, free-form.
    pub session: serde_yaml::Value,
    /// Change history, free-form.
    pub changes_log: Vec<serde_yaml::Value>,
}

impl Default for ReportContext {
    fn default() -> Self {
        let empty = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        Self {
            hostname: "unknown".to_owned(),
            os: empty.clone(),
            first_run: String::new(),
            last_update: String::new(),
            total_measurements: 1,
            extended_system_info: empty.clone(),
            session: empty,
            changes_log: Vec::new(),
        }
    }
}

/// A complete export: header, template, flows, and derived statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowExportReport {
    /// Message header.
    pub header: MessageHeader,
    /// The single flow template.
    pub template: TemplateRecord,
    /// Flows in input order.
    pub flows: Vec<FlowRecord>,
    /// Aggregates over `flows`.
    pub statistics: FlowStatistics,
    /// Pass-through host details.
    pub context: ReportContext,
}

/// Renders an `IPV4_*_ADDR` value as a dotted quad.
#[must_use]
pub fn ipv4_to_string(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(protocol: u8, packets: u64) -> FlowRecord {
        FlowRecord {
            src_addr: 0,
            dst_addr: 0,
            src_port: 0,
            dst_port: 0,
            protocol,
            packet_count: packets,
            byte_count: packets * 1024,
            first_switched: 0,
            last_switched: 0,
            tcp_flags: 0,
            input_interface: 1,
            output_interface: 2,
            meta: None,
        }
    }

    #[test]
    fn statistics_group_by_protocol() {
        let flows = vec![flow(6, 2), flow(6, 1), flow(17, 4), flow(99, 1)];
        let stats = FlowStatistics::from_flows(&flows, 1.5);
        assert_eq!(stats.total_flows, 4);
        assert_eq!(stats.total_packets, 8);
        assert_eq!(stats.total_bytes, 8 * 1024);
        assert_eq!(stats.protocols.get("tcp"), Some(&2));
        assert_eq!(stats.protocols.get("udp"), Some(&1));
        assert_eq!(stats.protocols.get("unknown"), Some(&1));
    }

    #[test]
    fn protocol_name_of_unknown_number() {
        assert_eq!(flow(1, 1).protocol_name(), "icmp");
        assert_eq!(flow(47, 1).protocol_name(), "protocol_47");
    }

    #[test]
    fn ipv4_rendering() {
        assert_eq!(ipv4_to_string(0), "0.0.0.0");
        assert_eq!(ipv4_to_string(0xC0A8_010A), "192.168.1.10");
    }
}
