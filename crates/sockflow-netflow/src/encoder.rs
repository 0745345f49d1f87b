//! Tracked records to NetFlow v9 reports.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sockflow_common::config::ExporterConfig;
use sockflow_common::constants::{
    DEFAULT_INPUT_INTERFACE, DEFAULT_OUTPUT_INTERFACE, DEFAULT_TEMPLATE_ID,
    ESTIMATED_BYTES_PER_PACKET, NETFLOW_VERSION, TCP_FLAGS_ACK_PSH,
};
use sockflow_common::types::{AddressFamily, Protocol};
use sockflow_track::endpoint::Endpoint;
use sockflow_track::record::ConnectionRecord;
use sockflow_track::roles::resolve_roles;

use crate::report::{FlowExportReport, FlowMeta, FlowRecord, FlowStatistics, MessageHeader, ReportContext};
use crate::template::TemplateRecord;
use crate::timestamp::{from_epoch, switched_window};

/// Builds export reports and numbers them.
///
/// The sequence counter is atomic, so one encoder can be shared between
/// threads and every `encode` call still gets a distinct number.
#[derive(Debug)]
pub struct NetflowEncoder {
    observation_domain_id: u32,
    template_id: u16,
    sequence: AtomicU32,
    started: Instant,
}

impl NetflowEncoder {
    /// Creates an encoder for one observation domain.
    #[must_use]
    pub fn new(observation_domain_id: u32) -> Self {
        Self {
            observation_domain_id,
            template_id: DEFAULT_TEMPLATE_ID,
            sequence: AtomicU32::new(0),
            started: Instant::now(),
        }
    }

    /// Creates an encoder from exporter configuration.
    #[must_use]
    pub fn from_config(config: &ExporterConfig) -> Self {
        let mut encoder = Self::new(config.observation_domain_id);
        encoder.template_id = config.template_id;
        encoder
    }

    /// Sequence number the next report will carry.
    #[must_use]
    pub fn next_sequence_number(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Encodes `records` at the current time.
    #[must_use]
    pub fn encode(&self, records: &[ConnectionRecord], context: ReportContext) -> FlowExportReport {
        self.encode_at(records, context, Utc::now())
    }

    /// Encodes `records` with an explicit export time.
    ///
    /// Flows keep the order of `records`. Never fails: unusable addresses
    /// become `0` and unusable times fall back to the default window.
    #[must_use]
    pub fn encode_at(
        &self,
        records: &[ConnectionRecord],
        context: ReportContext,
        now: DateTime<Utc>,
    ) -> FlowExportReport {
        let flows: Vec<FlowRecord> = records.iter().map(|r| flow_record(r, now)).collect();
        let uptime = self.started.elapsed();

        let record_count = u16::try_from(flows.len() + 1).unwrap_or_else(|_| {
            tracing::warn!(flows = flows.len(), "record count exceeds header field");
            u16::MAX
        });
        let sequence_number = self.sequence.fetch_add(1, Ordering::SeqCst);
        let header = MessageHeader {
            version: NETFLOW_VERSION,
            record_count,
            sys_uptime_ms: u32::try_from(uptime.as_millis()).unwrap_or(u32::MAX),
            unix_secs: u32::try_from(now.timestamp()).unwrap_or(0),
            sequence_number,
            source_id: self.observation_domain_id,
        };
        let statistics = FlowStatistics::from_flows(&flows, uptime.as_secs_f64());

        tracing::info!(
            flows = flows.len(),
            sequence = sequence_number,
            domain = self.observation_domain_id,
            "netflow report encoded"
        );

        FlowExportReport {
            header,
            template: TemplateRecord::flow_template(self.template_id),
            flows,
            statistics,
            context,
        }
    }
}

impl Default for NetflowEncoder {
    fn default() -> Self {
        Self::from_config(&ExporterConfig::default())
    }
}

/// Projects one tracked record onto the flow template.
#[must_use]
pub fn flow_record(record: &ConnectionRecord, now: DateTime<Utc>) -> FlowRecord {
    let roles = resolve_roles(&record.local, &record.remote, record.protocol, record.direction);
    let (first, last) = switched_window(
        from_epoch(record.first_seen.timestamp()),
        from_epoch(record.last_seen.timestamp()),
        now,
    );
    let packet_count = record.occurrence_count;

    FlowRecord {
        src_addr: ipv4_field(&roles.src),
        dst_addr: ipv4_field(&roles.dst),
        src_port: roles.src.port,
        dst_port: roles.dst.port,
        protocol: record.protocol.number(),
        packet_count,
        byte_count: packet_count.saturating_mul(ESTIMATED_BYTES_PER_PACKET),
        first_switched: first.timestamp(),
        last_switched: last.timestamp(),
        tcp_flags: if record.protocol == Protocol::Tcp {
            TCP_FLAGS_ACK_PSH
        } else {
            0
        },
        input_interface: DEFAULT_INPUT_INTERFACE,
        output_interface: DEFAULT_OUTPUT_INTERFACE,
        meta: Some(FlowMeta {
            direction: roles.direction,
            original_direction: Some(record.direction),
            process: record.process.clone(),
            src_addr_str: roles.src.address.clone(),
            dst_addr_str: roles.dst.address.clone(),
            protocol_str: record.protocol.as_str().to_owned(),
            connection_count: record.occurrence_count,
            is_server_connection: roles.local_is_server,
            local_original: record.local.to_string(),
            remote_original: record.remote.to_string(),
            src_ip_version: ip_version(&roles.src),
            dst_ip_version: ip_version(&roles.dst),
        }),
    }
}

/// Value of an `IPV4_*_ADDR` field, `0` when the address is not a dotted
/// quad. Bare addresses without a port (ICMP) still count.
fn ipv4_field(endpoint: &Endpoint) -> u32 {
    endpoint.ipv4().map_or(0, u32::from)
}

/// IP version reported in `meta`, `4` for any dotted quad.
fn ip_version(endpoint: &Endpoint) -> u8 {
    if endpoint.ipv4().is_some() {
        AddressFamily::Ipv4.version()
    } else {
        endpoint.family.version()
    }
}
