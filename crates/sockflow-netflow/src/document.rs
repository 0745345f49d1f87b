//! YAML export document.
//!
//! The document nests the NetFlow message under `netflow_message` and
//! carries statistics and host details beside it:
//!
//! ```yaml
//! netflow_message:
//!   header: { netflow_version, record_count, ... }
//!   templates: [ { template_id, field_count, fields: [ { name, type, length } ] } ]
//!   flows: [ { source_address, destination_address, ..., meta: { ... } } ]
//! flow_statistics: { total_flows, total_bytes, total_packets, flow_duration, protocols }
//! system_information: { hostname, os, first_run, ... }
//! ```
//!
//! A document without `netflow_message` is not a NetFlow export.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sockflow_common::constants;
use sockflow_common::error::{Result, SockflowError};

use crate::report::{FlowExportReport, FlowMeta, FlowRecord, FlowStatistics, ReportContext, ipv4_to_string};
use crate::template::TemplateRecord;
use crate::timestamp::{UNKNOWN_TIME, format_epoch};

const UNSPECIFIED_ADDRESS: &str = "0.0.0.0";

/// Top-level export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetflowDocument {
    /// The NetFlow message, absent in non-NetFlow documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netflow_message: Option<NetflowMessage>,
    /// Aggregates over the flows.
    #[serde(default)]
    pub flow_statistics: FlowStatistics,
    /// Host details.
    #[serde(default)]
    pub system_information: ReportContext,
}

/// Header, templates, and flows of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetflowMessage {
    /// Message header.
    #[serde(default)]
    pub header: HeaderSection,
    /// Template records.
    #[serde(default)]
    pub templates: Vec<TemplateSection>,
    /// Data records.
    #[serde(default)]
    pub flows: Vec<FlowEntry>,
}

/// Rendered message header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSection {
    /// Export format version.
    pub netflow_version: u16,
    /// Template plus data records.
    pub record_count: u16,
    /// Exporter uptime in milliseconds.
    pub system_uptime_ms: u32,
    /// Export time, epoch seconds.
    pub export_timestamp: u32,
    /// Export time, human-readable.
    pub export_time: String,
    /// Message counter.
    pub sequence_number: u32,
    /// Exporter observation domain.
    pub observation_domain_id: u32,
}

/// Rendered template record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSection {
    /// Template identifier.
    pub template_id: u16,
    /// Number of fields.
    pub field_count: usize,
    /// Fields in record order.
    pub fields: Vec<TemplateFieldEntry>,
}

/// One rendered template field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFieldEntry {
    /// Field name, e.g. `IPV4_SRC_ADDR`.
    pub name: String,
    /// Field type code.
    #[serde(rename = "type")]
    pub field_type: u16,
    /// Field length in bytes.
    pub length: u16,
}

/// One rendered flow. Fields mirror [`FlowRecord`] with addresses and
/// times rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    /// Flow source address text.
    #[serde(default = "unspecified_address")]
    pub source_address: String,
    /// Flow destination address text.
    #[serde(default = "unspecified_address")]
    pub destination_address: String,
    /// `L4_SRC_PORT`.
    #[serde(default)]
    pub source_port: u16,
    /// `L4_DST_PORT`.
    #[serde(default)]
    pub destination_port: u16,
    /// IANA protocol number.
    #[serde(default)]
    pub protocol: u8,
    /// Lowercase protocol name.
    #[serde(default = "default_protocol_name")]
    pub protocol_name: String,
    /// `IN_PKTS`, the folded occurrence count.
    #[serde(default = "one")]
    pub packet_count: u64,
    /// `IN_BYTES` estimate.
    #[serde(default)]
    pub byte_count: u64,
    /// First switched time, epoch seconds.
    #[serde(default)]
    pub first_switched: i64,
    /// Last switched time, epoch seconds.
    #[serde(default)]
    pub last_switched: i64,
    /// First switched time, rendered or `unknown`.
    #[serde(default = "unknown_time")]
    pub first_switched_time: String,
    /// Last switched time, rendered or `unknown`.
    #[serde(default = "unknown_time")]
    pub last_switched_time: String,
    /// Cumulative TCP flags.
    #[serde(default)]
    pub tcp_flags: u8,
    /// Input SNMP index.
    #[serde(default)]
    pub input_interface: u16,
    /// Output SNMP index.
    #[serde(default)]
    pub output_interface: u16,
    /// Reversibility sidecar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FlowMeta>,
}

fn unspecified_address() -> String {
    UNSPECIFIED_ADDRESS.to_owned()
}

fn default_protocol_name() -> String {
    "tcp".to_owned()
}

const fn one() -> u64 {
    1
}

fn unknown_time() -> String {
    UNKNOWN_TIME.to_owned()
}

impl FlowEntry {
    /// Renders a flow record.
    ///
    /// Addresses come from the `meta` strings when both are real
    /// addresses; otherwise each side falls back to `*`, the `meta`
    /// string, or the dotted quad of the numeric field.
    #[must_use]
    pub fn from_flow(flow: &FlowRecord) -> Self {
        let (source_address, destination_address) = flow_addresses(flow);
        Self {
            source_address,
            destination_address,
            source_port: flow.src_port,
            destination_port: flow.dst_port,
            protocol: flow.protocol,
            protocol_name: flow.protocol_name(),
            packet_count: flow.packet_count,
            byte_count: flow.byte_count,
            first_switched: flow.first_switched,
            last_switched: flow.last_switched,
            first_switched_time: format_epoch(flow.first_switched),
            last_switched_time: format_epoch(flow.last_switched),
            tcp_flags: flow.tcp_flags,
            input_interface: flow.input_interface,
            output_interface: flow.output_interface,
            meta: flow.meta.clone(),
        }
    }
}

fn is_real_address(text: &str) -> bool {
    !constants::is_pseudo_address(text)
}

fn flow_addresses(flow: &FlowRecord) -> (String, String) {
    let meta = flow.meta.as_ref();
    if let Some(meta) =
        meta.filter(|m| is_real_address(&m.src_addr_str) && is_real_address(&m.dst_addr_str))
    {
        return (meta.src_addr_str.clone(), meta.dst_addr_str.clone());
    }
    (
        side_address(meta.map(|m| m.src_addr_str.as_str()), flow.src_addr),
        side_address(meta.map(|m| m.dst_addr_str.as_str()), flow.dst_addr),
    )
}

fn side_address(meta_address: Option<&str>, numeric: u32) -> String {
    match meta_address {
        Some("*") => "*".to_owned(),
        _ if numeric != 0 => ipv4_to_string(numeric),
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => UNSPECIFIED_ADDRESS.to_owned(),
    }
}

impl From<&TemplateRecord> for TemplateSection {
    fn from(template: &TemplateRecord) -> Self {
        Self {
            template_id: template.template_id,
            field_count: template.field_count(),
            fields: template
                .fields
                .iter()
                .map(|f| TemplateFieldEntry {
                    name: f.field_type.name().to_owned(),
                    field_type: f.field_type.code(),
                    length: f.length,
                })
                .collect(),
        }
    }
}

impl FlowExportReport {
    /// Renders the report as an export document.
    #[must_use]
    pub fn to_document(&self) -> NetflowDocument {
        let header = HeaderSection {
            netflow_version: self.header.version,
            record_count: self.header.record_count,
            system_uptime_ms: self.header.sys_uptime_ms,
            export_timestamp: self.header.unix_secs,
            export_time: format_epoch(i64::from(self.header.unix_secs)),
            sequence_number: self.header.sequence_number,
            observation_domain_id: self.header.source_id,
        };
        NetflowDocument {
            netflow_message: Some(NetflowMessage {
                header,
                templates: vec![TemplateSection::from(&self.template)],
                flows: self.flows.iter().map(FlowEntry::from_flow).collect(),
            }),
            flow_statistics: self.statistics.clone(),
            system_information: self.context.clone(),
        }
    }
}

impl NetflowDocument {
    /// Returns whether the document carries a NetFlow message.
    #[must_use]
    pub const fn is_netflow(&self) -> bool {
        self.netflow_message.is_some()
    }

    /// Parses a document from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not YAML of the document shape.
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Renders the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reads a document from a file.
    ///
    /// # Errors
    ///
    /// Returns [`SockflowError::NotFound`] if the file does not exist, or
    /// another error if it cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SockflowError::NotFound {
                kind: "export document",
                id: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| SockflowError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Writes the document to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|e| SockflowError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "netflow document written");
        Ok(())
    }
}
