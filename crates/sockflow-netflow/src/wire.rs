//! Binary NetFlow v9 packets (RFC 3954).
//!
//! A packet is a 20-byte header followed by FlowSets. Each FlowSet starts
//! with `(id, length)`: id 0 carries templates, ids of 256 and above carry
//! data records laid out by the template with that id. Data FlowSets are
//! padded to a 4-byte boundary.
//!
//! The `meta` sidecar has no place on the wire, so a parsed packet is the
//! lossy, externally-produced form of a report.

use nom::{
    IResult, Parser,
    bytes::complete::take,
    multi::count,
    number::complete::{be_u16, be_u32},
};
use sockflow_common::constants::NETFLOW_VERSION;
use sockflow_common::error::{Result, SockflowError};

use crate::report::{FlowExportReport, FlowRecord, FlowStatistics, MessageHeader, ReportContext};
use crate::template::{FieldType, TemplateField, TemplateRecord};

/// Length of the packet header in bytes.
pub const HEADER_LEN: usize = 20;

const TEMPLATE_FLOWSET_ID: u16 = 0;
const MIN_DATA_FLOWSET_ID: u16 = 256;
const FLOWSET_HEADER_LEN: usize = 4;

/// Serializes a report into one packet.
///
/// Values wider than their field saturate. Large reports are split over
/// several data FlowSets.
#[must_use]
pub fn encode_packet(report: &FlowExportReport) -> Vec<u8> {
    let template = &report.template;
    let record_len = template.record_length();
    let mut buf = Vec::with_capacity(
        HEADER_LEN + 2 * FLOWSET_HEADER_LEN + 4 * (template.field_count() + 1)
            + record_len * report.flows.len(),
    );

    write_header(&mut buf, &report.header);
    write_template_flowset(&mut buf, template);

    let max_body = usize::from(u16::MAX) - FLOWSET_HEADER_LEN - 3;
    let per_set = (max_body / record_len.max(1)).max(1);
    for chunk in report.flows.chunks(per_set) {
        write_data_flowset(&mut buf, template, chunk);
    }

    tracing::debug!(bytes = buf.len(), flows = report.flows.len(), "netflow packet encoded");
    buf
}

fn write_header(buf: &mut Vec<u8>, header: &MessageHeader) {
    buf.extend_from_slice(&header.version.to_be_bytes());
    buf.extend_from_slice(&header.record_count.to_be_bytes());
    buf.extend_from_slice(&header.sys_uptime_ms.to_be_bytes());
    buf.extend_from_slice(&header.unix_secs.to_be_bytes());
    buf.extend_from_slice(&header.sequence_number.to_be_bytes());
    buf.extend_from_slice(&header.source_id.to_be_bytes());
}

fn write_template_flowset(buf: &mut Vec<u8>, template: &TemplateRecord) {
    let length = FLOWSET_HEADER_LEN + 4 + 4 * template.field_count();
    buf.extend_from_slice(&TEMPLATE_FLOWSET_ID.to_be_bytes());
    buf.extend_from_slice(&saturate_u16(length).to_be_bytes());
    buf.extend_from_slice(&template.template_id.to_be_bytes());
    buf.extend_from_slice(&saturate_u16(template.field_count()).to_be_bytes());
    for field in &template.fields {
        buf.extend_from_slice(&field.field_type.code().to_be_bytes());
        buf.extend_from_slice(&field.length.to_be_bytes());
    }
}

fn write_data_flowset(buf: &mut Vec<u8>, template: &TemplateRecord, flows: &[FlowRecord]) {
    let body = template.record_length() * flows.len();
    let padding = (4 - (FLOWSET_HEADER_LEN + body) % 4) % 4;
    let length = FLOWSET_HEADER_LEN + body + padding;

    buf.extend_from_slice(&template.template_id.to_be_bytes());
    buf.extend_from_slice(&saturate_u16(length).to_be_bytes());
    for flow in flows {
        for field in &template.fields {
            write_uint(buf, field_value(flow, field.field_type), usize::from(field.length));
        }
    }
    buf.resize(buf.len() + padding, 0);
}

fn saturate_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Writes `value` big-endian into `len` bytes, saturating at the field width.
fn write_uint(buf: &mut Vec<u8>, value: u64, len: usize) {
    if len >= 8 {
        buf.resize(buf.len() + (len - 8), 0);
        buf.extend_from_slice(&value.to_be_bytes());
        return;
    }
    let max = (1_u64 << (8 * len)) - 1;
    let bytes = value.min(max).to_be_bytes();
    buf.extend_from_slice(&bytes[8 - len..]);
}

fn field_value(flow: &FlowRecord, field: FieldType) -> u64 {
    match field {
        FieldType::Ipv4SrcAddr => u64::from(flow.src_addr),
        FieldType::Ipv4DstAddr => u64::from(flow.dst_addr),
        FieldType::L4SrcPort => u64::from(flow.src_port),
        FieldType::L4DstPort => u64::from(flow.dst_port),
        FieldType::Protocol => u64::from(flow.protocol),
        FieldType::InPkts => flow.packet_count,
        FieldType::InBytes => flow.byte_count,
        FieldType::FirstSwitched => u64::try_from(flow.first_switched).unwrap_or(0),
        FieldType::LastSwitched => u64::try_from(flow.last_switched).unwrap_or(0),
        FieldType::TcpFlags => u64::from(flow.tcp_flags),
        FieldType::InputSnmp => u64::from(flow.input_interface),
        FieldType::OutputSnmp => u64::from(flow.output_interface),
        _ => 0,
    }
}

/// A template as announced on the wire, including field codes this crate
/// does not model.
struct WireTemplate {
    template_id: u16,
    fields: Vec<(u16, u16)>,
}

impl WireTemplate {
    fn record_length(&self) -> usize {
        self.fields.iter().map(|&(_, len)| usize::from(len)).sum()
    }

    fn to_record(&self) -> TemplateRecord {
        TemplateRecord {
            template_id: self.template_id,
            fields: self
                .fields
                .iter()
                .filter_map(|&(code, length)| {
                    FieldType::from_code(code).map(|field_type| TemplateField { field_type, length })
                })
                .collect(),
        }
    }
}

/// Parses a packet produced by [`encode_packet`] or another exporter.
///
/// Data FlowSets whose template is not in the same packet are skipped.
///
/// # Errors
///
/// Returns [`SockflowError::Wire`] if the packet is truncated, is not
/// version 9, or a FlowSet length is inconsistent.
pub fn parse_packet(bytes: &[u8]) -> Result<FlowExportReport> {
    let (mut rest, header) = parse_header(bytes).map_err(|_| wire_err("truncated header"))?;
    if header.version != NETFLOW_VERSION {
        return Err(wire_err(&format!("unsupported version {}", header.version)));
    }

    let mut templates: Vec<WireTemplate> = Vec::new();
    let mut flows = Vec::new();

    while rest.len() >= FLOWSET_HEADER_LEN {
        let (after, (flowset_id, length)) =
            flowset_header(rest).map_err(|_| wire_err("truncated flowset header"))?;
        let length = usize::from(length);
        if length < FLOWSET_HEADER_LEN {
            return Err(wire_err(&format!("flowset {flowset_id} length {length} too small")));
        }
        let (after, body) = take_bytes(after, length - FLOWSET_HEADER_LEN)
            .map_err(|_| wire_err(&format!("flowset {flowset_id} exceeds packet")))?;
        rest = after;

        if flowset_id == TEMPLATE_FLOWSET_ID {
            templates.extend(parse_templates(body)?);
        } else if flowset_id >= MIN_DATA_FLOWSET_ID {
            match templates.iter().find(|t| t.template_id == flowset_id) {
                Some(template) => flows.extend(parse_records(body, template)),
                None => tracing::warn!(flowset_id, "data flowset without template skipped"),
            }
        } else {
            tracing::debug!(flowset_id, "options flowset skipped");
        }
    }

    let template = templates
        .first()
        .map_or_else(|| TemplateRecord::flow_template(MIN_DATA_FLOWSET_ID), WireTemplate::to_record);
    let statistics = FlowStatistics::from_flows(&flows, f64::from(header.sys_uptime_ms) / 1000.0);

    tracing::debug!(flows = flows.len(), sequence = header.sequence_number, "netflow packet parsed");
    Ok(FlowExportReport {
        header,
        template,
        flows,
        statistics,
        context: ReportContext::default(),
    })
}

fn parse_header(input: &[u8]) -> IResult<&[u8], MessageHeader> {
    let (rest, (version, record_count, sys_uptime_ms, unix_secs, sequence_number, source_id)) =
        (be_u16, be_u16, be_u32, be_u32, be_u32, be_u32).parse(input)?;
    Ok((
        rest,
        MessageHeader {
            version,
            record_count,
            sys_uptime_ms,
            unix_secs,
            sequence_number,
            source_id,
        },
    ))
}

fn flowset_header(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    (be_u16, be_u16).parse(input)
}

fn take_bytes(input: &[u8], len: usize) -> IResult<&[u8], &[u8]> {
    take(len).parse(input)
}

fn template_record(input: &[u8]) -> IResult<&[u8], WireTemplate> {
    let (rest, (template_id, field_count)) = (be_u16, be_u16).parse(input)?;
    let (rest, fields) = count((be_u16, be_u16), usize::from(field_count)).parse(rest)?;
    Ok((rest, WireTemplate { template_id, fields }))
}

fn parse_templates(mut body: &[u8]) -> Result<Vec<WireTemplate>> {
    let mut templates = Vec::new();
    while body.len() >= 4 {
        let (rest, template) =
            template_record(body).map_err(|_| wire_err("truncated template record"))?;
        if template.template_id < MIN_DATA_FLOWSET_ID {
            return Err(wire_err(&format!("invalid template id {}", template.template_id)));
        }
        templates.push(template);
        body = rest;
    }
    Ok(templates)
}

fn parse_records(body: &[u8], template: &WireTemplate) -> Vec<FlowRecord> {
    let record_len = template.record_length();
    if record_len == 0 {
        return Vec::new();
    }
    // Trailing bytes shorter than a record are padding.
    body.chunks_exact(record_len)
        .map(|record| {
            let mut flow = blank_flow();
            let mut offset = 0;
            for &(code, len) in &template.fields {
                let len = usize::from(len);
                let bytes = &record[offset..offset + len];
                offset += len;
                if len > 8 {
                    continue;
                }
                if let Some(field) = FieldType::from_code(code) {
                    apply_field(&mut flow, field, read_uint(bytes));
                }
            }
            flow
        })
        .collect()
}

fn read_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

fn apply_field(flow: &mut FlowRecord, field: FieldType, value: u64) {
    match field {
        FieldType::Ipv4SrcAddr => flow.src_addr = u32::try_from(value).unwrap_or(0),
        FieldType::Ipv4DstAddr => flow.dst_addr = u32::try_from(value).unwrap_or(0),
        FieldType::L4SrcPort => flow.src_port = u16::try_from(value).unwrap_or(0),
        FieldType::L4DstPort => flow.dst_port = u16::try_from(value).unwrap_or(0),
        FieldType::Protocol => flow.protocol = u8::try_from(value).unwrap_or(0),
        FieldType::InPkts => flow.packet_count = value,
        FieldType::InBytes => flow.byte_count = value,
        FieldType::FirstSwitched => flow.first_switched = i64::try_from(value).unwrap_or(0),
        FieldType::LastSwitched => flow.last_switched = i64::try_from(value).unwrap_or(0),
        FieldType::TcpFlags => flow.tcp_flags = u8::try_from(value).unwrap_or(0),
        FieldType::InputSnmp => flow.input_interface = u16::try_from(value).unwrap_or(0),
        FieldType::OutputSnmp => flow.output_interface = u16::try_from(value).unwrap_or(0),
        _ => {}
    }
}

const fn blank_flow() -> FlowRecord {
    FlowRecord {
        src_addr: 0,
        dst_addr: 0,
        src_port: 0,
        dst_port: 0,
        protocol: 0,
        packet_count: 0,
        byte_count: 0,
        first_switched: 0,
        last_switched: 0,
        tcp_flags: 0,
        input_interface: 0,
        output_interface: 0,
        meta: None,
    }
}

fn wire_err(message: &str) -> SockflowError {
    SockflowError::Wire {
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sockflow_track::observation::RawObservation;
    use sockflow_track::record::ConnectionRecord;

    use super::*;
    use crate::decoder::decode;
    use crate::encoder::NetflowEncoder;

    fn report(raws: &[(&str, &str, &str, &str)]) -> FlowExportReport {
        let now = Utc.timestamp_opt(1_700_000_000, 0).single().expect("ts");
        let records: Vec<ConnectionRecord> = raws
            .iter()
            .map(|&(local, remote, protocol, direction)| {
                let obs = RawObservation::new(local, remote, protocol, direction, "p").normalize();
                ConnectionRecord::first_observation(
                    obs.local,
                    obs.remote,
                    obs.protocol,
                    obs.direction,
                    obs.process,
                    now,
                )
            })
            .collect();
        NetflowEncoder::new(42).encode_at(&records, ReportContext::default(), now)
    }

    #[test]
    fn packet_layout() {
        let report = report(&[("192.168.1.10:51000", "93.184.216.34:443", "tcp", "outgoing")]);
        let bytes = encode_packet(&report);

        assert_eq!(&bytes[0..2], &9_u16.to_be_bytes());
        assert_eq!(&bytes[2..4], &2_u16.to_be_bytes());
        assert_eq!(&bytes[16..20], &42_u32.to_be_bytes());
        // Template flowset: id 0, 4 + 4 + 12 * 4 bytes.
        assert_eq!(&bytes[20..22], &0_u16.to_be_bytes());
        assert_eq!(&bytes[22..24], &56_u16.to_be_bytes());
        // Data flowset: 34-byte record padded to 40.
        let data = HEADER_LEN + 56;
        assert_eq!(&bytes[data..data + 2], &256_u16.to_be_bytes());
        assert_eq!(&bytes[data + 2..data + 4], &40_u16.to_be_bytes());
        assert_eq!(bytes.len(), data + 40);
    }

    #[test]
    fn parse_recovers_numeric_fields() {
        let report = report(&[
            ("192.168.1.10:51000", "93.184.216.34:443", "tcp", "outgoing"),
            ("0.0.0.0:53", "*:*", "udp", "listening"),
        ]);
        let parsed = parse_packet(&encode_packet(&report)).expect("parse");

        assert_eq!(parsed.header, report.header);
        assert_eq!(parsed.template, report.template);
        assert_eq!(parsed.flows.len(), 2);
        for (parsed, original) in parsed.flows.iter().zip(&report.flows) {
            let mut original = original.clone();
            original.meta = None;
            assert_eq!(parsed, &original);
        }
        assert_eq!(parsed.statistics.protocols, report.statistics.protocols);
    }

    #[test]
    fn counters_saturate_at_field_width() {
        let mut report = report(&[("10.0.0.1:40000", "10.0.0.2:443", "tcp", "outgoing")]);
        report.flows[0].packet_count = u64::from(u32::MAX) + 10;
        let parsed = parse_packet(&encode_packet(&report)).expect("parse");
        assert_eq!(parsed.flows[0].packet_count, u64::from(u32::MAX));
    }

    #[test]
    fn ipv6_is_lost_on_the_wire() {
        let report = report(&[("[fe80::1]:5353", "[fe80::2]:40000", "udp", "incoming")]);
        let parsed = parse_packet(&encode_packet(&report)).expect("parse");
        let decoded = decode(&parsed);
        let rec = decoded.records().next().expect("record");
        assert_eq!(rec.local.address, "0.0.0.0");
        assert_eq!(rec.remote.address, "0.0.0.0");
    }

    #[test]
    fn rejects_truncated_and_foreign_packets() {
        let report = report(&[("10.0.0.1:40000", "10.0.0.2:443", "tcp", "outgoing")]);
        let bytes = encode_packet(&report);

        assert!(parse_packet(&bytes[..10]).is_err());
        assert!(parse_packet(&bytes[..bytes.len() - 8]).is_err());

        let mut v5 = bytes.clone();
        v5[1] = 5;
        assert!(parse_packet(&v5).is_err());
    }

    #[test]
    fn skips_data_without_template() {
        let mut bytes = Vec::new();
        write_header(
            &mut bytes,
            &MessageHeader {
                version: 9,
                record_count: 1,
                sys_uptime_ms: 0,
                unix_secs: 0,
                sequence_number: 0,
                source_id: 1,
            },
        );
        bytes.extend_from_slice(&300_u16.to_be_bytes());
        bytes.extend_from_slice(&8_u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 4]);
        let parsed = parse_packet(&bytes).expect("parse");
        assert!(parsed.flows.is_empty());
    }
}
