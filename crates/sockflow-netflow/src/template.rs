//! NetFlow v9 field types and the flow template.

use std::fmt;

/// NetFlow v9 field types 1 through 30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FieldType {
    InBytes,
    InPkts,
    Flows,
    Protocol,
    SrcTos,
    TcpFlags,
    L4SrcPort,
    Ipv4SrcAddr,
    SrcMask,
    InputSnmp,
    L4DstPort,
    Ipv4DstAddr,
    DstMask,
    OutputSnmp,
    Ipv4NextHop,
    SrcAs,
    DstAs,
    BgpIpv4NextHop,
    MulDstPkts,
    MulDstBytes,
    LastSwitched,
    FirstSwitched,
    OutBytes,
    OutPkts,
    MinPktLngth,
    MaxPktLngth,
    Ipv6SrcAddr,
    Ipv6DstAddr,
    Ipv6SrcMask,
    Ipv6DstMask,
}

/// `(type, code, default length, name)` for every supported field.
const FIELD_TABLE: [(FieldType, u16, u16, &str); 30] = [
    (FieldType::InBytes, 1, 4, "IN_BYTES"),
    (FieldType::InPkts, 2, 4, "IN_PKTS"),
    (FieldType::Flows, 3, 4, "FLOWS"),
    (FieldType::Protocol, 4, 1, "PROTOCOL"),
    (FieldType::SrcTos, 5, 1, "SRC_TOS"),
    (FieldType::TcpFlags, 6, 1, "TCP_FLAGS"),
    (FieldType::L4SrcPort, 7, 2, "L4_SRC_PORT"),
    (FieldType::Ipv4SrcAddr, 8, 4, "IPV4_SRC_ADDR"),
    (FieldType::SrcMask, 9, 1, "SRC_MASK"),
    (FieldType::InputSnmp, 10, 2, "INPUT_SNMP"),
    (FieldType::L4DstPort, 11, 2, "L4_DST_PORT"),
    (FieldType::Ipv4DstAddr, 12, 4, "IPV4_DST_ADDR"),
    (FieldType::DstMask, 13, 1, "DST_MASK"),
    (FieldType::OutputSnmp, 14, 2, "OUTPUT_SNMP"),
    (FieldType::Ipv4NextHop, 15, 4, "IPV4_NEXT_HOP"),
    (FieldType::SrcAs, 16, 2, "SRC_AS"),
    (FieldType::DstAs, 17, 2, "DST_AS"),
    (FieldType::BgpIpv4NextHop, 18, 4, "BGP_IPV4_NEXT_HOP"),
    (FieldType::MulDstPkts, 19, 4, "MUL_DST_PKTS"),
    (FieldType::MulDstBytes, 20, 4, "MUL_DST_BYTES"),
    (FieldType::LastSwitched, 21, 4, "LAST_SWITCHED"),
    (FieldType::FirstSwitched, 22, 4, "FIRST_SWITCHED"),
    (FieldType::OutBytes, 23, 4, "OUT_BYTES"),
    (FieldType::OutPkts, 24, 4, "OUT_PKTS"),
    (FieldType::MinPktLngth, 25, 2, "MIN_PKT_LNGTH"),
    (FieldType::MaxPktLngth, 26, 2, "MAX_PKT_LNGTH"),
    (FieldType::Ipv6SrcAddr, 27, 16, "IPV6_SRC_ADDR"),
    (FieldType::Ipv6DstAddr, 28, 16, "IPV6_DST_ADDR"),
    (FieldType::Ipv6SrcMask, 29, 1, "IPV6_SRC_MASK"),
    (FieldType::Ipv6DstMask, 30, 1, "IPV6_DST_MASK"),
];

impl FieldType {
    fn entry(self) -> (FieldType, u16, u16, &'static str) {
        // Table rows are in declaration order.
        FIELD_TABLE[self as usize]
    }

    /// Field type code on the wire.
    #[must_use]
    pub fn code(self) -> u16 {
        self.entry().1
    }

    /// Default field length in bytes.
    #[must_use]
    pub fn default_length(self) -> u16 {
        self.entry().2
    }

    /// RFC 3954 field name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.entry().3
    }

    /// Looks up a field type by its wire code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        FIELD_TABLE
            .iter()
            .find(|(_, c, _, _)| *c == code)
            .map(|&(field, ..)| field)
    }

    /// Looks up a field type by its RFC 3954 name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        FIELD_TABLE
            .iter()
            .find(|(_, _, _, n)| *n == name)
            .map(|&(field, ..)| field)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fields of the flow template, in record order.
pub const FLOW_TEMPLATE_FIELDS: [FieldType; 12] = [
    FieldType::Ipv4SrcAddr,
    FieldType::Ipv4DstAddr,
    FieldType::L4SrcPort,
    FieldType::L4DstPort,
    FieldType::Protocol,
    FieldType::InPkts,
    FieldType::InBytes,
    FieldType::FirstSwitched,
    FieldType::LastSwitched,
    FieldType::TcpFlags,
    FieldType::InputSnmp,
    FieldType::OutputSnmp,
];

/// One `(type, length)` entry of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateField {
    /// Field type.
    pub field_type: FieldType,
    /// Field length in bytes.
    pub length: u16,
}

/// Ordered field layout of data records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    /// Template identifier (`>= 256`).
    pub template_id: u16,
    /// Fields in record order.
    pub fields: Vec<TemplateField>,
}

impl TemplateRecord {
    /// Builds the fixed 12-field flow template.
    #[must_use]
    pub fn flow_template(template_id: u16) -> Self {
        Self {
            template_id,
            fields: FLOW_TEMPLATE_FIELDS
                .iter()
                .map(|&field_type| TemplateField {
                    field_type,
                    length: field_type.default_length(),
                })
                .collect(),
        }
    }

    /// Number of fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Length of one data record in bytes.
    #[must_use]
    pub fn record_length(&self) -> usize {
        self.fields.iter().map(|f| usize::from(f.length)).sum()
    }
}
