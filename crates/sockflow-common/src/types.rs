//! Domain primitive types used across the sockflow workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol of an observed socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Transmission Control Protocol.
    Tcp,
    /// User Datagram Protocol.
    Udp,
    /// Internet Control Message Protocol (raw sockets).
    Icmp,
}

impl Protocol {
    /// Parses a collector protocol string, case-insensitively.
    ///
    /// Unknown names fall back to TCP, matching the collectors' default.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "udp" | "udp4" | "udp6" => Self::Udp,
            "icmp" | "icmp6" | "icmpv6" => Self::Icmp,
            _ => Self::Tcp,
        }
    }

    /// Maps an IANA protocol number back to a protocol, if known.
    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Icmp),
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    /// IANA protocol number carried in the NetFlow `PROTOCOL` field.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    /// Lowercase protocol name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the local socket in a relationship, as tagged by a collector
/// or as resolved for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// A remote peer connected to a local service.
    Incoming,
    /// The local host connected to a remote service.
    Outgoing,
    /// A local socket waiting for peers, with no remote side.
    Listening,
}

impl Direction {
    /// Parses a collector direction hint. Unknown hints are treated as
    /// outgoing.
    #[must_use]
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "incoming" | "inbound" | "in" => Self::Incoming,
            "listening" | "listen" => Self::Listening,
            _ => Self::Outgoing,
        }
    }

    /// Lowercase direction name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Listening => "listening",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family of a parsed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Dotted-quad `addr:port` form.
    Ipv4,
    /// Bracketed or multi-colon form.
    Ipv6,
    /// The input could not be classified.
    #[default]
    Unknown,
}

impl AddressFamily {
    /// IP version number used in export metadata (`0` when unknown).
    #[must_use]
    pub const fn version(self) -> u8 {
        match self {
            Self::Ipv4 => 4,
            Self::Ipv6 => 6,
            Self::Unknown => 0,
        }
    }

    /// Inverse of [`AddressFamily::version`].
    #[must_use]
    pub const fn from_version(version: u8) -> Self {
        match version {
            4 => Self::Ipv4,
            6 => Self::Ipv6,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "ipv4"),
            Self::Ipv6 => write!(f, "ipv6"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_names_are_case_insensitive() {
        assert_eq!(Protocol::from_name("UDP"), Protocol::Udp);
        assert_eq!(Protocol::from_name(" icmp "), Protocol::Icmp);
        assert_eq!(Protocol::from_name("tcp6"), Protocol::Tcp);
        assert_eq!(Protocol::from_name("sctp"), Protocol::Tcp);
    }

    #[test]
    fn protocol_numbers_round_trip() {
        for proto in [Protocol::Tcp, Protocol::Udp, Protocol::Icmp] {
            assert_eq!(Protocol::from_number(proto.number()), Some(proto));
        }
        assert_eq!(Protocol::from_number(47), None);
    }

    #[test]
    fn direction_hint_defaults_to_outgoing() {
        assert_eq!(Direction::from_hint("incoming"), Direction::Incoming);
        assert_eq!(Direction::from_hint("LISTEN"), Direction::Listening);
        assert_eq!(Direction::from_hint("sideways"), Direction::Outgoing);
    }

    #[test]
    fn direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Listening).expect("serialize");
        assert_eq!(json, "\"listening\"");
    }

    #[test]
    fn address_family_version_mapping() {
        assert_eq!(AddressFamily::Ipv6.version(), 6);
        assert_eq!(AddressFamily::from_version(4), AddressFamily::Ipv4);
        assert_eq!(AddressFamily::from_version(9), AddressFamily::Unknown);
    }
}
