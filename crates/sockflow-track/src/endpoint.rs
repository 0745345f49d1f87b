//! Endpoint normalization.
//!
//! Collectors print endpoints as `ip:port`, `[ipv6]:port`, bare IPv6
//! addresses, or with a service name in place of the port. [`Endpoint::parse`]
//! absorbs all of these into one canonical value and never fails.

use std::fmt;
use std::net::Ipv4Addr;

use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_until},
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res},
    sequence::delimited,
};
use serde::{Deserialize, Serialize};
use sockflow_common::constants;
use sockflow_common::types::AddressFamily;

/// A canonical `(address, port, family)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Address text, preserved verbatim (including `*` placeholders).
    pub address: String,
    /// Port number, `0` when absent or unresolvable.
    pub port: u16,
    /// Address family inferred from the textual form.
    pub family: AddressFamily,
}

impl Endpoint {
    /// Creates an endpoint from its parts.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16, family: AddressFamily) -> Self {
        Self {
            address: address.into(),
            port,
            family,
        }
    }

    /// Parses a collector endpoint string.
    ///
    /// Rules, in order:
    /// 1. `[addr]:port` is IPv6 with a port.
    /// 2. A single `:` separates an IPv4 address from its port.
    /// 3. With several `:`, a trailing integer is the port of an IPv6
    ///    address; otherwise the whole text is a bare IPv6 address.
    /// 4. Non-numeric port tokens go through the service-name table.
    ///
    /// Anything else is returned as-is with port `0` and an unknown family.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Ok((port_token, address)) = bracketed_address(raw) {
            return Self::new(address, resolve_port(port_token), AddressFamily::Ipv6);
        }

        match raw.matches(':').count() {
            0 => Self::new(raw, 0, AddressFamily::Unknown),
            1 => {
                let (address, port_token) = raw.split_once(':').unwrap_or((raw, ""));
                Self::new(address, resolve_port(port_token), AddressFamily::Ipv4)
            }
            _ => {
                let (head, tail) = raw.rsplit_once(':').unwrap_or((raw, ""));
                match numeric_port(tail) {
                    Some(port) => Self::new(head, port, AddressFamily::Ipv6),
                    None => Self::new(
                        raw.trim_start_matches('[').trim_end_matches(']'),
                        0,
                        AddressFamily::Ipv6,
                    ),
                }
            }
        }
    }

    /// Returns whether the address is a placeholder (`*`, empty, `0.0.0.0`)
    /// rather than a real peer.
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        constants::is_pseudo_address(&self.address)
    }

    /// Returns the address as IPv4, if it is a dotted quad.
    #[must_use]
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.address.parse().ok()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            AddressFamily::Ipv6 => write!(f, "[{}]:{}", self.address, self.port),
            AddressFamily::Ipv4 if self.address == "*" && self.port == 0 => f.write_str("*:*"),
            AddressFamily::Ipv4 => write!(f, "{}:{}", self.address, self.port),
            AddressFamily::Unknown => f.write_str(&self.address),
        }
    }
}

/// Matches `[addr]:` and returns the address plus the remaining port token.
fn bracketed_address(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_until("]:"), tag("]:")).parse(input)
}

/// Parses a port token consisting only of digits that fits in `u16`.
fn numeric_port(token: &str) -> Option<u16> {
    let parsed: IResult<&str, u16> =
        all_consuming(map_res(digit1, |digits: &str| digits.parse::<u16>())).parse(token);
    parsed.ok().map(|(_, port)| port)
}

/// Resolves a port token, falling back to service names and then `0`.
fn resolve_port(token: &str) -> u16 {
    numeric_port(token)
        .or_else(|| constants::service_port(token))
        .unwrap_or(0)
}
