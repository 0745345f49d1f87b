//! Raw collector observations and pre-cache filtering.
//!
//! Every OS-specific collector (netstat, lsof, ss, /proc) emits the same
//! plain-string [`RawObservation`]. Normalization into [`Observation`] is
//! the single place where their differences are absorbed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sockflow_common::config::FilterConfig;
use sockflow_common::types::{AddressFamily, Direction, Protocol};

use crate::endpoint::Endpoint;
use crate::record::UNKNOWN_PROCESS;

/// One socket row as reported by a collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Local endpoint text.
    pub local: String,
    /// Remote endpoint text (`*:*` for listening sockets).
    #[serde(default)]
    pub remote: String,
    /// Protocol name (`tcp`, `udp`, `icmp`).
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Collector's direction tag.
    #[serde(default, alias = "direction")]
    pub direction_hint: String,
    /// Owning process, if the collector could attribute it.
    #[serde(default = "default_process")]
    pub process: String,
}

fn default_protocol() -> String {
    Protocol::Tcp.as_str().to_owned()
}

fn default_process() -> String {
    UNKNOWN_PROCESS.to_owned()
}

impl RawObservation {
    /// Creates a raw observation from collector strings.
    #[must_use]
    pub fn new(
        local: impl Into<String>,
        remote: impl Into<String>,
        protocol: impl Into<String>,
        direction_hint: impl Into<String>,
        process: impl Into<String>,
    ) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            protocol: protocol.into(),
            direction_hint: direction_hint.into(),
            process: process.into(),
        }
    }

    /// Parses both endpoints and the protocol/direction tags.
    #[must_use]
    pub fn normalize(&self) -> Observation {
        let process = self.process.trim();
        Observation {
            local: Endpoint::parse(&self.local),
            remote: Endpoint::parse(&self.remote),
            protocol: Protocol::from_name(&self.protocol),
            direction: Direction::from_hint(&self.direction_hint),
            process: if process.is_empty() {
                UNKNOWN_PROCESS.to_owned()
            } else {
                process.to_owned()
            },
        }
    }
}

/// A normalized observation, ready for the tracking cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Local endpoint.
    pub local: Endpoint,
    /// Remote endpoint.
    pub remote: Endpoint,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Collector's direction tag.
    pub direction: Direction,
    /// Owning process or `"unknown"`.
    pub process: String,
}

/// Drops observations the report should not contain.
#[derive(Debug, Clone, Default)]
pub struct ObservationFilter {
    except_local: bool,
    except_ipv6: bool,
    local_addresses: HashSet<String>,
}

impl ObservationFilter {
    /// Builds a filter from configuration.
    #[must_use]
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            except_local: config.except_local_connections,
            except_ipv6: config.except_ipv6,
            local_addresses: config.local_addresses.iter().cloned().collect(),
        }
    }

    /// A filter that accepts everything.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Returns whether the observation should be tracked.
    ///
    /// Listening sockets and other placeholder remotes are never treated
    /// as local traffic.
    #[must_use]
    pub fn allows(&self, observation: &Observation) -> bool {
        if self.except_ipv6
            && (observation.local.family == AddressFamily::Ipv6
                || observation.remote.family == AddressFamily::Ipv6)
        {
            return false;
        }
        if self.except_local
            && !observation.remote.is_pseudo()
            && self.local_addresses.contains(&observation.remote.address)
        {
            return false;
        }
        true
    }
}
