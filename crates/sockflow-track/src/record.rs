//! Canonical connection records held by the tracking cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sockflow_common::types::{Direction, Protocol};

use crate::endpoint::Endpoint;

/// Process name used when a collector cannot attribute a socket.
pub const UNKNOWN_PROCESS: &str = "unknown";

/// A deduplicated connection relationship.
///
/// One record exists per key. `first_seen <= last_seen` and
/// `occurrence_count >= 1` hold for every record the cache hands out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Composite relationship key, see [`relationship_key`].
    pub key: String,
    /// Local side as first observed.
    pub local: Endpoint,
    /// Remote side as first observed.
    pub remote: Endpoint,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Direction tag supplied by the collector.
    pub direction: Direction,
    /// Owning process, best effort.
    pub process: String,
    /// First time the relationship was observed.
    pub first_seen: DateTime<Utc>,
    /// Most recent observation.
    pub last_seen: DateTime<Utc>,
    /// Number of observations folded into this record.
    pub occurrence_count: u64,
}

impl ConnectionRecord {
    /// Creates a record for a first observation at `now`.
    #[must_use]
    pub fn first_observation(
        local: Endpoint,
        remote: Endpoint,
        protocol: Protocol,
        direction: Direction,
        process: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: relationship_key(&local, &remote, protocol, direction),
            local,
            remote,
            protocol,
            direction,
            process: process.into(),
            first_seen: now,
            last_seen: now,
            occurrence_count: 1,
        }
    }

    /// Folds a repeated observation into the record.
    ///
    /// The process name only replaces a previously unknown one.
    pub fn touch(&mut self, process: &str, now: DateTime<Utc>) {
        self.last_seen = now.max(self.first_seen);
        self.occurrence_count = self.occurrence_count.saturating_add(1);
        if self.process == UNKNOWN_PROCESS && process != UNKNOWN_PROCESS && !process.is_empty() {
            self.process = process.to_owned();
        }
    }

    /// Restores the record invariants after loading untrusted data.
    pub fn repair(&mut self) {
        if self.first_seen > self.last_seen {
            std::mem::swap(&mut self.first_seen, &mut self.last_seen);
        }
        if self.occurrence_count == 0 {
            self.occurrence_count = 1;
        }
        if self.process.is_empty() {
            UNKNOWN_PROCESS.clone_into(&mut self.process);
        }
        self.key = relationship_key(&self.local, &self.remote, self.protocol, self.direction);
    }
}

/// Builds the composite key of a relationship.
///
/// The key drops the ephemeral side: incoming relationships
/// ignore the remote port, outgoing ones ignore the local port, and
/// listening sockets have no remote at all.
#[must_use]
pub fn relationship_key(
    local: &Endpoint,
    remote: &Endpoint,
    protocol: Protocol,
    direction: Direction,
) -> String {
    match direction {
        Direction::Incoming => format!(
            "{}:{}-{}:{protocol}",
            local.address, local.port, remote.address
        ),
        Direction::Outgoing => format!(
            "{}-{}:{}:{protocol}",
            local.address, remote.address, remote.port
        ),
        Direction::Listening => format!("{}:{}->*:{protocol}", local.address, local.port),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn incoming_key_ignores_remote_port() {
        let local = Endpoint::parse("10.0.0.1:22");
        let a = relationship_key(
            &local,
            &Endpoint::parse("203.0.113.9:50001"),
            Protocol::Tcp,
            Direction::Incoming,
        );
        let b = relationship_key(
            &local,
            &Endpoint::parse("203.0.113.9:50002"),
            Protocol::Tcp,
            Direction::Incoming,
        );
        assert_eq!(a, b);
        assert_eq!(a, "10.0.0.1:22-203.0.113.9:tcp");
    }

    #[test]
    fn outgoing_key_ignores_local_port() {
        let remote = Endpoint::parse("93.184.216.34:443");
        let a = relationship_key(
            &Endpoint::parse("192.168.1.10:50001"),
            &remote,
            Protocol::Tcp,
            Direction::Outgoing,
        );
        let b = relationship_key(
            &Endpoint::parse("192.168.1.10:50002"),
            &remote,
            Protocol::Tcp,
            Direction::Outgoing,
        );
        assert_eq!(a, b);
        assert_eq!(a, "192.168.1.10-93.184.216.34:443:tcp");
    }

    #[test]
    fn listening_key_has_wildcard_remote() {
        let key = relationship_key(
            &Endpoint::parse("0.0.0.0:53"),
            &Endpoint::parse("*:*"),
            Protocol::Udp,
            Direction::Listening,
        );
        assert_eq!(key, "0.0.0.0:53->*:udp");
    }

    #[test]
    fn protocol_distinguishes_keys() {
        let local = Endpoint::parse("10.0.0.1:53");
        let remote = Endpoint::parse("10.0.0.2:40000");
        assert_ne!(
            relationship_key(&local, &remote, Protocol::Tcp, Direction::Incoming),
            relationship_key(&local, &remote, Protocol::Udp, Direction::Incoming)
        );
    }

    #[test]
    fn touch_fills_unknown_process_only() {
        let mut rec = ConnectionRecord::first_observation(
            Endpoint::parse("10.0.0.1:40000"),
            Endpoint::parse("10.0.0.2:443"),
            Protocol::Tcp,
            Direction::Outgoing,
            UNKNOWN_PROCESS,
            at(100),
        );
        rec.touch("curl", at(110));
        assert_eq!(rec.process, "curl");
        rec.touch("wget", at(120));
        assert_eq!(rec.process, "curl");
        assert_eq!(rec.occurrence_count, 3);
        assert_eq!(rec.first_seen, at(100));
        assert_eq!(rec.last_seen, at(120));
    }

    #[test]
    fn touch_never_moves_last_seen_before_first_seen() {
        let mut rec = ConnectionRecord::first_observation(
            Endpoint::parse("10.0.0.1:40000"),
            Endpoint::parse("10.0.0.2:443"),
            Protocol::Tcp,
            Direction::Outgoing,
            "curl",
            at(100),
        );
        rec.touch("curl", at(50));
        assert_eq!(rec.last_seen, at(100));
    }

    #[test]
    fn repair_restores_invariants() {
        let mut rec = ConnectionRecord::first_observation(
            Endpoint::parse("10.0.0.1:40000"),
            Endpoint::parse("10.0.0.2:443"),
            Protocol::Tcp,
            Direction::Outgoing,
            "",
            at(100),
        );
        rec.last_seen = at(10);
        rec.occurrence_count = 0;
        rec.key = "garbage".into();
        rec.repair();

        assert!(rec.first_seen <= rec.last_seen);
        assert_eq!(rec.occurrence_count, 1);
        assert_eq!(rec.process, UNKNOWN_PROCESS);
        assert_eq!(rec.key, "10.0.0.1-10.0.0.2:443:tcp");
    }
}
