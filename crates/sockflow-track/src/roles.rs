//! Client/server role inference.
//!
//! NetFlow expects the flow source to be the initiator. Collectors tag
//! direction unreliably, so port heuristics take precedence over the tag.

use sockflow_common::constants::{EPHEMERAL_PORT_MIN, PRIVILEGED_PORT_MAX, WELL_KNOWN_SERVER_PORTS};
use sockflow_common::types::{Direction, Protocol};

use crate::endpoint::Endpoint;

/// Flow orientation chosen by [`resolve_roles`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoles {
    /// Flow source (the initiator).
    pub src: Endpoint,
    /// Flow destination (the server).
    pub dst: Endpoint,
    /// `Incoming` when the local side serves, `Outgoing` otherwise.
    pub direction: Direction,
    /// Whether the local endpoint was judged to be the server.
    pub local_is_server: bool,
}

/// Which rule decided the local role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    LocalPrivileged,
    LocalWellKnown,
    RemoteService,
    LocalEphemeral,
    Tag,
}

fn is_service_port(port: u16) -> bool {
    port <= PRIVILEGED_PORT_MAX || WELL_KNOWN_SERVER_PORTS.contains(&port)
}

fn local_role(local: &Endpoint, remote: &Endpoint, tagged: Direction) -> (bool, Rule) {
    if local.port <= PRIVILEGED_PORT_MAX {
        (true, Rule::LocalPrivileged)
    } else if WELL_KNOWN_SERVER_PORTS.contains(&local.port) {
        (true, Rule::LocalWellKnown)
    } else if is_service_port(remote.port) {
        (false, Rule::RemoteService)
    } else if local.port > EPHEMERAL_PORT_MIN {
        (false, Rule::LocalEphemeral)
    } else {
        (matches!(tagged, Direction::Incoming | Direction::Listening), Rule::Tag)
    }
}

/// Decides which endpoint is the server and orients the flow.
///
/// First matching rule wins:
/// 1. local port `<= 1024`: local serves.
/// 2. local port is a well-known server port: local serves.
/// 3. remote port `<= 1024` or well-known: remote serves.
/// 4. local port `> 32768`: local is a client.
/// 5. otherwise the collector tag decides (`Incoming` and `Listening`
///    mean local serves).
///
/// Port `0` (ICMP, unresolved services) counts as privileged.
#[must_use]
pub fn resolve_roles(
    local: &Endpoint,
    remote: &Endpoint,
    protocol: Protocol,
    tagged: Direction,
) -> ResolvedRoles {
    let (local_is_server, rule) = local_role(local, remote, tagged);
    tracing::trace!(
        %local,
        %remote,
        %protocol,
        ?rule,
        local_is_server,
        "roles resolved"
    );

    if local_is_server {
        ResolvedRoles {
            src: remote.clone(),
            dst: local.clone(),
            direction: Direction::Incoming,
            local_is_server,
        }
    } else {
        ResolvedRoles {
            src: local.clone(),
            dst: remote.clone(),
            direction: Direction::Outgoing,
            local_is_server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(local: &str, remote: &str, tagged: Direction) -> ResolvedRoles {
        resolve_roles(
            &Endpoint::parse(local),
            &Endpoint::parse(remote),
            Protocol::Tcp,
            tagged,
        )
    }

    #[test]
    fn server_port_overrides_stale_tag() {
        let roles = resolve("10.0.0.1:443", "203.0.113.9:51000", Direction::Outgoing);
        assert_eq!(roles.direction, Direction::Incoming);
        assert_eq!(roles.src.port, 51000);
        assert_eq!(roles.dst.port, 443);
        assert!(roles.local_is_server);
    }

    #[test]
    fn client_to_https_is_outgoing() {
        let roles = resolve("192.168.1.10:51000", "93.184.216.34:443", Direction::Outgoing);
        assert_eq!(roles.direction, Direction::Outgoing);
        assert_eq!(roles.src.address, "192.168.1.10");
        assert_eq!(roles.dst.port, 443);
    }

    #[test]
    fn well_known_local_port_above_1024_serves() {
        let roles = resolve("10.0.0.1:5432", "10.0.0.7:2000", Direction::Outgoing);
        assert!(roles.local_is_server);
    }

    #[test]
    fn local_well_known_beats_remote_privileged() {
        let roles = resolve("10.0.0.1:8080", "10.0.0.7:80", Direction::Outgoing);
        assert!(roles.local_is_server);
    }

    #[test]
    fn remote_service_beats_incoming_tag() {
        let roles = resolve("10.0.0.1:20000", "10.0.0.7:6379", Direction::Incoming);
        assert_eq!(roles.direction, Direction::Outgoing);
    }

    #[test]
    fn ephemeral_local_port_is_client() {
        let roles = resolve("10.0.0.1:40000", "10.0.0.7:20000", Direction::Incoming);
        assert!(!roles.local_is_server);
    }

    #[test]
    fn falls_back_to_tag() {
        let incoming = resolve("10.0.0.1:20000", "10.0.0.7:20001", Direction::Incoming);
        assert!(incoming.local_is_server);
        let outgoing = resolve("10.0.0.1:20000", "10.0.0.7:20001", Direction::Outgoing);
        assert!(!outgoing.local_is_server);
    }

    #[test]
    fn listening_socket_serves() {
        let roles = resolve("0.0.0.0:53", "*:*", Direction::Listening);
        assert!(roles.local_is_server);
        assert_eq!(roles.src.address, "*");
        assert_eq!(roles.dst.port, 53);
    }

    #[test]
    fn icmp_port_zero_counts_as_privileged() {
        let roles = resolve_roles(
            &Endpoint::parse("10.0.0.1"),
            &Endpoint::parse("8.8.8.8"),
            Protocol::Icmp,
            Direction::Outgoing,
        );
        assert!(roles.local_is_server);
    }
}
