//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default tracking cache capacity (number of relationships).
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default retention window for tracked relationships, in seconds.
pub const DEFAULT_RETENTION_SECS: u64 = 3600;

/// Share of the capacity dropped when the cache overflows, in percent.
pub const DEFAULT_EVICTION_PERCENT: u8 = 20;

/// Ports that identify the local side as a server even above 1024.
pub const WELL_KNOWN_SERVER_PORTS: &[u16] = &[
    22, 80, 443, 993, 995, 143, 110, 25, 587, 465, 53, 8080, 8443, 3306, 5432, 6379, 27017,
];

/// Highest port number treated as a privileged (system) port.
pub const PRIVILEGED_PORT_MAX: u16 = 1024;

/// Ports above this value are assumed to be ephemeral client ports.
pub const EPHEMERAL_PORT_MIN: u16 = 32768;

/// Service names that collectors print instead of numeric ports.
pub const SERVICE_PORTS: &[(&str, u16)] = &[
    ("https", 443),
    ("http", 80),
    ("ssh", 22),
    ("imaps", 993),
    ("imap", 143),
    ("smtp", 25),
    ("pop3", 110),
    ("pop3s", 995),
    ("ftp", 21),
];

/// Remote addresses that stand for "no remote peer".
pub const PSEUDO_ADDRESSES: &[&str] = &["*", "", "0.0.0.0", "None"];

/// Default local addresses excluded from tracking.
pub const DEFAULT_LOCAL_ADDRESSES: &[&str] = &["127.0.0.1", "::1", "::ffff:127.0.1"];

/// NetFlow export format version.
pub const NETFLOW_VERSION: u16 = 9;

/// Template identifier of the fixed flow template.
pub const DEFAULT_TEMPLATE_ID: u16 = 256;

/// Default observation domain (source id) of the exporter.
pub const DEFAULT_OBSERVATION_DOMAIN_ID: u32 = 1;

/// Placeholder bytes-per-packet estimate used for `IN_BYTES`.
pub const ESTIMATED_BYTES_PER_PACKET: u64 = 1024;

/// Fallback flow duration when no timestamps can be parsed, in seconds.
pub const DEFAULT_FLOW_WINDOW_SECS: i64 = 300;

/// TCP flags reported for TCP flows (ACK + PSH).
pub const TCP_FLAGS_ACK_PSH: u8 = 0x18;

/// SNMP index reported as the input interface.
pub const DEFAULT_INPUT_INTERFACE: u16 = 1;

/// SNMP index reported as the output interface.
pub const DEFAULT_OUTPUT_INTERFACE: u16 = 2;

/// Human-readable timestamp format used in export documents.
pub const EXPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Alternate day-first timestamp format written by the collectors.
pub const COLLECTOR_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "sockflow";

/// Default base directory for sockflow data on a system install.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/sockflow";

/// Returns the data directory, preferring `$HOME/.sockflow` and falling
/// back to `/var/lib/sockflow`.
fn resolve_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".sockflow");
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Returns the default tracking state file path.
pub fn default_state_file() -> PathBuf {
    data_dir().join("tracking.json")
}

/// Looks up a service name in [`SERVICE_PORTS`].
#[must_use]
pub fn service_port(name: &str) -> Option<u16> {
    SERVICE_PORTS
        .iter()
        .find(|(service, _)| *service == name)
        .map(|&(_, port)| port)
}

/// Returns whether `address` is a placeholder rather than a real peer.
#[must_use]
pub fn is_pseudo_address(address: &str) -> bool {
    PSEUDO_ADDRESSES.contains(&address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_port_known_names() {
        assert_eq!(service_port("https"), Some(443));
        assert_eq!(service_port("pop3s"), Some(995));
        assert_eq!(service_port("gopher"), None);
    }

    #[test]
    fn pseudo_addresses_are_recognized() {
        assert!(is_pseudo_address("*"));
        assert!(is_pseudo_address(""));
        assert!(is_pseudo_address("0.0.0.0"));
        assert!(!is_pseudo_address("10.0.0.1"));
    }

    #[test]
    fn default_state_file_lives_in_data_dir() {
        assert!(default_state_file().starts_with(data_dir()));
        assert!(default_state_file().ends_with("tracking.json"));
    }
}
