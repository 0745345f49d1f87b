//! Formatted output helpers for CLI commands.
//!
//! Provides the shared relationship table and human-readable byte and
//! port-list formatting.

use sockflow_netflow::timestamp::format_time;
use sockflow_track::record::ConnectionRecord;

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a port list as `22, 53, 443`, or `-` when empty.
#[must_use]
pub fn format_ports(ports: &[u16]) -> String {
    if ports.is_empty() {
        return "-".to_owned();
    }
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Prints relationships as a table.
pub fn print_records<'a>(records: impl IntoIterator<Item = &'a ConnectionRecord>) {
    println!(
        "{:<42} {:<42} {:<6} {:<10} {:<16} {:<7} {:<20}",
        "LOCAL", "REMOTE", "PROTO", "DIRECTION", "PROCESS", "COUNT", "LAST SEEN"
    );
    for r in records {
        println!(
            "{:<42} {:<42} {:<6} {:<10} {:<16} {:<7} {:<20}",
            r.local.to_string(),
            r.remote.to_string(),
            r.protocol.as_str(),
            r.direction.as_str(),
            r.process,
            r.occurrence_count,
            format_time(r.last_seen)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_displays_bytes() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_displays_kib() {
        assert_eq!(format_bytes(2048), "2.0 KiB");
    }

    #[test]
    fn format_bytes_displays_mib() {
        assert_eq!(format_bytes(134_217_728), "128.0 MiB");
    }

    #[test]
    fn format_bytes_displays_gib() {
        assert_eq!(format_bytes(2_147_483_648), "2.0 GiB");
    }

    #[test]
    fn format_ports_joins_in_order() {
        assert_eq!(format_ports(&[22, 53, 443]), "22, 53, 443");
    }

    #[test]
    fn format_ports_marks_empty() {
        assert_eq!(format_ports(&[]), "-");
    }
}
