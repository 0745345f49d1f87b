//! End-to-end tests for the tracking and export pipeline.
//!
//! These tests drive the full path:
//! 1. Raw collector observations through the filter and cache
//! 2. Encoding the cache into a NetFlow v9 report
//! 3. Rendering the YAML document and parsing it back
//! 4. Decoding connections from the document
//! 5. Binary packet export

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};
use sockflow_common::config::{FilterConfig, TrackerConfig};
use sockflow_common::types::Direction;
use sockflow_netflow::decoder::{decode, decode_document};
use sockflow_netflow::document::NetflowDocument;
use sockflow_netflow::encoder::NetflowEncoder;
use sockflow_netflow::report::ReportContext;
use sockflow_netflow::wire::{encode_packet, parse_packet};
use sockflow_track::cache::TrackingCache;
use sockflow_track::observation::{ObservationFilter, RawObservation};
use sockflow_track::state::{load_cache, save_cache};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("valid timestamp")
}

fn raw(local: &str, remote: &str, protocol: &str, direction: &str, process: &str) -> RawObservation {
    RawObservation::new(local, remote, protocol, direction, process)
}

fn sample_batch() -> Vec<RawObservation> {
    vec![
        raw("192.168.1.10:51000", "93.184.216.34:443", "tcp", "outgoing", "firefox"),
        raw("192.168.1.10:51002", "140.82.112.3:443", "tcp", "outgoing", "git"),
        raw("192.168.1.10:22", "203.0.113.5:50123", "tcp", "incoming", "sshd"),
        raw("0.0.0.0:53", "*:*", "udp", "listening", "dnsmasq"),
        raw("[fe80::1]:5353", "*:*", "udp", "listening", "avahi-daemon"),
    ]
}

// ── Tracking ─────────────────────────────────────────────────────────

#[test]
fn repeated_cycles_fold_into_stable_relationships() {
    let mut cache = TrackingCache::from_config(&TrackerConfig::default());
    let filter = ObservationFilter::from_config(&FilterConfig::default());

    for cycle in 0..4 {
        let summary = cache.observe_batch(&sample_batch(), &filter, at(cycle * 10));
        assert_eq!(summary.observed, 5);
        if cycle == 0 {
            assert_eq!(summary.new, 5);
        } else {
            assert_eq!(summary.updated, 5);
        }
    }

    assert_eq!(cache.len(), 5);
    for record in cache.records() {
        assert_eq!(record.occurrence_count, 4);
        assert_eq!(record.first_seen, at(0));
        assert_eq!(record.last_seen, at(30));
    }
}

#[test]
fn eviction_bound_holds_across_batches() {
    let config = TrackerConfig {
        capacity: 50,
        ..TrackerConfig::default()
    };
    let mut cache = TrackingCache::from_config(&config);
    let filter = ObservationFilter::permissive();

    for i in 0..75_i64 {
        let batch = [raw(
            "10.0.0.1:40000",
            &format!("10.8.{}.{}:443", i / 200, i % 200),
            "tcp",
            "outgoing",
            "curl",
        )];
        let _ = cache.observe_batch(&batch, &filter, at(i));
        assert!(cache.len() <= 50);
    }

    // The newest relationship always survives its own batch.
    let newest = cache.recent(Direction::Outgoing, 1);
    assert_eq!(newest[0].remote.address, "10.8.0.74");
}

#[test]
fn state_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tracking.json");
    let filter = ObservationFilter::from_config(&FilterConfig::default());

    let mut cache = TrackingCache::default();
    let _ = cache.observe_batch(&sample_batch(), &filter, at(0));
    save_cache(&path, &cache).expect("save");

    let mut restored = load_cache(&path, &TrackerConfig::default()).expect("load");
    let summary = restored.observe_batch(&sample_batch(), &filter, at(10));
    assert_eq!(summary.new, 0);
    assert_eq!(summary.updated, 5);
    assert!(restored.records().iter().all(|r| r.occurrence_count == 2));
}

// ── Export ───────────────────────────────────────────────────────────

#[test]
fn three_tcp_and_two_listening_udp() {
    let mut cache = TrackingCache::default();
    let _ = cache.observe_batch(&sample_batch(), &ObservationFilter::permissive(), at(0));

    let report = NetflowEncoder::default().encode_at(&cache.snapshot(), ReportContext::default(), at(5));
    assert_eq!(report.header.record_count, 6);
    assert_eq!(report.statistics.total_flows, 5);
    assert_eq!(report.statistics.protocols.len(), 2);
    assert_eq!(report.statistics.protocols["tcp"], 3);
    assert_eq!(report.statistics.protocols["udp"], 2);

    let client = report
        .flows
        .iter()
        .find(|f| f.meta.as_ref().is_some_and(|m| m.process == "firefox"))
        .expect("firefox flow");
    assert_eq!(client.src_port, 51000);
    assert_eq!(client.dst_port, 443);
    assert_eq!(client.protocol, 6);
}

#[test]
fn yaml_round_trip_is_lossless_with_meta() {
    let mut cache = TrackingCache::default();
    for cycle in 0..3 {
        let _ = cache.observe_batch(&sample_batch(), &ObservationFilter::permissive(), at(cycle));
    }
    let originals = cache.snapshot();

    let context = ReportContext {
        hostname: "edge-01".into(),
        total_measurements: 3,
        ..ReportContext::default()
    };
    let report = NetflowEncoder::new(9).encode_at(&originals, context, at(10));
    let yaml = report.to_document().to_yaml().expect("yaml");

    let document = NetflowDocument::from_yaml(&yaml).expect("parse");
    assert_eq!(document.system_information.hostname, "edge-01");
    let decoded = decode_document(&document).expect("netflow document");
    assert_eq!(decoded.len(), originals.len());

    for original in &originals {
        let found = decoded
            .records()
            .find(|r| r.key == original.key)
            .expect("record decoded");
        assert_eq!(found.local.to_string(), original.local.to_string());
        assert_eq!(found.remote.to_string(), original.remote.to_string());
        assert_eq!(found.process, original.process);
        assert_eq!(found.protocol, original.protocol);
        assert_eq!(found.direction, original.direction);
        assert_eq!(found.occurrence_count, 3);
    }
}

#[test]
fn ipv6_recovery_depends_on_meta() {
    let mut cache = TrackingCache::default();
    let batch = [raw("[fe80::1]:5353", "[fe80::9]:40000", "udp", "incoming", "avahi-daemon")];
    let _ = cache.observe_batch(&batch, &ObservationFilter::permissive(), at(0));
    let mut report = NetflowEncoder::default().encode_at(&cache.snapshot(), ReportContext::default(), at(1));

    let with_meta = decode(&report);
    let rec = with_meta.records().next().expect("record");
    assert_eq!(rec.local.address, "fe80::1");
    assert_eq!(rec.local.port, 5353);

    // The numeric fields cannot carry IPv6; this loss is expected.
    report.flows[0].meta = None;
    let yaml = report.to_document().to_yaml().expect("yaml");
    assert!(!yaml.contains("fe80::1"));
    let document = NetflowDocument::from_yaml(&yaml).expect("parse");
    let without_meta = decode_document(&document).expect("netflow document");
    let rec = without_meta.records().next().expect("record");
    assert!(rec.local.address == "0.0.0.0" && rec.remote.address == "0.0.0.0");
    assert!([rec.local.port, rec.remote.port].contains(&5353));
}

#[test]
fn foreign_yaml_is_declined() {
    let document = NetflowDocument::from_yaml("hostname: box\ncurrent_state:\n  connections: {}\n")
        .expect("parse");
    assert!(decode_document(&document).is_none());
}

#[test]
fn binary_packet_carries_ipv4_flows() {
    let mut cache = TrackingCache::default();
    let _ = cache.observe_batch(&sample_batch(), &ObservationFilter::permissive(), at(0));
    let report = NetflowEncoder::default().encode_at(&cache.snapshot(), ReportContext::default(), at(1));

    let packet = encode_packet(&report);
    let parsed = parse_packet(&packet).expect("parse");
    assert_eq!(parsed.header.record_count, 6);

    let decoded = decode(&parsed);
    assert_eq!(decoded.len(), 5);
    assert!(
        decoded
            .records()
            .any(|r| r.remote.address == "93.184.216.34" && r.remote.port == 443)
    );
}
