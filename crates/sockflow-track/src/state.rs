//! Persistence of the tracking cache between runs.
//!
//! The state file is a JSON array of [`ConnectionRecord`]s. Writes go to a
//! temporary file in the same directory and are renamed into place.

use std::io::Write;
use std::path::Path;

use sockflow_common::config::TrackerConfig;
use sockflow_common::error::{Result, SockflowError};
use tempfile::NamedTempFile;

use crate::cache::TrackingCache;
use crate::record::ConnectionRecord;

/// Loads a cache from `path`.
///
/// A missing file yields an empty cache. Loaded records are repaired.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_cache(path: &Path, config: &TrackerConfig) -> Result<TrackingCache> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no tracking state, starting empty");
        return Ok(TrackingCache::from_config(config));
    }
    let content = std::fs::read_to_string(path).map_err(|e| SockflowError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let records: Vec<ConnectionRecord> = serde_json::from_str(&content)?;
    tracing::info!(path = %path.display(), records = records.len(), "tracking state loaded");
    Ok(TrackingCache::from_records(config, records))
}

/// Writes all records of `cache` to `path`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written.
pub fn save_cache(path: &Path, cache: &TrackingCache) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(&cache.records())?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| io_err(tmp.path(), e))?;
    let _ = tmp.persist(path).map_err(|e| io_err(path, e.error))?;

    tracing::debug!(path = %path.display(), records = cache.len(), "tracking state saved");
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> SockflowError {
    SockflowError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::observation::RawObservation;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = load_cache(&dir.path().join("none.json"), &TrackerConfig::default())
            .expect("load");
        assert!(cache.is_empty());
    }

    #[test]
    fn save_then_load_preserves_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("tracking.json");

        let mut cache = TrackingCache::default();
        let now = Utc::now();
        for _ in 0..3 {
            let obs = RawObservation::new("10.0.0.1:40000", "10.9.9.9:443", "tcp", "outgoing", "curl")
                .normalize();
            let _ = cache.observe_at(obs, now);
        }
        save_cache(&path, &cache).expect("save");

        let loaded = load_cache(&path, &TrackerConfig::default()).expect("load");
        assert_eq!(loaded.snapshot(), cache.snapshot());
        assert_eq!(loaded.records()[0].occurrence_count, 3);
    }

    #[test]
    fn load_repairs_broken_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tracking.json");

        let mut cache = TrackingCache::default();
        let obs = RawObservation::new("0.0.0.0:53", "*:*", "udp", "listening", "dnsmasq").normalize();
        let _ = cache.observe_at(obs, Utc::now());
        let mut records = cache.snapshot();
        records[0].occurrence_count = 0;
        records[0].last_seen = records[0].first_seen - Duration::seconds(60);
        std::fs::write(&path, serde_json::to_string(&records).expect("json")).expect("write");

        let loaded = load_cache(&path, &TrackerConfig::default()).expect("load");
        let rec = loaded.records()[0];
        assert_eq!(rec.occurrence_count, 1);
        assert!(rec.first_seen <= rec.last_seen);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tracking.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(load_cache(&path, &TrackerConfig::default()).is_err());
    }
}
