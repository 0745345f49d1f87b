//! Configuration model for the tracker and the NetFlow exporter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, SockflowError};

/// Root configuration, usually loaded from a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SockflowConfig {
    /// Tracking cache limits.
    pub tracker: TrackerConfig,
    /// NetFlow exporter identity.
    pub exporter: ExporterConfig,
    /// Observation filtering rules.
    pub filter: FilterConfig,
    /// Location of the persisted tracking state.
    pub state_file: Option<PathBuf>,
}

/// Capacity and age limits of the tracking cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Soft limit on the number of tracked relationships.
    pub capacity: usize,
    /// Records first seen longer ago than this are swept, in seconds.
    pub retention_secs: u64,
    /// Share of the capacity freed when the limit is exceeded.
    pub eviction_percent: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_CACHE_CAPACITY,
            retention_secs: constants::DEFAULT_RETENTION_SECS,
            eviction_percent: constants::DEFAULT_EVICTION_PERCENT,
        }
    }
}

/// Identity fields stamped on exported NetFlow messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Observation domain (source id) written in the message header.
    pub observation_domain_id: u32,
    /// Template identifier of the flow template.
    pub template_id: u16,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            observation_domain_id: constants::DEFAULT_OBSERVATION_DOMAIN_ID,
            template_id: constants::DEFAULT_TEMPLATE_ID,
        }
    }
}

/// Rules for discarding observations before they reach the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Drop relationships whose remote side is a local address.
    pub except_local_connections: bool,
    /// Drop relationships with an IPv6 endpoint.
    pub except_ipv6: bool,
    /// Addresses considered local to this host.
    pub local_addresses: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            except_local_connections: true,
            except_ipv6: false,
            local_addresses: constants::DEFAULT_LOCAL_ADDRESSES
                .iter()
                .map(|&a| a.to_owned())
                .collect(),
        }
    }
}

impl SockflowConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// contains out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| SockflowError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parses and validates configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML or fails validation.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SockflowError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.tracker.capacity == 0 {
            return Err(config_err("tracker.capacity must be greater than 0"));
        }
        if self.tracker.retention_secs == 0 {
            return Err(config_err("tracker.retention_secs must be greater than 0"));
        }
        if self.tracker.eviction_percent == 0 || self.tracker.eviction_percent > 100 {
            return Err(config_err(
                "tracker.eviction_percent must be between 1 and 100",
            ));
        }
        if self.exporter.template_id < 256 {
            return Err(config_err(
                "exporter.template_id must be 256 or above (0-255 are reserved FlowSet ids)",
            ));
        }
        Ok(())
    }

    /// Returns the configured state file, or the default location.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(constants::default_state_file)
    }
}

fn config_err(message: &str) -> SockflowError {
    SockflowError::Config {
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = SockflowConfig::default();
        assert_eq!(config.tracker.capacity, 10_000);
        assert_eq!(config.tracker.retention_secs, 3600);
        assert_eq!(config.tracker.eviction_percent, 20);
        assert_eq!(config.exporter.template_id, 256);
        assert!(config.filter.except_local_connections);
        assert!(config.filter.local_addresses.contains(&"::1".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = SockflowConfig::from_yaml("tracker:\n  capacity: 50\n").expect("parse");
        assert_eq!(config.tracker.capacity, 50);
        assert_eq!(config.tracker.retention_secs, 3600);
        assert_eq!(config.exporter.observation_domain_id, 1);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = SockflowConfig::from_yaml("tracker:\n  capacity: 0\n").unwrap_err();
        assert!(err.to_string().contains("capacity"), "got: {err}");
    }

    #[test]
    fn eviction_percent_out_of_range_is_rejected() {
        let result = SockflowConfig::from_yaml("tracker:\n  eviction_percent: 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn reserved_template_id_is_rejected() {
        let result = SockflowConfig::from_yaml("exporter:\n  template_id: 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sockflow.yaml");
        std::fs::write(
            &path,
            "exporter:\n  observation_domain_id: 7\nstate_file: /tmp/state.json\n",
        )
        .expect("write");

        let config = SockflowConfig::load(&path).expect("load");
        assert_eq!(config.exporter.observation_domain_id, 7);
        assert_eq!(config.state_file(), PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = SockflowConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, SockflowError::Io { .. }));
    }
}
