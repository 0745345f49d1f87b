//! `sockflow observe`: fold one collection cycle into the tracking cache.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;
use clap::Args;
use sockflow_track::observation::{ObservationFilter, RawObservation};
use sockflow_track::state::{load_cache, save_cache};

use super::Context;

/// Arguments for the `observe` command.
#[derive(Args, Debug)]
pub struct ObserveArgs {
    /// JSON or YAML file holding a list of raw observations.
    pub file: PathBuf,
}

/// Executes the `observe` command.
///
/// Loads the persisted cache, applies the batch through the configured
/// filter, and writes the cache back.
///
/// # Errors
///
/// Returns an error if the observation file or state file cannot be read
/// or the state file cannot be written.
pub fn execute(ctx: &Context, args: ObserveArgs) -> anyhow::Result<()> {
    let observations = load_observations(&args.file)?;
    let mut cache = load_cache(&ctx.state_file, &ctx.config.tracker)?;
    let filter = ObservationFilter::from_config(&ctx.config.filter);

    let summary = cache.observe_batch(&observations, &filter, Utc::now());
    save_cache(&ctx.state_file, &cache)?;

    println!(
        "{:<10} {:<8} {:<8} {:<10} {:<8} {:<8} {:<8}",
        "OBSERVED", "NEW", "UPDATED", "FILTERED", "EVICTED", "EXPIRED", "TRACKED"
    );
    println!(
        "{:<10} {:<8} {:<8} {:<10} {:<8} {:<8} {:<8}",
        summary.observed,
        summary.new,
        summary.updated,
        summary.filtered,
        summary.evicted,
        summary.expired,
        cache.len()
    );

    Ok(())
}

/// Reads a list of raw observations. `.json` files are parsed as JSON,
/// everything else as YAML.
fn load_observations(path: &Path) -> anyhow::Result<Vec<RawObservation>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let observations = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("invalid observation list in {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid observation list in {}", path.display()))?
    };
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_json_observations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"local":"10.0.0.1:40000","remote":"10.0.0.2:443","protocol":"tcp","direction_hint":"outgoing","process":"curl"}]"#,
        )
        .expect("write");

        let observations = load_observations(&path).expect("load");
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].process, "curl");
    }

    #[test]
    fn loads_yaml_observations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.yaml");
        std::fs::write(
            &path,
            "- local: 0.0.0.0:53\n  remote: '*:*'\n  protocol: udp\n  direction_hint: listening\n  process: dnsmasq\n",
        )
        .expect("write");

        let observations = load_observations(&path).expect("load");
        assert_eq!(observations[0].remote, "*:*");
    }

    #[test]
    fn rejects_malformed_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        std::fs::write(&path, "{not json").expect("write");
        assert!(load_observations(&path).is_err());
    }
}
