//! `sockflow export`: encode the tracking cache as NetFlow v9.

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::Args;
use sockflow_netflow::encoder::NetflowEncoder;
use sockflow_netflow::report::ReportContext;
use sockflow_netflow::timestamp::format_time;
use sockflow_netflow::wire::encode_packet;
use sockflow_track::record::ConnectionRecord;
use sockflow_track::state::load_cache;

use super::Context;
use crate::output::format_bytes;

/// Arguments for the `export` command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Write the YAML document here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Hostname recorded in the system information section.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Observation domain id (overrides the configuration).
    #[arg(long)]
    pub domain_id: Option<u32>,

    /// Also write an RFC 3954 binary packet to this file.
    #[arg(long)]
    pub binary: Option<PathBuf>,
}

/// Executes the `export` command.
///
/// # Errors
///
/// Returns an error if the state file cannot be loaded or an output file
/// cannot be written.
pub fn execute(ctx: &Context, args: ExportArgs) -> anyhow::Result<()> {
    let cache = load_cache(&ctx.state_file, &ctx.config.tracker)?;
    let records = cache.snapshot();

    let mut exporter = ctx.config.exporter.clone();
    if let Some(id) = args.domain_id {
        exporter.observation_domain_id = id;
    }
    let encoder = NetflowEncoder::from_config(&exporter);

    let now = Utc::now();
    let context = report_context(&records, args.hostname, now);
    let report = encoder.encode_at(&records, context, now);
    let document = report.to_document();

    if let Some(path) = &args.binary {
        let packet = encode_packet(&report);
        std::fs::write(path, &packet)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = packet.len(), "netflow packet written");
    }

    match &args.output {
        Some(path) => {
            document.save(path)?;
            println!(
                "Exported {} flows ({} estimated) to {}",
                report.flows.len(),
                format_bytes(report.statistics.total_bytes),
                path.display()
            );
        }
        None => print!("{}", document.to_yaml()?),
    }

    Ok(())
}

fn report_context(
    records: &[ConnectionRecord],
    hostname: Option<String>,
    now: DateTime<Utc>,
) -> ReportContext {
    let hostname = hostname
        .or_else(|| std::env::var("HOSTNAME").ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| ReportContext::default().hostname);
    let first_run = records
        .iter()
        .map(|r| r.first_seen)
        .min()
        .map_or_else(String::new, format_time);

    ReportContext {
        hostname,
        first_run,
        last_update: format_time(now),
        total_measurements: records.iter().map(|r| r.occurrence_count).max().unwrap_or(1),
        ..ReportContext::default()
    }
}
