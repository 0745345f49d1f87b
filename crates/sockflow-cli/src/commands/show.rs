//! `sockflow show`: list tracked relationships by recency.

use clap::Args;
use sockflow_common::types::Direction;
use sockflow_track::state::load_cache;

use super::Context;
use crate::output::print_records;

/// Arguments for the `show` command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Only show `incoming`, `outgoing`, or `listening` relationships.
    #[arg(short, long)]
    pub direction: Option<String>,

    /// Maximum number of rows per direction.
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,
}

/// Executes the `show` command.
///
/// # Errors
///
/// Returns an error if the state file cannot be loaded.
pub fn execute(ctx: &Context, args: ShowArgs) -> anyhow::Result<()> {
    let cache = load_cache(&ctx.state_file, &ctx.config.tracker)?;
    if cache.is_empty() {
        println!("No tracked relationships.");
        return Ok(());
    }

    let directions = match args.direction.as_deref() {
        Some(hint) => vec![Direction::from_hint(hint)],
        None => vec![Direction::Incoming, Direction::Outgoing, Direction::Listening],
    };

    for direction in directions {
        let records = cache.recent(direction, args.limit);
        if records.is_empty() {
            continue;
        }
        println!("{} ({}):", direction.as_str(), records.len());
        print_records(records);
        println!();
    }

    tracing::debug!(tracked = cache.len(), "cache listed");
    Ok(())
}
