//! # sockflow: socket relationship tracker
//!
//! Folds raw socket observations into a bounded tracking cache and exports
//! it as NetFlow v9 documents or packets.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    if cli.log_json {
        subscriber.json().with_ansi(false).init();
    } else {
        subscriber.init();
    }

    commands::execute(cli)
}
