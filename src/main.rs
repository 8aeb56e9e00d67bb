//! mergerfs-balance CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use mergerfs_balance::cli::Cli;
use mergerfs_balance::config;
use mergerfs_balance::coordinator::{BalanceOutcome, Coordinator};
use mergerfs_balance::logging;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet);

    let config_path = cli.config.clone().or_else(config::find_default_config);
    let config_file = match &config_path {
        Some(path) => match config::load_config_file(path) {
            Ok(f) => Some(f),
            Err(e) => {
                log::error!("{e}");
                return ExitCode::from(1);
            }
        },
        None => None,
    };

    let balance_config = match config::merge(cli, config_file) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(1);
        }
    };

    let mut coordinator = match Coordinator::new(balance_config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(1);
        }
    };

    let outcome = coordinator.run();
    let stats = coordinator.stats();

    if coordinator.was_interrupted() && outcome == BalanceOutcome::Interrupted {
        return ExitCode::from(130);
    }
    if stats.errors > 0 {
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}
