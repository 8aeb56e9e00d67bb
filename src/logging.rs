//! Logging setup: `log` facade + `env_logger`, dependency noise capped at `warn`, this
//! crate's own target following `-v`/`-vv`/`-q`.

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// `-q` forces Error-only; otherwise verbosity raises this crate's level: 0 → Info,
/// 1 (`-v`) → Debug, 2+ (`-vv`) → Trace. Dependencies stay at Warn regardless.
pub fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    // `CARGO_PKG_NAME` is "mergerfs-balance" (hyphenated); module paths use the Rust-ified
    // crate name "mergerfs_balance" (underscored), which is what `filter_module` must match.
    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        Level::Error => "ERROR".red(),
                        _ => unreachable!(),
                    };
                    let path = record.target().to_string().white();
                    format!("[{} {} {}] {}", name.cyan(), level_str, path, record.args())
                }
                _ => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .init();
}
