//! Command-line surface: argument parsing only. All decisions funnel into [`crate::config::BalanceConfig`].

use std::path::PathBuf;

use clap::Parser;

/// Balance file-level storage utilization across the member drives of a mergerfs pool.
#[derive(Clone, Parser)]
#[command(name = "mergerfs-balance", version)]
#[command(about = "Move files between mergerfs pool members until usage is within tolerance.")]
pub struct Cli {
    /// Mount point of the mergerfs pool (or a subdirectory of it). May also come from a
    /// config file's `mount_point` key, in which case it can be omitted here.
    #[arg(value_name = "MOUNT_POINT")]
    pub mount_point: Option<PathBuf>,

    /// Tolerance in percentage points. Default: 2.0.
    #[arg(short = 'p', long = "percentage")]
    pub percentage: Option<f64>,

    /// Basename include glob. Repeatable.
    #[arg(short = 'i', long = "include")]
    pub include: Vec<String>,

    /// Basename exclude glob. Repeatable.
    #[arg(short = 'e', long = "exclude")]
    pub exclude: Vec<String>,

    /// Minimum file size (e.g. "100M", "1.5G"). Default: unbounded.
    #[arg(short = 's', long = "min-size")]
    pub min_size: Option<String>,

    /// Maximum file size. Default: unbounded.
    #[arg(short = 'S', long = "max-size")]
    pub max_size: Option<String>,

    /// Number of concurrent transfer workers. 0 = auto. Default: 0.
    #[arg(long = "parallel")]
    pub parallel: Option<usize>,

    /// Restrict source members to these paths. Repeatable. Default: all members.
    #[arg(long = "source")]
    pub source: Vec<PathBuf>,

    /// Restrict destination members to these paths. Repeatable. Default: all members.
    #[arg(long = "dest")]
    pub dest: Vec<PathBuf>,

    /// Preview only; do not move files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Increase verbosity. Repeat for trace-level output (`-vv`).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Path to a config file. Default: searched in the standard locations.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Abort instead of prompting once the consecutive-error threshold is reached.
    #[arg(long = "abort-on-error")]
    pub abort_on_error: bool,

    /// Consecutive transfer failures before the escalation policy triggers. Default: 5.
    #[arg(long = "error-threshold")]
    pub error_threshold: Option<u32>,

    /// Append transfer errors (with an ISO-8601 timestamp) to this file.
    #[arg(long = "error-log")]
    pub error_log: Option<PathBuf>,
}
