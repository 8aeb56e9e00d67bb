//! Balance Coordinator: the control loop. Drives the pool model, selects
//! (source, file, destination) triples, schedules transfers, handles completions, tracks
//! consecutive errors, and decides convergence.
//!
//! `INIT -> LOOP -> DRAIN -> SUMMARY -> EXIT`, with `LOOP` re-entering itself each iteration
//! until it breaks to `DRAIN`.

use std::collections::HashMap;
use std::io::{BufRead, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono_like::iso8601_now;
use log::{debug, error, info, warn};

use crate::config::BalanceConfig;
use crate::error::BalanceError;
use crate::pool::{discovery, PoolModel};
use crate::transfer::{TransferPool, TransferWorker};
use crate::types::{format_bytes, BalanceStats, TransferResult, TransferStatus};
use crate::walker::{WalkFilter, Walker};

/// How `run()` terminated the `LOOP` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    Balanced,
    NoOverfullSources,
    NoMoreFilesCanBeMoved,
    Interrupted,
}

/// Up to this many filter-passing, size-fitting candidates are sampled per source before
/// scoring and picking the best one (§4.6's "sample K" selection variant).
const SAMPLE_SIZE: usize = 5;
/// Safety bound on how many walker items we'll pull while looking for `SAMPLE_SIZE` fitting
/// candidates, so a source with many oversized files doesn't spin the walker forever.
const MAX_SCAN_ATTEMPTS: usize = SAMPLE_SIZE * 20;

pub struct Coordinator {
    config: BalanceConfig,
    pool_model: PoolModel,
    walkers: HashMap<PathBuf, Walker>,
    transfer_pool: Arc<TransferPool>,
    stats: BalanceStats,
    shutdown: Arc<AtomicBool>,
    consecutive_errors: u32,
    error_log: Option<std::fs::File>,
    dry_run_log_only: bool,
}

impl Coordinator {
    pub fn new(config: BalanceConfig) -> Result<Self, BalanceError> {
        let discovered = discovery::discover(&config.mount_point)?;
        let target_dirs: Vec<PathBuf> = discovered
            .members
            .iter()
            .map(|m| m.join(&discovered.subpath))
            .collect();

        let pool_model = PoolModel::new(&target_dirs, &config.source_drives, &config.dest_drives);

        let max_workers = if config.parallel == 0 {
            let over = pool_model.overfull(config.percentage).len();
            let under = pool_model.underfull(config.percentage).len();
            1.max(over.min(under))
        } else {
            config.parallel
        };

        let transfer_pool = Arc::new(TransferPool::new(max_workers));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handler_shutdown = Arc::clone(&shutdown);
        let handler_pool = Arc::clone(&transfer_pool);
        ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
            handler_pool.cancel_all();
        })
        .map_err(|e| BalanceError::Validation(format!("installing signal handler: {e}")))?;

        let error_log = match &config.error_log {
            Some(path) => Some(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        BalanceError::Validation(format!(
                            "opening error log {}: {e}",
                            path.display()
                        ))
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            dry_run_log_only: config.dry_run,
            config,
            pool_model,
            walkers: HashMap::new(),
            transfer_pool,
            stats: BalanceStats::default(),
            shutdown,
            consecutive_errors: 0,
            error_log,
        })
    }

    pub fn stats(&self) -> BalanceStats {
        self.stats
    }

    pub fn was_interrupted(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn filter(&self) -> WalkFilter {
        WalkFilter {
            include: self.config.include.clone(),
            exclude: self.config.exclude.clone(),
            min_size: self.config.min_size,
            max_size: self.config.max_size,
        }
    }

    /// Run to convergence, signal, or drain-and-summarize. Blocks the calling thread.
    pub fn run(&mut self) -> BalanceOutcome {
        let outcome = self.loop_phase();
        self.drain();
        self.summary(outcome);
        outcome
    }

    fn loop_phase(&mut self) -> BalanceOutcome {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return BalanceOutcome::Interrupted;
            }

            self.pool_model.refresh_all_stats();

            if self.pool_model.is_balanced(self.config.percentage) {
                return BalanceOutcome::Balanced;
            }

            let sources: Vec<PathBuf> = self
                .pool_model
                .overfull(self.config.percentage)
                .iter()
                .map(|d| d.path().to_path_buf())
                .collect();
            if sources.is_empty() {
                return BalanceOutcome::NoOverfullSources;
            }

            let average = self.pool_model.average_usage();
            let mut transfers_started = 0usize;

            for src_path in &sources {
                if self.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if !self.transfer_pool.has_capacity() {
                    break;
                }
                let dst_path = match self.pool_model.best_destination(self.config.percentage, true) {
                    Some(d) => d.path().to_path_buf(),
                    None => break,
                };
                if dst_path == *src_path {
                    continue;
                }
                let dst_free = self
                    .pool_model
                    .drives()
                    .iter()
                    .find(|d| d.path() == dst_path)
                    .map(|d| d.stats.free_bytes)
                    .unwrap_or(0);

                let excess = self.source_excess(src_path, average);
                let filter = self.filter();
                let walker = self
                    .walkers
                    .entry(src_path.clone())
                    .or_insert_with(|| Walker::new(src_path, filter));
                let candidate = select_file(walker, dst_free, excess);
                let (file_path, size) = match candidate {
                    Some(c) => c,
                    None => continue,
                };

                let rel = match file_path.strip_prefix(src_path) {
                    Ok(r) => r.to_path_buf(),
                    Err(_) => continue,
                };
                let dest_file = dst_path.join(&rel);

                if !self.pool_model.acquire_write_lock(&dst_path) {
                    continue;
                }

                if self.dry_run_log_only {
                    info!(
                        "[dry-run] would move {} -> {} ({})",
                        file_path.display(),
                        dest_file.display(),
                        format_bytes(size as f64)
                    );
                    self.pool_model.release_write_lock(&dst_path);
                    self.stats.files_moved += 1;
                    self.stats.bytes_transferred += size;
                    continue;
                }

                let progress_source = file_path.clone();
                let worker = TransferWorker::new(
                    file_path.clone(),
                    dest_file,
                    src_path.clone(),
                    size,
                    false,
                )
                .with_progress_callback(Box::new(move |progress| {
                    debug!(
                        "{}: {:.0}% {}/s{}",
                        progress_source.display(),
                        progress.percent,
                        format_bytes(progress.speed_bytes_per_sec),
                        progress
                            .eta_seconds
                            .map(|s| format!(" eta={s}s"))
                            .unwrap_or_default(),
                    );
                }));
                let worker = Arc::new(worker);
                if !self.transfer_pool.submit(worker) {
                    self.pool_model.release_write_lock(&dst_path);
                    continue;
                }
                transfers_started += 1;
            }

            // Drain whatever's already finished so locks free up and stats stay current
            // before deciding whether this iteration made progress.
            while let Some(result) = self.transfer_pool.wait_for_any(Duration::from_millis(0)) {
                self.handle_result(result);
            }

            // Checked before the no-progress verdict below: a shutdown mid-source-loop with
            // no transfer in flight must report Interrupted, never NoMoreFilesCanBeMoved.
            if self.shutdown.load(Ordering::SeqCst) {
                return BalanceOutcome::Interrupted;
            }

            if transfers_started == 0 && self.transfer_pool.active_count() == 0 {
                self.pool_model.refresh_all_stats();
                if self.pool_model.is_balanced(self.config.percentage) {
                    return BalanceOutcome::Balanced;
                }
                return BalanceOutcome::NoMoreFilesCanBeMoved;
            }

            if self.transfer_pool.active_count() > 0
                && let Some(result) = self.transfer_pool.wait_for_any(Duration::from_secs(1))
            {
                self.handle_result(result);
            }
        }
    }

    /// Excess above average for `src`, in bytes; the amount a single transfer should aim to
    /// close. Never negative.
    fn source_excess(&self, src: &Path, average_pct: f64) -> f64 {
        let drive = self.pool_model.drives().iter().find(|d| d.path() == src);
        match drive {
            Some(d) => {
                let target_used = d.stats.total_bytes as f64 * average_pct / 100.0;
                (d.stats.used_bytes as f64 - target_used).max(0.0)
            }
            None => 0.0,
        }
    }

    fn drain(&mut self) {
        for result in self.transfer_pool.wait_for_all() {
            self.handle_result(result);
        }
    }

    fn handle_result(&mut self, result: TransferResult) {
        self.stats.add_result(&result);

        if let Some(drive) = self
            .pool_model
            .drives()
            .iter()
            .find(|d| result.dest_path.starts_with(d.path()))
        {
            self.pool_model.release_write_lock(drive.path());
        }

        match result.status {
            TransferStatus::Completed => {
                debug!(
                    "completed {} -> {} ({})",
                    result.source_path.display(),
                    result.dest_path.display(),
                    format_bytes(result.bytes_transferred as f64)
                );
                self.consecutive_errors = 0;
            }
            TransferStatus::Failed => {
                self.consecutive_errors += 1;
                let msg = result.error_message.clone().unwrap_or_default();
                error!(
                    "transfer failed: {} -> {}: {}",
                    result.source_path.display(),
                    result.dest_path.display(),
                    msg
                );
                self.log_error_to_file(&result, &msg);
                if self.consecutive_errors >= self.config.error_threshold {
                    self.escalate();
                }
            }
            TransferStatus::Cancelled | TransferStatus::Pending | TransferStatus::Running => {}
        }
    }

    fn log_error_to_file(&mut self, result: &TransferResult, msg: &str) {
        if let Some(file) = &mut self.error_log {
            let _ = writeln!(
                file,
                "[{}] {} -> {}: {}",
                iso8601_now(),
                result.source_path.display(),
                result.dest_path.display(),
                msg
            );
        }
    }

    /// Consecutive-error threshold reached: abort, or prompt on standard error. Because
    /// results are drained serially on this single coordinator thread, only one escalation
    /// can ever be in flight at a time — the re-entrancy guard the spec calls for falls out
    /// of the single-threaded drain rather than needing an explicit lock.
    fn escalate(&mut self) {
        if self.config.abort_on_error {
            warn!(
                "{} consecutive transfer failures, abort_on_error is set: shutting down",
                self.consecutive_errors
            );
            self.shutdown.store(true, Ordering::SeqCst);
            self.transfer_pool.cancel_all();
            return;
        }

        eprint!(
            "{} consecutive transfer failures. Continue? [y/N] ",
            self.consecutive_errors
        );
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        let answered_yes = match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => false, // EOF / non-interactive input: treat as "no"
            Ok(_) => line.trim().eq_ignore_ascii_case("y"),
            Err(_) => false,
        };

        if answered_yes {
            self.consecutive_errors = 0;
        } else {
            warn!("user declined to continue after repeated failures: shutting down");
            self.shutdown.store(true, Ordering::SeqCst);
            self.transfer_pool.cancel_all();
        }
    }

    fn summary(&self, outcome: BalanceOutcome) {
        info!(
            "files moved: {}, bytes transferred: {}, errors: {}",
            self.stats.files_moved,
            format_bytes(self.stats.bytes_transferred as f64),
            self.stats.errors
        );
        for drive in self.pool_model.drives() {
            info!(
                "{}: {:.2}% used",
                drive.path().display(),
                drive.stats.usage_percent()
            );
        }
        match outcome {
            BalanceOutcome::Balanced => {
                info!("balanced within {}%", self.config.percentage);
            }
            BalanceOutcome::NoOverfullSources => {
                info!("no overfull sources; nothing to move");
            }
            BalanceOutcome::NoMoreFilesCanBeMoved => {
                warn!(
                    "no more files can be moved; final usage range {:.2}%",
                    self.pool_model.usage_range()
                );
            }
            BalanceOutcome::Interrupted => {
                warn!("interrupted; final usage range {:.2}%", self.pool_model.usage_range());
            }
        }
    }
}

/// Score a candidate file: how close its size comes to exactly closing `bytes_to_move`.
/// Degenerate `bytes_to_move <= 0` always scores 1.0; a non-positive `file_size` scores 0.0.
fn score(file_size: f64, bytes_to_move: f64) -> f64 {
    if file_size <= 0.0 {
        return 0.0;
    }
    if bytes_to_move <= 0.0 {
        return 1.0;
    }
    if file_size <= bytes_to_move {
        file_size / bytes_to_move
    } else {
        bytes_to_move / file_size
    }
}

/// Sample up to [`SAMPLE_SIZE`] filter-passing candidates whose size fits `dest_free`, score
/// each against `bytes_to_move`, return the best and push the rest back onto the walker's
/// head in their original relative order.
fn select_file(walker: &mut Walker, dest_free: u64, bytes_to_move: f64) -> Option<(PathBuf, u64)> {
    let mut candidates = Vec::new();
    let mut attempts = 0;
    while candidates.len() < SAMPLE_SIZE && attempts < MAX_SCAN_ATTEMPTS {
        attempts += 1;
        match walker.next() {
            Some((path, size)) => {
                if dest_free > size {
                    candidates.push((path, size));
                }
            }
            None => break,
        }
    }

    if candidates.is_empty() {
        return None;
    }

    let best_index = candidates
        .iter()
        .enumerate()
        .map(|(i, (_, size))| (i, score(*size as f64, bytes_to_move)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap();

    let chosen = candidates.remove(best_index);
    walker.prepend(candidates);
    Some(chosen)
}

/// Minimal ISO-8601 UTC timestamp formatter, avoiding a chrono dependency for one log line.
mod chrono_like {
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn iso8601_now() -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let days = secs / 86_400;
        let time_of_day = secs % 86_400;
        let (year, month, day) = civil_from_days(days as i64);
        format!(
            "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
            time_of_day / 3600,
            (time_of_day % 3600) / 60,
            time_of_day % 60
        )
    }

    /// Howard Hinnant's `civil_from_days` algorithm (days since epoch -> y/m/d), the same
    /// math `chrono` and `libc++`'s `<chrono>` use internally.
    fn civil_from_days(z: i64) -> (i64, u32, u32) {
        let z = z + 719_468;
        let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
        let doe = (z - era * 146_097) as u64;
        let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
        let y = yoe as i64 + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
        let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
        (if m <= 2 { y + 1 } else { y }, m, d)
    }
}
