//! Transfer Worker: moves one file from source to destination via an external archival
//! copy tool (`rsync` by default), parsing progress, draining both output streams, and
//! supporting cooperative cancellation.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::types::{TransferProgress, TransferResult, TransferStatus};

/// The reference copy tool invocation: archive mode, remove source on success, machine
/// parseable progress, no incremental recursion (so progress2 totals are stable).
const RSYNC_ARGS: &[&str] = &["-a", "--remove-source-files", "--info=progress2", "--no-inc-recursive"];
const RSYNC_BIN: &str = "rsync";
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Callbacks a caller may register for live progress / terminal completion.
pub type ProgressCallback = Box<dyn Fn(TransferProgress) + Send>;

/// Moves one file. `source_root` bounds the empty-directory cleanup walk-up so it can never
/// escape above the member it came from.
pub struct TransferWorker {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub source_root: PathBuf,
    pub file_size: u64,
    pub dry_run: bool,
    status: Mutex<TransferStatus>,
    progress: Mutex<TransferProgress>,
    cancel_flag: Arc<AtomicBool>,
    on_progress: Option<ProgressCallback>,
}

impl TransferWorker {
    pub fn new(
        source_path: PathBuf,
        dest_path: PathBuf,
        source_root: PathBuf,
        file_size: u64,
        dry_run: bool,
    ) -> Self {
        Self {
            source_path,
            dest_path,
            source_root,
            file_size,
            dry_run,
            status: Mutex::new(TransferStatus::Pending),
            progress: Mutex::new(TransferProgress::default()),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    pub fn with_progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.on_progress = Some(cb);
        self
    }

    pub fn status(&self) -> TransferStatus {
        *self.status.lock().unwrap()
    }

    pub fn progress(&self) -> TransferProgress {
        *self.progress.lock().unwrap()
    }

    fn set_status(&self, status: TransferStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn set_progress(&self, progress: TransferProgress) {
        *self.progress.lock().unwrap() = progress;
        if let Some(cb) = &self.on_progress {
            cb(progress);
        }
    }

    /// Sets the cancel flag observed by `run()`; the child (if any) is signalled to terminate
    /// from within `run()`, since only the thread running the child has its handle.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Run the transfer to completion (or cancellation/failure). Emits exactly one result.
    pub fn run(&self) -> TransferResult {
        let start = Instant::now();

        if self.is_cancelled() {
            // Pending -> Cancelled directly, never observing Running.
            self.set_status(TransferStatus::Cancelled);
            return self.result(TransferStatus::Cancelled, 0, None, start.elapsed());
        }
        self.set_status(TransferStatus::Running);

        if self.dry_run {
            self.set_progress(TransferProgress {
                bytes_transferred: self.file_size,
                total_bytes: self.file_size,
                percent: 100.0,
                speed_bytes_per_sec: 0.0,
                eta_seconds: Some(0),
            });
            self.set_status(TransferStatus::Completed);
            return self.result(TransferStatus::Completed, self.file_size, None, start.elapsed());
        }

        match self.run_live() {
            Ok(bytes) => {
                self.set_status(TransferStatus::Completed);
                cleanup_empty_dirs(&self.source_path, &self.source_root);
                self.result(TransferStatus::Completed, bytes, None, start.elapsed())
            }
            Err(RunOutcome::Cancelled) => {
                self.set_status(TransferStatus::Cancelled);
                self.result(TransferStatus::Cancelled, 0, None, start.elapsed())
            }
            Err(RunOutcome::Failed(msg)) => {
                self.set_status(TransferStatus::Failed);
                self.result(TransferStatus::Failed, 0, Some(msg), start.elapsed())
            }
        }
    }

    fn result(
        &self,
        status: TransferStatus,
        bytes_transferred: u64,
        error_message: Option<String>,
        duration: Duration,
    ) -> TransferResult {
        TransferResult {
            source_path: self.source_path.clone(),
            dest_path: self.dest_path.clone(),
            status,
            bytes_transferred,
            error_message,
            duration_seconds: duration.as_secs_f64(),
        }
    }

    fn run_live(&self) -> Result<u64, RunOutcome> {
        if let Some(parent) = self.dest_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RunOutcome::Failed(format!("create {}: {e}", parent.display())))?;
        }

        let mut child = Command::new(RSYNC_BIN)
            .args(RSYNC_ARGS)
            .arg(&self.source_path)
            .arg(&self.dest_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RunOutcome::Failed(format!("missing tool: {RSYNC_BIN}"))
                } else {
                    RunOutcome::Failed(format!("spawn {RSYNC_BIN}: {e}"))
                }
            })?;

        let pid = child.id();
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        // Drain stderr concurrently; blocking on one stream while the child writes to the
        // other deadlocks the pipe once its buffer fills.
        let stderr_handle = std::thread::spawn(move || {
            let reader = BufReader::new(stderr);
            let mut captured = String::new();
            for line in reader.lines().map_while(Result::ok) {
                captured.push_str(&line);
                captured.push('\n');
            }
            captured
        });

        let cancelled = self.read_progress_and_watch_cancel(stdout, pid);

        let stderr_text = stderr_handle.join().unwrap_or_default();

        if cancelled {
            terminate_child(&mut child, pid);
            let _ = child.wait();
            return Err(RunOutcome::Cancelled);
        }

        let status = child
            .wait()
            .map_err(|e| RunOutcome::Failed(format!("wait on {RSYNC_BIN}: {e}")))?;

        if status.success() {
            Ok(self.file_size)
        } else {
            let msg = if stderr_text.trim().is_empty() {
                format!("{RSYNC_BIN} exited with {status}")
            } else {
                stderr_text.trim().to_string()
            };
            Err(RunOutcome::Failed(msg))
        }
    }

    /// Read stdout lines, parsing progress and updating live state; returns true if the
    /// cancel flag was observed (caller must then terminate the child).
    fn read_progress_and_watch_cancel(&self, stdout: impl std::io::Read, _pid: u32) -> bool {
        let reader = BufReader::new(stdout);
        for line in reader.lines().map_while(Result::ok) {
            if self.is_cancelled() {
                return true;
            }
            if let Some(mut progress) = parse_progress_line(&line) {
                progress.total_bytes = self.file_size;
                self.set_progress(progress);
            }
        }
        self.is_cancelled()
    }
}

enum RunOutcome {
    Cancelled,
    Failed(String),
}

/// Signal the child to terminate, wait up to [`CANCEL_GRACE`], then force-kill.
fn terminate_child(child: &mut std::process::Child, pid: u32) {
    send_sigterm(pid);
    let deadline = Instant::now() + CANCEL_GRACE;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    if let Err(e) = child.kill() {
        warn!("force-kill of {RSYNC_BIN} pid {pid} failed: {e}");
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

/// Walk upward from `start`'s parent, removing each directory that is now empty; stop at
/// the first non-empty directory, on any error, or when `boundary` (the member root) is
/// reached — the walk never evaluates or removes the boundary itself.
fn cleanup_empty_dirs(start: &Path, boundary: &Path) {
    let mut dir = match start.parent() {
        Some(p) => p.to_path_buf(),
        None => return,
    };
    loop {
        if dir == boundary || !dir.starts_with(boundary) {
            return;
        }
        match std::fs::read_dir(&dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    return; // not empty
                }
            }
            Err(_) => return,
        }
        if std::fs::remove_dir(&dir).is_err() {
            return;
        }
        debug!("removed now-empty directory {}", dir.display());
        dir = match dir.parent() {
            Some(p) => p.to_path_buf(),
            None => return,
        };
    }
}

/// Parse one `rsync --info=progress2` line:
/// `  1,234,567  50%   12.34MB/s    0:01:23`
/// Unparseable lines return `None` and are ignored by the caller.
pub fn parse_progress_line(line: &str) -> Option<TransferProgress> {
    let mut tokens = line.trim().split_whitespace();

    let bytes_tok = tokens.next()?;
    if bytes_tok.is_empty() || !bytes_tok.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return None;
    }
    let bytes_transferred: u64 = bytes_tok.replace(',', "").parse().ok()?;

    let percent_tok = tokens.next()?;
    let percent_str = percent_tok.strip_suffix('%')?;
    let percent: f64 = percent_str.parse().ok()?;

    let speed_tok = tokens.next()?;
    let speed_str = speed_tok.strip_suffix("/s")?;
    let (speed_num, unit) = split_speed_unit(speed_str)?;
    let speed_value: f64 = speed_num.parse().ok()?;
    let speed_bytes_per_sec = speed_value * unit_multiplier(unit)?;

    let eta_seconds = tokens.next().and_then(parse_eta);

    Some(TransferProgress {
        bytes_transferred,
        total_bytes: 0,
        percent,
        speed_bytes_per_sec,
        eta_seconds,
    })
}

fn split_speed_unit(s: &str) -> Option<(&str, &str)> {
    for unit in ["KB", "MB", "GB", "B"] {
        if let Some(num) = s.strip_suffix(unit) {
            return Some((num, unit));
        }
    }
    None
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    Some(match unit {
        "B" => 1.0,
        "KB" => 1024.0,
        "MB" => 1024.0 * 1024.0,
        "GB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    })
}

/// `H:M:S` or `M:S` into total seconds.
fn parse_eta(token: &str) -> Option<u64> {
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let mut seconds: u64 = 0;
    for part in &parts {
        let value: u64 = part.parse().ok()?;
        seconds = seconds * 60 + value;
    }
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn progress_line_from_spec_scenario_4() {
        let progress = parse_progress_line("  1,234,567  50%   12.34MB/s    0:01:23").unwrap();
        assert_eq!(progress.bytes_transferred, 1_234_567);
        assert_eq!(progress.percent, 50.0);
        assert!((progress.speed_bytes_per_sec - 12.34 * 1024.0 * 1024.0).abs() < 1.0);
        assert_eq!(progress.eta_seconds, Some(83));
    }

    #[test]
    fn progress_line_without_eta() {
        let progress = parse_progress_line("100 10% 1.00KB/s").unwrap();
        assert_eq!(progress.eta_seconds, None);
        assert_eq!(progress.bytes_transferred, 100);
    }

    #[test]
    fn unparseable_line_returns_none() {
        assert!(parse_progress_line("rsync: building file list...").is_none());
        assert!(parse_progress_line("").is_none());
    }

    #[test]
    fn eta_hms_and_ms() {
        assert_eq!(parse_eta("1:02:03"), Some(3723));
        assert_eq!(parse_eta("2:03"), Some(123));
        assert_eq!(parse_eta("not-a-time"), None);
    }

    #[test]
    fn dry_run_is_immediately_completed_with_no_side_effects() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.bin");
        std::fs::write(&source, b"hello").unwrap();
        let dest = dir.path().join("dest/src.bin");

        let worker = TransferWorker::new(source.clone(), dest.clone(), dir.path().to_path_buf(), 5, true);
        let result = worker.run();
        assert_eq!(result.status, TransferStatus::Completed);
        assert_eq!(result.bytes_transferred, 5);
        assert!(source.exists(), "dry run must not touch the source");
        assert!(!dest.exists(), "dry run must not touch the destination");
    }

    #[test]
    fn cancel_before_run_goes_straight_to_cancelled() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.bin");
        std::fs::write(&source, b"hello").unwrap();
        let worker = TransferWorker::new(
            source,
            dir.path().join("dest.bin"),
            dir.path().to_path_buf(),
            5,
            false,
        );
        worker.cancel();
        let result = worker.run();
        assert_eq!(result.status, TransferStatus::Cancelled);
    }

    #[test]
    fn cleanup_never_removes_the_boundary_root() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let fake_source = nested.join("file.bin");
        cleanup_empty_dirs(&fake_source, dir.path());
        assert!(dir.path().exists(), "boundary root must survive");
        assert!(!nested.exists());
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn cleanup_stops_at_first_nonempty_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("a/sibling.txt"), b"keep").unwrap();
        let fake_source = nested.join("file.bin");
        cleanup_empty_dirs(&fake_source, dir.path());
        assert!(!nested.exists());
        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a").exists(), "non-empty ancestor must survive");
    }
}
