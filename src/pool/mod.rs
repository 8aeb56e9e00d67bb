//! Pool Model: tracks member drives' capacity and write-busy state, answers balance queries.

pub mod discovery;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::glob::glob_match;
use crate::types::DriveStats;

/// One member drive: its last-refreshed capacity snapshot plus a write-busy flag.
///
/// `write_locked` is a mutual-exclusion *token*, not a filesystem lock: it serializes which
/// destination a new transfer may target for throughput predictability, while the copy tool
/// itself is responsible for on-disk correctness.
pub struct Drive {
    pub stats: DriveStats,
    write_locked: Mutex<bool>,
}

impl Drive {
    fn new(stats: DriveStats) -> Self {
        Self {
            stats,
            write_locked: Mutex::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.stats.path
    }

    pub fn is_write_locked(&self) -> bool {
        *self.write_locked.lock().unwrap()
    }

    /// Atomically set `write_locked = true` if currently false. Returns whether it acquired.
    fn acquire(&self) -> bool {
        let mut locked = self.write_locked.lock().unwrap();
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    /// Idempotent: clearing an already-unlocked drive is a no-op.
    fn release(&self) {
        *self.write_locked.lock().unwrap() = false;
    }
}

/// Live model of the pool: every member's capacity and write-busy state, plus the
/// configured source/destination restriction sets.
pub struct PoolModel {
    drives: Vec<Drive>,
    source_set: Vec<PathBuf>,
    dest_set: Vec<PathBuf>,
}

impl PoolModel {
    /// Build the model from the discovered `members`, restricting sources/destinations to
    /// the configured lists (glob patterns expanded against the discovered member paths;
    /// empty list means "all members").
    pub fn new(members: &[PathBuf], source_patterns: &[String], dest_patterns: &[String]) -> Self {
        let drives = members
            .iter()
            .map(|m| Drive::new(stats::read_drive_stats(m)))
            .collect();
        let source_set = expand_member_set(members, source_patterns);
        let dest_set = expand_member_set(members, dest_patterns);
        Self {
            drives,
            source_set,
            dest_set,
        }
    }

    /// Re-read capacity/used/free for every member. No ordering guarantee between members.
    pub fn refresh_all_stats(&mut self) {
        for drive in &mut self.drives {
            drive.stats = stats::read_drive_stats(drive.path());
        }
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    fn drive(&self, path: &Path) -> Option<&Drive> {
        self.drives.iter().find(|d| d.path() == path)
    }

    /// Capacity-weighted average usage: `Σused / Σtotal × 100`, never the arithmetic mean of
    /// per-drive percentages (which misprices pools with differently-sized members).
    pub fn average_usage(&self) -> f64 {
        let total: u64 = self.drives.iter().map(|d| d.stats.total_bytes).sum();
        if total == 0 {
            return 0.0;
        }
        let used: u64 = self.drives.iter().map(|d| d.stats.used_bytes).sum();
        (used as f64 / total as f64) * 100.0
    }

    pub fn usage_range(&self) -> f64 {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for d in &self.drives {
            let u = d.stats.usage_percent();
            min = min.min(u);
            max = max.max(u);
        }
        if !min.is_finite() || !max.is_finite() {
            0.0
        } else {
            max - min
        }
    }

    pub fn is_balanced(&self, tolerance_pct: f64) -> bool {
        self.usage_range() <= tolerance_pct
    }

    /// Source members above `average + tolerance/2`, sorted by usage percent descending.
    pub fn overfull(&self, tolerance_pct: f64) -> Vec<&Drive> {
        let threshold = self.average_usage() + tolerance_pct / 2.0;
        let mut drives: Vec<&Drive> = self
            .drives
            .iter()
            .filter(|d| self.source_set.contains(&d.path().to_path_buf()))
            .filter(|d| d.stats.usage_percent() > threshold)
            .collect();
        drives.sort_by(|a, b| {
            b.stats
                .usage_percent()
                .partial_cmp(&a.stats.usage_percent())
                .unwrap()
        });
        drives
    }

    /// Destination members below `average - tolerance/2`, sorted by free bytes descending.
    pub fn underfull(&self, tolerance_pct: f64) -> Vec<&Drive> {
        let threshold = self.average_usage() - tolerance_pct / 2.0;
        let mut drives: Vec<&Drive> = self
            .drives
            .iter()
            .filter(|d| self.dest_set.contains(&d.path().to_path_buf()))
            .filter(|d| d.stats.usage_percent() < threshold)
            .collect();
        drives.sort_by(|a, b| b.stats.free_bytes.cmp(&a.stats.free_bytes));
        drives
    }

    /// Among underfull destinations (optionally excluding busy ones), the one with the most
    /// free space. `None` if no candidate qualifies.
    pub fn best_destination(&self, tolerance_pct: f64, exclude_busy: bool) -> Option<&Drive> {
        self.underfull(tolerance_pct)
            .into_iter()
            .find(|d| !exclude_busy || !d.is_write_locked())
    }

    pub fn acquire_write_lock(&self, path: &Path) -> bool {
        match self.drive(path) {
            Some(d) => d.acquire(),
            None => false,
        }
    }

    pub fn release_write_lock(&self, path: &Path) {
        if let Some(d) = self.drive(path) {
            d.release();
        }
    }
}

/// Expand a configured path list (default: all members) against the discovered `members`.
/// A pattern with no glob metacharacters must match a member exactly; a pattern with `*`/`?`
/// is matched against each member's full path string.
fn expand_member_set(members: &[PathBuf], patterns: &[String]) -> Vec<PathBuf> {
    if patterns.is_empty() {
        return members.to_vec();
    }
    members
        .iter()
        .filter(|m| {
            let text = m.to_string_lossy();
            patterns.iter().any(|p| {
                if crate::glob::has_wildcard(p) {
                    glob_match(p, &text)
                } else {
                    p.as_str() == text
                }
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_from_stats(stats: Vec<DriveStats>) -> PoolModel {
        let members: Vec<PathBuf> = stats.iter().map(|s| s.path.clone()).collect();
        let mut pool = PoolModel::new(&members, &[], &[]);
        pool.drives = stats.into_iter().map(Drive::new).collect();
        pool
    }

    fn stats(path: &str, total: u64, used: u64) -> DriveStats {
        DriveStats {
            path: PathBuf::from(path),
            total_bytes: total,
            used_bytes: used,
            free_bytes: total - used,
        }
    }

    const TIB: u64 = 1024 * 1024 * 1024 * 1024;

    #[test]
    fn scenario_1_three_drives_average_and_over_under_full() {
        let pool = model_from_stats(vec![
            stats("/mnt/disk1", TIB, (TIB as f64 * 0.8) as u64),
            stats("/mnt/disk2", TIB, (TIB as f64 * 0.3) as u64),
            stats("/mnt/disk3", 2 * TIB, TIB),
        ]);
        assert!((pool.average_usage() - 52.5).abs() < 0.01);
        let over = pool.overfull(2.0);
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].path(), Path::new("/mnt/disk1"));
        let under = pool.underfull(2.0);
        assert_eq!(under.len(), 2);
        let best = pool.best_destination(2.0, false).unwrap();
        assert_eq!(best.path(), Path::new("/mnt/disk3"));
    }

    #[test]
    fn scenario_2_best_destination_skips_write_locked() {
        let pool = model_from_stats(vec![
            stats("/mnt/disk1", TIB, (TIB as f64 * 0.8) as u64),
            stats("/mnt/disk2", TIB, (TIB as f64 * 0.3) as u64),
            stats("/mnt/disk3", 2 * TIB, TIB),
        ]);
        assert!(pool.acquire_write_lock(Path::new("/mnt/disk3")));
        let best = pool.best_destination(2.0, true).unwrap();
        assert_eq!(best.path(), Path::new("/mnt/disk2"));
    }

    #[test]
    fn scenario_3_all_drives_full_no_underfull_candidates() {
        let pool = model_from_stats(vec![
            stats("/mnt/disk1", TIB, (TIB as f64 * 0.9) as u64),
            stats("/mnt/disk2", TIB, (TIB as f64 * 0.9) as u64),
            stats("/mnt/disk3", 2 * TIB, (2.0 * TIB as f64 * 0.9) as u64),
        ]);
        assert!(pool.best_destination(2.0, false).is_none());
    }

    #[test]
    fn zero_capacity_drive_is_zero_percent_not_division_error() {
        let pool = model_from_stats(vec![stats("/mnt/empty", 0, 0)]);
        assert_eq!(pool.drives()[0].stats.usage_percent(), 0.0);
    }

    #[test]
    fn single_drive_pool_is_always_balanced() {
        let pool = model_from_stats(vec![stats("/mnt/only", TIB, TIB / 2)]);
        assert_eq!(pool.usage_range(), 0.0);
        assert!(pool.is_balanced(0.0));
    }

    #[test]
    fn write_lock_acquire_is_exclusive_and_release_is_idempotent() {
        let pool = model_from_stats(vec![stats("/mnt/disk1", TIB, TIB / 2)]);
        assert!(pool.acquire_write_lock(Path::new("/mnt/disk1")));
        assert!(!pool.acquire_write_lock(Path::new("/mnt/disk1")));
        pool.release_write_lock(Path::new("/mnt/disk1"));
        pool.release_write_lock(Path::new("/mnt/disk1"));
        assert!(pool.acquire_write_lock(Path::new("/mnt/disk1")));
    }

    #[test]
    fn is_balanced_iff_usage_range_within_tolerance() {
        let pool = model_from_stats(vec![
            stats("/mnt/disk1", TIB, (TIB as f64 * 0.8) as u64),
            stats("/mnt/disk2", TIB, (TIB as f64 * 0.3) as u64),
        ]);
        let range = pool.usage_range();
        assert_eq!(pool.is_balanced(range), true);
        assert_eq!(pool.is_balanced(range - 0.001), false);
    }

    #[test]
    fn source_and_dest_restriction_lists_are_honored() {
        let members: Vec<PathBuf> = vec![PathBuf::from("/mnt/disk1"), PathBuf::from("/mnt/disk2")];
        let pool = PoolModel::new(&members, &["/mnt/disk1".to_string()], &["/mnt/disk2".to_string()]);
        assert_eq!(pool.source_set, vec![PathBuf::from("/mnt/disk1")]);
        assert_eq!(pool.dest_set, vec![PathBuf::from("/mnt/disk2")]);
    }

    #[test]
    fn glob_pattern_in_restriction_list_matches_multiple_members() {
        let members: Vec<PathBuf> = vec![
            PathBuf::from("/mnt/disk1"),
            PathBuf::from("/mnt/disk2"),
            PathBuf::from("/mnt/ssd1"),
        ];
        let pool = PoolModel::new(&members, &["/mnt/disk*".to_string()], &[]);
        assert_eq!(pool.source_set.len(), 2);
    }
}
