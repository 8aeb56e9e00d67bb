//! Disk capacity lookup: map a member path to total/used/free bytes for its filesystem.
//!
//! Uses `sysinfo::Disks`, matching by longest mount-point prefix (the same "closest enclosing
//! mount" idea the teacher's `disk_detect` module used for drive-type detection, repurposed
//! here for capacity instead of spindle type).

use std::path::Path;

use sysinfo::Disks;

use crate::types::DriveStats;

/// Read capacity/used/free for the filesystem backing `path`.
///
/// Matches `path` against every mounted filesystem's mount point and picks the longest
/// matching prefix (the filesystem actually backing the path, not some parent mount).
/// Falls back to `total=0` (and therefore `usage_percent() == 0`) if no mount matches,
/// which keeps the pool model's zero-capacity invariant rather than erroring.
pub fn read_drive_stats(path: &Path) -> DriveStats {
    let disks = Disks::new_with_refreshed_list();
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    let mut best: Option<(&Path, u64, u64)> = None;
    for disk in disks.list() {
        let mount_point = disk.mount_point();
        if canonical.starts_with(mount_point) {
            let depth = mount_point.components().count() as u64;
            let replace = match best {
                None => true,
                Some((best_mp, _, _)) => depth > best_mp.components().count() as u64,
            };
            if replace {
                best = Some((mount_point, disk.total_space(), disk.available_space()));
            }
        }
    }

    match best {
        Some((_, total, available)) => {
            let used = total.saturating_sub(available);
            DriveStats {
                path: path.to_path_buf(),
                total_bytes: total,
                used_bytes: used,
                free_bytes: available,
            }
        }
        None => DriveStats {
            path: path.to_path_buf(),
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
        },
    }
}
