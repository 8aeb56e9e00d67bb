//! Pool member discovery: given a mergerfs mount point, find its underlying member
//! directories and the subpath (relative to the mount) the user actually asked to balance.

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::BalanceError;

const XATTR_NAME: &str = "user.mergerfs.srcmounts";

/// `(members, subpath)`: the member directories backing the pool, and the path from the
/// union root to the user-specified balance target (identical to `mount_point` unless the
/// user pointed the tool at a subdirectory of the pool).
pub struct Discovery {
    pub members: Vec<PathBuf>,
    pub subpath: PathBuf,
}

/// Discover pool members for `target` (the mount point or a subdirectory of it).
///
/// Tries, in order: (1) the mergerfs control xattr, (2) `/proc/mounts`, (3) `/etc/fstab`.
/// Fatal (`BalanceError::Discovery`) if no method yields a non-empty member list.
pub fn discover(target: &Path) -> Result<Discovery, BalanceError> {
    let target = target.canonicalize().map_err(|e| BalanceError::Discovery {
        mount_point: target.to_path_buf(),
        reason: format!("canonicalize: {e}"),
    })?;

    let mount_point = find_mount_point(&target)
        .unwrap_or_else(|| target.clone());
    let subpath = target
        .strip_prefix(&mount_point)
        .unwrap_or(Path::new(""))
        .to_path_buf();

    let members = read_xattr_srcmounts(&mount_point)
        .or_else(|| read_proc_mounts(&mount_point))
        .or_else(|| read_etc_fstab(&mount_point));

    match members {
        Some(members) if !members.is_empty() => Ok(Discovery { members, subpath }),
        _ => Err(BalanceError::Discovery {
            mount_point,
            reason: "no discovery method yielded a non-empty member list".to_string(),
        }),
    }
}

/// Find the mount point actually backing `path`: the longest prefix among `/proc/mounts`
/// entries, falling back to `path` itself if `/proc/mounts` is unreadable (non-Linux).
fn find_mount_point(path: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string("/proc/mounts").ok()?;
    let mut best: Option<PathBuf> = None;
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let _device = fields.next()?;
        let mount_point = fields.next()?;
        let mount_point = unescape_mount_field(mount_point);
        if path.starts_with(&mount_point) {
            let better = match &best {
                None => true,
                Some(b) => mount_point.components().count() > b.components().count(),
            };
            if better {
                best = Some(mount_point);
            }
        }
    }
    best
}

/// Read the mergerfs control xattr directly on `mount_point` (mergerfs exposes it on the
/// mount root itself, not on a separate control file, for reads of this key).
fn read_xattr_srcmounts(mount_point: &Path) -> Option<Vec<PathBuf>> {
    let value = xattr::get(mount_point, XATTR_NAME).ok().flatten()?;
    let text = String::from_utf8(value).ok()?;
    let members: Vec<PathBuf> = text
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    debug!("discovered {} members via xattr", members.len());
    if members.is_empty() { None } else { Some(members) }
}

/// Fall back to `/proc/mounts`: find the `fuse.mergerfs` entry for `mount_point` and split
/// its colon-separated source field.
fn read_proc_mounts(mount_point: &Path) -> Option<Vec<PathBuf>> {
    let contents = std::fs::read_to_string("/proc/mounts").ok()?;
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let source = fields.next()?;
        let mp = fields.next()?;
        let fstype = fields.next()?;
        if fstype != "fuse.mergerfs" {
            continue;
        }
        if unescape_mount_field(mp) != mount_point {
            continue;
        }
        let members: Vec<PathBuf> = source
            .split(':')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if !members.is_empty() {
            debug!("discovered {} members via /proc/mounts", members.len());
            return Some(members);
        }
    }
    None
}

/// Last-resort static fallback: `/etc/fstab` entries are rarely live-accurate for mergerfs
/// (mounts are usually started by a unit or script), but the format is identical.
fn read_etc_fstab(mount_point: &Path) -> Option<Vec<PathBuf>> {
    let contents = std::fs::read_to_string("/etc/fstab").ok()?;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let source = fields.next()?;
        let mp = fields.next()?;
        let fstype = fields.next()?;
        if fstype != "fuse.mergerfs" && fstype != "mergerfs" {
            continue;
        }
        if Path::new(mp) != mount_point {
            continue;
        }
        let members: Vec<PathBuf> = source
            .split(':')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if !members.is_empty() {
            debug!("discovered {} members via /etc/fstab", members.len());
            return Some(members);
        }
    }
    None
}

/// `/proc/mounts` escapes spaces, tabs, backslashes and newlines as `\xxx` octal; undo that
/// for the mount-point field so path comparisons work.
fn unescape_mount_field(field: &str) -> PathBuf {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            if let Ok(code) = u8::from_str_radix(
                std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or(""),
                8,
            ) {
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(String::from_utf8_lossy(&out).into_owned())
}
