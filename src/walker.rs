//! File Walker: a lazy, finite, non-restartable `(path, size)` sequence over one member
//! directory, filtered by basename glob and size bounds, with push-back support for the
//! coordinator's scoring-based file selection (§4.6 of the design).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::glob::glob_match;

/// Basename include/exclude globs plus size bounds, applied uniformly by the walker.
#[derive(Clone, Debug, Default)]
pub struct WalkFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

impl WalkFilter {
    /// Includes take precedence over the "accept everything" default; excludes always apply.
    fn name_matches(&self, name: &str) -> bool {
        if !self.exclude.is_empty() && self.exclude.iter().any(|p| glob_match(p, name)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| glob_match(p, name))
    }

    fn size_matches(&self, size: u64) -> bool {
        if let Some(min) = self.min_size
            && size < min
        {
            return false;
        }
        if let Some(max) = self.max_size
            && size > max
        {
            return false;
        }
        true
    }

    pub fn matches(&self, name: &str, size: u64) -> bool {
        self.name_matches(name) && self.size_matches(size)
    }
}

fn is_dotted(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Depth-first, filtered `(path, size)` cursor over `root`, with a small prepend buffer
/// serviced before the underlying traversal resumes.
pub struct Walker {
    inner: Box<dyn Iterator<Item = walkdir::Result<walkdir::DirEntry>>>,
    filter: WalkFilter,
    prepend_buf: VecDeque<(PathBuf, u64)>,
}

impl Walker {
    pub fn new(root: &Path, filter: WalkFilter) -> Self {
        let walk = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_dotted(e));
        Self {
            inner: Box::new(walk),
            filter,
            prepend_buf: VecDeque::new(),
        }
    }

    /// Push previously-yielded items back onto the head of the sequence, serviced before the
    /// underlying traversal resumes. Used by the scoring-based selection variant to return
    /// unchosen candidates.
    pub fn prepend(&mut self, items: Vec<(PathBuf, u64)>) {
        for item in items.into_iter().rev() {
            self.prepend_buf.push_front(item);
        }
    }
}

impl Iterator for Walker {
    type Item = (PathBuf, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.prepend_buf.pop_front() {
            return Some(item);
        }
        for entry in self.inner.by_ref() {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue, // stat/readdir error: skip silently, keep walking
            };
            if entry.depth() == 0 {
                continue; // never yield the root itself
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            let name = match entry.file_name().to_str() {
                Some(n) => n,
                None => continue,
            };
            let size = metadata.len();
            if self.filter.matches(name, size) {
                return Some((entry.into_path(), size));
            }
        }
        None
    }
}
