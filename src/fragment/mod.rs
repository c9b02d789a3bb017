
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

use crate::error::Result;

/// One produced segment: an HLS TS segment or a DASH m4s fragment.
///
/// Producers write to [`Fragment::tmp_path`] and atomically publish with
/// [`Fragment::rename`], so a consumer fetching by URL never observes a
/// partially written file.
#[derive(Debug, Default, Clone)]
pub struct Fragment {
    full_path: PathBuf,
    duration: Duration,
    start_dts: Option<i64>,
    sequence_header: bool,
    number: u64,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.full_path = path.into();
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn tmp_path(&self) -> PathBuf {
        let mut os = self.full_path.as_os_str().to_owned();
        os.push(".tmp");
        PathBuf::from(os)
    }

    pub fn set_number(&mut self, n: u64) {
        self.number = n;
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn set_sequence_header(&mut self, v: bool) {
        self.sequence_header = v;
    }

    pub fn is_sequence_header(&self) -> bool {
        self.sequence_header
    }

    /// Account one frame; the duration spans the first to the latest
    /// dts.
    pub fn append(&mut self, dts_ms: i64) {
        match self.start_dts {
            None => self.start_dts = Some(dts_ms),
            Some(start) => {
                // Ignore backward jumps; streams do rewind on republish.
                if dts_ms > start {
                    self.duration = Duration::from_millis((dts_ms - start) as u64);
                }
            }
        }
    }

    pub fn start_dts(&self) -> i64 {
        self.start_dts.unwrap_or(0)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn create_dir(&self) -> Result<()> {
        if let Some(dir) = self.full_path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Atomically publish the segment under its final name.
    pub fn rename(&self) -> Result<()> {
        fs::rename(self.tmp_path(), &self.full_path)?;
        Ok(())
    }

    pub fn unlink_tmpfile(&self) {
        let tmp = self.tmp_path();
        if tmp.exists() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("unlink {}: {e}", tmp.display());
            }
        }
    }

    pub fn unlink_file(&self) {
        if self.full_path.exists() {
            if let Err(e) = fs::remove_file(&self.full_path) {
                warn!("unlink {}: {e}", self.full_path.display());
            }
        }
    }
}

/// The sliding window of segments a playlist references.
#[derive(Debug, Default)]
pub struct FragmentWindow {
    fragments: Vec<Fragment>,
    expired: Vec<Fragment>,
}

impl FragmentWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a finished fragment into the active window.
    pub fn append(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Evict the oldest fragments while the window exceeds its duration
    /// budget, keeping at least one.
    pub fn shrink(&mut self, window: Duration) {
        let mut total: Duration = self.fragments.iter().map(|f| f.duration()).sum();
        while total > window && self.fragments.len() >= 2 {
            let evicted = self.fragments.remove(0);
            total = total.saturating_sub(evicted.duration());
            self.expired.push(evicted);
        }
    }

    /// Drop expired fragments, unlinking their files when asked.
    pub fn clear_expired(&mut self, delete_files: bool) {
        if delete_files {
            for fragment in &self.expired {
                fragment.unlink_file();
            }
        }
        self.expired.clear();
    }

    /// Delete every fragment, active and expired.
    pub fn dispose(&mut self) {
        for fragment in self.fragments.drain(..).chain(self.expired.drain(..)) {
            fragment.unlink_file();
            fragment.unlink_tmpfile();
        }
    }

    pub fn max_duration(&self) -> Duration {
        self.fragments
            .iter()
            .map(|f| f.duration())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn size(&self) -> usize {
        self.fragments.len()
    }

    pub fn first(&self) -> Option<&Fragment> {
        self.fragments.first()
    }

    pub fn at(&self, index: usize) -> Option<&Fragment> {
        self.fragments.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter()
    }

    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }
}
