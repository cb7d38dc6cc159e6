// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime},
};

use tracing::trace;

use crate::{Error, Result};

/// How long a file's modification time needs to stay put before a change is
/// considered finished, unless configured otherwise.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq)]
enum DebounceState {
    /// The file's modification time matches the last known one.
    Stable,
    /// The file's modification time was seen to differ at `read_at`, and
    /// we're waiting for a read that agrees with `candidate`.
    ChangeDetected {
        candidate: SystemTime,
        read_at: Instant,
    },
}

/// Polling change detector for a single file.
///
/// Writers (compilers, editors) often update a file over multiple syscalls,
/// so one differing modification time doesn't mean the file is ready to be
/// read. A change is only reported once two consecutive reads, at least the
/// settle interval apart, agree on the new modification time.
///
/// [`ChangeWatcher::poll`] never blocks, it's meant to be called e.g. once per
/// frame, and the settle interval is measured between polls.
#[derive(Debug)]
pub struct ChangeWatcher {
    path: PathBuf,
    last_known_mtime: Option<SystemTime>,
    state: DebounceState,
    settle_interval: Duration,
}

impl ChangeWatcher {
    /// Creates a watcher for `path`, considering its current contents as
    /// already seen. If the file doesn't exist yet, it will be reported as
    /// changed after it appears.
    pub fn new(path: impl Into<PathBuf>) -> ChangeWatcher {
        let path = path.into();
        let last_known_mtime = read_mtime(&path).ok();
        ChangeWatcher {
            path,
            last_known_mtime,
            state: DebounceState::Stable,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        }
    }

    /// Sets the minimum time between the reads which need to agree before a
    /// change is reported.
    pub fn with_settle_interval(mut self, settle_interval: Duration) -> ChangeWatcher {
        self.settle_interval = settle_interval;
        self
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The modification time of the last reported (or initially seen)
    /// version of the file.
    pub fn last_known_mtime(&self) -> Option<SystemTime> {
        self.last_known_mtime
    }

    /// Returns true if a change has been detected but not yet confirmed.
    pub fn is_settling(&self) -> bool {
        matches!(self.state, DebounceState::ChangeDetected { .. })
    }

    /// Checks the file, returning true if a change finished since the last
    /// time this returned true.
    ///
    /// If the file can't be accessed, [`Error::ResourceUnavailable`] is
    /// returned and nothing changes, so the next poll simply tries again.
    pub fn poll(&mut self) -> Result<bool> {
        let now = Instant::now();
        match self.state {
            DebounceState::Stable => {
                let mtime = read_mtime(&self.path)?;
                if Some(mtime) != self.last_known_mtime {
                    trace!(
                        "Detected a change in {}, waiting for it to settle.",
                        self.path.display()
                    );
                    self.state = DebounceState::ChangeDetected {
                        candidate: mtime,
                        read_at: now,
                    };
                }
                Ok(false)
            }

            DebounceState::ChangeDetected { candidate, read_at } => {
                if now.duration_since(read_at) < self.settle_interval {
                    return Ok(false);
                }
                let mtime = read_mtime(&self.path)?;
                if mtime == candidate {
                    self.last_known_mtime = Some(mtime);
                    self.state = DebounceState::Stable;
                    Ok(true)
                } else {
                    self.state = DebounceState::ChangeDetected {
                        candidate: mtime,
                        read_at: now,
                    };
                    Ok(false)
                }
            }
        }
    }

    /// Polls until the file is stable, sleeping for the settle interval
    /// between reads. Returns true if a change was confirmed.
    ///
    /// This blocks for as long as the file keeps changing, so prefer
    /// [`ChangeWatcher::poll`] in anything frame-based.
    pub fn settle_blocking(&mut self) -> Result<bool> {
        loop {
            if self.poll()? {
                return Ok(true);
            }
            if !self.is_settling() {
                return Ok(false);
            }
            thread::sleep(self.settle_interval);
        }
    }
}

fn read_mtime(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(|source| Error::ResourceUnavailable {
            path: path.to_path_buf(),
            source,
        })
}
