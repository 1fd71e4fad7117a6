//! File operations that tolerate transient conflicts.
//!
//! A concurrent reader may briefly hold a segment file open while a merge
//! tries to delete or replace it. These helpers retry with linear backoff and
//! give up with [`HashdexError::TransientFsConflict`] past a fixed ceiling.

use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{HashdexError, Result};

/// How often and how patiently to retry a file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure; grows linearly with each attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn run<F>(&self, operation: &'static str, path: &Path, mut op: F) -> Result<()>
    where
        F: FnMut() -> std::io::Result<()>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(()) => {
                    debug!("{operation} {path:?} succeeded on attempt {attempt}");
                    return Ok(());
                }
                Err(source) if attempt >= self.max_attempts => {
                    return Err(HashdexError::TransientFsConflict {
                        operation,
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    let delay = self.base_delay * attempt;
                    warn!("failed to {operation} {path:?} ({e}), retrying in {delay:?}");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(10, Duration::from_secs(1))
    }
}

/// Delete `path`, retrying while the removal fails.
///
/// A file that is already gone counts as deleted.
pub fn remove_file(path: &Path, policy: &RetryPolicy) -> Result<()> {
    policy.run("delete", path, || match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    })
}

/// Rename `from` to `to`, replacing `to`, retrying while the rename fails.
pub fn rename(from: &Path, to: &Path, policy: &RetryPolicy) -> Result<()> {
    policy.run("rename", from, || std::fs::rename(from, to))
}
