// src/run_lock.rs
//! Advisory single-flag run lock.
//!
//! A persisted boolean says whether a workflow is running. Acquiring reads the
//! flag and sets it; there is no compare-and-set, so two runs starting within
//! the flag's write latency can both get in. Finding the flag already set is
//! not an error: the caller skips its work and reports success.
//!
//! `run_exclusive` clears the flag on every exit of the protected work,
//! including panics. A process killed mid-run leaves the flag set and it has
//! to be cleared by hand.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::error::RunLockError;

const RUNNING: &str = "yep";
const IDLE: &str = "nope";

/// Persisted "workflow is running" flag.
#[async_trait]
pub trait RunFlag: Send + Sync {
    async fn is_set(&self) -> Result<bool, RunLockError>;
    async fn set(&self, running: bool) -> Result<(), RunLockError>;
}

/// Flag stored as a small text file holding `yep` or `nope`.
pub struct FileRunFlag {
    path: PathBuf,
}

impl FileRunFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RunFlag for FileRunFlag {
    async fn is_set(&self) -> Result<bool, RunLockError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.trim() == RUNNING),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, running: bool) -> Result<(), RunLockError> {
        let content = if running { RUNNING } else { IDLE };
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRunFlag {
    running: AtomicBool,
}

impl MemoryRunFlag {
    pub fn new(running: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
        }
    }
}

#[async_trait]
impl RunFlag for MemoryRunFlag {
    async fn is_set(&self) -> Result<bool, RunLockError> {
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn set(&self, running: bool) -> Result<(), RunLockError> {
        self.running.store(running, Ordering::SeqCst);
        Ok(())
    }
}

/// Result of a lock-guarded run.
#[derive(Debug, PartialEq)]
pub enum LockOutcome<T> {
    Completed(T),
    /// Another run holds the flag. Nothing was done.
    AlreadyRunning,
}

#[derive(Clone)]
pub struct RunLock {
    flag: Arc<dyn RunFlag>,
}

impl RunLock {
    pub fn new(flag: Arc<dyn RunFlag>) -> Self {
        Self { flag }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileRunFlag::new(path)))
    }

    pub async fn is_held(&self) -> Result<bool, RunLockError> {
        self.flag.is_set().await
    }

    /// Sets the flag. Returns `false` when it was already set.
    pub async fn acquire(&self) -> Result<bool, RunLockError> {
        if self.flag.is_set().await? {
            return Ok(false);
        }
        self.flag.set(true).await?;
        Ok(true)
    }

    pub async fn release(&self) -> Result<(), RunLockError> {
        self.flag.set(false).await
    }

    /// Runs `work` while holding the flag and releases it afterwards, whether
    /// `work` returns or panics. A panic is resumed after the release.
    pub async fn run_exclusive<F, T>(&self, work: F) -> Result<LockOutcome<T>, RunLockError>
    where
        F: Future<Output = T>,
    {
        if !self.acquire().await? {
            info!("Run lock already held, skipping this run");
            return Ok(LockOutcome::AlreadyRunning);
        }

        let result = AssertUnwindSafe(work).catch_unwind().await;

        let released = self.release().await;
        if let Err(e) = &released {
            error!("Failed to release run lock: {}", e);
        }

        match result {
            Ok(value) => match released {
                Ok(()) => Ok(LockOutcome::Completed(value)),
                Err(e) => Err(RunLockError::Release(e.to_string())),
            },
            Err(panic) => {
                warn!("Lock-guarded work panicked, lock released");
                std::panic::resume_unwind(panic)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_held_lock_skips_work() {
        let lock = RunLock::new(Arc::new(MemoryRunFlag::new(true)));
        let mut ran = false;
        let outcome = lock
            .run_exclusive(async {
                ran = true;
            })
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::AlreadyRunning);
        assert!(!ran);
        assert!(lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_released_after_success_and_error() {
        let lock = RunLock::new(Arc::new(MemoryRunFlag::default()));

        let outcome = lock.run_exclusive(async { 5 }).await.unwrap();
        assert_eq!(outcome, LockOutcome::Completed(5));
        assert!(!lock.is_held().await.unwrap());

        let outcome = lock
            .run_exclusive(async { Err::<(), _>("boom") })
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Completed(Err("boom")));
        assert!(!lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_is_held_during_work() {
        let lock = RunLock::new(Arc::new(MemoryRunFlag::default()));
        let inner = lock.clone();
        let outcome = lock
            .run_exclusive(async move { inner.is_held().await.unwrap() })
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Completed(true));
    }

    #[tokio::test]
    async fn test_lock_released_after_panic() {
        let lock = RunLock::new(Arc::new(MemoryRunFlag::default()));
        let task_lock = lock.clone();
        let handle = tokio::spawn(async move {
            task_lock
                .run_exclusive(async {
                    panic!("work exploded");
                })
                .await
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert!(!lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_flag_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("is_running.txt");
        let lock = RunLock::file(&path);

        assert!(!lock.is_held().await.unwrap());
        assert!(lock.acquire().await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "yep");
        assert!(!lock.acquire().await.unwrap());

        lock.release().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nope");
        assert!(!lock.is_held().await.unwrap());
    }
}
