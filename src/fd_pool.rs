//! Pool of read-only file handles for one path.
//!
//! Concurrent sequence readers each borrow a private handle through an RAII
//! guard; dropping the guard pushes the handle back for reuse. The pool keeps
//! a LIFO list behind a mutex whose critical section is a single push or pop.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct PoolInner {
    path: PathBuf,
    idle: Mutex<Vec<File>>,
}

/// Shared pool of idle read handles. Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct FdPool {
    inner: Arc<PoolInner>,
}

impl FdPool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FdPool { inner: Arc::new(PoolInner { path: path.into(), idle: Mutex::new(Vec::new()) }) }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns a cached idle handle if any, else opens a new read-only one.
    pub fn acquire(&self) -> io::Result<FdGuard> {
        let cached = self.inner.idle.lock().unwrap().pop();
        let file = match cached {
            Some(file) => file,
            None => File::open(&self.inner.path)?,
        };
        Ok(FdGuard { pool: Arc::clone(&self.inner), file: Some(file) })
    }
}

/// Borrowed handle; returns to the pool on drop.
#[derive(Debug)]
pub struct FdGuard {
    pool: Arc<PoolInner>,
    file: Option<File>,
}

impl FdGuard {
    /// The underlying handle, or `None` once the guard has been released.
    pub fn file(&mut self) -> Option<&mut File> {
        self.file.as_mut()
    }

    /// Returns the handle to the pool ahead of drop. Idempotent.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            self.pool.idle.lock().unwrap().push(file);
        }
    }
}

impl Drop for FdGuard {
    fn drop(&mut self) {
        self.release();
    }
}
