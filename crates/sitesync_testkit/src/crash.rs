//! Storage fault injection.
//!
//! [`CrashingBackend`] wraps an [`InMemoryBackend`] and fails writes on
//! demand. The backend is moved into the store, so it is armed through the
//! [`CrashSwitch`] returned alongside it. The wrapped buffer stays readable
//! through the original handle, which lets a test reopen a store from the
//! bytes that made it to "disk" before the crash.

use sitesync_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Switch {
    /// Appended bytes allowed before the crash.
    budget: AtomicU64,
    crashed: AtomicBool,
}

/// Arms a [`CrashingBackend`] after it has been handed to a store.
#[derive(Debug, Clone)]
pub struct CrashSwitch {
    inner: Arc<Switch>,
}

impl CrashSwitch {
    /// Lets `bytes` more bytes through, then cuts the next append short and
    /// fails every write after it.
    pub fn crash_after(&self, bytes: u64) {
        self.inner.budget.store(bytes, Ordering::SeqCst);
    }

    /// Fails every write from now on without writing anything.
    pub fn crash_now(&self) {
        self.crash_after(0);
    }

    /// True once a write has failed.
    pub fn has_crashed(&self) -> bool {
        self.inner.crashed.load(Ordering::SeqCst)
    }
}

/// An in-memory backend whose writes can be made to fail.
#[derive(Debug)]
pub struct CrashingBackend {
    inner: InMemoryBackend,
    switch: Arc<Switch>,
}

impl CrashingBackend {
    /// Wraps `inner`, disarmed.
    pub fn new(inner: InMemoryBackend) -> (Self, CrashSwitch) {
        let switch = Arc::new(Switch {
            budget: AtomicU64::new(u64::MAX),
            crashed: AtomicBool::new(false),
        });
        let handle = CrashSwitch {
            inner: Arc::clone(&switch),
        };
        (Self { inner, switch }, handle)
    }

    fn crash(&self, what: &str) -> StorageError {
        self.switch.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }

    fn check(&self, what: &str) -> StorageResult<()> {
        if self.switch.crashed.load(Ordering::SeqCst) {
            Err(self.crash(what))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for CrashingBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check("append")?;
        let budget = self.switch.budget.load(Ordering::SeqCst);
        let len = data.len() as u64;
        if len > budget {
            let partial = usize::try_from(budget).unwrap_or(data.len());
            if partial > 0 {
                self.inner.append(&data[..partial])?;
            }
            return Err(self.crash("append"));
        }
        if budget != u64::MAX {
            self.switch.budget.store(budget - len, Ordering::SeqCst);
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check("flush")?;
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check("sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check("truncate")?;
        self.inner.truncate(new_size)
    }

    fn replace_all(&mut self, data: &[u8]) -> StorageResult<()> {
        self.check("rewrite")?;
        self.inner.replace_all(data)
    }
}
