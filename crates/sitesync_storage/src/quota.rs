//! Byte-budget wrapper around another backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};

/// Wraps a backend and refuses writes that would exceed `limit` bytes.
///
/// Mirrors the per-origin quota of browser storage: a rejected append leaves
/// the inner backend untouched and returns
/// [`StorageError::QuotaExceeded`].
///
/// ```rust
/// use sitesync_storage::{InMemoryBackend, QuotaBackend, StorageBackend};
///
/// let mut backend = QuotaBackend::new(InMemoryBackend::new(), 8);
/// backend.append(b"12345678").unwrap();
/// assert!(backend.append(b"9").unwrap_err().is_quota());
/// ```
#[derive(Debug)]
pub struct QuotaBackend<B: StorageBackend> {
    inner: B,
    limit: u64,
}

impl<B: StorageBackend> QuotaBackend<B> {
    /// Wraps `inner` with a budget of `limit` bytes.
    pub fn new(inner: B, limit: u64) -> Self {
        Self { inner, limit }
    }

    /// Returns the wrapped backend.
    pub fn into_inner(self) -> B {
        self.inner
    }

    fn check(&self, used: u64, requested: u64) -> StorageResult<()> {
        if used.saturating_add(requested) > self.limit {
            return Err(StorageError::QuotaExceeded {
                requested,
                used,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

impl<B: StorageBackend> StorageBackend for QuotaBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check(self.inner.size()?, data.len() as u64)?;
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace_all(&mut self, data: &[u8]) -> StorageResult<()> {
        self.check(0, data.len() as u64)?;
        self.inner.replace_all(data)
    }

    fn limit(&self) -> Option<u64> {
        Some(match self.inner.limit() {
            Some(inner) => inner.min(self.limit),
            None => self.limit,
        })
    }
}
