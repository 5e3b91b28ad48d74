//! Store configuration.

/// Configuration for opening a [`crate::DurableStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Force every record to the device before the write returns.
    pub sync_on_write: bool,

    /// Logs smaller than this are never compacted automatically.
    pub compaction_min_bytes: u64,

    /// Fraction of the log that must be garbage before automatic compaction.
    pub compaction_garbage_ratio: f64,

    /// Byte budget for the log, if any.
    pub quota_bytes: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            compaction_min_bytes: 64 * 1024,
            compaction_garbage_ratio: 0.5,
            quota_bytes: None,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether each write is synced to the device.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the minimum log size for automatic compaction.
    #[must_use]
    pub const fn compaction_min_bytes(mut self, bytes: u64) -> Self {
        self.compaction_min_bytes = bytes;
        self
    }

    /// Sets the garbage ratio that triggers automatic compaction.
    #[must_use]
    pub fn compaction_garbage_ratio(mut self, ratio: f64) -> Self {
        self.compaction_garbage_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Limits the log to `bytes`.
    #[must_use]
    pub const fn quota_bytes(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.sync_on_write);
        assert_eq!(config.compaction_min_bytes, 65536);
        assert_eq!(config.quota_bytes, None);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .sync_on_write(false)
            .compaction_min_bytes(0)
            .compaction_garbage_ratio(3.0)
            .quota_bytes(4096);

        assert!(!config.sync_on_write);
        assert_eq!(config.compaction_min_bytes, 0);
        assert!((config.compaction_garbage_ratio - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.quota_bytes, Some(4096));
    }
}
