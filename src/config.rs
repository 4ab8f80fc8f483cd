//! Log configuration.

use serde::{Deserialize, Serialize};

/// Segment limit used when a configured limit is zero.
pub const DEFAULT_SEGMENT_BYTES: u64 = 1024;

/// Configuration for opening a log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Per-segment limits and the starting offset of a brand-new log.
    #[serde(default)]
    pub segment: SegmentConfig,
}

/// Size limits shared by every segment of a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Rotate once the store file reaches this many bytes.
    pub max_store_bytes: u64,

    /// Rotate once the index reaches this many bytes.
    /// Also the size of the pre-allocated, memory-mapped index region.
    pub max_index_bytes: u64,

    /// Base offset of the first segment when the log directory is empty.
    /// Ignored when existing segments are found on disk.
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_SEGMENT_BYTES,
            max_index_bytes: DEFAULT_SEGMENT_BYTES,
            initial_offset: 0,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum store size of a segment.
    #[must_use]
    pub const fn max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    /// Sets the maximum index size (and mapped capacity) of a segment.
    #[must_use]
    pub const fn max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Sets the base offset of a brand-new log.
    #[must_use]
    pub const fn initial_offset(mut self, offset: u64) -> Self {
        self.segment.initial_offset = offset;
        self
    }

    /// Returns a copy with zero limits replaced by [`DEFAULT_SEGMENT_BYTES`].
    ///
    /// A zero limit would make every segment maxed on creation and the log
    /// would rotate forever.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        if config.segment.max_store_bytes == 0 {
            config.segment.max_store_bytes = DEFAULT_SEGMENT_BYTES;
        }
        if config.segment.max_index_bytes == 0 {
            config.segment.max_index_bytes = DEFAULT_SEGMENT_BYTES;
        }
        config
    }
}
