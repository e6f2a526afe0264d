//! Buffer configuration.

use serde::{Deserialize, Serialize};
use strata_common::utils::error::{Error, Result};

/// Tuning knobs shared by hybrid buffers, encoded columns and block buffers.
///
/// # Examples
///
/// ```
/// use strata_core::BufferConfig;
///
/// let config = BufferConfig::default()
///     .with_in_memory_cap(1024)
///     .with_block_size(256);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Items a hybrid buffer keeps resident before spilling a chunk.
    pub in_memory_cap: usize,
    /// Distinct values tracked before tracking is abandoned.
    pub distinct_cap: usize,
    /// Items per block of a finished column.
    pub block_size: usize,
    /// Finished columns at or below this length stay in memory.
    pub in_memory_threshold: usize,
    /// Verify CRC32 of spilled chunks when reading them back.
    pub verify_checksums: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            in_memory_cap: 32_768,
            distinct_cap: 1_024,
            block_size: 4_096,
            in_memory_threshold: 16_384,
            verify_checksums: true,
        }
    }
}

impl BufferConfig {
    /// Sets the resident item cap.
    pub fn with_in_memory_cap(mut self, cap: usize) -> Self {
        self.in_memory_cap = cap;
        self
    }

    /// Sets the distinct tracking cap.
    pub fn with_distinct_cap(mut self, cap: usize) -> Self {
        self.distinct_cap = cap;
        self
    }

    /// Sets the block size of finished columns.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the in-memory array threshold.
    pub fn with_in_memory_threshold(mut self, threshold: usize) -> Self {
        self.in_memory_threshold = threshold;
        self
    }

    /// Enables or disables chunk checksum verification.
    pub fn with_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Checks that every size is usable.
    pub fn validate(&self) -> Result<()> {
        if self.in_memory_cap == 0 {
            return Err(Error::Config("in_memory_cap must be at least 1".to_string()));
        }
        if self.distinct_cap == 0 {
            return Err(Error::Config("distinct_cap must be at least 1".to_string()));
        }
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(BufferConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(BufferConfig::default().with_in_memory_cap(0).validate().is_err());
        assert!(BufferConfig::default().with_block_size(0).validate().is_err());
        assert!(BufferConfig::default().with_distinct_cap(0).validate().is_err());
        assert!(BufferConfig::default().with_distinct_cap(1).validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: BufferConfig = serde_json::from_str(r#"{"block_size": 64}"#).unwrap();
        assert_eq!(config.block_size, 64);
        assert_eq!(config.in_memory_cap, BufferConfig::default().in_memory_cap);
    }
}
