//! Registry configuration

use std::time::Duration;

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Size of the shared zone in bytes
    pub zone_size: usize,

    /// Largest single block the zone hands out
    pub max_block_size: usize,

    /// Longest accepted channel id in bytes
    pub max_id_len: usize,

    /// Interval of the background sweep (None = lookups reclaim on their own)
    pub sweep_interval: Option<Duration>,

    /// Maximum channels deleted per sweep pass
    pub sweep_batch: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            zone_size: 16 * 1024 * 1024, // 16MB
            max_block_size: 1024 * 1024,
            max_id_len: 1024,
            sweep_interval: None,
            sweep_batch: 64,
        }
    }
}

impl RegistryConfig {
    /// Set the zone size
    pub fn zone_size(mut self, bytes: usize) -> Self {
        self.zone_size = bytes;
        self
    }

    /// Set the maximum block size
    pub fn max_block_size(mut self, bytes: usize) -> Self {
        self.max_block_size = bytes;
        self
    }

    /// Set the maximum channel id length
    pub fn max_id_len(mut self, len: usize) -> Self {
        self.max_id_len = len;
        self
    }

    /// Enable the background sweep
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the number of channels a sweep pass may delete
    pub fn sweep_batch(mut self, batch: usize) -> Self {
        self.sweep_batch = batch.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.zone_size, 16 * 1024 * 1024);
        assert_eq!(config.max_block_size, 1024 * 1024);
        assert_eq!(config.max_id_len, 1024);
        assert!(config.sweep_interval.is_none());
        assert_eq!(config.sweep_batch, 64);
    }

    #[test]
    fn test_builder_sweep_batch_floor() {
        let config = RegistryConfig::default().sweep_batch(0);

        assert_eq!(config.sweep_batch, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .zone_size(4096)
            .max_block_size(512)
            .max_id_len(255)
            .sweep_interval(Duration::from_secs(30))
            .sweep_batch(8);

        assert_eq!(config.zone_size, 4096);
        assert_eq!(config.max_block_size, 512);
        assert_eq!(config.max_id_len, 255);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.sweep_batch, 8);
    }
}
