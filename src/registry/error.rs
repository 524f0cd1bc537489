//! Registry error types
//!
//! Error types for channel registry operations. Only conditions a caller can
//! react to are represented here; a corrupted index panics instead.

use super::entry::ChannelHandle;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The shared zone could not satisfy an allocation
    ///
    /// Non-fatal: the registry is left unchanged and the call can be retried
    /// once other channels have been reclaimed.
    AllocationFailed {
        /// Size of the block that was requested
        requested: usize,
        /// Bytes still free in the zone at the time of the request
        available: usize,
    },
    /// Channel identifier exceeds the configured maximum length
    IdentifierTooLong { len: usize, max: usize },
    /// The handle refers to a channel that has since been deleted
    StaleHandle(ChannelHandle),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AllocationFailed {
                requested,
                available,
            } => write!(
                f,
                "Zone allocation failed: requested {} bytes, {} available",
                requested, available
            ),
            RegistryError::IdentifierTooLong { len, max } => {
                write!(f, "Channel id too long: {} bytes (max {})", len, max)
            }
            RegistryError::StaleHandle(handle) => write!(f, "Stale channel handle: {}", handle),
        }
    }
}

impl std::error::Error for RegistryError {}
