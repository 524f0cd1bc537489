//! Channel registry for long-polling publish/subscribe brokers
//!
//! Publishers and subscribers address channels by opaque byte ids. The
//! registry keeps one record per live channel, each with a FIFO of pending
//! messages and a count of subscribers waiting on it, and reclaims expired
//! messages and abandoned channels as a side effect of ordinary lookups.
//!
//! ```no_run
//! use bytes::Bytes;
//! use push_channels::{ChannelRegistry, Message, SharedRegistry};
//!
//! # async fn run() -> Result<(), push_channels::RegistryError> {
//! let shared = SharedRegistry::new(ChannelRegistry::new());
//!
//! let mut registry = shared.lock().await;
//! let channel = registry.find_or_create(b"news")?;
//! registry.publish(channel, Message::new(Bytes::from_static(b"hello")))?;
//! # Ok(())
//! # }
//! ```

pub mod registry;

pub use registry::{
    Channel, ChannelHandle, ChannelId, ChannelRegistry, ChannelStats, Message, RegistryConfig,
    RegistryError, RegistryGuard, RegistryStats, SharedRegistry,
};
