//! Channel registry for long-polling pub/sub
//!
//! The registry maps opaque channel ids to channel records holding a queue of
//! pending messages and a count of waiting subscribers. It does no locking of
//! its own: callers reach it through one exclusive lock (see
//! [`SharedRegistry`]) and keep that lock for the lookup and for whatever they
//! do with the returned channel.
//!
//! # Architecture
//!
//! ```text
//!                       ChannelRegistry (behind the lock)
//!              ┌──────────────────────────────────────────┐
//!              │ index: red-black tree over (hash, id)    │
//!              │ store: Slab<Channel> + ZoneAllocator     │
//!              │   Channel {                              │
//!              │     id, hash, link,                      │
//!              │     messages: [Message, ...],            │
//!              │     subscribers, workers: [...]          │
//!              │   }                                      │
//!              └────────────────────┬─────────────────────┘
//!                                   │
//!        ┌──────────────────────────┼──────────────────────────┐
//!        │                          │                          │
//!        ▼                          ▼                          ▼
//!   [Publisher]                [Subscriber]              [Sweep task]
//!   find_or_create()           find_or_create()          sweep(batch)
//!   publish()                  add_subscriber()
//! ```
//!
//! # Lazy Reclamation
//!
//! Messages expire and channels go idle without anyone being told. Instead,
//! every lookup trims expired messages from the channels it walks past and
//! deletes the first channel it finds empty with nobody waiting, at most one
//! per call. That keeps the cost added to any single lookup constant no matter
//! how much garbage has built up; the optional sweep task catches what lookup
//! traffic never reaches.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod hash;
pub mod message;
pub mod shared;
pub mod store;
pub mod zone;

mod arena;
mod index;
mod reclaim;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RegistryConfig;
pub use entry::{Channel, ChannelHandle, ChannelStats, WorkerSubscriber};
pub use error::RegistryError;
pub use hash::{ChannelHasher, Xxh32Hasher};
pub use message::{ChannelId, Message};
pub use shared::{RegistryGuard, SharedRegistry};
pub use store::{ChannelRegistry, RegistryStats};
pub use zone::{Block, BudgetZone, ZoneAllocator};
