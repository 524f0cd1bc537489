//! Channel registry implementation
//!
//! The registry facade: lookups walk the index, clean what they pass, and
//! apply at most one deletion per call. Every method takes `&self` or
//! `&mut self`; holding the registry lock is what grants that borrow, so
//! nothing here synchronizes on its own.

use std::cmp::Ordering;

use super::arena::ChannelStore;
use super::clock::{Clock, SystemClock};
use super::config::RegistryConfig;
use super::entry::{Channel, ChannelHandle, ChannelStats, WorkerSubscriber};
use super::error::RegistryError;
use super::hash::{ChannelHasher, Xxh32Hasher};
use super::index::{compare, Index, IndexNode};
use super::message::Message;
use super::reclaim::{self, ReclaimPass};
use super::zone::{message_block_size, BudgetZone, ZoneAllocator, WORKER_NODE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// Plain lookup; a match left collectible by an earlier call may be reclaimed
    Find,
    /// Lookup on behalf of `find_or_create`; the match is always kept
    Acquire,
}

/// Registry-wide statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Channels in the index
    pub channels: usize,
    /// Messages queued across all channels
    pub messages: usize,
    /// Bytes allocated from the zone
    pub zone_used: usize,
    /// Total zone size
    pub zone_capacity: usize,
}

/// Registry of all live channels
pub struct ChannelRegistry {
    /// Balanced index over the arena slots
    index: Index,

    /// Channel records and the zone backing them
    store: ChannelStore,

    /// Time source for message expiry
    clock: Box<dyn Clock>,

    /// Channel id hash, the primary index key
    hasher: Box<dyn ChannelHasher>,

    /// Configuration
    config: RegistryConfig,
}

impl ChannelRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let zone = BudgetZone::new(config.zone_size, config.max_block_size);

        Self {
            index: Index::new(),
            store: ChannelStore::new(Box::new(zone)),
            clock: Box::new(SystemClock),
            hasher: Box::new(Xxh32Hasher::default()),
            config,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the channel id hasher
    ///
    /// # Panics
    ///
    /// If channels already exist; their index keys were computed with the old hasher.
    pub fn with_hasher(mut self, hasher: impl ChannelHasher + 'static) -> Self {
        assert!(self.is_empty(), "hasher replaced on a populated registry");
        self.hasher = Box::new(hasher);
        self
    }

    /// Replace the zone allocator
    ///
    /// # Panics
    ///
    /// If channels already exist; their blocks belong to the old zone.
    pub fn with_zone(mut self, zone: impl ZoneAllocator + 'static) -> Self {
        assert!(self.is_empty(), "zone replaced on a populated registry");
        self.store = ChannelStore::new(Box::new(zone));
        self
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Look up a channel
    ///
    /// Cleans the channels along the search path and deletes at most one
    /// collectible channel. A channel that was already empty and
    /// subscriber-less when this call reached it counts as gone: it is
    /// deleted and `None` is returned, provided no other deletion was spent
    /// on the way down.
    ///
    /// This is the one place a lookup drops its own match. Without it a
    /// channel whose last message expired would be handed back on every
    /// later `find` and only ever go away through a neighbour's lookup or a
    /// sweep; with it the first lookup after expiry still returns the
    /// emptied channel and the next one reports it gone.
    pub fn find(&mut self, id: &[u8]) -> Option<ChannelHandle> {
        let hash = self.hasher.hash(id);
        self.lookup(id, hash, Lookup::Find)
    }

    /// Look up a channel, creating it if it doesn't exist
    ///
    /// An existing channel is always returned, even when empty. On
    /// allocation failure the registry is unchanged apart from whatever the
    /// lookup itself reclaimed, and the call can be retried.
    pub fn find_or_create(&mut self, id: &[u8]) -> Result<ChannelHandle, RegistryError> {
        if id.len() > self.config.max_id_len {
            return Err(RegistryError::IdentifierTooLong {
                len: id.len(),
                max: self.config.max_id_len,
            });
        }

        let hash = self.hasher.hash(id);
        if let Some(handle) = self.lookup(id, hash, Lookup::Acquire) {
            return Ok(handle);
        }

        let now = self.clock.now();
        let handle = self.store.allocate(id, hash, now).map_err(|err| {
            tracing::warn!(
                channel = %String::from_utf8_lossy(id),
                error = %err,
                channels = self.index.len(),
                "Channel allocation failed"
            );
            err
        })?;
        self.index.insert(&mut self.store.slots, handle.slot);

        tracing::debug!(
            channel = %String::from_utf8_lossy(id),
            hash = hash,
            channels = self.index.len(),
            "Channel created"
        );

        Ok(handle)
    }

    fn lookup(&mut self, id: &[u8], hash: u32, mode: Lookup) -> Option<ChannelHandle> {
        let mut pass = ReclaimPass::new(self.clock.now());
        let mut found = None;
        let mut cur = self.index.root();

        while let Some(slot) = cur {
            let ord = compare((hash, id), self.store.get(slot).key());
            if ord == Ordering::Equal {
                found = Some(slot);
                break;
            }

            let (channel, zone) = self.store.split_mut(slot);
            pass.visit(slot, channel, zone);
            cur = Index::child(&self.store.slots, slot, ord);
        }

        let handle = match found {
            Some(slot) => {
                let (channel, zone) = self.store.split_mut(slot);
                let stale = channel.is_collectible();
                pass.visit_match(channel, zone);

                if mode == Lookup::Find && stale && pass.candidate().is_none() {
                    self.delete_slot(slot, "stale on lookup");
                    None
                } else {
                    Some(self.store.handle(slot))
                }
            }
            None => None,
        };

        if let Some(candidate) = pass.candidate() {
            self.delete_slot(candidate, "collectible on search path");
        }

        if pass.trimmed() > 0 {
            tracing::trace!(
                channel = %String::from_utf8_lossy(id),
                trimmed = pass.trimmed(),
                "Lookup trimmed expired messages"
            );
        }

        handle
    }

    fn delete_slot(&mut self, slot: usize, reason: &'static str) -> ChannelStats {
        self.index.remove(&mut self.store.slots, slot);
        let stats = self.store.release(slot, self.clock.now());

        tracing::debug!(
            channel = %stats.id,
            messages = stats.message_count,
            subscribers = stats.subscriber_count,
            workers = stats.worker_count,
            reason = reason,
            "Channel deleted"
        );

        stats
    }

    fn resolve(&self, handle: ChannelHandle) -> Result<usize, RegistryError> {
        self.store
            .resolve(handle)
            .ok_or(RegistryError::StaleHandle(handle))
    }

    /// Read access to a channel
    pub fn channel(&self, handle: ChannelHandle) -> Option<&Channel> {
        self.store.resolve(handle).map(|slot| self.store.get(slot))
    }

    /// Counters for a channel, aged by the registry clock
    pub fn channel_stats(&self, handle: ChannelHandle) -> Option<ChannelStats> {
        self.channel(handle).map(|channel| channel.stats(self.clock.now()))
    }

    /// Append a message to the tail of a channel's queue
    ///
    /// Returns the new queue length. On allocation failure the queue is unchanged.
    pub fn publish(&mut self, handle: ChannelHandle, message: Message) -> Result<usize, RegistryError> {
        let slot = self.resolve(handle)?;
        let block = self.store.alloc(message_block_size(message.data.len())).map_err(|err| {
            tracing::warn!(
                channel = %self.store.get(slot).id(),
                error = %err,
                "Message allocation failed"
            );
            err
        })?;

        let channel = self.store.get_mut(slot);
        channel.push_message(message, block);
        Ok(channel.message_count())
    }

    /// Remove and return the oldest message of a channel
    pub fn pop_message(&mut self, handle: ChannelHandle) -> Result<Option<Message>, RegistryError> {
        let slot = self.resolve(handle)?;
        let queued = self.store.get_mut(slot).pop_message();

        Ok(queued.map(|queued| {
            self.store.free(queued.block);
            queued.message
        }))
    }

    /// Register a waiting subscriber, returning the new count
    pub fn add_subscriber(&mut self, handle: ChannelHandle) -> Result<u32, RegistryError> {
        let slot = self.resolve(handle)?;
        Ok(self.store.get_mut(slot).add_subscriber())
    }

    /// Unregister a subscriber, returning the new count
    pub fn remove_subscriber(&mut self, handle: ChannelHandle) -> Result<u32, RegistryError> {
        let slot = self.resolve(handle)?;
        let channel = self.store.get_mut(slot);

        match channel.remove_subscriber() {
            Some(count) => Ok(count),
            None => {
                tracing::warn!(channel = %channel.id(), "Subscriber removed from channel without subscribers");
                Ok(0)
            }
        }
    }

    /// Record a subscriber parked on `worker_id`
    ///
    /// Allocates a descriptor the first time a worker attaches. Returns the
    /// number of subscribers now parked on that worker.
    pub fn attach_worker(&mut self, handle: ChannelHandle, worker_id: u32) -> Result<u32, RegistryError> {
        let slot = self.resolve(handle)?;

        if let Some(worker) = self.store.get_mut(slot).worker_mut(worker_id) {
            worker.subscribers += 1;
            return Ok(worker.subscribers);
        }

        let block = self.store.alloc(WORKER_NODE_SIZE)?;
        self.store.get_mut(slot).push_worker(
            WorkerSubscriber {
                worker_id,
                subscribers: 1,
            },
            block,
        );
        Ok(1)
    }

    /// Drop a subscriber parked on `worker_id`
    ///
    /// Frees the descriptor once the worker has no subscribers left. Returns
    /// false if the worker had no descriptor on this channel.
    pub fn detach_worker(&mut self, handle: ChannelHandle, worker_id: u32) -> Result<bool, RegistryError> {
        let slot = self.resolve(handle)?;
        let channel = self.store.get_mut(slot);

        let Some(worker) = channel.worker_mut(worker_id) else {
            return Ok(false);
        };
        worker.subscribers = worker.subscribers.saturating_sub(1);
        if worker.subscribers == 0 {
            if let Some(node) = channel.remove_worker(worker_id) {
                self.store.free(node.block);
            }
        }
        Ok(true)
    }

    /// Delete a channel regardless of its contents
    pub fn delete(&mut self, handle: ChannelHandle) -> Result<ChannelStats, RegistryError> {
        let slot = self.resolve(handle)?;
        Ok(self.delete_slot(slot, "deleted"))
    }

    /// Walk the index in key order and delete up to `max` collectible channels
    ///
    /// Every channel visited before the limit is reached has its expired
    /// messages trimmed. Returns the number of channels deleted.
    pub fn sweep(&mut self, max: usize) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        let mut cur = self.index.first(&self.store.slots);

        while let Some(slot) = cur {
            if removed >= max {
                break;
            }
            // successor stays valid: unlinking a node never moves another
            let next = Index::next(&self.store.slots, slot);

            let (channel, zone) = self.store.split_mut(slot);
            if reclaim::clean(channel, now, zone).collectible {
                self.delete_slot(slot, "swept");
                removed += 1;
            }
            cur = next;
        }

        if removed > 0 {
            tracing::info!(
                removed = removed,
                remaining = self.index.len(),
                "Sweep reclaimed channels"
            );
        }

        removed
    }

    /// Get total number of channels
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the registry holds no channels
    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }

    /// Get registry statistics
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            channels: self.index.len(),
            messages: self
                .store
                .slots
                .iter()
                .map(|(_, channel)| channel.message_count())
                .sum(),
            zone_used: self.store.zone().used(),
            zone_capacity: self.store.zone().capacity(),
        }
    }

    /// Index membership without any reclamation side effects
    #[cfg(test)]
    pub(crate) fn contains(&self, id: &[u8]) -> bool {
        let hash = self.hasher.hash(id);
        self.index.search(&self.store.slots, (hash, id)).is_some()
    }

    /// Check that every allocated channel is indexed and the index is sound
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        self.index.validate(&self.store.slots);
        assert_eq!(
            self.index.len(),
            self.store.slots.len(),
            "registry corrupted: unindexed channel records"
        );
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
