//! Channel arena
//!
//! Owns every channel record and the zone blocks behind it. A record lives in
//! a `slab` slot; handles name the slot plus the generation the record was
//! created with, so a handle outliving its channel is detected instead of
//! silently aliasing whatever reused the slot.

use slab::Slab;

use super::entry::{Channel, ChannelHandle, ChannelStats};
use super::error::RegistryError;
use super::message::ChannelId;
use super::zone::{channel_block_size, Block, ZoneAllocator};

pub(crate) struct ChannelStore {
    pub(super) slots: Slab<Channel>,
    zone: Box<dyn ZoneAllocator>,
    next_generation: u64,
}

impl ChannelStore {
    pub(crate) fn new(zone: Box<dyn ZoneAllocator>) -> Self {
        Self {
            slots: Slab::new(),
            zone,
            next_generation: 1,
        }
    }

    /// Allocate a channel record for `id`
    ///
    /// One zone block covers the header, a copy of the id and the queue
    /// sentinel. The record is not linked into the index. `now` stamps its
    /// creation time.
    pub(crate) fn allocate(&mut self, id: &[u8], hash: u32, now: u64) -> Result<ChannelHandle, RegistryError> {
        let block = self.alloc(channel_block_size(id.len()))?;

        let generation = self.next_generation;
        self.next_generation += 1;

        let channel = Channel::new(ChannelId::copy_from_slice(id), hash, generation, now, block);
        let slot = self.slots.insert(channel);

        Ok(ChannelHandle { slot, generation })
    }

    /// Free a channel record and everything it owns
    ///
    /// The record must already be unlinked from the index.
    pub(crate) fn release(&mut self, slot: usize, now: u64) -> ChannelStats {
        let channel = self
            .slots
            .try_remove(slot)
            .unwrap_or_else(|| panic!("channel slot {} released twice", slot));

        let stats = channel.stats(now);
        let blocks = channel.into_blocks();
        for block in blocks.workers {
            self.zone.free(block);
        }
        for block in blocks.messages {
            self.zone.free(block);
        }
        self.zone.free(blocks.channel);

        stats
    }

    pub(crate) fn alloc(&mut self, size: usize) -> Result<Block, RegistryError> {
        let available = self.zone.available();
        self.zone.alloc(size).ok_or(RegistryError::AllocationFailed {
            requested: size,
            available,
        })
    }

    pub(crate) fn free(&mut self, block: Block) {
        self.zone.free(block);
    }

    pub(crate) fn zone(&self) -> &dyn ZoneAllocator {
        self.zone.as_ref()
    }

    pub(crate) fn handle(&self, slot: usize) -> ChannelHandle {
        ChannelHandle {
            slot,
            generation: self.slots[slot].generation(),
        }
    }

    /// Resolve a handle to its slot if the channel still exists
    pub(crate) fn resolve(&self, handle: ChannelHandle) -> Option<usize> {
        self.slots
            .get(handle.slot)
            .filter(|channel| channel.generation() == handle.generation)
            .map(|_| handle.slot)
    }

    pub(crate) fn get(&self, slot: usize) -> &Channel {
        &self.slots[slot]
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> &mut Channel {
        &mut self.slots[slot]
    }

    /// Borrow a record and the zone at the same time
    pub(crate) fn split_mut(&mut self, slot: usize) -> (&mut Channel, &mut dyn ZoneAllocator) {
        (&mut self.slots[slot], self.zone.as_mut())
    }
}
