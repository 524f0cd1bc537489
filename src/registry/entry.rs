//! Channel record and handle types
//!
//! This module defines the per-channel state stored in the registry arena.

use std::collections::VecDeque;
use std::time::Duration;

use super::index::{IndexNode, Link};
use super::message::{ChannelId, Message};
use super::zone::Block;

/// Reference to a channel held by the protocol layer
///
/// Only meaningful while the registry lock is held. The generation is checked
/// on every access, so a handle kept across a release of the lock resolves to
/// nothing once the channel has been deleted, even if its slot was reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub(super) slot: usize,
    pub(super) generation: u64,
}

impl std::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}@{}", self.slot, self.generation)
    }
}

/// Per-worker subscriber descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSubscriber {
    /// Worker process/thread the subscribers are parked on
    pub worker_id: u32,
    /// Subscribers parked on that worker
    pub subscribers: u32,
}

#[derive(Debug)]
pub(super) struct QueuedMessage {
    pub(super) message: Message,
    pub(super) block: Block,
}

#[derive(Debug)]
pub(super) struct WorkerNode {
    pub(super) worker: WorkerSubscriber,
    pub(super) block: Block,
}

/// Blocks owned by a channel, handed back to the zone on release
pub(super) struct OwnedBlocks {
    pub(super) workers: Vec<Block>,
    pub(super) messages: Vec<Block>,
    pub(super) channel: Block,
}

/// A channel record
///
/// Lives in one arena slot. The `block` accounts for the header, the inline
/// id and the embedded queue sentinel; queued messages and worker descriptors
/// each own a block of their own.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    hash: u32,
    generation: u64,
    messages: VecDeque<QueuedMessage>,
    subscribers: u32,
    workers: Vec<WorkerNode>,
    created_at: u64,
    block: Block,
    pub(super) link: Link,
}

impl Channel {
    pub(super) fn new(id: ChannelId, hash: u32, generation: u64, created_at: u64, block: Block) -> Self {
        Self {
            id,
            hash,
            generation,
            messages: VecDeque::new(),
            subscribers: 0,
            workers: Vec::new(),
            created_at,
            block,
            link: Link::default(),
        }
    }

    /// Channel identifier
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Primary index key
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Number of queued messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> u32 {
        self.subscribers
    }

    /// Queued messages, oldest first
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().map(|queued| &queued.message)
    }

    /// Oldest queued message
    pub fn front(&self) -> Option<&Message> {
        self.messages.front().map(|queued| &queued.message)
    }

    /// Per-worker subscriber descriptors
    pub fn workers(&self) -> impl Iterator<Item = &WorkerSubscriber> {
        self.workers.iter().map(|node| &node.worker)
    }

    /// Registry clock reading at creation, in seconds since the Unix epoch
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Empty queue and nobody waiting: eligible for deletion
    pub fn is_collectible(&self) -> bool {
        self.messages.is_empty() && self.subscribers == 0
    }

    /// Snapshot of the channel's counters as of `now`, a registry clock reading
    pub fn stats(&self, now: u64) -> ChannelStats {
        ChannelStats {
            id: self.id.clone(),
            message_count: self.messages.len(),
            subscriber_count: self.subscribers,
            worker_count: self.workers.len(),
            age: Duration::from_secs(now.saturating_sub(self.created_at)),
        }
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation
    }

    pub(super) fn push_message(&mut self, message: Message, block: Block) {
        self.messages.push_back(QueuedMessage { message, block });
    }

    pub(super) fn pop_message(&mut self) -> Option<QueuedMessage> {
        self.messages.pop_front()
    }

    pub(super) fn add_subscriber(&mut self) -> u32 {
        self.subscribers = self.subscribers.saturating_add(1);
        self.subscribers
    }

    /// Returns the new count, or `None` if the count was already zero
    pub(super) fn remove_subscriber(&mut self) -> Option<u32> {
        self.subscribers = self.subscribers.checked_sub(1)?;
        Some(self.subscribers)
    }

    pub(super) fn worker_mut(&mut self, worker_id: u32) -> Option<&mut WorkerSubscriber> {
        self.workers
            .iter_mut()
            .map(|node| &mut node.worker)
            .find(|worker| worker.worker_id == worker_id)
    }

    pub(super) fn push_worker(&mut self, worker: WorkerSubscriber, block: Block) {
        self.workers.push(WorkerNode { worker, block });
    }

    pub(super) fn remove_worker(&mut self, worker_id: u32) -> Option<WorkerNode> {
        let pos = self
            .workers
            .iter()
            .position(|node| node.worker.worker_id == worker_id)?;
        Some(self.workers.swap_remove(pos))
    }

    /// Tear the record apart into the blocks it owns
    pub(super) fn into_blocks(self) -> OwnedBlocks {
        OwnedBlocks {
            workers: self.workers.into_iter().map(|node| node.block).collect(),
            messages: self.messages.into_iter().map(|queued| queued.block).collect(),
            channel: self.block,
        }
    }
}

impl IndexNode for Channel {
    fn link(&self) -> &Link {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }

    fn key(&self) -> (u32, &[u8]) {
        (self.hash, self.id.as_bytes())
    }
}

/// Statistics for a channel
#[derive(Debug, Clone)]
pub struct ChannelStats {
    /// Channel identifier
    pub id: ChannelId,
    /// Number of queued messages
    pub message_count: usize,
    /// Number of active subscribers
    pub subscriber_count: u32,
    /// Number of per-worker descriptors attached
    pub worker_count: usize,
    /// Time since creation, by the registry clock
    pub age: Duration,
}
