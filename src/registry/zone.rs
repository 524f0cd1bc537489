//! Shared memory zone allocator
//!
//! The registry never calls the global allocator for accounting purposes; it
//! asks a `ZoneAllocator` for blocks so that a fixed-size shared zone can run
//! out, and so that every byte a channel owns is returned when it is deleted.

/// Size of a channel record header
pub const CHANNEL_HEADER_SIZE: usize = 96;

/// Size of the queue sentinel embedded in every channel block
pub const QUEUE_NODE_SIZE: usize = 16;

/// Fixed overhead of a queued message, excluding its body
pub const MESSAGE_HEADER_SIZE: usize = 48;

/// Size of a per-worker subscriber descriptor
pub const WORKER_NODE_SIZE: usize = 32;

/// Size of the single block holding a channel header, its id and its queue sentinel
pub const fn channel_block_size(id_len: usize) -> usize {
    CHANNEL_HEADER_SIZE + id_len + QUEUE_NODE_SIZE
}

/// Size of the block holding one queued message
pub const fn message_block_size(data_len: usize) -> usize {
    MESSAGE_HEADER_SIZE + data_len
}

/// A block handed out by a zone
///
/// Not `Clone`: freeing consumes the block, so a block cannot be freed twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a block must be returned to its zone with `free`"]
pub struct Block {
    size: usize,
}

impl Block {
    /// Create a block of `size` bytes; intended for `ZoneAllocator` implementations
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Size of the block in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Allocator backing the shared zone
///
/// Memory is not zeroed; callers initialize everything they store.
pub trait ZoneAllocator: Send {
    /// Allocate `size` bytes, or `None` when the zone cannot satisfy it
    fn alloc(&mut self, size: usize) -> Option<Block>;

    /// Return a block to the zone
    fn free(&mut self, block: Block);

    /// Bytes currently allocated
    fn used(&self) -> usize;

    /// Total bytes the zone can hand out
    fn capacity(&self) -> usize;

    /// Bytes still available
    fn available(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }
}

/// Byte-budget zone with a maximum block size
#[derive(Debug)]
pub struct BudgetZone {
    capacity: usize,
    max_block_size: usize,
    used: usize,
    blocks: usize,
}

impl BudgetZone {
    /// Create a zone of `capacity` bytes whose blocks are at most `max_block_size`
    pub fn new(capacity: usize, max_block_size: usize) -> Self {
        Self {
            capacity,
            max_block_size,
            used: 0,
            blocks: 0,
        }
    }

    /// Number of blocks currently outstanding
    pub fn blocks(&self) -> usize {
        self.blocks
    }
}

impl ZoneAllocator for BudgetZone {
    fn alloc(&mut self, size: usize) -> Option<Block> {
        if size > self.max_block_size || size > self.available() {
            return None;
        }
        self.used += size;
        self.blocks += 1;
        Some(Block::new(size))
    }

    fn free(&mut self, block: Block) {
        assert!(
            block.size <= self.used && self.blocks > 0,
            "zone corrupted: freeing {} bytes with {} in use",
            block.size,
            self.used
        );
        self.used -= block.size;
        self.blocks -= 1;
    }

    fn used(&self) -> usize {
        self.used
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_free() {
        let mut zone = BudgetZone::new(1024, 512);

        let a = zone.alloc(100).unwrap();
        let b = zone.alloc(200).unwrap();
        assert_eq!(zone.used(), 300);
        assert_eq!(zone.available(), 724);
        assert_eq!(zone.blocks(), 2);

        zone.free(a);
        zone.free(b);
        assert_eq!(zone.used(), 0);
        assert_eq!(zone.blocks(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let mut zone = BudgetZone::new(256, 256);

        let a = zone.alloc(200).unwrap();
        assert!(zone.alloc(100).is_none());
        assert_eq!(zone.used(), 200);

        zone.free(a);
        assert!(zone.alloc(100).is_some());
    }

    #[test]
    fn test_max_block_size() {
        let mut zone = BudgetZone::new(4096, 128);
        assert!(zone.alloc(129).is_none());
        assert!(zone.alloc(128).is_some());
    }

    #[test]
    fn test_channel_block_layout() {
        assert_eq!(
            channel_block_size(5),
            CHANNEL_HEADER_SIZE + 5 + QUEUE_NODE_SIZE
        );
        assert_eq!(message_block_size(0), MESSAGE_HEADER_SIZE);
    }

    #[test]
    #[should_panic(expected = "zone corrupted")]
    fn test_free_foreign_block_panics() {
        let mut zone = BudgetZone::new(1024, 1024);
        zone.free(Block::new(10));
    }
}
