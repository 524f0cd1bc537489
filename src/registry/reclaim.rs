//! Opportunistic reclamation
//!
//! Lookups pay for cleanup: every channel a lookup walks past has its expired
//! messages trimmed from the head of its queue, and the first channel found
//! empty with nobody waiting becomes the single deletion that lookup is
//! allowed to perform. Nothing here touches the index; the facade applies the
//! decision.

use super::entry::Channel;
use super::zone::ZoneAllocator;

/// Result of cleaning one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cleaned {
    /// Expired messages removed from the head of the queue
    pub(crate) trimmed: usize,
    /// Queue ended empty and no subscribers are waiting
    pub(crate) collectible: bool,
}

/// Trim expired messages from the head of `channel`'s queue
///
/// Stops at the first live message; the queue is assumed to be in arrival
/// order, so anything behind a live message is left alone.
pub(crate) fn clean(channel: &mut Channel, now: u64, zone: &mut dyn ZoneAllocator) -> Cleaned {
    let mut trimmed = 0;

    loop {
        match channel.front() {
            Some(message) if message.is_expired(now) => {}
            Some(_) => {
                return Cleaned {
                    trimmed,
                    collectible: false,
                }
            }
            None => break,
        }

        if let Some(queued) = channel.pop_message() {
            tracing::trace!(
                channel = %channel.id(),
                expires = queued.message.expires,
                now = now,
                "Expired message trimmed"
            );
            zone.free(queued.block);
            trimmed += 1;
        }
    }

    Cleaned {
        trimmed,
        collectible: channel.subscriber_count() == 0,
    }
}

/// Reclamation state for one top-level lookup
///
/// Records at most one collectible channel: the first one met on the way
/// down. Once a candidate is recorded, further nodes on the path are not
/// cleaned.
#[derive(Debug)]
pub(crate) struct ReclaimPass {
    now: u64,
    candidate: Option<usize>,
    trimmed: usize,
}

impl ReclaimPass {
    pub(crate) fn new(now: u64) -> Self {
        Self {
            now,
            candidate: None,
            trimmed: 0,
        }
    }

    /// Clean a channel the lookup passes through without matching
    pub(crate) fn visit(&mut self, slot: usize, channel: &mut Channel, zone: &mut dyn ZoneAllocator) {
        if self.candidate.is_some() {
            return;
        }
        let cleaned = clean(channel, self.now, zone);
        self.trimmed += cleaned.trimmed;
        if cleaned.collectible {
            self.candidate = Some(slot);
        }
    }

    /// Clean the channel the lookup matched; it never becomes the candidate
    pub(crate) fn visit_match(&mut self, channel: &mut Channel, zone: &mut dyn ZoneAllocator) -> Cleaned {
        let cleaned = clean(channel, self.now, zone);
        self.trimmed += cleaned.trimmed;
        cleaned
    }

    pub(crate) fn candidate(&self) -> Option<usize> {
        self.candidate
    }

    /// Total expired messages trimmed during this pass
    pub(crate) fn trimmed(&self) -> usize {
        self.trimmed
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::registry::message::{ChannelId, Message};
    use crate::registry::zone::{message_block_size, Block, BudgetZone};

    fn channel(zone: &mut BudgetZone, expiries: &[u64]) -> Channel {
        let block = zone.alloc(100).unwrap();
        let mut ch = Channel::new(ChannelId::from("ch"), 1, 1, 0, block);
        for &expires in expiries {
            let block = zone.alloc(message_block_size(1)).unwrap();
            ch.push_message(
                Message::new(Bytes::from_static(b"m")).expires_at(expires),
                block,
            );
        }
        ch
    }

    #[test]
    fn test_clean_trims_expired_head() {
        let mut zone = BudgetZone::new(4096, 4096);
        let mut ch = channel(&mut zone, &[5, 8, 20]);

        let cleaned = clean(&mut ch, 10, &mut zone);

        assert_eq!(cleaned.trimmed, 2);
        assert!(!cleaned.collectible);
        assert_eq!(ch.message_count(), 1);
        assert_eq!(zone.used(), 100 + message_block_size(1));
    }

    #[test]
    fn test_clean_stops_at_never_expiring_message() {
        let mut zone = BudgetZone::new(4096, 4096);
        let mut ch = channel(&mut zone, &[0, 5]);

        let cleaned = clean(&mut ch, 1_000, &mut zone);

        // the expired message behind the live one stays
        assert_eq!(cleaned.trimmed, 0);
        assert_eq!(ch.message_count(), 2);
    }

    #[test]
    fn test_clean_empty_without_subscribers_is_collectible() {
        let mut zone = BudgetZone::new(4096, 4096);
        let mut ch = channel(&mut zone, &[5]);

        let cleaned = clean(&mut ch, 6, &mut zone);

        assert_eq!(cleaned.trimmed, 1);
        assert!(cleaned.collectible);
    }

    #[test]
    fn test_clean_subscribers_block_collection() {
        let mut zone = BudgetZone::new(4096, 4096);
        let mut ch = channel(&mut zone, &[5]);
        ch.add_subscriber();

        let cleaned = clean(&mut ch, 6, &mut zone);

        assert_eq!(ch.message_count(), 0);
        assert!(!cleaned.collectible);
    }

    #[test]
    fn test_pass_records_first_candidate_only() {
        let mut zone = BudgetZone::new(4096, 4096);
        let mut live = channel(&mut zone, &[0]);
        let mut first = channel(&mut zone, &[5]);
        let mut second = channel(&mut zone, &[5]);

        let mut pass = ReclaimPass::new(10);
        pass.visit(0, &mut live, &mut zone);
        assert_eq!(pass.candidate(), None);

        pass.visit(1, &mut first, &mut zone);
        pass.visit(2, &mut second, &mut zone);

        assert_eq!(pass.candidate(), Some(1));
        // nodes after the candidate are not cleaned
        assert_eq!(second.message_count(), 1);
        assert_eq!(pass.trimmed(), 1);
    }

    #[test]
    fn test_pass_match_is_cleaned_but_not_recorded() {
        let mut zone = BudgetZone::new(4096, 4096);
        let mut ch = channel(&mut zone, &[5]);

        let mut pass = ReclaimPass::new(10);
        let cleaned = pass.visit_match(&mut ch, &mut zone);

        assert!(cleaned.collectible);
        assert_eq!(pass.candidate(), None);
        assert_eq!(pass.trimmed(), 1);
    }

    #[test]
    fn test_clean_without_messages_keeps_zone() {
        let mut zone = BudgetZone::new(4096, 4096);
        let mut ch = Channel::new(ChannelId::from("x"), 1, 1, 0, Block::new(0));

        let cleaned = clean(&mut ch, 10, &mut zone);
        assert_eq!(cleaned.trimmed, 0);
        assert!(cleaned.collectible);
        assert_eq!(zone.used(), 0);
    }
}
