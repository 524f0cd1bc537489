//! Channel identifiers and queued messages
//!
//! Both wrap `bytes::Bytes`, so handing an id or a message body to the
//! protocol layer is a reference-count bump rather than a copy.

use bytes::Bytes;

/// Opaque identifier of a channel, as supplied by the protocol layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Bytes);

impl ChannelId {
    /// Create a channel id from any byte source
    pub fn new(id: impl Into<Bytes>) -> Self {
        Self(id.into())
    }

    /// Create a channel id by copying a byte slice
    pub fn copy_from_slice(id: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(id))
    }

    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the identifier in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&'static str> for ChannelId {
    fn from(id: &'static str) -> Self {
        Self(Bytes::from_static(id.as_bytes()))
    }
}

/// A message waiting in a channel's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message body (zero-copy via reference counting)
    pub data: Bytes,
    /// Absolute expiry in seconds since the Unix epoch; 0 never expires
    pub expires: u64,
}

impl Message {
    /// Create a message that never expires
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            expires: 0,
        }
    }

    /// Set the absolute expiry timestamp
    pub fn expires_at(mut self, expires: u64) -> Self {
        self.expires = expires;
        self
    }

    /// Whether the message has expired at `now`
    ///
    /// A message is still live during the second named by `expires`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires != 0 && now > self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_display() {
        let id = ChannelId::from("news/today");
        assert_eq!(id.to_string(), "news/today");
        assert_eq!(id.len(), 10);

        let raw = ChannelId::copy_from_slice(&[0x66, 0xff, 0x6f]);
        assert_eq!(raw.to_string(), "f\u{fffd}o");
    }

    #[test]
    fn test_never_expires() {
        let msg = Message::new(Bytes::from_static(b"hello"));
        assert_eq!(msg.expires, 0);
        assert!(!msg.is_expired(u64::MAX));
    }

    #[test]
    fn test_expiry_is_strict() {
        let msg = Message::new(Bytes::from_static(b"hello")).expires_at(100);
        assert!(!msg.is_expired(99));
        assert!(!msg.is_expired(100));
        assert!(msg.is_expired(101));
    }
}
