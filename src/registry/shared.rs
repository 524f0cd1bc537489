//! Lock-guarded registry for in-process sharing
//!
//! `ChannelRegistry` does no synchronization of its own. `SharedRegistry`
//! supplies the single exclusive lock it expects: the guard returned by
//! [`SharedRegistry::lock`] is the only way to reach the registry, so every
//! lookup and every mutation of a returned channel happens under it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use super::store::ChannelRegistry;

/// Exclusive access to the registry; handles are valid while it is held
pub type RegistryGuard<'a> = MutexGuard<'a, ChannelRegistry>;

/// Cloneable, lock-guarded registry
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<ChannelRegistry>>,

    /// Sweep interval and batch, read from the config at construction
    sweep: Option<(Duration, usize)>,
}

impl SharedRegistry {
    pub fn new(registry: ChannelRegistry) -> Self {
        let config = registry.config();
        let sweep = config
            .sweep_interval
            .map(|interval| (interval, config.sweep_batch));

        Self {
            inner: Arc::new(Mutex::new(registry)),
            sweep,
        }
    }

    /// Acquire the registry lock
    pub async fn lock(&self) -> RegistryGuard<'_> {
        self.inner.lock().await
    }

    /// Acquire the registry lock without waiting
    pub fn try_lock(&self) -> Option<RegistryGuard<'_>> {
        self.inner.try_lock().ok()
    }

    /// Spawn the background sweep task
    ///
    /// Returns `None` when no `sweep_interval` is configured. Each tick takes
    /// the lock once and deletes at most `sweep_batch` channels, so a sweep
    /// never holds the lock for longer than a bounded pass.
    pub fn spawn_sweep_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        let (interval, batch) = self.sweep?;
        let registry = self.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.lock().await.sweep(batch);
            }
        }))
    }
}

impl From<ChannelRegistry> for SharedRegistry {
    fn from(registry: ChannelRegistry) -> Self {
        Self::new(registry)
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(ChannelRegistry::new())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::registry::clock::ManualClock;
    use crate::registry::config::RegistryConfig;
    use crate::registry::message::Message;

    #[tokio::test]
    async fn test_handles_used_under_lock() {
        let shared = SharedRegistry::default();

        {
            let mut registry = shared.lock().await;
            let handle = assert_ok!(registry.find_or_create(b"news"));
            assert_ok!(registry.publish(handle, Message::new(Bytes::from_static(b"hi"))));
        }

        let other = shared.clone();
        let mut registry = other.lock().await;
        let handle = registry.find(b"news").unwrap();
        assert_eq!(registry.channel(handle).unwrap().message_count(), 1);
    }

    #[tokio::test]
    async fn test_try_lock_contended() {
        let shared = SharedRegistry::default();

        let guard = shared.lock().await;
        assert!(shared.try_lock().is_none());
        drop(guard);
        assert!(shared.try_lock().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_tasks_share_one_channel() {
        let shared = SharedRegistry::default();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let shared = shared.clone();
            tasks.push(tokio::spawn(async move {
                let mut registry = shared.lock().await;
                let handle = registry.find_or_create(b"shared").unwrap();
                registry.add_subscriber(handle).unwrap();
                handle
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        handles.dedup();
        assert_eq!(handles.len(), 1);

        let registry = shared.lock().await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.channel(handles[0]).unwrap().subscriber_count(), 8);
    }

    #[tokio::test]
    async fn test_no_sweep_task_without_interval() {
        let shared = SharedRegistry::default();
        assert!(shared.spawn_sweep_task().is_none());
    }

    #[tokio::test]
    async fn test_sweep_task_reclaims_idle_channels() {
        let clock = ManualClock::new(100);
        let registry = ChannelRegistry::with_config(
            RegistryConfig::default().sweep_interval(Duration::from_millis(10)),
        )
        .with_clock(clock.clone());
        let shared = SharedRegistry::from(registry);

        {
            let mut registry = shared.lock().await;
            for i in 0..5 {
                let handle = registry.find_or_create(format!("idle-{}", i).as_bytes()).unwrap();
                registry
                    .publish(handle, Message::new(Bytes::from_static(b"m")).expires_at(150))
                    .unwrap();
            }
            let live = registry.find_or_create(b"live").unwrap();
            registry.add_subscriber(live).unwrap();
        }
        clock.set(200);

        let task = shared.spawn_sweep_task().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();
        assert_err!(task.await);

        let mut registry = shared.lock().await;
        assert_eq!(registry.len(), 1);
        assert!(registry.find(b"live").is_some());
    }
}
