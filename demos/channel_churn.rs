//! Channel churn demo
//!
//! Runs a handful of publisher and subscriber tasks against one shared
//! registry with short-lived messages, then prints how much of the zone is
//! still in use once traffic stops and the sweep has caught up.
//!
//! Run with:
//! ```sh
//! RUST_LOG=push_channels=debug cargo run --example channel_churn
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use push_channels::{ChannelRegistry, Message, RegistryConfig, SharedRegistry};

const CHANNELS: usize = 32;
const PUBLISHERS: usize = 4;
const SUBSCRIBERS: usize = 4;
const ROUNDS: usize = 50;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("push_channels=info".parse()?)
                .add_directive("channel_churn=info".parse()?),
        )
        .init();

    let config = RegistryConfig::default()
        .zone_size(256 * 1024)
        .sweep_interval(Duration::from_millis(250))
        .sweep_batch(8);
    let shared = SharedRegistry::new(ChannelRegistry::with_config(config));
    let sweeper = shared.spawn_sweep_task();

    let mut tasks = Vec::new();

    for publisher in 0..PUBLISHERS {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let id = format!("channel-{}", (publisher * 7 + round) % CHANNELS);
                let body = Bytes::from(format!("update {} from publisher {}", round, publisher));

                let mut registry = shared.lock().await;
                match registry.find_or_create(id.as_bytes()) {
                    Ok(channel) => {
                        let message = Message::new(body).expires_at(now() + 1);
                        if let Err(e) = registry.publish(channel, message) {
                            tracing::warn!(channel = %id, error = %e, "Publish dropped");
                        }
                    }
                    Err(e) => tracing::warn!(channel = %id, error = %e, "Channel unavailable"),
                }
                drop(registry);

                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }));
    }

    for subscriber in 0..SUBSCRIBERS {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            let mut received = 0usize;
            for round in 0..ROUNDS {
                let id = format!("channel-{}", (subscriber * 5 + round) % CHANNELS);

                let mut registry = shared.lock().await;
                if let Some(channel) = registry.find(id.as_bytes()) {
                    if let Ok(Some(_message)) = registry.pop_message(channel) {
                        received += 1;
                    }
                }
                drop(registry);

                tokio::time::sleep(Duration::from_millis(15)).await;
            }
            tracing::info!(subscriber = subscriber, received = received, "Subscriber done");
        }));
    }

    for task in tasks {
        task.await?;
    }

    let stats = shared.lock().await.stats();
    println!(
        "After traffic: {} channels, {} messages, {} / {} zone bytes",
        stats.channels, stats.messages, stats.zone_used, stats.zone_capacity
    );

    // let messages expire and the sweep drain the idle channels
    tokio::time::sleep(Duration::from_secs(3)).await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    let stats = shared.lock().await.stats();
    println!(
        "After sweep:   {} channels, {} messages, {} / {} zone bytes",
        stats.channels, stats.messages, stats.zone_used, stats.zone_capacity
    );

    Ok(())
}
