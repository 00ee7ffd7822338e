//! Pub/sub fan-out over Redis lists.
//!
//! Publish is `RPUSH <topic> <json>`; consumers `BLPOP` the same key, so each
//! message is handed to exactly one worker. Redelivery after a crashed
//! worker is possible; consumers must tolerate reprocessing.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: &Value) -> Result<(), PublishError>;
}

pub struct RedisPublisher {
    client: redis::Client,
}

impl RedisPublisher {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, topic: &str, message: &Value) -> Result<(), PublishError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.rpush::<_, _, ()>(topic, payload).await?;
        Ok(())
    }
}

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Consumes `topic` forever, handing each raw message to `handle`.
/// Connection failures are logged and retried; handler outcomes are the
/// handler's business.
pub async fn consume<F, Fut>(client: redis::Client, topic: String, handle: F)
where
    F: Fn(String) -> Fut + Send,
    Fut: std::future::Future<Output = ()> + Send,
{
    loop {
        // Dedicated connection: BLPOP parks it until a message arrives.
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Queue consumer for '{topic}' could not connect: {e}");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        info!("Queue consumer listening on '{topic}'");

        loop {
            match conn.blpop::<_, Option<(String, String)>>(&topic, 0.0).await {
                Ok(Some((_, payload))) => handle(payload).await,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Queue consumer for '{topic}' lost its connection: {e}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    break;
                }
            }
        }
    }
}
