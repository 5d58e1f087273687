//! Redis pub/sub-backed notification bus (optional).
//!
//! Pub/sub is not durable: subscribers that are offline miss messages.

use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{debug, warn};

use warden_events::{EventBus, Notification, PublishError, Subscription};

pub const DEFAULT_CHANNEL: &str = "warden:notifications";

/// Redis pub/sub bus for JSON-encoded notifications.
#[derive(Clone)]
pub struct RedisPubSubEventBus {
    client: redis::Client,
    conn: MultiplexedConnection,
    channel: String,
}

impl std::fmt::Debug for RedisPubSubEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPubSubEventBus")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl RedisPubSubEventBus {
    pub async fn connect(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, PublishError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            conn,
            channel: channel.into(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl EventBus<Notification> for RedisPubSubEventBus {
    async fn publish(&self, message: Notification) -> Result<(), PublishError> {
        let payload =
            serde_json::to_string(&message).map_err(|e| PublishError::Serialize(e.to_string()))?;

        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        debug!(kind = message.kind(), receivers, "notification published");
        Ok(())
    }

    fn subscribe(&self) -> Subscription<Notification> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Blocking pub/sub connection on its own thread, forwarding decoded messages.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "redis subscriber could not connect");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.subscribe(&channel) {
                warn!(error = %e, channel = %channel, "redis subscribe failed");
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(_) => return,
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let notification: Notification = match serde_json::from_str(&payload) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable notification");
                        continue;
                    }
                };

                if tx.send(notification).is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx)
    }
}
