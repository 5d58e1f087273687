//! Infrastructure-backed notification bus implementations.
//!
//! The bus abstraction and the in-memory bus live in `warden-events`.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{DEFAULT_CHANNEL, RedisPubSubEventBus};
