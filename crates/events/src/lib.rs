//! `warden-events`: downstream notifications and the bus that carries them.

pub mod bus;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, PublishError, Subscription};
pub use in_memory_bus::InMemoryEventBus;
pub use notification::Notification;
