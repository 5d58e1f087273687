//! Process-wide tracing setup for the warden binary.

pub mod tracing;

pub use self::tracing::{LogSettings, init};
