//! `warden-core`: domain building blocks shared by every warden crate.
//!
//! This crate contains **pure domain** types (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod page;
pub mod user;

pub use error::{DomainError, DomainResult};
pub use id::UserId;
pub use page::PageSpec;
pub use user::{NewUser, User, UserPatch, UserView};
