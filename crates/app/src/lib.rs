//! `warden-app`: the use-case orchestrators and process wiring.
//!
//! Transports (HTTP or otherwise) call [`auth::AuthService`] and
//! [`users::UsersService`] and render their `Result<_, ErrorSet>`.

pub mod auth;
pub mod bootstrap;
pub mod builder;
pub mod dto;
pub mod errors;
pub mod settings;
pub mod users;
pub mod validation;

pub use auth::AuthService;
pub use bootstrap::{Bootstrap, BootstrapError};
pub use errors::{AppError, ErrorKind, ErrorSet};
pub use settings::{Settings, SettingsError};
pub use users::UsersService;
