//! Role-based access control.
//!
//! [`PolicyModel`] is the pure decision function, [`PolicyStore`] persists
//! rules and groupings, and [`Enforcer`] keeps the two in step.

mod enforcer;
mod model;
mod store;

pub use enforcer::{Enforcer, PolicyView};
pub use model::{Effect, Grouping, PolicyModel, PolicyRule, PolicySnapshot, WILDCARD};
pub use store::{InMemoryPolicyStore, PolicyError, PolicyStore};
