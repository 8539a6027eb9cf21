//! Entitlements
//!
//! Decides which module types a user may see and which sessions may reach
//! protected content at all.
//!
//! - `resolver`: pure entitlement resolution
//! - `filter`: turns an entitlement into a module predicate
//! - `gate`: per-request session gate (Discord link, trial expiry)
//! - `store`: tenant-scoped catalog and grant queries
//! - `context`: loads everything for the current request

pub mod context;
pub mod filter;
pub mod gate;
mod models;
pub mod resolver;
pub mod store;

pub use context::{effective_types_for_display, load_entitlement};
pub use filter::{visibility_filter, VisibilityFilter};
pub use gate::{GateDecision, GateDenial, GateSubject};
pub use models::{CatalogEntry, Entitlement, Principal, RoleSet};
pub use resolver::resolve;
pub use store::GrantError;
