//! Shared Types

mod catalog;
mod user;

pub use catalog::*;
pub use user::*;
