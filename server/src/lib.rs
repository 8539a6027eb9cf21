//! LMS Server
//!
//! Multi-tenant video course catalog. Module visibility is resolved from
//! Discord guild roles, manual grants and account role.

pub mod admin;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod discord;
pub mod entitlements;
pub mod tenant;
