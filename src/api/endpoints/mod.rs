//! HTTP endpoint handlers.

pub mod admin;
pub mod health;
pub mod query;
