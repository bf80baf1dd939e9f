//! Shared models used across features
//!
//! Types that more than one feature depends on live here to avoid
//! circular dependencies between feature slices.

pub mod models;
