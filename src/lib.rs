//! Albumgate - gallery proxy over a remote hierarchical media store
//!
//! This library crate exposes the core functionality for integration testing.

pub mod albums;
pub mod cache;
pub mod config;
pub mod server;
pub mod store;
pub mod transform;
