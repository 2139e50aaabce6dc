//! Test-only adapters that live inside the domain crate for convenience.
//!
//! These are intended for unit testing and local demos. The durable blob store
//! (SQLite) lives in its own crate.

pub mod memory_blob;
