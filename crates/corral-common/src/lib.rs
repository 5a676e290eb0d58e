//! Shared vocabulary for the corral crates: wire error codes, well-known
//! install paths, and small encoding helpers.

pub mod encoding;
pub mod error;
pub mod paths;
pub mod persist;
