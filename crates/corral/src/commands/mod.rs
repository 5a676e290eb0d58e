//! CLI command handlers that talk to a coordinator over HTTP.
//!
//! - `join` enrolls this node and optionally starts its component.
//! - `admin` lists and approves signing requests.

pub mod admin;
pub mod join;

use std::time::Duration;

/// Resolve a `--wait` value: `0` waits forever.
pub(crate) fn effective_wait(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

/// Print a serializable value as JSON, handling serialization errors
/// gracefully instead of panicking.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize response: {e}"),
    }
}
