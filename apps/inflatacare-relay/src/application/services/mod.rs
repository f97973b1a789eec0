//! Application Services
//!
//! - `PropertySync`: applies a reported cloud value to the store, then
//!   publishes it to connected clients

mod sync;

pub use sync::{PropertySync, SyncOutcome};
