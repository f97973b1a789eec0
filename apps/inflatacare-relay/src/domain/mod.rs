//! Domain Layer - Property cache and cloud link state.
//!
//! Pure in-memory types with no I/O. Both are constructed once at startup
//! and shared by `Arc` between the sync pipeline and the HTTP surface.

/// Latest-value cache for the monitored properties.
pub mod store;

/// Observable state of the cloud link.
pub mod link_state;

pub use link_state::{LinkState, LinkStatus};
pub use store::PropertyStore;
