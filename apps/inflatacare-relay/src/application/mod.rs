//! Application Layer - Use cases and port definitions.
//!
//! Ports describe what the relay needs from the outside world (a cloud
//! connection, somewhere to publish updates); services apply cloud events to
//! the domain through those ports.

/// Port interfaces for the cloud link and update publishing.
pub mod ports;

/// Application services for property synchronization.
pub mod services;
