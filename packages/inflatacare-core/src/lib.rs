#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines
    )
)]

//! Inflatacare Core - Shared Property Types
//!
//! Types shared by the relay server and the dashboard client:
//!
//! - `property`: the closed set of monitored Arduino IoT Cloud variables and
//!   the snapshot type mapping each of them to its last known value
//! - `event`: push-channel wire events (`all-properties`, `property-update`)
//!   and their JSON codec
//! - `reconnect`: fixed-delay and exponential reconnection policies
//!
//! # Wire Format
//!
//! ```text
//! {"event":"all-properties","data":{"fRS1":12.5,"alertStatus":3}}
//! {"event":"property-update","data":{"property":"fRS1","value":13.0}}
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Push-channel wire events and codec.
pub mod event;

/// Monitored property names and snapshots.
pub mod property;

/// Reconnection policies.
pub mod reconnect;

pub use event::{CodecError, PropertyUpdate, PushCodec, PushEvent};
pub use property::{PropertyName, PropertySnapshot, PropertyValue, UnknownProperty};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
