//! # pulse-core
//!
//! Domain layer of the pulse gateway: the socket directory and its
//! interlocking relation maps, the lifecycle event bus, and the typed view of
//! backend identity records.
//!
//! Nothing in this crate performs I/O. The transport and HTTP layers live in
//! `pulse-server` and reach the state exclusively through [`StateStore`]
//! mutators, which preserve the cross-map invariants (membership implies
//! authentication, online-set matches live sockets, one-use tokens).

#![deny(unsafe_code)]

pub mod client;
pub mod events;
pub mod identity;
pub mod state;
pub mod validate;

pub use client::ClientHandle;
pub use events::{EventBus, GatewayEvent};
pub use identity::AuthIdentity;
pub use state::{StateStore, StoreCounts};
