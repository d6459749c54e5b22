//! # pulse-server
//!
//! Network surface and session engine of the pulse gateway.
//!
//! - Admin control plane over HTTP, gated by a constant-time service-key
//!   check
//! - WebSocket gateway: connection management, heartbeat, frame dispatch
//! - Session engine: authentication against the backend, channel and
//!   token-channel membership, presence with grace windows, fan-out
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod admin;
pub mod backend;
pub mod config;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod websocket;
