//! WebSocket transport adapter.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-socket state (bounded send queue, liveness flag, cancellation) |
//! | `session` | Frame parsing and lifecycle — ping liveness lives in the session loop |
//!
//! The adapter implements [`pulse_core::ClientHandle`], so the session
//! engine never sees axum types.

pub mod connection;
pub mod session;

pub use connection::WsClient;
pub use session::run_ws_session;
