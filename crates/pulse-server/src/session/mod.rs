//! Socket lifecycle and message fan-out.

mod manager;
mod timers;

pub use manager::{AuthAck, AuthRequest, JoinTokenRequest, SessionManager};
pub use timers::{GraceTimers, TimerRegistry};
