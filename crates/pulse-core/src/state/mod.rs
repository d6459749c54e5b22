//! In-memory connection, channel, and presence state.
//!
//! The [`StateStore`] owns every map; the session engine and admin surface
//! mutate only through its methods. See the crate docs for the invariants the
//! mutators preserve.

mod store;
mod types;

pub use store::StateStore;
pub use types::{AuthedSocket, Channel, StoreCounts, TokenChannel};
