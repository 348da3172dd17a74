//! Wire protocol for talking to the host process.

pub mod events;
mod protocol;

pub use events::*;
pub use protocol::*;
