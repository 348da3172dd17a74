//! Generator bitmaps plugin.
//!
//! Connects to the host's Generator endpoint, adds a menu item and, on each
//! click, saves a flattened snapshot of the active document as a PNG.

pub mod config;
pub mod host;
pub mod listener;
pub mod output;
pub mod session;
pub mod snapshot;
