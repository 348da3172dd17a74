//! Generator Bitmaps Common Library
//!
//! Wire protocol, pixmap decoders and shared types used by the bitmaps
//! plugin to talk to the host and turn its pixel transmissions into RGBA.

pub mod ipc;
pub mod logging;
pub mod pixmap;
pub mod types;
pub mod validation;

pub use types::*;
