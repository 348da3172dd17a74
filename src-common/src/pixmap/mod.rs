//! Decoders for the host's raw pixel transmissions.
//!
//! Two shapes arrive over the wire:
//! - document thumbnails: 16-byte header, packed RGB rows, each row followed
//!   by a few padding bytes whose count is derived from header byte 12
//! - layer pixmaps: the same header carrying width, height and row stride,
//!   followed by ARGB rows

mod decode;
mod header;

pub use decode::*;
pub use header::*;

/// Error type for pixmap decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is shorter than its header and dimensions require
    Truncated { expected: usize, actual: usize },
    /// Channel layout this decoder cannot convert
    UnsupportedChannels(u8),
    /// Sample depth other than 8 bits
    UnsupportedDepth(u8),
    /// Header describes an unusable image
    InvalidHeader(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated { expected, actual } => write!(
                f,
                "Pixmap truncated: expected at least {} bytes, got {}",
                expected, actual
            ),
            DecodeError::UnsupportedChannels(n) => {
                write!(f, "Unsupported channel count: {}", n)
            }
            DecodeError::UnsupportedDepth(bits) => {
                write!(f, "Unsupported bits per channel: {}", bits)
            }
            DecodeError::InvalidHeader(msg) => write!(f, "Invalid pixmap header: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}
