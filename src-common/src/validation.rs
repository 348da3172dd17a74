//! Input validation for values that come from the host or from configuration.

use once_cell::sync::Lazy;
use regex::Regex;

/// Menu ids are embedded in host scripts, so they are restricted to a safe
/// identifier alphabet.
static MENU_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]{1,64}$").unwrap());

/// Largest document side the host can produce, in pixels.
pub const MAX_DIMENSION: u32 = 300_000;

/// Largest pixel count accepted for one image (1 GiB of RGBA).
pub const MAX_PIXELS: u64 = 1 << 28;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Menu id contains invalid characters or is too long
    InvalidMenuId(String),
    /// Dimension (width/height) is out of valid range
    DimensionOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
    /// Width times height exceeds the pixel budget
    TooManyPixels { pixels: u64, max: u64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidMenuId(id) => write!(f, "Invalid menu ID: {}", id),
            ValidationError::DimensionOutOfRange { field, value, max } => {
                write!(f, "{} out of range: {} (max {})", field, value, max)
            }
            ValidationError::TooManyPixels { pixels, max } => {
                write!(f, "Image too large: {} pixels (max {})", pixels, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a menu id string.
///
/// Menu ids must be alphanumeric, dash or underscore, 1-64 chars.
/// Examples: "bitmaps", "export-layers"
pub fn validate_menu_id(id: &str) -> Result<(), ValidationError> {
    if !MENU_ID_PATTERN.is_match(id) {
        return Err(ValidationError::InvalidMenuId(id.to_string()));
    }
    Ok(())
}

/// Validate dimension values (width, height).
///
/// Each side must be positive and not exceed MAX_DIMENSION, and the area
/// must fit within MAX_PIXELS.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), ValidationError> {
    if width == 0 || width > MAX_DIMENSION {
        return Err(ValidationError::DimensionOutOfRange {
            field: "width",
            value: width,
            max: MAX_DIMENSION,
        });
    }
    if height == 0 || height > MAX_DIMENSION {
        return Err(ValidationError::DimensionOutOfRange {
            field: "height",
            value: height,
            max: MAX_DIMENSION,
        });
    }
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_PIXELS {
        return Err(ValidationError::TooManyPixels {
            pixels,
            max: MAX_PIXELS,
        });
    }
    Ok(())
}
