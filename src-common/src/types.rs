//! Shared types for snapshot requests and host documents.

use serde::{Deserialize, Serialize};

use crate::validation::{validate_dimensions, ValidationError};

/// Pixel size of a document, as reported by the host.
///
/// Only constructed through [`Dimensions::new`], so every value is within
/// `MAX_DIMENSION` per side and `MAX_PIXELS` in area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    width: u32,
    height: u32,
}

/// Error returned when the host's dimension reply cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionsError {
    /// Reply is not a `width,height` pair of numbers
    Unparseable(String),
    /// Numbers parsed but are out of range
    Invalid(ValidationError),
}

impl std::fmt::Display for DimensionsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionsError::Unparseable(reply) => {
                write!(f, "Cannot read dimensions from host reply {:?}", reply)
            }
            DimensionsError::Invalid(e) => write!(f, "Invalid dimensions: {}", e),
        }
    }
}

impl std::error::Error for DimensionsError {}

impl From<ValidationError> for DimensionsError {
    fn from(e: ValidationError) -> Self {
        DimensionsError::Invalid(e)
    }
}

impl Dimensions {
    /// Create validated dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self, ValidationError> {
        validate_dimensions(width, height)?;
        Ok(Self { width, height })
    }

    /// Parse the host's `width,height` reply.
    ///
    /// Each side is read like an integer prefix, so unit suffixes such as
    /// `"800 px"` and fractional values such as `"800.6"` are accepted.
    pub fn parse_host_pair(reply: &str) -> Result<Self, DimensionsError> {
        let mut parts = reply.split(',');
        let unparseable = || DimensionsError::Unparseable(reply.to_string());

        let width = parts.next().and_then(leading_integer).ok_or_else(unparseable)?;
        let height = parts.next().and_then(leading_integer).ok_or_else(unparseable)?;

        Ok(Self::new(width, height)?)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length in bytes of an RGBA buffer of this size.
    pub fn rgba_len(&self) -> usize {
        self.pixel_count() * 4
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn leading_integer(part: &str) -> Option<u32> {
    let part = part.trim();
    let digits = part
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, c)| &part[..i + c.len_utf8()])?;
    digits.parse().ok()
}

/// A packed RGBA8 raster, one pixel per 4 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    dimensions: Dimensions,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// Wrap an RGBA buffer. Returns `None` if its length does not match
    /// `width * height * 4`.
    pub fn from_rgba(dimensions: Dimensions, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != dimensions.rgba_len() {
            return None;
        }
        Some(Self { dimensions, pixels })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width()
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// Summary of one layer in a host document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

/// Document metadata returned by the host. Fields this plugin does not use
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: u32,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub layers: Vec<LayerInfo>,
}

/// Local view of a registered menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuState {
    pub enabled: bool,
    pub checked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_pair() {
        let dims = Dimensions::parse_host_pair("800,600").unwrap();
        assert_eq!((dims.width(), dims.height()), (800, 600));
    }

    #[test]
    fn test_parse_unit_values() {
        let dims = Dimensions::parse_host_pair("800 px, 600 px").unwrap();
        assert_eq!((dims.width(), dims.height()), (800, 600));

        let dims = Dimensions::parse_host_pair("1024.7 px,768.2 px").unwrap();
        assert_eq!((dims.width(), dims.height()), (1024, 768));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Dimensions::parse_host_pair("undefined"),
            Err(DimensionsError::Unparseable(_))
        ));
        assert!(matches!(
            Dimensions::parse_host_pair("px 800,600"),
            Err(DimensionsError::Unparseable(_))
        ));
        assert!(matches!(
            Dimensions::parse_host_pair("0,600"),
            Err(DimensionsError::Invalid(_))
        ));
    }

    #[test]
    fn test_new_enforces_pixel_budget() {
        assert!(matches!(
            Dimensions::new(300_000, 300_000),
            Err(ValidationError::TooManyPixels { .. })
        ));
        assert!(matches!(
            Dimensions::parse_host_pair("300000,300000"),
            Err(DimensionsError::Invalid(ValidationError::TooManyPixels { .. }))
        ));

        let dims = Dimensions::new(16384, 16384).unwrap();
        assert_eq!(dims.rgba_len(), 16384 * 16384 * 4);
    }

    #[test]
    fn test_decoded_image_length_invariant() {
        let dims = Dimensions::new(2, 3).unwrap();
        assert!(DecodedImage::from_rgba(dims, vec![0; 24]).is_some());
        assert!(DecodedImage::from_rgba(dims, vec![0; 23]).is_none());
    }

    #[test]
    fn test_document_info_ignores_unknown_fields() {
        let json = r#"{"id":12,"version":"1.6.1","layers":[{"id":3,"name":"Background","type":"layer"}]}"#;
        let doc: DocumentInfo = serde_json::from_str(json).unwrap();
        assert_eq!(doc.id, 12);
        assert_eq!(doc.file, None);
        assert_eq!(doc.layers[0].name, "Background");
    }
}
