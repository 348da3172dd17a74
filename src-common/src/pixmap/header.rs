use super::DecodeError;

/// Length of the header that precedes pixel data in every pixmap.
pub const PIXMAP_HEADER_LEN: usize = 16;

/// Offset of the byte document thumbnails use as the row divider.
pub const DIVIDER_OFFSET: usize = 12;

/// Fixed header of a layer pixmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixmapHeader {
    pub format: u8,
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub color_mode: u8,
    pub channel_count: u8,
    pub bits_per_channel: u8,
}

impl PixmapHeader {
    /// Parse the 16-byte header at the start of `raw`.
    pub fn parse(raw: &[u8]) -> Result<Self, DecodeError> {
        let header: &[u8; PIXMAP_HEADER_LEN] = raw
            .get(..PIXMAP_HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(DecodeError::Truncated {
                expected: PIXMAP_HEADER_LEN,
                actual: raw.len(),
            })?;
        let be = |at: usize| {
            u32::from_be_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
        };

        Ok(Self {
            format: header[0],
            width: be(1),
            height: be(5),
            row_bytes: be(9),
            color_mode: header[13],
            channel_count: header[14],
            bits_per_channel: header[15],
        })
    }
}

/// Row divider of a document thumbnail: header byte 12.
pub fn divider(raw: &[u8]) -> Result<u8, DecodeError> {
    if raw.len() < PIXMAP_HEADER_LEN {
        return Err(DecodeError::Truncated {
            expected: PIXMAP_HEADER_LEN,
            actual: raw.len(),
        });
    }
    Ok(raw[DIVIDER_OFFSET])
}

/// Padding bytes that follow each transmitted row for a given divider.
/// Unrecognised dividers mean no padding.
pub fn row_padding(divider: u8) -> usize {
    match divider {
        16 => 1,
        32 => 2,
        _ => 0,
    }
}
