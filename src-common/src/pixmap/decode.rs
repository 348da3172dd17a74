use super::header::{divider, row_padding, PixmapHeader, PIXMAP_HEADER_LEN};
use super::DecodeError;
use crate::types::{DecodedImage, Dimensions};

/// Channels per pixel in a document thumbnail (RGB, no alpha).
const THUMBNAIL_CHANNELS: usize = 3;

/// Alpha written for every thumbnail pixel.
const OPAQUE: u8 = 255;

/// Bytes a document thumbnail of `dimensions` must contain, padding between
/// rows included. Padding after the last row is optional.
pub fn snapshot_len(dimensions: Dimensions, divider: u8) -> usize {
    let row = dimensions.width() as usize * THUMBNAIL_CHANNELS;
    let padding = row_padding(divider);
    PIXMAP_HEADER_LEN
        + row * dimensions.height() as usize
        + padding * (dimensions.height() as usize).saturating_sub(1)
}

/// Decode a flattened document thumbnail into RGBA.
///
/// The buffer holds a 16-byte header followed by `height` rows of packed RGB
/// triples. Each row is followed by `row_padding(divider)` bytes, where the
/// divider is header byte 12. Alpha is always opaque.
pub fn decode_snapshot(raw: &[u8], dimensions: Dimensions) -> Result<DecodedImage, DecodeError> {
    let divider = divider(raw)?;
    let expected = snapshot_len(dimensions, divider);
    if raw.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: raw.len(),
        });
    }

    let row_len = dimensions.width() as usize * THUMBNAIL_CHANNELS;
    let stride = row_len + row_padding(divider);
    let mut rgba = Vec::with_capacity(dimensions.rgba_len());

    let mut n = PIXMAP_HEADER_LEN;
    for _row in 0..dimensions.height() {
        for rgb in raw[n..n + row_len].chunks_exact(THUMBNAIL_CHANNELS) {
            rgba.extend_from_slice(rgb);
            rgba.push(OPAQUE);
        }
        n += stride;
    }

    DecodedImage::from_rgba(dimensions, rgba).ok_or_else(|| {
        DecodeError::InvalidHeader(format!("decoded buffer does not match {}", dimensions))
    })
}

/// Rotate every ARGB pixel of `pixels` to RGBA in place.
///
/// Only four-channel data can be rotated. A trailing partial pixel is left
/// as it is.
pub fn argb_to_rgba_in_place(pixels: &mut [u8], channel_count: u8) -> Result<(), DecodeError> {
    if channel_count != 4 {
        return Err(DecodeError::UnsupportedChannels(channel_count));
    }
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.rotate_left(1);
    }
    Ok(())
}

/// Decode a layer pixmap (header + ARGB rows) into RGBA.
pub fn decode_layer_pixmap(raw: &[u8]) -> Result<DecodedImage, DecodeError> {
    let header = PixmapHeader::parse(raw)?;
    if header.bits_per_channel != 8 {
        return Err(DecodeError::UnsupportedDepth(header.bits_per_channel));
    }
    if header.channel_count != 4 {
        return Err(DecodeError::UnsupportedChannels(header.channel_count));
    }

    let dimensions = Dimensions::new(header.width, header.height)
        .map_err(|e| DecodeError::InvalidHeader(e.to_string()))?;
    let row_len = dimensions.width() as usize * 4;
    let stride = header.row_bytes as usize;
    if stride < row_len {
        return Err(DecodeError::InvalidHeader(format!(
            "row bytes {} shorter than {} pixels",
            stride, dimensions.width()
        )));
    }

    let expected = PIXMAP_HEADER_LEN + stride * (dimensions.height() as usize - 1) + row_len;
    if raw.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: raw.len(),
        });
    }

    let mut pixels = Vec::with_capacity(dimensions.rgba_len());
    for row in raw[PIXMAP_HEADER_LEN..].chunks(stride).take(dimensions.height() as usize) {
        pixels.extend_from_slice(&row[..row_len]);
    }
    argb_to_rgba_in_place(&mut pixels, header.channel_count)?;

    DecodedImage::from_rgba(dimensions, pixels).ok_or_else(|| {
        DecodeError::InvalidHeader(format!("decoded buffer does not match {}", dimensions))
    })
}
