//! PNG output.
//!
//! Images are encoded into a sibling temporary file and renamed over the
//! target, so readers only ever see a complete PNG even when two snapshots
//! finish at the same time.

use bitmaps_common::DecodedImage;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Error type for writing output images.
#[derive(Debug)]
pub enum OutputError {
    /// Filesystem error
    Io(std::io::Error),
    /// PNG encoder rejected the image
    Encode(String),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io(e) => write!(f, "I/O error: {}", e),
            OutputError::Encode(msg) => write!(f, "PNG encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for OutputError {}

impl From<std::io::Error> for OutputError {
    fn from(e: std::io::Error) -> Self {
        OutputError::Io(e)
    }
}

/// Encode `image` as PNG at `path`, replacing any existing file.
pub fn write_png(image: &DecodedImage, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path(path);
    if let Err(e) = encode_to(image, &temp) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }

    info!("PNG written: {} ({})", path.display(), image.dimensions());
    Ok(())
}

fn encode_to(image: &DecodedImage, path: &Path) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    PngEncoder::new(&mut writer)
        .write_image(
            image.pixels(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| OutputError::Encode(e.to_string()))?;

    writer.flush()?;
    debug!("Encoded {} into {:?}", image.dimensions(), path);
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot.png".to_string());
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), unique))
}
