//! Snapshot requests: fetch a bitmap of the active document and save it.

use crate::config::SnapshotMode;
use crate::host::{jsx, Host, HostError};
use crate::output::{write_png, OutputError};
use crate::session::Session;
use bitmaps_common::pixmap::{decode_layer_pixmap, decode_snapshot, divider, DecodeError};
use bitmaps_common::{DecodedImage, Dimensions, DimensionsError, DocumentInfo};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Progress of one snapshot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPhase {
    /// Pixmap and dimensions requested, waiting for both
    AwaitingDimensions,
    /// Both halves received, converting to RGBA
    Decoding,
    /// Image handed to the output step
    Done,
}

impl std::fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotPhase::AwaitingDimensions => write!(f, "awaiting-dimensions"),
            SnapshotPhase::Decoding => write!(f, "decoding"),
            SnapshotPhase::Done => write!(f, "done"),
        }
    }
}

/// Error type for snapshot requests.
#[derive(Debug)]
pub enum SnapshotError {
    Host(HostError),
    Dimensions(DimensionsError),
    Decode(DecodeError),
    Output(OutputError),
    /// Layer mode on a document without layers
    NoLayers(u32),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Host(e) => write!(f, "{}", e),
            SnapshotError::Dimensions(e) => write!(f, "{}", e),
            SnapshotError::Decode(e) => write!(f, "{}", e),
            SnapshotError::Output(e) => write!(f, "{}", e),
            SnapshotError::NoLayers(id) => write!(f, "Document {} has no layers", id),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<HostError> for SnapshotError {
    fn from(e: HostError) -> Self {
        SnapshotError::Host(e)
    }
}

impl From<DimensionsError> for SnapshotError {
    fn from(e: DimensionsError) -> Self {
        SnapshotError::Dimensions(e)
    }
}

impl From<DecodeError> for SnapshotError {
    fn from(e: DecodeError) -> Self {
        SnapshotError::Decode(e)
    }
}

impl From<OutputError> for SnapshotError {
    fn from(e: OutputError) -> Self {
        SnapshotError::Output(e)
    }
}

/// Run one snapshot and log the outcome. Failures never propagate further.
pub async fn run_snapshot<H: Host>(session: &Session<H>, document_id: Option<u32>) {
    match request_entire_document(session, document_id).await {
        Ok(path) => info!("Snapshot saved to {}", path.display()),
        Err(e) => error!("Snapshot failed: {}", e),
    }
}

/// Snapshot a document (the active one for `None`) and write it to the
/// session's output path. Returns the path written.
pub async fn request_entire_document<H: Host>(
    session: &Session<H>,
    document_id: Option<u32>,
) -> Result<PathBuf, SnapshotError> {
    let request = session.next_request_id();
    if document_id.is_none() {
        info!("Determining the current document ID");
    }

    let _in_flight = session.begin_snapshot().await;

    let document = session.host().document_info(document_id).await?;
    session.set_current_document_id(document.id).await;

    let image = match session.config().snapshot_mode {
        SnapshotMode::Flattened => flattened_document_bitmap(session.host(), request).await?,
        SnapshotMode::FirstLayer => {
            first_layer_bitmap(session.host(), &document, request).await?
        }
    };

    let path = session.output_path().clone();
    save(image, path.clone()).await?;
    debug!(request, phase = %SnapshotPhase::Done, "Snapshot complete");
    Ok(path)
}

/// Fetch the flattened thumbnail of the active document.
pub async fn flattened_document_bitmap<H: Host>(
    host: &H,
    request: u64,
) -> Result<DecodedImage, SnapshotError> {
    debug!(request, phase = %SnapshotPhase::AwaitingDimensions, "Requesting flattened document bitmap");
    let reply = host
        .evaluate_jsx_with_pixmap(&jsx::document_thumbnail())
        .await?;

    let dimensions = Dimensions::parse_host_pair(&reply.result)?;
    debug!(
        request,
        phase = %SnapshotPhase::Decoding,
        length = reply.pixmap.len(),
        divider = divider(&reply.pixmap).unwrap_or_default(),
        "Decoding {} thumbnail",
        dimensions
    );

    Ok(decode_snapshot(&reply.pixmap, dimensions)?)
}

/// Fetch the first layer of `document` as an ARGB pixmap.
pub async fn first_layer_bitmap<H: Host>(
    host: &H,
    document: &DocumentInfo,
    request: u64,
) -> Result<DecodedImage, SnapshotError> {
    let layer = document
        .layers
        .first()
        .ok_or(SnapshotError::NoLayers(document.id))?;

    debug!(request, phase = %SnapshotPhase::AwaitingDimensions, "Requesting layer {} of document {}", layer.id, document.id);
    let raw = host.layer_pixmap(document.id, layer.id).await?;

    debug!(request, phase = %SnapshotPhase::Decoding, length = raw.len(), "Decoding layer pixmap");
    let image = decode_layer_pixmap(&raw)?;
    info!("Got pixmap: {} x {}", image.width(), image.height());
    Ok(image)
}

async fn save(image: DecodedImage, path: PathBuf) -> Result<(), SnapshotError> {
    tokio::task::spawn_blocking(move || write_png(&image, &path))
        .await
        .map_err(|e| OutputError::Encode(format!("encoder task failed: {}", e)))??;
    Ok(())
}
