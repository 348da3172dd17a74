//! Connection to the host process.
//!
//! [`Host`] is the seam the rest of the plugin talks through; [`HostClient`]
//! implements it over the Generator wire protocol.

mod client;
pub mod jsx;

#[cfg(test)]
pub(crate) mod fake;

pub use client::HostClient;

use async_trait::async_trait;
use bitmaps_common::ipc::{HostEvent, IpcError};
use bitmaps_common::DocumentInfo;
use tokio::sync::broadcast;
use tracing::debug;

/// Error type for host operations.
#[derive(Debug)]
pub enum HostError {
    /// Connecting to the host failed
    ConnectionFailed(String),
    /// Sending a request failed
    SendFailed(IpcError),
    /// Host evaluated the script and reported an error
    Remote(String),
    /// Host reply could not be interpreted
    BadReply(String),
    /// Connection dropped before the reply arrived
    Disconnected,
    /// Request timed out
    Timeout,
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            HostError::SendFailed(e) => write!(f, "Send failed: {}", e),
            HostError::Remote(msg) => write!(f, "Host error: {}", msg),
            HostError::BadReply(msg) => write!(f, "Unexpected host reply: {}", msg),
            HostError::Disconnected => write!(f, "Host disconnected"),
            HostError::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for HostError {}

impl From<IpcError> for HostError {
    fn from(e: IpcError) -> Self {
        match e {
            IpcError::ConnectionClosed => HostError::Disconnected,
            other => HostError::SendFailed(other),
        }
    }
}

/// Reply to a script that also makes the host transmit a pixmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixmapReply {
    /// Value of the script's last expression
    pub result: String,
    /// Raw pixmap message body, header included
    pub pixmap: Vec<u8>,
}

/// Operations the plugin needs from the host.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Evaluate a script and return its result.
    async fn evaluate_jsx(&self, script: &str) -> Result<String, HostError>;

    /// Evaluate a script that triggers a pixmap transmission and wait for
    /// both the result and the pixmap of that same request.
    async fn evaluate_jsx_with_pixmap(&self, script: &str) -> Result<PixmapReply, HostError>;

    /// Receive host event notifications.
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;

    /// Register a Generator menu item.
    async fn add_menu_item(
        &self,
        id: &str,
        label: &str,
        enabled: bool,
        checked: bool,
    ) -> Result<(), HostError> {
        self.evaluate_jsx(&jsx::menu_initialize(id, label, enabled, checked))
            .await
            .map(|_| ())
    }

    /// Ask the host to deliver `event` notifications.
    async fn subscribe_event(&self, event: &str) -> Result<(), HostError> {
        self.evaluate_jsx(&jsx::event_subscribe(event))
            .await
            .map(|_| ())
    }

    /// Metadata of a document, or of the active document for `None`.
    async fn document_info(&self, document_id: Option<u32>) -> Result<DocumentInfo, HostError> {
        let reply = self.evaluate_jsx(&jsx::document_info(document_id)).await?;
        debug!("Document info reply: {} bytes", reply.len());
        serde_json::from_str(&reply)
            .map_err(|e| HostError::BadReply(format!("document info: {}", e)))
    }

    /// Raw ARGB pixmap of one layer.
    async fn layer_pixmap(&self, document_id: u32, layer_id: u32) -> Result<Vec<u8>, HostError> {
        let reply = self
            .evaluate_jsx_with_pixmap(&jsx::layer_thumbnail(document_id, layer_id))
            .await?;
        Ok(reply.pixmap)
    }
}
