//! In-memory host for tests.

use super::{Host, HostError, PixmapReply};
use async_trait::async_trait;
use bitmaps_common::ipc::HostEvent;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Answers the scripts the plugin sends with canned replies and records
/// every script it receives.
pub struct FakeHost {
    pub scripts: Mutex<Vec<String>>,
    pub document_json: String,
    pub thumbnail: Mutex<Vec<PixmapReply>>,
    pub layer_pixmap: Vec<u8>,
    pub fail_menu: bool,
    pub delay: Duration,
    events: broadcast::Sender<HostEvent>,
}

impl FakeHost {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            scripts: Mutex::new(Vec::new()),
            document_json: r#"{"id":7,"layers":[{"id":1,"name":"Layer 1"}]}"#.to_string(),
            thumbnail: Mutex::new(Vec::new()),
            layer_pixmap: Vec::new(),
            fail_menu: false,
            delay: Duration::ZERO,
            events,
        }
    }

    /// Queue a thumbnail reply. The last queued reply is repeated once the
    /// queue is down to one.
    pub fn with_thumbnail(self, result: &str, pixmap: Vec<u8>) -> Self {
        self.thumbnail.lock().unwrap().push(PixmapReply {
            result: result.to_string(),
            pixmap,
        });
        self
    }

    pub fn emit(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.scripts().iter().filter(|s| s.contains(needle)).count()
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn evaluate_jsx(&self, script: &str) -> Result<String, HostError> {
        self.scripts.lock().unwrap().push(script.to_string());
        if script.contains("nodeMenuInitialize") && self.fail_menu {
            return Err(HostError::Remote("menu rejected".to_string()));
        }
        if script.contains("sendDocumentInfoToNetworkClient") {
            return Ok(self.document_json.clone());
        }
        Ok(String::new())
    }

    async fn evaluate_jsx_with_pixmap(&self, script: &str) -> Result<PixmapReply, HostError> {
        self.scripts.lock().unwrap().push(script.to_string());
        if script.contains("sendLayerThumbnailToNetworkClient") {
            return Ok(PixmapReply {
                result: String::new(),
                pixmap: self.layer_pixmap.clone(),
            });
        }

        let reply = {
            let mut queue = self.thumbnail.lock().unwrap();
            if queue.len() > 1 {
                Some(queue.remove(0))
            } else {
                queue.first().cloned()
            }
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        reply.ok_or(HostError::BadReply("no thumbnail queued".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}
