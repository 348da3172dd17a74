//! Host client over the Generator wire protocol.

use super::{Host, HostError, PixmapReply};
use async_trait::async_trait;
use bitmaps_common::ipc::{
    next_message_id, read_message, write_message, HostEvent, IpcError, Message, MessageType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Buffered host events per subscriber.
const EVENT_CAPACITY: usize = 64;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Reply slots of one in-flight request.
#[derive(Default)]
struct Pending {
    result: Option<oneshot::Sender<Result<String, HostError>>>,
    pixmap: Option<oneshot::Sender<Result<Vec<u8>, HostError>>>,
}

impl Pending {
    fn is_done(&self) -> bool {
        self.result.is_none() && self.pixmap.is_none()
    }
}

type PendingMap = Arc<std::sync::Mutex<HashMap<u32, Pending>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<u32, Pending>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Client for the host's Generator endpoint.
///
/// Requests are written from any task; a background reader routes replies
/// and pixmaps back by message id and fans out event notifications.
pub struct HostClient {
    writer: Mutex<Writer>,
    pending: PendingMap,
    last_id: AtomicU32,
    events: broadcast::Sender<HostEvent>,
    timeout: Duration,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl HostClient {
    /// Connect to the host at `address` (`host:port`).
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self, HostError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| HostError::Timeout)?
            .map_err(|e| {
                HostError::ConnectionFailed(format!("Failed to connect to {}: {}", address, e))
            })?;
        stream.set_nodelay(true).ok();

        info!("Connected to host at {}", address);
        Ok(Self::from_stream(stream, timeout))
    }

    /// Run the protocol over an already connected stream.
    pub fn from_stream<S>(stream: S, timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let pending = PendingMap::default();
        let pending_reader = pending.clone();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let events_reader = events.clone();
        let (closed_tx, closed) = watch::channel(false);
        let reader = tokio::spawn(read_loop(read_half, pending_reader, events_reader, closed_tx));

        Self {
            writer: Mutex::new(Box::new(write_half)),
            pending,
            last_id: AtomicU32::new(0),
            events,
            timeout,
            closed,
            reader,
        }
    }

    /// Whether the reader is still receiving from the host.
    pub fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Resolves once the host connection is gone.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    fn next_id(&self) -> u32 {
        let previous = self
            .last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                Some(next_message_id(id))
            })
            .unwrap_or_default();
        next_message_id(previous)
    }

    fn release(&self, id: u32) {
        lock(&self.pending).remove(&id);
    }

    /// Register reply slots, then write the request. Slots exist before the
    /// frame leaves so no reply can outrun its registration.
    async fn send(&self, id: u32, slots: Pending, script: &str) -> Result<(), HostError> {
        {
            // Checked under the lock the reader drains with, so a slot is
            // either drained on disconnect or never inserted.
            let mut pending = lock(&self.pending);
            if !self.is_connected() {
                return Err(HostError::Disconnected);
            }
            pending.insert(id, slots);
        }

        let written = {
            let mut writer = self.writer.lock().await;
            write_message(&mut *writer, &Message::javascript(id, script)).await
        };
        if let Err(e) = written {
            self.release(id);
            return Err(e.into());
        }
        debug!("Sent script {} ({} bytes)", id, script.len());
        Ok(())
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Drop for HostClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Host for HostClient {
    async fn evaluate_jsx(&self, script: &str) -> Result<String, HostError> {
        let id = self.next_id();
        let (result_tx, result_rx) = oneshot::channel();
        let slots = Pending {
            result: Some(result_tx),
            pixmap: None,
        };
        self.send(id, slots, script).await?;

        match tokio::time::timeout(self.timeout, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HostError::Disconnected),
            Err(_) => {
                self.release(id);
                warn!("Script {} timed out after {:?}", id, self.timeout);
                Err(HostError::Timeout)
            }
        }
    }

    async fn evaluate_jsx_with_pixmap(&self, script: &str) -> Result<PixmapReply, HostError> {
        let id = self.next_id();
        let (result_tx, result_rx) = oneshot::channel();
        let (pixmap_tx, pixmap_rx) = oneshot::channel();
        let slots = Pending {
            result: Some(result_tx),
            pixmap: Some(pixmap_tx),
        };
        self.send(id, slots, script).await?;

        // Either half may arrive first.
        let both = async { tokio::join!(result_rx, pixmap_rx) };
        let (result, pixmap) = match tokio::time::timeout(self.timeout, both).await {
            Ok(pair) => pair,
            Err(_) => {
                self.release(id);
                warn!("Pixmap request {} timed out after {:?}", id, self.timeout);
                return Err(HostError::Timeout);
            }
        };

        let result = result.map_err(|_| HostError::Disconnected)??;
        let pixmap = pixmap.map_err(|_| HostError::Disconnected)??;
        debug!("Request {} paired: {} pixmap bytes", id, pixmap.len());
        Ok(PixmapReply { result, pixmap })
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

async fn read_loop<R>(
    mut reader: R,
    pending: PendingMap,
    events: broadcast::Sender<HostEvent>,
    closed: watch::Sender<bool>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let message = match read_message(&mut reader).await {
            Ok(message) => message,
            Err(IpcError::ConnectionClosed) => {
                info!("Host closed the connection");
                break;
            }
            Err(e) => {
                error!("Error reading from host: {}", e);
                break;
            }
        };
        dispatch(&pending, &events, message);
    }

    // Dropping the slots fails every waiting request with Disconnected.
    let abandoned = {
        let mut map = lock(&pending);
        closed.send_replace(true);
        map.drain().count()
    };
    if abandoned > 0 {
        warn!("{} in-flight requests abandoned", abandoned);
    }
}

fn dispatch(pending: &PendingMap, events: &broadcast::Sender<HostEvent>, message: Message) {
    let id = message.id;
    match message.kind {
        MessageType::JavaScript => {
            let text = message.text();
            let slot = take_slot(pending, id, |p| p.result.take());
            match slot {
                Some(tx) => {
                    let _ = tx.send(Ok(text));
                }
                None => match HostEvent::parse(&text) {
                    Some(event) => {
                        debug!("Host event: {}", event.name);
                        // No subscribers is fine.
                        let _ = events.send(event);
                    }
                    None => debug!("Ignoring unsolicited reply to message {}", id),
                },
            }
        }
        MessageType::Pixmap => match take_slot(pending, id, |p| p.pixmap.take()) {
            Some(tx) => {
                let _ = tx.send(Ok(message.body));
            }
            None => debug!("Ignoring pixmap for unknown message {}", id),
        },
        MessageType::Error => {
            let text = message.text();
            // Fail whichever half of the request is still waiting.
            match lock(pending).remove(&id) {
                Some(Pending {
                    result: Some(tx), ..
                }) => {
                    let _ = tx.send(Err(HostError::Remote(text)));
                }
                Some(Pending {
                    pixmap: Some(tx), ..
                }) => {
                    let _ = tx.send(Err(HostError::Remote(text)));
                }
                _ => warn!("Host error for message {}: {}", id, text),
            }
        }
        MessageType::KeepAlive => debug!("Keep-alive from host"),
        other => debug!("Ignoring {:?} message {}", other, id),
    }
}

/// Take one reply slot of request `id`, dropping the entry once both halves
/// are taken.
fn take_slot<T>(
    pending: &PendingMap,
    id: u32,
    take: impl FnOnce(&mut Pending) -> Option<T>,
) -> Option<T> {
    let mut map = lock(pending);
    let entry = map.get_mut(&id)?;
    let slot = take(entry);
    if entry.is_done() {
        map.remove(&id);
    }
    slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn connected() -> (HostClient, DuplexStream) {
        let (client_end, host_end) = tokio::io::duplex(1 << 16);
        (HostClient::from_stream(client_end, TIMEOUT), host_end)
    }

    async fn reply(host: &mut DuplexStream, id: u32, kind: MessageType, body: &[u8]) {
        let message = Message {
            id,
            kind,
            body: body.to_vec(),
        };
        write_message(host, &message).await.unwrap();
    }

    #[tokio::test]
    async fn test_replies_routed_by_id() {
        let (client, mut host) = connected();
        let client = Arc::new(client);

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.evaluate_jsx("1+1").await }
        });
        let a = read_message(&mut host).await.unwrap();
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.evaluate_jsx("2+2").await }
        });
        let b = read_message(&mut host).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(b.text(), "2+2");

        reply(&mut host, b.id, MessageType::JavaScript, b"4\0").await;
        reply(&mut host, a.id, MessageType::JavaScript, b"2\0").await;

        assert_eq!(first.await.unwrap().unwrap(), "2");
        assert_eq!(second.await.unwrap().unwrap(), "4");
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_pixmap_paired_in_either_order() {
        for pixmap_first in [true, false] {
            let (client, mut host) = connected();
            let client = Arc::new(client);
            let task = tokio::spawn({
                let client = client.clone();
                async move { client.evaluate_jsx_with_pixmap("thumb").await }
            });

            let request = read_message(&mut host).await.unwrap();
            if pixmap_first {
                reply(&mut host, request.id, MessageType::Pixmap, &[1, 2, 3]).await;
                reply(&mut host, request.id, MessageType::JavaScript, b"2,1").await;
            } else {
                reply(&mut host, request.id, MessageType::JavaScript, b"2,1").await;
                reply(&mut host, request.id, MessageType::Pixmap, &[1, 2, 3]).await;
            }

            let paired = task.await.unwrap().unwrap();
            assert_eq!(paired.result, "2,1");
            assert_eq!(paired.pixmap, vec![1, 2, 3]);
            assert_eq!(client.pending_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_pixmap_for_other_request_ignored() {
        let (client, mut host) = connected();
        let client = Arc::new(client);
        let task = tokio::spawn({
            let client = client.clone();
            async move { client.evaluate_jsx_with_pixmap("thumb").await }
        });

        let request = read_message(&mut host).await.unwrap();
        reply(&mut host, request.id + 100, MessageType::Pixmap, &[9]).await;
        reply(&mut host, request.id, MessageType::JavaScript, b"1,1").await;
        reply(&mut host, request.id, MessageType::Pixmap, &[7]).await;

        assert_eq!(task.await.unwrap().unwrap().pixmap, vec![7]);
    }

    #[tokio::test]
    async fn test_events_broadcast() {
        let (client, mut host) = connected();
        let mut events = client.subscribe();

        let body = b"generatorMenuChanged\r{\"generatorMenuChanged\":{\"name\":\"bitmaps\"}}";
        reply(&mut host, 0, MessageType::JavaScript, body).await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.menu_change().unwrap().name, "bitmaps");
    }

    #[tokio::test]
    async fn test_error_frame_fails_request() {
        let (client, mut host) = connected();
        let client = Arc::new(client);
        let task = tokio::spawn({
            let client = client.clone();
            async move { client.evaluate_jsx_with_pixmap("boom").await }
        });

        let request = read_message(&mut host).await.unwrap();
        reply(&mut host, request.id, MessageType::Error, b"General Photoshop error\0").await;

        match task.await.unwrap() {
            Err(HostError::Remote(msg)) => assert_eq!(msg, "General Photoshop error"),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_error_after_result_fails_pixmap_half() {
        let (client, mut host) = connected();
        let client = Arc::new(client);
        let task = tokio::spawn({
            let client = client.clone();
            async move { client.evaluate_jsx_with_pixmap("thumb").await }
        });

        let request = read_message(&mut host).await.unwrap();
        reply(&mut host, request.id, MessageType::JavaScript, b"2,1").await;
        reply(&mut host, request.id, MessageType::Error, b"Pixmap unavailable\0").await;

        match task.await.unwrap() {
            Err(HostError::Remote(msg)) => assert_eq!(msg, "Pixmap unavailable"),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending() {
        let (client, mut host) = connected();
        let client = Arc::new(client);
        let task = tokio::spawn({
            let client = client.clone();
            async move { client.evaluate_jsx("app.name").await }
        });

        read_message(&mut host).await.unwrap();
        drop(host);

        assert!(matches!(task.await.unwrap(), Err(HostError::Disconnected)));
        client.closed().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_request_after_disconnect_fails_without_waiting() {
        let (client_end, host) = tokio::io::duplex(1 << 16);
        let client = HostClient::from_stream(client_end, Duration::from_secs(60));
        drop(host);
        client.closed().await;

        let result = tokio::time::timeout(Duration::from_secs(1), client.evaluate_jsx("app.name"))
            .await
            .expect("request should not wait for the reply timeout");
        assert!(matches!(result, Err(HostError::Disconnected)));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_releases_slot() {
        let (client_end, mut host) = tokio::io::duplex(1 << 16);
        let client = HostClient::from_stream(client_end, Duration::from_millis(50));

        let (result, request) = tokio::join!(client.evaluate_jsx("slow"), read_message(&mut host));
        assert!(request.is_ok());
        assert!(matches!(result, Err(HostError::Timeout)));
        assert_eq!(client.pending_count(), 0);
    }
}
