//! Host message framing and transport protocol.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload size (1 GiB). Flattened pixmaps of large documents
/// are the biggest messages the host sends.
pub const MAX_MESSAGE_SIZE: usize = 1 << 30;

/// Bytes between the length field and the body: status, version, id, type.
pub const FRAME_HEADER_LEN: usize = 16;

/// Protocol version written into every outgoing frame.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message ids wrap at this value.
pub const MAX_MESSAGE_ID: u32 = 1 << 24;

/// Communication status reported by a healthy connection.
pub const STATUS_OK: u32 = 0;

/// Error type for host wire operations.
#[derive(Debug)]
pub enum IpcError {
    /// I/O error during read/write
    Io(std::io::Error),
    /// Message exceeds maximum size
    MessageTooLarge { size: usize, max: usize },
    /// Frame is shorter than its fixed header
    Malformed(String),
    /// Host reported a communication failure
    BadStatus(u32),
    /// Connection closed
    ConnectionClosed,
}

impl std::fmt::Display for IpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpcError::Io(e) => write!(f, "I/O error: {}", e),
            IpcError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            IpcError::Malformed(e) => write!(f, "Malformed frame: {}", e),
            IpcError::BadStatus(status) => write!(f, "Host communication status {}", status),
            IpcError::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for IpcError {}

impl From<std::io::Error> for IpcError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            IpcError::ConnectionClosed
        } else {
            IpcError::Io(e)
        }
    }
}

/// Message type tag carried in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Script evaluation failed on the host
    Error,
    /// Script to evaluate, its result, or an event notification
    JavaScript,
    /// Raw pixel transmission
    Pixmap,
    /// Colour profile blob
    IccProfile,
    /// Connection heartbeat
    KeepAlive,
    /// Any tag this plugin does not interpret
    Other(u32),
}

impl MessageType {
    /// Wire code for this type.
    pub fn code(self) -> u32 {
        match self {
            MessageType::Error => 1,
            MessageType::JavaScript => 2,
            MessageType::Pixmap => 3,
            MessageType::IccProfile => 4,
            MessageType::KeepAlive => 6,
            MessageType::Other(code) => code,
        }
    }

    /// Map a wire code to a type.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => MessageType::Error,
            2 => MessageType::JavaScript,
            3 => MessageType::Pixmap,
            4 => MessageType::IccProfile,
            6 => MessageType::KeepAlive,
            other => MessageType::Other(other),
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u32,
    pub kind: MessageType,
    pub body: Vec<u8>,
}

impl Message {
    /// Build a script evaluation request.
    pub fn javascript(id: u32, script: &str) -> Self {
        Self {
            id,
            kind: MessageType::JavaScript,
            body: script.as_bytes().to_vec(),
        }
    }

    /// Body decoded as text. The host NUL-terminates script results.
    pub fn text(&self) -> String {
        let body = self.body.strip_suffix(&[0]).unwrap_or(&self.body);
        String::from_utf8_lossy(body).into_owned()
    }
}

/// Next message id after `id`, skipping 0.
pub fn next_message_id(id: u32) -> u32 {
    let next = (id + 1) % MAX_MESSAGE_ID;
    if next == 0 {
        1
    } else {
        next
    }
}

/// Read one frame with size validation.
///
/// Frame format (all fields big-endian u32):
/// ```text
/// ┌────────┬────────┬─────────┬────┬──────┬──────────────────────┐
/// │ length │ status │ version │ id │ type │ body (length - 16)   │
/// └────────┴────────┴─────────┴────┴──────┴──────────────────────┘
/// ```
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, IpcError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    // Validate size BEFORE allocating
    if len < FRAME_HEADER_LEN {
        return Err(IpcError::Malformed(format!(
            "length {} is shorter than the {} byte header",
            len, FRAME_HEADER_LEN
        )));
    }
    if len - FRAME_HEADER_LEN > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge {
            size: len - FRAME_HEADER_LEN,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let field = |at: usize| {
        u32::from_be_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
    };

    let status = field(0);
    if status != STATUS_OK {
        return Err(IpcError::BadStatus(status));
    }

    let mut body = vec![0u8; len - FRAME_HEADER_LEN];
    reader.read_exact(&mut body).await?;

    Ok(Message {
        id: field(8),
        kind: MessageType::from_code(field(12)),
        body,
    })
}

/// Write one frame.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), IpcError> {
    if message.body.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge {
            size: message.body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let len = (FRAME_HEADER_LEN + message.body.len()) as u32;
    let mut frame = Vec::with_capacity(4 + FRAME_HEADER_LEN + message.body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&STATUS_OK.to_be_bytes());
    frame.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    frame.extend_from_slice(&message.id.to_be_bytes());
    frame.extend_from_slice(&message.kind.code().to_be_bytes());
    frame.extend_from_slice(&message.body);

    writer.write_all(&frame).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_message_roundtrip() {
        let script = "app.activeDocument.width";
        let original = Message::javascript(7, script);
        let mut buf = Vec::new();

        write_message(&mut buf, &original).await.unwrap();
        assert_eq!(&buf[0..4], &((FRAME_HEADER_LEN + script.len()) as u32).to_be_bytes());
        assert_eq!(buf.len(), 4 + FRAME_HEADER_LEN + script.len());
        assert_eq!(&buf[8..12], &PROTOCOL_VERSION.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        let read = read_message(&mut cursor).await.unwrap();

        assert_eq!(read, original);
    }

    #[tokio::test]
    async fn test_length_below_header_is_malformed() {
        let mut cursor = Cursor::new(8u32.to_be_bytes().to_vec());
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(IpcError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected_before_read() {
        let len = (MAX_MESSAGE_SIZE + FRAME_HEADER_LEN + 1) as u32;
        let mut cursor = Cursor::new(len.to_be_bytes().to_vec());
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(IpcError::MessageTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_nonzero_status() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&16u32.to_be_bytes());
        frame.extend_from_slice(&3u32.to_be_bytes());
        frame.extend_from_slice(&[0u8; 12]);
        let mut cursor = Cursor::new(frame);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(IpcError::BadStatus(3))));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let mut cursor = Cursor::new(Vec::new());
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(IpcError::ConnectionClosed)));
    }

    #[test]
    fn test_text_strips_trailing_nul() {
        let message = Message {
            id: 1,
            kind: MessageType::JavaScript,
            body: b"800 px,600 px\0".to_vec(),
        };
        assert_eq!(message.text(), "800 px,600 px");
    }

    #[test]
    fn test_unknown_type_preserved() {
        assert_eq!(MessageType::from_code(9), MessageType::Other(9));
        assert_eq!(MessageType::from_code(3), MessageType::Pixmap);
        assert_eq!(MessageType::Other(9).code(), 9);
    }

    #[test]
    fn test_message_id_wraps_and_skips_zero() {
        assert_eq!(next_message_id(1), 2);
        assert_eq!(next_message_id(MAX_MESSAGE_ID - 1), 1);
    }
}
