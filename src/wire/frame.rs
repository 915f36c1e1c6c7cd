//! Bit-exact request framing for the mesh entry node.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! [correlation id: 16][version: u32][priority: u32][accuracy: u32]
//! [hint len: u32][hint bytes: hint len][payload len: u64][payload: payload len]
//! ```
//!
//! A missing precision hint is encoded as a zero length prefix and nothing
//! else. A length prefix that is not followed by that many bytes is a
//! framing violation on the receiving side.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ids::CorrelationId;

/// Only defined value of the reserved/version field.
pub const WIRE_VERSION: u32 = 0;

/// Bytes before the variable-length precision hint.
pub const FIXED_HEADER_LEN: usize = 16 + 4 + 4 + 4 + 4;

const PAYLOAD_LEN_WIDTH: usize = 8;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Truncated frame: {field} needs {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Unsupported wire version {0}")]
    UnsupportedVersion(u32),

    #[error("{field} too large: {size} bytes (max {max})")]
    TooLarge {
        field: &'static str,
        size: u64,
        max: u64,
    },

    #[error("Precision hint is not valid UTF-8")]
    InvalidHint(#[from] std::string::FromUtf8Error),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("I/O error while framing: {0}")]
    Io(#[from] std::io::Error),
}

/// Receiver-side bounds on variable-length fields.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    pub max_hint_len: u32,
    pub max_payload: u64,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_hint_len: 256,
            max_payload: 64 * 1024 * 1024,
        }
    }
}

/// One inference request as the entry node sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub correlation_id: CorrelationId,
    pub priority: u32,
    pub accuracy_target: u32,
    pub precision_hint: Option<String>,
    pub payload: Vec<u8>,
}

impl RequestFrame {
    pub fn new(correlation_id: CorrelationId, payload: Vec<u8>) -> Self {
        Self {
            correlation_id,
            priority: 0,
            accuracy_target: 0,
            precision_hint: None,
            payload,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_accuracy_target(mut self, accuracy_target: u32) -> Self {
        self.accuracy_target = accuracy_target;
        self
    }

    pub fn with_precision_hint(mut self, hint: impl Into<String>) -> Self {
        self.precision_hint = Some(hint.into());
        self
    }

    /// Total encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN
            + self.precision_hint.as_ref().map_or(0, |h| h.len())
            + PAYLOAD_LEN_WIDTH
            + self.payload.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, FramingError> {
        encode(
            self.correlation_id,
            self.priority,
            self.accuracy_target,
            self.precision_hint.as_deref(),
            &self.payload,
        )
    }

    /// Check the variable-length fields against a receiver's limits.
    pub fn check_limits(&self, limits: &FrameLimits) -> Result<(), FramingError> {
        let hint_len = self.precision_hint.as_ref().map_or(0, |h| h.len());
        let hint_len = u32::try_from(hint_len).unwrap_or(u32::MAX);
        check_hint_len(hint_len, limits)?;
        check_payload_len(self.payload.len() as u64, limits)
    }

    /// Decode exactly one frame from `bytes`. Trailing data is rejected.
    pub fn decode(bytes: &[u8], limits: &FrameLimits) -> Result<Self, FramingError> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let id = cursor.take("correlation_id", 16)?;
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(id);

        let version = cursor.u32("version")?;
        if version != WIRE_VERSION {
            return Err(FramingError::UnsupportedVersion(version));
        }
        let priority = cursor.u32("priority")?;
        let accuracy_target = cursor.u32("accuracy_target")?;

        let hint_len = cursor.u32("precision_hint_len")?;
        check_hint_len(hint_len, limits)?;
        let hint = cursor.take("precision_hint", hint_len as usize)?;
        let precision_hint = decode_hint(hint.to_vec())?;

        let payload_len = cursor.u64("payload_len")?;
        check_payload_len(payload_len, limits)?;
        let payload = cursor.take("payload", payload_len as usize)?.to_vec();

        let rest = bytes.len() - cursor.pos;
        if rest != 0 {
            return Err(FramingError::TrailingBytes(rest));
        }

        Ok(Self {
            correlation_id: CorrelationId::from_bytes(id_bytes),
            priority,
            accuracy_target,
            precision_hint,
            payload,
        })
    }
}

/// Serialize a request into the entry-node wire layout.
///
/// Fails only when a variable-length field does not fit its length prefix.
pub fn encode(
    correlation_id: CorrelationId,
    priority: u32,
    accuracy_target: u32,
    precision_hint: Option<&str>,
    payload: &[u8],
) -> Result<Vec<u8>, FramingError> {
    let hint = precision_hint.unwrap_or_default().as_bytes();
    let hint_len = u32::try_from(hint.len()).map_err(|_| FramingError::TooLarge {
        field: "precision_hint",
        size: hint.len() as u64,
        max: u32::MAX as u64,
    })?;

    let mut buf =
        Vec::with_capacity(FIXED_HEADER_LEN + hint.len() + PAYLOAD_LEN_WIDTH + payload.len());
    buf.extend_from_slice(correlation_id.as_bytes());
    buf.extend_from_slice(&WIRE_VERSION.to_be_bytes());
    buf.extend_from_slice(&priority.to_be_bytes());
    buf.extend_from_slice(&accuracy_target.to_be_bytes());
    buf.extend_from_slice(&hint_len.to_be_bytes());
    buf.extend_from_slice(hint);
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Read one frame from an async stream, as the entry node does.
///
/// End of stream inside any field is reported as [`FramingError::Truncated`].
pub async fn read_frame<R>(reader: &mut R, limits: &FrameLimits) -> Result<RequestFrame, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut id_bytes = [0u8; 16];
    read_field(reader, "correlation_id", &mut id_bytes).await?;

    let version = read_u32(reader, "version").await?;
    if version != WIRE_VERSION {
        return Err(FramingError::UnsupportedVersion(version));
    }
    let priority = read_u32(reader, "priority").await?;
    let accuracy_target = read_u32(reader, "accuracy_target").await?;

    let hint_len = read_u32(reader, "precision_hint_len").await?;
    check_hint_len(hint_len, limits)?;
    let mut hint = vec![0u8; hint_len as usize];
    read_field(reader, "precision_hint", &mut hint).await?;
    let precision_hint = decode_hint(hint)?;

    let mut len_bytes = [0u8; PAYLOAD_LEN_WIDTH];
    read_field(reader, "payload_len", &mut len_bytes).await?;
    let payload_len = u64::from_be_bytes(len_bytes);
    check_payload_len(payload_len, limits)?;
    let mut payload = vec![0u8; payload_len as usize];
    read_field(reader, "payload", &mut payload).await?;

    Ok(RequestFrame {
        correlation_id: CorrelationId::from_bytes(id_bytes),
        priority,
        accuracy_target,
        precision_hint,
        payload,
    })
}

/// Write one frame to an async stream and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &RequestFrame) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

fn check_hint_len(len: u32, limits: &FrameLimits) -> Result<(), FramingError> {
    if len > limits.max_hint_len {
        return Err(FramingError::TooLarge {
            field: "precision_hint",
            size: len as u64,
            max: limits.max_hint_len as u64,
        });
    }
    Ok(())
}

fn check_payload_len(len: u64, limits: &FrameLimits) -> Result<(), FramingError> {
    if len > limits.max_payload {
        return Err(FramingError::TooLarge {
            field: "payload",
            size: len,
            max: limits.max_payload,
        });
    }
    Ok(())
}

fn decode_hint(bytes: Vec<u8>) -> Result<Option<String>, FramingError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8(bytes)?))
}

async fn read_field<R>(reader: &mut R, field: &'static str, buf: &mut [u8]) -> Result<(), FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(FramingError::Truncated {
                field,
                needed: buf.len(),
                available: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

async fn read_u32<R>(reader: &mut R, field: &'static str) -> Result<u32, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    read_field(reader, field, &mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], FramingError> {
        let available = self.bytes.len() - self.pos;
        if available < len {
            return Err(FramingError::Truncated {
                field,
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, FramingError> {
        let b = self.take(field, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, FramingError> {
        let b = self.take(field, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }
}
