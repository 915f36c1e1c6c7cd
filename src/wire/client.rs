//! Minimal submitting client: one frame out, whole response back.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::frame::{write_frame, FramingError, RequestFrame};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Request framing failed: {0}")]
    Framing(#[from] FramingError),

    #[error("Reading response failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("No response within {0}ms")]
    Timeout(u64),
}

/// Response body plus wall-clock time from first byte written to EOF.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

impl SubmitResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Send one framed request to the mesh entry node and read until it closes.
pub async fn submit(
    addr: &str,
    frame: &RequestFrame,
    timeout: Duration,
) -> Result<SubmitResponse, ClientError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;

    tracing::debug!(
        correlation_id = %frame.correlation_id,
        bytes = frame.encoded_len(),
        "submitting request"
    );

    let start = Instant::now();
    write_frame(&mut stream, frame).await?;
    stream.shutdown().await?;

    let mut body = Vec::with_capacity(1024);
    match tokio::time::timeout(timeout, stream.read_to_end(&mut body)).await {
        Ok(read) => {
            read?;
        }
        Err(_) => return Err(ClientError::Timeout(timeout.as_millis() as u64)),
    }

    Ok(SubmitResponse {
        body,
        elapsed: start.elapsed(),
    })
}
