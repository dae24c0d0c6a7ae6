//! Newline-delimited JSON framing over an async byte stream.
//!
//! One frame is one JSON value followed by `\n`. This is the concrete
//! encoding spec.md leaves to the transport layer's "message-framed socket
//! abstraction".

use pathfinder_core::{ProtocolError, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

pub struct FrameReader {
    inner: BufReader<OwnedReadHalf>,
}

impl FrameReader {
    pub fn new(read_half: OwnedReadHalf) -> Self {
        Self {
            inner: BufReader::new(read_half),
        }
    }

    /// Reads and parses the next request, or `Ok(None)` on clean EOF.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ProtocolError> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            // Blank keep-alive lines are tolerated and simply skipped.
            return Box::pin(self.read_request()).await;
        }
        serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

pub struct FrameWriter {
    inner: OwnedWriteHalf,
}

impl FrameWriter {
    pub fn new(write_half: OwnedWriteHalf) -> Self {
        Self { inner: write_half }
    }

    pub async fn write_response(&mut self, response: &Response) -> Result<(), std::io::Error> {
        let mut line = serde_json::to_string(response).expect("Response always serializes");
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await
    }
}
