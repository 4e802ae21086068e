//! Response writer.
//!
//! Every response is encoded, written in full and flushed before the next
//! request is read, so the peer sees each reply without buffering delay.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::protocol::Response;

/// Writes MessagePack responses to an output stream.
pub struct ResponseWriter<W> {
    writer: W,
    /// Responses written so far.
    sent: u64,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer, sent: 0 }
    }

    /// Encode `response`, write it and flush.
    ///
    /// A result that cannot be encoded (it contains itself, or nests too
    /// deeply) is reported to the peer as a `ValueError` response instead.
    ///
    /// # Errors
    ///
    /// Returns error if the stream write or flush fails.
    pub async fn send(&mut self, response: &Response) -> Result<()> {
        let bytes = match MsgPackCodec::encode(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Result not serializable: {}", e);
                MsgPackCodec::encode(&unencodable(response, &e.to_string()))?
            }
        };

        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        self.sent += 1;

        tracing::trace!(len = bytes.len(), sent = self.sent, "Response written");
        Ok(())
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Replacement for a response whose result failed to encode.
fn unencodable(response: &Response, reason: &str) -> Response {
    let fallback = Response::failure(format!("result could not be serialized: {reason}"));
    if response.etype.is_some() {
        fallback.with_error_type(Some("ValueError".to_string()))
    } else {
        fallback
    }
}
