//! Read-evaluate-respond loop.
//!
//! The [`ReplBuilder`] provides a fluent API for configuring the loop. The
//! [`Repl`] then runs the cycle until the input stream ends:
//! 1. Read whatever bytes are available
//! 2. Cut complete messages out of the buffer
//! 3. Run each statement in the session
//! 4. Write and flush one response per message
//!
//! # Example
//!
//! ```ignore
//! use evalwire::{ProtocolVariant, Repl};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> evalwire::Result<()> {
//!     let mut repl = Repl::builder()
//!         .variant(ProtocolVariant::Typed)
//!         .build();
//!     repl.run_stdio().await?;
//!     Ok(())
//! }
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::config::{ProtocolVariant, ReplConfig};
use crate::error::{ReplError, Result};
use crate::protocol::{MessageBuffer, RawMessage, Request, Response};
use crate::session::Session;
use crate::writer::ResponseWriter;

/// Builder for configuring and creating a [`Repl`].
#[derive(Debug, Clone, Default)]
pub struct ReplBuilder {
    config: ReplConfig,
}

impl ReplBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn config(mut self, config: ReplConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the protocol variant.
    ///
    /// Default: `standard`
    pub fn variant(mut self, variant: ProtocolVariant) -> Self {
        self.config.variant = variant;
        self
    }

    /// Set the largest accepted request, in bytes.
    ///
    /// Default: 64 MiB
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set how many bytes are requested per read. Values below 1 are raised
    /// to 1.
    ///
    /// Default: 64 KiB
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    pub fn build(self) -> Repl {
        Repl::new(self.config)
    }
}

/// A read-evaluate-respond loop bound to one session.
pub struct Repl {
    config: ReplConfig,
    session: Session,
}

impl Repl {
    pub fn builder() -> ReplBuilder {
        ReplBuilder::new()
    }

    pub fn new(config: ReplConfig) -> Self {
        Self {
            session: Session::new(config.variant),
            config,
        }
    }

    pub fn config(&self) -> &ReplConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve the process's standard input and output.
    pub async fn run_stdio(&mut self) -> Result<u64> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve requests from `reader`, writing responses to `writer`.
    ///
    /// Returns the number of requests answered once the input ends on a
    /// message boundary.
    ///
    /// # Errors
    ///
    /// Fails on stream I/O errors, malformed input, a request without a text
    /// `statement`, or input that ends in the middle of a message. Responses
    /// for earlier requests have already been flushed by then.
    pub async fn serve<R, W>(&mut self, mut reader: R, writer: W) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = MessageBuffer::with_max_message_size(self.config.max_message_size);
        let mut writer = ResponseWriter::new(writer);
        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];

        tracing::debug!(variant = %self.config.variant, "Serving requests");

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                if !buffer.is_empty() {
                    tracing::error!(
                        "Input closed with {} bytes of an incomplete message",
                        buffer.len()
                    );
                    return Err(ReplError::ConnectionClosed);
                }
                tracing::debug!(handled = writer.sent(), "Input closed");
                return Ok(writer.sent());
            }

            buffer.extend(&buf[..n]);
            while let Some(message) = buffer.next_message()? {
                let response = self.handle(&message)?;
                writer.send(&response).await?;
            }
        }
    }

    /// Decode one message and run its statement.
    pub fn handle(&mut self, message: &RawMessage) -> Result<Response> {
        let request: Request = message.decode()?;
        Ok(self.respond(&request))
    }

    /// Run a decoded request.
    pub fn respond(&mut self, request: &Request) -> Response {
        tracing::debug!(statement = %request.statement, "Request");
        let response = self.session.respond(&request.statement);
        if let Some(error) = &response.error {
            tracing::debug!(%error, "Statement failed");
        }
        response
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new(ReplConfig::default())
    }
}
