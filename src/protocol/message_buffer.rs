//! Message buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so complete messages are split off without
//! copying. Implements a small state machine over the input stream:
//! - `Idle`: no bytes of the next message buffered yet
//! - `Scanning`: part of a message buffered, scanner cursor kept
//!
//! # Example
//!
//! ```ignore
//! use evalwire::protocol::MessageBuffer;
//!
//! let mut buffer = MessageBuffer::new();
//!
//! // Data arrives in chunks from stdin
//! for message in buffer.push(&chunk)? {
//!     let request: Request = message.decode()?;
//! }
//! ```

use bytes::BytesMut;

use super::message::RawMessage;
use super::wire_format::{ValueScanner, DEFAULT_MAX_MESSAGE_SIZE};
use crate::error::Result;

/// State machine for message extraction.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for the first byte of a message.
    Idle,
    /// Part of a message buffered; the scanner remembers how far it got.
    Scanning(ValueScanner),
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
///
/// Boundaries are found by walking MessagePack markers, so each byte is
/// inspected once no matter how the input is chunked.
pub struct MessageBuffer {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed size of one message.
    max_message_size: usize,
}

impl MessageBuffer {
    /// Create a new message buffer with default settings.
    ///
    /// Default capacity: 64KB, max message: 64MB.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a new message buffer with a custom max message size.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::Idle,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Returns the complete messages in arrival order. Partial data is kept
    /// for the next push.
    ///
    /// # Errors
    ///
    /// Returns error on a reserved marker or a message larger than
    /// `max_message_size`. The stream cannot be resynchronized afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<RawMessage>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }

        Ok(messages)
    }

    /// Append data to the buffer without extracting messages.
    ///
    /// Pair with [`next_message`](Self::next_message) to act on each message
    /// before a later one in the same chunk turns out to be malformed.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete message, if one is buffered.
    ///
    /// Returns:
    /// - `Ok(Some(message))` if a complete message was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a reserved marker or an oversize message
    pub fn next_message(&mut self) -> Result<Option<RawMessage>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut scanner = match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => ValueScanner::new(),
            State::Scanning(scanner) => scanner,
        };

        match scanner.advance(&self.buffer, self.max_message_size)? {
            Some(len) => {
                let bytes = self.buffer.split_to(len).freeze();
                Ok(Some(RawMessage::new(bytes)))
            }
            None => {
                self.state = State::Scanning(scanner);
                Ok(None)
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    ///
    /// An empty buffer at end of input means the stream closed on a message
    /// boundary.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Idle;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Idle => "Idle",
            State::Scanning(_) => "Scanning",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::error::ReplError;
    use crate::protocol::Request;

    fn request_bytes(statement: &str) -> Vec<u8> {
        MsgPackCodec::encode(&Request::new(statement)).unwrap()
    }

    fn statements(messages: &[RawMessage]) -> Vec<String> {
        messages
            .iter()
            .map(|m| m.decode::<Request>().unwrap().statement)
            .collect()
    }

    #[test]
    fn test_single_complete_message() {
        let mut buffer = MessageBuffer::new();
        let messages = buffer.push(&request_bytes("1 + 1")).unwrap();

        assert_eq!(statements(&messages), ["1 + 1"]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "Idle");
    }

    #[test]
    fn test_multiple_messages_in_one_push() {
        let mut buffer = MessageBuffer::new();

        let mut combined = request_bytes("a = 1");
        combined.extend_from_slice(&request_bytes("b = 2"));
        combined.extend_from_slice(&request_bytes("a + b"));

        let messages = buffer.push(&combined).unwrap();
        assert_eq!(statements(&messages), ["a = 1", "b = 2", "a + b"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_message() {
        let mut buffer = MessageBuffer::new();
        let bytes = request_bytes("this statement arrives in two pieces");

        let messages = buffer.push(&bytes[..7]).unwrap();
        assert!(messages.is_empty());
        assert_eq!(buffer.state_name(), "Scanning");
        assert_eq!(buffer.len(), 7);

        let messages = buffer.push(&bytes[7..]).unwrap();
        assert_eq!(statements(&messages), ["this statement arrives in two pieces"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = MessageBuffer::new();
        let mut stream = request_bytes("x = 5");
        stream.extend_from_slice(&request_bytes("x"));

        let mut messages = Vec::new();
        for byte in &stream {
            messages.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(statements(&messages), ["x = 5", "x"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_large_statement() {
        let mut buffer = MessageBuffer::new();
        let statement = "1 + ".repeat(50_000) + "1";
        let messages = buffer.push(&request_bytes(&statement)).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(statements(&messages)[0].len(), statement.len());
    }

    #[test]
    fn test_max_message_size() {
        let mut buffer = MessageBuffer::with_max_message_size(32);
        let result = buffer.push(&request_bytes(&"x".repeat(100)));

        assert!(matches!(result, Err(ReplError::MessageTooLarge { max: 32, .. })));
    }

    #[test]
    fn test_oversize_detected_before_body_arrives() {
        let mut buffer = MessageBuffer::with_max_message_size(1024);
        // fixmap(1) "statement" str32 announcing 1 MiB
        let mut head = vec![0x81, 0xa9];
        head.extend_from_slice(b"statement");
        head.extend_from_slice(&[0xdb, 0x00, 0x10, 0x00, 0x00]);

        let result = buffer.push(&head);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_reserved_marker() {
        let mut buffer = MessageBuffer::new();
        let result = buffer.push(&[0xc1]);
        assert!(matches!(result, Err(ReplError::Protocol(_))));
    }

    #[test]
    fn test_non_map_values_still_framed() {
        let mut buffer = MessageBuffer::new();
        let mut stream = MsgPackCodec::encode(&42u8).unwrap();
        stream.extend_from_slice(&request_bytes("1"));

        let messages = buffer.push(&stream).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].decode::<Request>().is_err());
        assert_eq!(messages[1].decode::<Request>().unwrap().statement, "1");
    }

    #[test]
    fn test_next_message_before_error() {
        let mut buffer = MessageBuffer::with_max_message_size(64);
        let mut stream = request_bytes("ok");
        stream.extend_from_slice(&request_bytes(&"y".repeat(100)));
        buffer.extend(&stream);

        let first = buffer.next_message().unwrap().unwrap();
        assert_eq!(first.decode::<Request>().unwrap().statement, "ok");
        assert!(buffer.next_message().is_err());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = MessageBuffer::new();
        let bytes = request_bytes("partial");

        buffer.push(&bytes[..4]).unwrap();
        assert_eq!(buffer.state_name(), "Scanning");
        assert!(!buffer.is_empty());

        buffer.clear();
        assert_eq!(buffer.state_name(), "Idle");
        assert!(buffer.is_empty());

        let messages = buffer.push(&request_bytes("fresh")).unwrap();
        assert_eq!(statements(&messages), ["fresh"]);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = MessageBuffer::new();
        let first = request_bytes("first");
        let second = request_bytes("second");

        let mut data = first.clone();
        data.extend_from_slice(&second[..5]);

        let messages = buffer.push(&data).unwrap();
        assert_eq!(statements(&messages), ["first"]);
        assert_eq!(buffer.len(), 5);

        let messages = buffer.push(&second[5..]).unwrap();
        assert_eq!(statements(&messages), ["second"]);
        assert!(buffer.is_empty());
    }
}
