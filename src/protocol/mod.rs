//! Protocol module - message boundaries, buffering, and message types.
//!
//! The wire carries a plain sequence of MessagePack values with no outer
//! framing:
//! - boundary detection by walking value markers
//! - message buffer for accumulating partial reads
//! - request/response types

mod message;
mod message_buffer;
mod wire_format;

pub use message::{RawMessage, Request, Response};
pub use message_buffer::MessageBuffer;
pub use wire_format::{measure_value, ValueScanner, DEFAULT_MAX_MESSAGE_SIZE};
