//! Wire format boundary detection.
//!
//! Messages are not wrapped in an outer header. Each message is one
//! MessagePack value and carries its own length information in its markers:
//!
//! ```text
//! ┌────────┬──────────────────┬──────────────┐
//! │ Marker │ Length (0/1/2/4) │ Body / items │
//! │ 1 byte │ uint BE          │              │
//! └────────┴──────────────────┴──────────────┘
//! ```
//!
//! [`ValueScanner`] walks those markers to find where a value ends without
//! decoding it. The scanner is resumable: when it runs out of bytes it keeps
//! its cursor and continues from there on the next call.

use rmp::Marker;

use crate::error::{ReplError, Result};

/// Default maximum size of a single message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// How the bytes after a marker are laid out.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// Fixed total size, marker included.
    Fixed(usize),
    /// Body length stored in the marker itself.
    FixBlob(usize),
    /// Body length stored in `prefix` bytes after the marker, followed by
    /// `extra` bytes (the ext type tag) before the body.
    Blob { prefix: usize, extra: usize },
    /// Item count stored in the marker itself.
    FixCollection(u64),
    /// Item count stored in `prefix` bytes after the marker. Each counted
    /// entry stands for `per_entry` nested values (2 for maps).
    Collection { prefix: usize, per_entry: u64 },
}

fn layout(marker: Marker) -> Result<Layout> {
    let layout = match marker {
        Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {
            Layout::Fixed(1)
        }
        Marker::U8 | Marker::I8 => Layout::Fixed(2),
        Marker::U16 | Marker::I16 => Layout::Fixed(3),
        Marker::U32 | Marker::I32 | Marker::F32 => Layout::Fixed(5),
        Marker::U64 | Marker::I64 | Marker::F64 => Layout::Fixed(9),
        Marker::FixExt1 => Layout::Fixed(3),
        Marker::FixExt2 => Layout::Fixed(4),
        Marker::FixExt4 => Layout::Fixed(6),
        Marker::FixExt8 => Layout::Fixed(10),
        Marker::FixExt16 => Layout::Fixed(18),
        Marker::FixStr(len) => Layout::FixBlob(len as usize),
        Marker::Str8 | Marker::Bin8 => Layout::Blob { prefix: 1, extra: 0 },
        Marker::Str16 | Marker::Bin16 => Layout::Blob { prefix: 2, extra: 0 },
        Marker::Str32 | Marker::Bin32 => Layout::Blob { prefix: 4, extra: 0 },
        Marker::Ext8 => Layout::Blob { prefix: 1, extra: 1 },
        Marker::Ext16 => Layout::Blob { prefix: 2, extra: 1 },
        Marker::Ext32 => Layout::Blob { prefix: 4, extra: 1 },
        Marker::FixArray(len) => Layout::FixCollection(len as u64),
        Marker::FixMap(len) => Layout::FixCollection(2 * len as u64),
        Marker::Array16 => Layout::Collection { prefix: 2, per_entry: 1 },
        Marker::Array32 => Layout::Collection { prefix: 4, per_entry: 1 },
        Marker::Map16 => Layout::Collection { prefix: 2, per_entry: 2 },
        Marker::Map32 => Layout::Collection { prefix: 4, per_entry: 2 },
        Marker::Reserved => {
            return Err(ReplError::Protocol(
                "Reserved marker 0xc1 in input".to_string(),
            ))
        }
    };
    Ok(layout)
}

/// Read a big-endian unsigned integer of 1, 2 or 4 bytes.
#[inline]
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Resumable scanner locating the end of one MessagePack value.
///
/// `pos` may run past the end of the buffer when a string or binary body
/// is only partly buffered; the value is complete once the buffer catches up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueScanner {
    /// Offset of the next unread marker.
    pos: usize,
    /// Number of values still to be walked (1 for the top-level value).
    pending: u64,
}

impl ValueScanner {
    /// Create a scanner positioned at the start of a new value.
    pub fn new() -> Self {
        Self { pos: 0, pending: 1 }
    }

    /// Bytes of the current value consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Continue scanning `buf`, which must start at the first byte of the value.
    ///
    /// Returns:
    /// - `Ok(Some(len))` once the whole value occupies `buf[..len]`
    /// - `Ok(None)` if more bytes are needed
    /// - `Err(...)` on a reserved marker or a value larger than `max_size`
    pub fn advance(&mut self, buf: &[u8], max_size: usize) -> Result<Option<usize>> {
        loop {
            if self.pending == 0 {
                return Ok((self.pos <= buf.len()).then_some(self.pos));
            }

            let Some(&byte) = buf.get(self.pos) else {
                return Ok(None);
            };

            let (head, body, items) = match layout(Marker::from_u8(byte))? {
                Layout::Fixed(size) => (size, 0u64, 0u64),
                Layout::FixBlob(len) => (1, len as u64, 0),
                Layout::FixCollection(items) => (1, 0, items),
                Layout::Blob { prefix, extra } => match buf.get(self.pos + 1..self.pos + 1 + prefix) {
                    Some(len) => (1 + prefix + extra, read_be(len), 0),
                    None => return Ok(None),
                },
                Layout::Collection { prefix, per_entry } => {
                    match buf.get(self.pos + 1..self.pos + 1 + prefix) {
                        Some(len) => (1 + prefix, 0, read_be(len) * per_entry),
                        None => return Ok(None),
                    }
                }
            };

            let end = usize::try_from(body)
                .ok()
                .and_then(|body| self.pos.checked_add(head)?.checked_add(body))
                .unwrap_or(usize::MAX);
            if end > max_size {
                return Err(ReplError::MessageTooLarge {
                    size: end,
                    max: max_size,
                });
            }

            self.pos = end;
            self.pending = self.pending - 1 + items;
        }
    }
}

impl Default for ValueScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Measure a complete value at the start of `buf` in one shot.
///
/// Convenience wrapper over [`ValueScanner`] for callers that hold the whole
/// input already.
pub fn measure_value(buf: &[u8], max_size: usize) -> Result<Option<usize>> {
    ValueScanner::new().advance(buf, max_size)
}
