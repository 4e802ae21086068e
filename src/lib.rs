//! # evalwire
//!
//! A read-evaluate-respond loop over a byte stream.
//!
//! Requests arrive as a plain sequence of MessagePack maps
//! `{"statement": <text>}`. Each statement is run in a session whose
//! bindings persist across requests, and one response map is written and
//! flushed per request:
//!
//! - `{"result": <value|nil>, "error": <text|nil>}` (standard, eval-only)
//! - `{"result": ..., "error": ..., "etype": <text|nil>}` (typed)
//!
//! Statements are written in a small Python-flavoured language, see
//! [`lang`].
//!
//! ## Example
//!
//! ```ignore
//! use evalwire::{ProtocolVariant, Repl};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> evalwire::Result<()> {
//!     let mut repl = Repl::builder().variant(ProtocolVariant::Typed).build();
//!     repl.run_stdio().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod lang;
pub mod protocol;
pub mod session;
pub mod writer;

mod repl;

pub use config::{ProtocolVariant, ReplConfig};
pub use error::{ReplError, Result};
pub use repl::{Repl, ReplBuilder};
pub use session::{Outcome, Session};
