//! Wire protocol for the trace relay.
//!
//! A trace event travels as one [`MessageFrame`]. The codec turns a frame
//! into a body of bytes, and the [`wire`] module moves bodies across a byte
//! stream with a length prefix.
//!
//! # Wire format
//!
//! ```text
//! FRAME:
//!   [4 bytes BE: body_len]
//!   BODY:
//!     [1 byte: flags]  bit0 = timestamp present, bit1 = activity id present
//!     [8 bytes BE: unix millis]      (if bit0)
//!     [16 bytes: activity uuid]      (if bit1)
//!     [UTF-8: "severity|source|message"]
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod wire;

pub use codec::{decode, encode};
pub use error::FrameError;
pub use frame::{MessageFrame, Severity};

/// Separator between the text fields of a frame.
pub const DELIMITER: char = '|';

/// Default maximum encoded body size (256 KiB).
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Maximum body size for transports configured with large frames (1 MiB).
pub const LARGE_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Endpoint name shared by producers and the collector unless configured.
pub const DEFAULT_ENDPOINT_NAME: &str = "biz.dfch.CS.Commons.Diagnostics.NamedPipeTraceListener";
