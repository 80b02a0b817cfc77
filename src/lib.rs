//! vcdec: streaming VCDIFF (RFC 3284) decoding in Rust.
//!
//! Decodes the generic differencing format of RFC 3284 plus the
//! unofficial SDCH extensions signalled by version byte `'S'`:
//! interleaved window sections and per-window Adler-32 checksums.
//! Input is consumed incrementally — chunks of any size down to one
//! byte — and output is emitted as soon as it is unambiguously
//! determined.  Secondary compressors are rejected; encoding is out of
//! scope.
//!
//! # Modules
//!
//! - `varint`        — Variable-length integer encoding (base-128, big-endian)
//! - `parse`         — Restartable pull parser over buffered input
//! - `address_cache` — NEAR/SAME address cache for COPY instruction addresses
//! - `code_table`    — Default RFC 3284 code table (256 entries) and custom tables
//! - `window`        — Per-window header parsing and instruction execution
//! - `decoder`       — Streaming driver, custom-code-table recursion, one-shot wrapper
//!
//! # Quick start
//!
//! ```no_run
//! use vcdec::StreamingDecoder;
//!
//! let dictionary = b"hello old world";
//! let delta: &[u8] = todo!("a VCDIFF delta produced against the dictionary");
//!
//! let mut decoder = StreamingDecoder::new();
//! let mut target = Vec::new();
//! decoder.start(dictionary).unwrap();
//! for chunk in delta.chunks(4096) {
//!     decoder.decode_chunk(chunk, &mut target).unwrap();
//! }
//! decoder.finish().unwrap();
//! ```

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod error;
pub mod parse;
pub mod varint;
pub mod window;

// Re-export the main entry points.
pub use decoder::{StreamingDecoder, decode};
pub use error::DecodeError;
