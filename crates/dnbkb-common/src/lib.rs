//! DNB-KB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the DNB knowledge base workspace.
//!
//! - **Error Handling**: the `KbError` type and `Result` alias
//! - **Checksums**: incremental SHA-256 digests for streamed downloads
//! - **Logging**: tracing subscriber setup driven by `LOG_*` environment variables
//!
//! # Example
//!
//! ```no_run
//! use dnbkb_common::checksum::StreamingDigest;
//!
//! let mut digest = StreamingDigest::new();
//! digest.update(b"chunk one");
//! digest.update(b"chunk two");
//! println!("{} bytes, sha256 {}", digest.bytes_seen(), digest.finalize_hex());
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{KbError, Result};
