//! Controlled, switchable read stream
//!
//! This crate wraps a byte-producing source in a [`ControlledReader`] that a
//! controller can steer from other threads while a single consumer keeps
//! calling [`std::io::Read::read`] on it.
//!
//! # Capabilities
//!
//! - **Hot swap**: [`ControlledReader::switch_source`] replaces the underlying
//!   source; the consumer just keeps reading. The replaced source is not
//!   closed: it comes back through [`ControlledReader::take_replaced`].
//! - **Gated end-of-stream**: exhaustion of the underlying source is masked
//!   until [`ControlledReader::allow_eof`] is called. Until then the reader
//!   re-probes the source every pause interval.
//! - **Forced finish**: the [`StopHandle`] returned by the factory, or
//!   cancellation of the token given to it, wakes a parked read and makes it
//!   return end-of-stream.
//!
//! Hard errors from the source are never masked or retried.
//!
//! # Example
//!
//! ```ignore
//! use ctrl_reader::{ControlledReader, ReaderConfig};
//! use std::io::Read;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let (mut reader, stop) =
//!     ControlledReader::new(cancel.clone(), &b"first"[..], ReaderConfig::default())?;
//! let control = reader.handle();
//!
//! std::thread::spawn(move || {
//!     // Wait until the first source is drained, then hand over the next one
//!     while !control.is_source_drained() {
//!         std::thread::sleep(std::time::Duration::from_millis(10));
//!     }
//!     control.switch_source(&b"second"[..]);
//!     control.allow_eof();
//! });
//!
//! let mut out = Vec::new();
//! reader.read_to_end(&mut out)?;
//! assert_eq!(out, b"firstsecond");
//! # drop(stop);
//! ```

mod config;
mod error;
mod governor;
mod reader;
mod shared;
mod source;
mod state;

pub use config::{ReaderConfig, DEFAULT_BUFFER_SIZE, DEFAULT_PAUSE};
pub use error::{Error, Result};
pub use reader::{ControlledReader, ReaderHandle, StopHandle};
pub use source::{Probe, Source};
pub use state::{FinishReason, StreamState};
