//! Error types for constructing a controlled reader.
//!
//! Read failures are not represented here: they are the underlying source's
//! `std::io::Error`, passed through unchanged.

use thiserror::Error;

/// Errors that can occur while building a [`ControlledReader`](crate::ControlledReader).
#[derive(Error, Debug)]
pub enum Error {
    /// A zero pause would turn the wait loop into a busy spin.
    #[error("Pause duration must be greater than zero")]
    ZeroPause,

    /// The lifecycle governor needs a tokio runtime to run on.
    #[error("No tokio runtime available for the lifecycle governor: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

pub type Result<T> = std::result::Result<T, Error>;
