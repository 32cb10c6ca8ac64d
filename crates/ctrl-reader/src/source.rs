//! Underlying source abstraction

use std::io::{ErrorKind, Read};

/// Outcome of probing the underlying source once
#[derive(Debug)]
pub enum Probe {
    /// `n` bytes were produced and more may follow.
    /// `Data(0)` means "nothing right now" without claiming exhaustion.
    Data(usize),
    /// `n` bytes were produced and the source is now exhausted
    Last(usize),
    /// No bytes, the source is exhausted
    End,
    /// Any failure other than exhaustion
    Failed(std::io::Error),
}

/// A byte producer that a [`ControlledReader`](crate::ControlledReader) can wrap.
///
/// Every `std::io::Read + Send` type is a source. Implement this directly for
/// producers that can report trailing bytes and exhaustion in one step.
pub trait Source: Send {
    /// Fill `buf` with up to `buf.len()` bytes and report what happened
    fn probe(&mut self, buf: &mut [u8]) -> Probe;
}

impl<R: Read + Send> Source for R {
    fn probe(&mut self, buf: &mut [u8]) -> Probe {
        loop {
            match self.read(buf) {
                Ok(0) => return Probe::End,
                Ok(n) => return Probe::Data(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // A truncated stream is still just an exhausted one
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Probe::End,
                Err(e) => return Probe::Failed(e),
            }
        }
    }
}
