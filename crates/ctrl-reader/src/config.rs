//! Reader configuration

use crate::error::{Error, Result};
use std::time::Duration;

/// Default scratch buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default pause between probes while no data is available
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

/// Tunables for a [`ControlledReader`](crate::ControlledReader)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Capacity of the scratch buffer, i.e. the most bytes a single read returns.
    /// Zero means [`DEFAULT_BUFFER_SIZE`].
    pub buffer_size: usize,
    /// How long a read parks before probing the source again.
    /// Also bounds how long a blocked read takes to notice `allow_eof`.
    pub pause: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            pause: DEFAULT_PAUSE,
        }
    }
}

impl ReaderConfig {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Scratch buffer size actually used, never zero
    pub fn effective_buffer_size(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.pause.is_zero() {
            return Err(Error::ZeroPause);
        }
        Ok(())
    }
}
