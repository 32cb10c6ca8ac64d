//! The controlled reader and its control handles

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::governor;
use crate::shared::{BoxedSource, Exhaustion, Park, Shared};
use crate::source::{Probe, Source};
use crate::state::{FinishReason, StreamState};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::trace;

/// Read side of a controlled stream.
///
/// Reads block until the active source produces data, until end-of-stream is
/// both observed and allowed, or until the stream is forced to finish. Both
/// kinds of end-of-stream read as `Ok(0)`; source errors come back unchanged.
///
/// Reading needs `&mut self`, so there is exactly one consumer. Control
/// operations take `&self` and are also available from other threads through
/// [`ReaderHandle`].
pub struct ControlledReader {
    scratch: Box<[u8]>,
    source: BoxedSource,
    generation: u64,
    pause: Duration,
    shared: Arc<Shared>,
    // Retires the lifecycle governor when the reader goes away
    _retire: DropGuard,
}

impl ControlledReader {
    /// Wrap `source`, running the lifecycle governor on the current tokio runtime.
    ///
    /// Returns the reader and a [`StopHandle`] that forces it to finish.
    /// Cancelling `cancel` has the same effect as [`StopHandle::stop`].
    pub fn new<S: Source + 'static>(
        cancel: CancellationToken,
        source: S,
        config: ReaderConfig,
    ) -> Result<(Self, StopHandle)> {
        let runtime = Handle::try_current()?;
        Self::with_runtime(&runtime, cancel, source, config)
    }

    /// Like [`ControlledReader::new`], for callers outside a runtime context
    pub fn with_runtime<S: Source + 'static>(
        runtime: &Handle,
        cancel: CancellationToken,
        source: S,
        config: ReaderConfig,
    ) -> Result<(Self, StopHandle)> {
        config.validate()?;

        let shared = Arc::new(Shared::new());
        governor::spawn(runtime, cancel, Arc::clone(&shared));

        let reader = Self {
            scratch: vec![0u8; config.effective_buffer_size()].into_boxed_slice(),
            source: Box::new(source),
            generation: 0,
            pause: config.pause,
            _retire: shared.retired().clone().drop_guard(),
            shared: Arc::clone(&shared),
        };
        Ok((reader, StopHandle { shared }))
    }

    /// A cloneable handle for controlling this reader from elsewhere
    pub fn handle(&self) -> ReaderHandle {
        ReaderHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Replace the underlying source from the next probe on.
    ///
    /// The reader does not close or drain the source being replaced: once it
    /// adopts the new one, the old one is handed back through
    /// [`ControlledReader::take_replaced`]. Bytes already returned from it
    /// are never replayed.
    pub fn switch_source<S: Source + 'static>(&self, source: S) {
        self.shared.install(Box::new(source));
    }

    /// Take back the oldest source this reader no longer uses.
    ///
    /// That is either a source displaced by a switch, or a replacement that
    /// was superseded before the reader adopted it. Replaced sources are held
    /// until taken.
    pub fn take_replaced(&self) -> Option<Box<dyn Source>> {
        self.shared.take_replaced()
    }

    /// Let the next observed exhaustion through as end-of-stream. Irreversible.
    ///
    /// A read that is already parked notices this after its current pause.
    pub fn allow_eof(&self) {
        self.shared.allow();
    }

    /// Whether the most recent probe found the active source exhausted
    pub fn is_eof_observed(&self) -> bool {
        self.shared.eof_observed()
    }

    /// Whether the most recently switched-in source has been probed and found exhausted
    pub fn is_source_drained(&self) -> bool {
        self.shared.source_drained()
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Most bytes a single read returns
    pub fn buffer_size(&self) -> usize {
        self.scratch.len()
    }

    fn adopt(&mut self, generation: u64, source: BoxedSource) {
        trace!(
            "Adopting source generation {generation}, retiring generation {}",
            self.generation
        );
        let old = std::mem::replace(&mut self.source, source);
        self.generation = generation;
        self.shared.hand_back(old);
    }

    fn deliver(&mut self, buf: &mut [u8], n: usize, exhausted: bool) -> usize {
        buf[..n].copy_from_slice(&self.scratch[..n]);
        self.shared.record_data(self.generation, exhausted);
        n
    }
}

impl Read for ControlledReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = buf.len().min(self.scratch.len());

        loop {
            let cycle = self.shared.begin_cycle();
            if let Some((generation, source)) = cycle.replacement {
                self.adopt(generation, source);
            }

            match self.source.probe(&mut self.scratch[..limit]) {
                Probe::Data(n) if n > 0 => return Ok(self.deliver(buf, n.min(limit), false)),
                Probe::Last(n) if n > 0 => return Ok(self.deliver(buf, n.min(limit), true)),
                Probe::Failed(e) => {
                    self.shared.record_failure(self.generation);
                    return Err(e);
                }
                // Nothing yet, but no claim of exhaustion either
                Probe::Data(_) => {}
                Probe::Last(_) | Probe::End => {
                    match self.shared.record_exhausted(self.generation) {
                        Exhaustion::Surface => return Ok(0),
                        Exhaustion::Retry => continue,
                        Exhaustion::Wait => {}
                    }
                }
            }

            if self.shared.park(cycle.epoch, self.pause) == Park::Finished {
                return Ok(0);
            }
        }
    }
}

impl fmt::Debug for ControlledReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlledReader")
            .field("buffer_size", &self.scratch.len())
            .field("generation", &self.generation)
            .field("pause", &self.pause)
            .field("state", &self.state())
            .finish()
    }
}

/// Cloneable control side of a [`ControlledReader`]
#[derive(Clone)]
pub struct ReaderHandle {
    shared: Arc<Shared>,
}

impl ReaderHandle {
    /// See [`ControlledReader::switch_source`]
    pub fn switch_source<S: Source + 'static>(&self, source: S) {
        self.shared.install(Box::new(source));
    }

    /// See [`ControlledReader::take_replaced`]
    pub fn take_replaced(&self) -> Option<Box<dyn Source>> {
        self.shared.take_replaced()
    }

    /// See [`ControlledReader::allow_eof`]
    pub fn allow_eof(&self) {
        self.shared.allow();
    }

    pub fn is_eof_observed(&self) -> bool {
        self.shared.eof_observed()
    }

    pub fn is_source_drained(&self) -> bool {
        self.shared.source_drained()
    }

    /// Wake a parked read so it probes the source now instead of after its pause.
    ///
    /// For producers that know when new bytes have arrived.
    pub fn notify_data(&self) {
        self.shared.notify();
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }
}

impl fmt::Debug for ReaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Forces a [`ControlledReader`] to finish.
///
/// Stopping wakes a parked read, which then returns end-of-stream, and allows
/// end-of-stream from then on. Stopping more than once is harmless.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shared.finish(FinishReason::Stopped);
    }

    pub fn is_finished(&self) -> bool {
        self.shared.state().is_finished()
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.shared.state().finish_reason()
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("state", &self.shared.state())
            .finish()
    }
}
