//! Control block shared between the reader, its handles and the governor
//!
//! Everything a controller can touch lives behind one mutex. The reader owns
//! the active source outright; replacements are handed over through the
//! single `pending` slot and adopted at the start of the next probe cycle.
//! Sources that leave the reader, whether displaced on adoption or superseded
//! while still pending, queue up in `replaced` until the controller takes them.

use crate::source::Source;
use crate::state::{FinishReason, StreamState};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub(crate) type BoxedSource = Box<dyn Source>;

struct Control {
    state: StreamState,
    eof_observed: bool,
    /// Bumped whenever a parked reader should probe again before its pause ends
    epoch: u64,
    pending: Option<(u64, BoxedSource)>,
    /// Oldest first
    replaced: VecDeque<BoxedSource>,
    /// Generation of the most recently switched-in source
    latest: u64,
    /// Generation the last probe ran against
    probed: u64,
}

/// What the reader should do after its source reported exhaustion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exhaustion {
    /// Report end-of-stream to the consumer
    Surface,
    /// A replacement is waiting; probe it right away
    Retry,
    /// Park until the pause elapses or something wakes us
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Park {
    Finished,
    Woken,
    Elapsed,
}

/// Start-of-cycle snapshot taken by the reader
pub(crate) struct Cycle {
    pub epoch: u64,
    pub replacement: Option<(u64, BoxedSource)>,
}

pub(crate) struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    /// Cancelled once the reader is finished or dropped
    retired: CancellationToken,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            control: Mutex::new(Control {
                state: StreamState::Open,
                eof_observed: false,
                epoch: 0,
                pending: None,
                replaced: VecDeque::new(),
                latest: 0,
                probed: 0,
            }),
            wake: Condvar::new(),
            retired: CancellationToken::new(),
        }
    }

    // A panic while holding the lock cannot leave the control block half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn retired(&self) -> &CancellationToken {
        &self.retired
    }

    pub fn begin_cycle(&self) -> Cycle {
        let mut control = self.lock();
        Cycle {
            epoch: control.epoch,
            replacement: control.pending.take(),
        }
    }

    /// Queue `source` for adoption by the reader, superseding any earlier
    /// replacement that was never adopted. Returns the new source generation.
    pub fn install(&self, source: BoxedSource) -> u64 {
        let (generation, superseded) = {
            let mut control = self.lock();
            control.latest = control.latest.wrapping_add(1);
            control.epoch = control.epoch.wrapping_add(1);
            let generation = control.latest;
            let superseded = match control.pending.replace((generation, source)) {
                Some((old, source)) => {
                    control.replaced.push_back(source);
                    Some(old)
                }
                None => None,
            };
            (generation, superseded)
        };
        self.wake.notify_all();

        match superseded {
            Some(old) => {
                debug!("Source generation {generation} supersedes unadopted generation {old}")
            }
            None => debug!("Switching to source generation {generation}"),
        }
        generation
    }

    /// Queue a source the reader no longer uses for the controller to take
    pub fn hand_back(&self, source: BoxedSource) {
        self.lock().replaced.push_back(source);
    }

    pub fn take_replaced(&self) -> Option<BoxedSource> {
        self.lock().replaced.pop_front()
    }

    pub fn record_data(&self, generation: u64, exhausted: bool) {
        let mut control = self.lock();
        control.probed = generation;
        control.eof_observed = exhausted;
        control.state = if exhausted {
            control.state.on_exhausted()
        } else {
            control.state.on_data()
        };
    }

    pub fn record_failure(&self, generation: u64) {
        let mut control = self.lock();
        control.probed = generation;
        control.eof_observed = false;
        control.state = control.state.on_data();
    }

    pub fn record_exhausted(&self, generation: u64) -> Exhaustion {
        let mut control = self.lock();
        control.probed = generation;
        control.eof_observed = true;
        control.state = control.state.on_exhausted();

        if control.pending.is_some() {
            Exhaustion::Retry
        } else if control.state.eof_allowed() {
            Exhaustion::Surface
        } else {
            Exhaustion::Wait
        }
    }

    /// Returns true if this call granted the permission
    pub fn allow(&self) -> bool {
        let mut control = self.lock();
        let before = control.state;
        control.state = before.on_allow();
        let granted = before != control.state;
        drop(control);

        if granted {
            debug!("End-of-stream allowed (was {before})");
        }
        granted
    }

    /// Force the stream to finish. Returns true on the first call only.
    pub fn finish(&self, reason: FinishReason) -> bool {
        let mut control = self.lock();
        if control.state.is_finished() {
            return false;
        }
        let before = control.state;
        control.state = before.on_finish(reason);
        drop(control);

        self.wake.notify_all();
        self.retired.cancel();
        debug!("Reader finished by {reason:?} (was {before})");
        true
    }

    /// Wake a parked reader so it probes again immediately
    pub fn notify(&self) {
        let mut control = self.lock();
        control.epoch = control.epoch.wrapping_add(1);
        drop(control);
        self.wake.notify_all();
    }

    /// Block for at most `pause`, returning early on finish or when the epoch
    /// moves past the one captured at the start of the cycle.
    pub fn park(&self, epoch: u64, pause: Duration) -> Park {
        let control = self.lock();
        let (control, _) = self
            .wake
            .wait_timeout_while(control, pause, |c| {
                !c.state.is_finished() && c.epoch == epoch
            })
            .unwrap_or_else(PoisonError::into_inner);

        let outcome = if control.state.is_finished() {
            Park::Finished
        } else if control.epoch != epoch {
            Park::Woken
        } else {
            Park::Elapsed
        };
        trace!("Park ended: {outcome:?}");
        outcome
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    pub fn eof_observed(&self) -> bool {
        self.lock().eof_observed
    }

    /// True when the latest switched-in source has been probed and found exhausted
    pub fn source_drained(&self) -> bool {
        let control = self.lock();
        control.eof_observed && control.pending.is_none() && control.probed == control.latest
    }
}
