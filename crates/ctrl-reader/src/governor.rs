//! Lifecycle governor
//!
//! Background task that turns cancellation of the caller's token into a forced
//! finish. It fires at most once and exits early once the reader is retired.

use crate::shared::Shared;
use crate::state::FinishReason;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub(crate) fn spawn(
    runtime: &Handle,
    cancel: CancellationToken,
    shared: Arc<Shared>,
) -> JoinHandle<()> {
    let retired = shared.retired().clone();
    runtime.spawn(async move {
        tokio::select! {
            biased;
            _ = retired.cancelled() => {
                trace!("Reader retired before cancellation, governor exiting");
            }
            _ = cancel.cancelled() => {
                if shared.finish(FinishReason::Cancelled) {
                    debug!("Cancellation received, reader forced to finish");
                }
            }
        }
    })
}
