//! File relay built on a controlled reader
//!
//! The relay opens the first file as the reader's source and copies the reader
//! into the output on a blocking thread. Meanwhile it acts as the controller:
//! whenever the active file is drained it switches to the next one, and in
//! [`Mode::Cat`] it allows end-of-stream once the last file is active.
//!
//! It only uses the public API of `ctrl-reader` and stays a thin example of a
//! controller; the reader itself knows nothing about files or modes.

use crate::ReaderOpts;
use anyhow::{Context, Result};
use ctrl_reader::{ControlledReader, FinishReason, ReaderConfig, ReaderHandle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// When the relay lets the output see end-of-stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Once the last file is drained
    Cat,
    /// Never; the last file is followed until the relay is cancelled or times out
    Follow,
}

/// Outcome of a relay run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    /// Bytes written to the output
    pub bytes: u64,
    /// Files that were switched in, including the first
    pub sources: usize,
    /// Set when the stream was forced to finish instead of ending cleanly
    pub finish: Option<FinishReason>,
}

pub struct Relay {
    paths: Vec<PathBuf>,
    mode: Mode,
    config: ReaderConfig,
    poll: Duration,
    timeout: Option<Duration>,
}

impl Relay {
    pub fn new(paths: Vec<PathBuf>, mode: Mode, opts: &ReaderOpts) -> Self {
        Self {
            paths,
            mode,
            config: opts.reader_config(),
            poll: opts.poll,
            timeout: opts.timeout,
        }
    }

    /// Relay all files into `out`, returning the summary and the output back.
    ///
    /// Cancelling `cancel` forces the stream to finish; whatever was read up
    /// to that point has been written. The timeout only ends this relay and
    /// leaves `cancel` itself untouched.
    pub async fn run<W>(self, cancel: CancellationToken, out: W) -> Result<(RelaySummary, W)>
    where
        W: Write + Send + 'static,
    {
        let (first, rest) = self
            .paths
            .split_first()
            .context("No input files given")?;
        let cancel = cancel.child_token();

        // Retires the deadline task however this function returns
        let scope = CancellationToken::new();
        let _scope_guard = scope.clone().drop_guard();
        if let Some(timeout) = self.timeout {
            spawn_deadline(cancel.clone(), scope, timeout);
        }

        let file = open(first).await?;
        let (reader, stop) = ControlledReader::new(cancel.clone(), file, self.config)
            .context("Failed to create controlled reader")?;
        let control = reader.handle();
        debug!("Relaying {} ({:?} mode)", first.display(), self.mode);

        let copy = tokio::task::spawn_blocking(move || copy_all(reader, out));

        let mut sources = 1;
        for path in rest {
            if !wait_for_drain(&control, self.poll, &cancel, &copy).await {
                break;
            }
            close_replaced(&control);
            match open(path).await {
                Ok(file) => {
                    debug!("Switching to {}", path.display());
                    control.switch_source(file);
                    sources += 1;
                }
                Err(e) => {
                    stop.stop();
                    match copy.await {
                        Ok(Ok((bytes, _))) => debug!("Relayed {bytes} bytes before the failure"),
                        Ok(Err(copy_err)) => warn!("Relay copy also failed: {copy_err}"),
                        Err(join_err) => warn!("Relay copy task panicked: {join_err}"),
                    }
                    return Err(e);
                }
            }
        }

        if self.mode == Mode::Cat {
            control.allow_eof();
        }

        let (bytes, out) = copy
            .await
            .context("Relay copy task panicked")?
            .context("Failed to relay data")?;
        close_replaced(&control);

        let summary = RelaySummary {
            bytes,
            sources,
            finish: stop.finish_reason(),
        };
        info!(
            "Relayed {} bytes from {} file(s){}",
            summary.bytes,
            summary.sources,
            match summary.finish {
                Some(reason) => format!(", finished by {reason:?}"),
                None => String::new(),
            }
        );
        Ok((summary, out))
    }
}

async fn open(path: &Path) -> Result<std::fs::File> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    Ok(file.into_std().await)
}

/// The reader hands every replaced file back; the relay has no further use
/// for them.
fn close_replaced(control: &ReaderHandle) {
    while let Some(old) = control.take_replaced() {
        trace!("Closing replaced source");
        drop(old);
    }
}

fn copy_all<W: Write>(mut reader: ControlledReader, mut out: W) -> std::io::Result<(u64, W)> {
    let bytes = std::io::copy(&mut reader, &mut out)?;
    out.flush()?;
    Ok((bytes, out))
}

/// Wait until the active file is drained. Returns false if the relay should
/// stop switching instead: cancellation fired or the copy already ended.
async fn wait_for_drain<T>(
    control: &ReaderHandle,
    poll: Duration,
    cancel: &CancellationToken,
    copy: &JoinHandle<T>,
) -> bool {
    loop {
        if control.is_source_drained() {
            return true;
        }
        if copy.is_finished() {
            return false;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

fn spawn_deadline(cancel: CancellationToken, scope: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = scope.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                info!("Timeout of {timeout:?} reached, finishing relay");
                cancel.cancel();
            }
        }
    });
}
