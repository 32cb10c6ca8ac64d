//! ctrlio library
//!
//! Relays a sequence of files through a single controlled read stream from the
//! `ctrl-reader` crate. The relay plays the controller: it switches to the next
//! file once the current one is drained, and decides when the consumer may see
//! end-of-stream.
//!
//! # CLI Usage
//!
//! ```bash
//! # Concatenate files, ending after the last one is drained
//! ctrlio cat part1.log part2.log part3.log
//!
//! # Same, then keep following the last file for appended data for 10 minutes
//! ctrlio follow --timeout 10m part1.log part2.log live.log
//! ```

use clap::Parser;
use ctrl_reader::{ReaderConfig, DEFAULT_BUFFER_SIZE};
use std::time::Duration;

pub mod config;
pub mod relay;

pub use relay::{Mode, Relay, RelaySummary};

#[derive(Parser, Clone, Debug)]
pub struct ReaderOpts {
    /// Largest chunk handed to the output in one read, in bytes (0 uses the default)
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE, env = "CTRLIO_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Pause between probes while the current file has no new data (e.g. "100ms")
    #[arg(
        long,
        default_value = "100ms",
        env = "CTRLIO_PAUSE",
        value_parser = config::parse_positive_duration
    )]
    pub pause: Duration,

    /// How often the relay checks whether the current file is drained
    #[arg(
        long,
        default_value = "20ms",
        env = "CTRLIO_POLL",
        value_parser = config::parse_positive_duration
    )]
    pub poll: Duration,

    /// Force the stream to finish after this long (e.g. "30s", "10m")
    #[arg(long, env = "CTRLIO_TIMEOUT", value_parser = config::parse_duration)]
    pub timeout: Option<Duration>,
}

impl Default for ReaderOpts {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            pause: ctrl_reader::DEFAULT_PAUSE,
            poll: Duration::from_millis(20),
            timeout: None,
        }
    }
}

impl ReaderOpts {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig::default()
            .with_buffer_size(self.buffer_size)
            .with_pause(self.pause)
    }
}
