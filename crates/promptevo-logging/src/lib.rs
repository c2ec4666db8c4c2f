//! # promptevo-logging
//!
//! Progress events and logging for the promptevo optimizer.
//!
//! ## Key Types
//!
//! - [`ProgressEvent`] / [`StampedEvent`] - run lifecycle events
//! - [`ProgressSink`] - where a run sends its events
//! - [`Logger`] - console sink (Pretty, JSON, Compact) with optional JSONL mirror
//! - [`ChannelSink`] - forwards events into a tokio channel

mod events;
mod logger;
mod sink;

pub use events::{ProgressEvent, StampedEvent};
pub use logger::{LogFormat, Logger};
pub use sink::{ChannelSink, FanoutSink, NullSink, ProgressSink};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty | LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}
