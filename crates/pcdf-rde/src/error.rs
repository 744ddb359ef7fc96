//! The error types of the analyser. All of them abort the current analysis run.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::analyser::Channel;

/// Errors raised while decoding a single record line into an [Event](crate::Event).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The line is not a well-formed record, or its payload does not match its diagnostic command.
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// Errors of an [EventStream](crate::EventStream).
///
/// The error is cheap to clone so that a faulted stream can hand out the same fault on every access.
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// The underlying reader failed.
    #[error("failed to read event stream: {0}")]
    Io(#[source] Arc<io::Error>),
    /// A record could not be decoded.
    #[error("could not decode record in line {line}: {source}")]
    Decode {
        /// The 1-based line number of the record.
        line: usize,
        /// The reason.
        source: DecodeError,
    },
    /// A single-use stream was iterated a second time.
    #[error("single-use event stream has already been consumed")]
    Exhausted,
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        StreamError::Io(Arc::new(e))
    }
}

/// Reasons why a vehicle is not suitable for an RDE test.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// The bootstrap prefix did not contain the data needed for capability detection.
    #[error("incomplete bootstrap: no {missing} observed before monitoring data")]
    IncompleteBootstrap {
        /// Human-readable description of what was missing.
        missing: &'static str,
    },
    /// Only diesel and gasoline cars can be checked.
    #[error("incompatible for RDE: fuel type unknown or invalid ('{0}')")]
    UnsupportedFuelType(String),
    /// A mandatory channel is not provided by the car.
    #[error("incompatible for RDE: {channel} not provided by the car (none of the PIDs {} supported)", pid_list(.candidates))]
    MissingCapability {
        /// The mandatory channel.
        channel: Channel,
        /// The PIDs that would have provided it.
        candidates: Vec<u8>,
    },
}

fn pid_list(pids: &[u8]) -> String {
    pids.iter().map(|pid| format!("0x{:02X}", pid)).collect::<Vec<_>>().join(", ")
}

/// Errors reported by a [MonitorBridge](crate::MonitorBridge).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The monitor engine could not be loaded.
    #[error("monitor engine not available: {0}")]
    Unavailable(String),
    /// The engine rejected the specification or the requested outputs.
    #[error("monitor initialization failed: {0}")]
    Init(String),
    /// [submit](crate::MonitorBridge::submit) was called before a successful initialization.
    #[error("monitor was not initialized")]
    NotInitialized,
    /// The engine failed to process a submitted event.
    #[error("monitor failed to process event: {0}")]
    Call(String),
}

/// Top-level error of an analysis run.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The stream did not contain a single event.
    #[error("the event stream is empty")]
    EmptyStream,
    #[allow(missing_docs)]
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// Writing to the output sink failed.
    #[error("failed to write to output sink: {0}")]
    Sink(#[from] io::Error),
    /// A specification fragment could not be loaded.
    #[error("could not load specification fragment `{name}`: {source}")]
    Fragment {
        /// The resource name of the fragment.
        name: String,
        /// The reason.
        source: io::Error,
    },
}
