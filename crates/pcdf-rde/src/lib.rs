//! # The PCDF RDE Analyser
//! Decides whether a recorded drive in PCDF format provides the sensor data required for a Real Driving Emissions
//! (RDE) test, assembles an RTLola specification tailored to the car and feeds the recording to a monitor.
//!
//! ## Usage
//! The main entrypoint is the [RdeAnalyser].
//! It consumes an [EventStream], usually a [FileEventStream] wrapped into a [StreamFilter](stream::StreamFilter)
//! that removes invalid sensor frames, and writes the original events as well as the monitor outputs to an
//! [OutputSink].
//!
//! The monitor itself is reached through the [MonitorBridge] trait.
//! With the `rtlola` feature enabled, [RtLolaBridge](bridge::RtLolaBridge) evaluates the specification with the
//! RTLola interpreter.

#![forbid(unused_must_use)] // disallow discarding errors
#![warn(
    missing_docs,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

pub mod analyser;
pub mod bridge;
pub mod event;
pub mod simulator;
pub mod sink;
pub mod stream;

mod error;

pub use crate::analyser::{AnalyserConfig, RdeAnalyser};
pub use crate::bridge::MonitorBridge;
pub use crate::error::{AnalysisError, BridgeError, DecodeError, DetectionError, StreamError};
pub use crate::event::Event;
pub use crate::sink::OutputSink;
pub use crate::stream::{EventStream, FileEventStream};
