//! The RDE analysis of a recording.
//!
//! An analysis runs in two phases. During the bootstrap the car announces its supported PIDs and fuel type; from
//! those the [CapabilityProfile] of the car is detected and a [MonitorSpecification] is assembled for it.
//! In the steady state the remaining events are handed to a [StreamCollector] that feeds the monitor.
//! Every event read, as well as every output of the monitor, is appended to an [OutputSink].

use tracing::{debug, info};

use crate::bridge::MonitorBridge;
use crate::error::AnalysisError;
use crate::event::Event;
use crate::sink::OutputSink;
use crate::stream::EventStream;

pub mod capability;
mod collector;
mod specification;

pub use self::capability::{Bootstrap, CapabilityProfile, Channel, FuelType};
pub use self::collector::{LatestValues, StreamCollector};
pub use self::specification::{MonitorSpecification, SpecFragments, FRAGMENT_NAMES};

/// The producer tag of the output events if none is configured.
pub const DEFAULT_PRODUCER: &str = "pcdf-rde";

/// The settings of an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyserConfig {
    /// The output streams of the specification whose values are written to the sink, in this order.
    pub outputs: Vec<String>,
    /// The source of the written output events.
    pub producer: String,
}

impl AnalyserConfig {
    /// Creates a configuration requesting the given outputs, tagged with [DEFAULT_PRODUCER].
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnalyserConfig {
            outputs: outputs.into_iter().map(Into::into).collect(),
            producer: DEFAULT_PRODUCER.to_string(),
        }
    }

    #[allow(missing_docs)]
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = producer.into();
        self
    }
}

/// What an analysis found out about the recording.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    /// The detected profile of the car.
    pub profile: CapabilityProfile,
    /// The specification given to the monitor.
    pub specification: MonitorSpecification,
    /// The number of events read from the stream.
    pub events: usize,
    /// The number of submissions to the monitor.
    pub submissions: usize,
    /// The number of output events written.
    pub outputs: usize,
}

/// A single analysis of a recording.
///
/// The analyser is consumed by [monitor_stream](RdeAnalyser::monitor_stream), so the profile and the specification
/// are determined exactly once.
#[derive(Debug, Clone)]
pub struct RdeAnalyser {
    config: AnalyserConfig,
    fragments: SpecFragments,
}

impl RdeAnalyser {
    /// Creates an analyser assembling specifications from the embedded fragments.
    pub fn new(config: AnalyserConfig) -> Self {
        RdeAnalyser {
            config,
            fragments: SpecFragments::embedded(),
        }
    }

    /// Replaces the fragments the specification is assembled from.
    pub fn with_fragments(mut self, fragments: SpecFragments) -> Self {
        self.fragments = fragments;
        self
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    /// Analyses the recording in `stream` with the monitor behind `bridge`.
    ///
    /// All events of the stream are appended to `sink` in order, each followed by the output events it caused.
    /// Fails if the stream is empty or faulty, if the car is not suitable for an RDE test or if the monitor fails.
    pub fn monitor_stream<S, B, O>(
        self,
        stream: &mut S,
        bridge: &mut B,
        sink: &mut O,
    ) -> Result<AnalysisReport, AnalysisError>
    where
        S: EventStream + ?Sized,
        B: MonitorBridge + ?Sized,
        O: OutputSink + ?Sized,
    {
        let RdeAnalyser { config, fragments } = self;
        let mut events = stream.events();
        let mut read = 0;

        let mut bootstrap = Bootstrap::default();
        let boundary = loop {
            let Some(event) = events.next() else {
                break None;
            };
            let event = event?;
            read += 1;
            if !Bootstrap::is_bootstrap_event(&event) {
                break Some(event);
            }
            sink.append(&event)?;
            bootstrap.observe(&event);
        };
        if read == 0 {
            return Err(AnalysisError::EmptyStream);
        }
        info!(
            events = read,
            supported_pids = bootstrap.supported_pids.len(),
            fuel_type = bootstrap.fuel_type.as_deref().unwrap_or("unknown"),
            "bootstrap finished"
        );

        let profile = bootstrap.detect()?;
        let specification = fragments.build(&profile);
        debug!("specification:\n{}", specification);
        bridge.initialize(&specification, &config.outputs)?;

        let mut collector = StreamCollector::new(profile.clone(), config.outputs, config.producer);
        let mut submissions = 0;
        let mut outputs = 0;
        if let Some(first) = &boundary {
            debug!(timestamp = first.timestamp, "steady state starts");
        }
        // the boundary event was already counted by the bootstrap loop
        let steady = events.inspect(|_| read += 1);
        for event in boundary.map(Ok).into_iter().chain(steady) {
            let event = event?;
            sink.append(&event)?;
            let results = collector.collect(&event, bridge)?;
            if collector.is_complete() {
                submissions += 1;
            }
            outputs += results.len();
            for output in results {
                sink.append(&Event::from(output))?;
            }
        }
        sink.flush()?;

        info!(submissions, outputs, "analysis finished");
        Ok(AnalysisReport {
            profile,
            specification,
            events: read,
            submissions,
            outputs,
        })
    }
}
