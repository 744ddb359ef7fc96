//! The connection to the runtime monitor.
//!
//! The analyser only talks to a monitor through the [MonitorBridge] trait: once to hand over the specification,
//! and then once per event with the latest input values.

use std::collections::VecDeque;
use std::fmt::Debug;

use crate::analyser::MonitorSpecification;
use crate::error::BridgeError;

#[cfg(feature = "rtlola")]
mod rtlola;

#[cfg(feature = "rtlola")]
pub use self::rtlola::RtLolaBridge;

/// A runtime monitor evaluating a [MonitorSpecification].
pub trait MonitorBridge: Debug {
    /// Loads the specification and selects the output streams whose values are returned by
    /// [submit](MonitorBridge::submit).
    ///
    /// Called exactly once per analysis.
    fn initialize(&mut self, spec: &MonitorSpecification, outputs: &[String]) -> Result<(), BridgeError>;

    /// Extends the input streams with `inputs`, one value per input stream in declaration order followed by the
    /// time of the event in seconds.
    ///
    /// Returns the values of the selected outputs computed since the previous call as a flat sequence of tuples, each
    /// containing one value per selected output in the order of selection.
    /// The result is empty if no output was computed.
    fn submit(&mut self, inputs: &[f64]) -> Result<Vec<f64>, BridgeError>;
}

impl<B: MonitorBridge + ?Sized> MonitorBridge for &mut B {
    fn initialize(&mut self, spec: &MonitorSpecification, outputs: &[String]) -> Result<(), BridgeError> {
        (**self).initialize(spec, outputs)
    }

    fn submit(&mut self, inputs: &[f64]) -> Result<Vec<f64>, BridgeError> {
        (**self).submit(inputs)
    }
}

impl<B: MonitorBridge + ?Sized> MonitorBridge for Box<B> {
    fn initialize(&mut self, spec: &MonitorSpecification, outputs: &[String]) -> Result<(), BridgeError> {
        (**self).initialize(spec, outputs)
    }

    fn submit(&mut self, inputs: &[f64]) -> Result<Vec<f64>, BridgeError> {
        (**self).submit(inputs)
    }
}

/// A [MonitorBridge] that answers with prepared results and records everything it receives.
///
/// Useful to run an analysis without a monitor engine.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBridge {
    specification: Option<MonitorSpecification>,
    outputs: Vec<String>,
    submissions: Vec<Vec<f64>>,
    responses: VecDeque<Vec<f64>>,
    init_failure: Option<String>,
}

impl ScriptedBridge {
    /// Creates a bridge that accepts every specification and returns no outputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues results for the following submissions, one per submission.
    ///
    /// Once the queue is empty, submissions return an empty result.
    pub fn respond_with<I: IntoIterator<Item = Vec<f64>>>(&mut self, responses: I) -> &mut Self {
        self.responses.extend(responses);
        self
    }

    /// Makes the initialization fail with `reason`.
    pub fn reject(&mut self, reason: impl Into<String>) -> &mut Self {
        self.init_failure = Some(reason.into());
        self
    }

    /// The specification received during initialization.
    pub fn specification(&self) -> Option<&MonitorSpecification> {
        self.specification.as_ref()
    }

    /// The outputs selected during initialization.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// All submitted input vectors in order.
    pub fn submissions(&self) -> &[Vec<f64>] {
        &self.submissions
    }
}

impl MonitorBridge for ScriptedBridge {
    fn initialize(&mut self, spec: &MonitorSpecification, outputs: &[String]) -> Result<(), BridgeError> {
        if let Some(reason) = &self.init_failure {
            return Err(BridgeError::Init(reason.clone()));
        }
        if self.specification.is_some() {
            return Err(BridgeError::Init("monitor is already initialized".into()));
        }
        self.specification = Some(spec.clone());
        self.outputs = outputs.to_vec();
        Ok(())
    }

    fn submit(&mut self, inputs: &[f64]) -> Result<Vec<f64>, BridgeError> {
        if self.specification.is_none() {
            return Err(BridgeError::NotInitialized);
        }
        self.submissions.push(inputs.to_vec());
        Ok(self.responses.pop_front().unwrap_or_default())
    }
}
