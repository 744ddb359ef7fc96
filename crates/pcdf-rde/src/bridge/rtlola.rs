use std::convert::Infallible;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

use rtlola_interpreter::config::OfflineMode;
use rtlola_interpreter::input::ArrayFactory;
use rtlola_interpreter::monitor::{Total, Verdicts};
use rtlola_interpreter::rtlola_frontend::mir::RtLolaMir;
use rtlola_interpreter::rtlola_frontend::{self, ParserConfig};
use rtlola_interpreter::time::RelativeFloat;
use rtlola_interpreter::{ConfigBuilder, Monitor, Value};
use tracing::debug;

use super::MonitorBridge;
use crate::analyser::MonitorSpecification;
use crate::error::BridgeError;

type ArrayMonitor<const N: usize> =
    Monitor<ArrayFactory<N, Infallible, [Value; N]>, OfflineMode<RelativeFloat>, Total, RelativeFloat>;

/// The monitors for the supported numbers of input streams.
enum Engine {
    Five(ArrayMonitor<5>),
    Six(ArrayMonitor<6>),
}

/// A [MonitorBridge] evaluating the specification with the RTLola interpreter in offline mode.
///
/// The last value of each submission is the relative time of the event in seconds.
/// The selected outputs are expected to be periodic; their values are returned for every period that elapsed
/// before the submitted event.
#[derive(Default)]
pub struct RtLolaBridge {
    engine: Option<Engine>,
    outputs: Vec<usize>,
}

impl RtLolaBridge {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Debug for RtLolaBridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let engine = match &self.engine {
            None => "uninitialized",
            Some(Engine::Five(_)) => "5 inputs",
            Some(Engine::Six(_)) => "6 inputs",
        };
        f.debug_struct("RtLolaBridge")
            .field("engine", &engine)
            .field("outputs", &self.outputs)
            .finish()
    }
}

fn build<const N: usize>(ir: RtLolaMir) -> Result<ArrayMonitor<N>, BridgeError> {
    ConfigBuilder::new()
        .with_ir(ir)
        .offline::<RelativeFloat>()
        .with_array_events::<N, Infallible, [Value; N]>()
        .with_verdict::<Total>()
        .monitor()
        .map_err(|e| BridgeError::Init(format!("{:?}", e)))
}

fn step<const N: usize>(
    monitor: &mut ArrayMonitor<N>,
    inputs: &[f64],
    outputs: &[usize],
) -> Result<Vec<f64>, BridgeError> {
    let Some((time, values)) = inputs.split_last() else {
        return Err(BridgeError::Call("no time given".into()));
    };
    let event: [Value; N] = values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                Ok(Value::from(v))
            } else {
                Err(BridgeError::Call(format!("invalid input value {}", v)))
            }
        })
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|v: Vec<Value>| BridgeError::Call(format!("expected {} input values, got {}", N, v.len())))?;
    if !time.is_finite() || *time < 0.0 {
        return Err(BridgeError::Call(format!("invalid time {}", time)));
    }
    let Verdicts { timed, .. } = monitor
        .accept_event(event, Duration::from_secs_f64(*time))
        .map_err(|e| BridgeError::Call(format!("{:?}", e)))?;
    let mut results = Vec::with_capacity(timed.len() * outputs.len());
    for (_, verdict) in timed {
        let tuple: Option<Vec<f64>> = outputs
            .iter()
            .map(|&idx| verdict.outputs.get(idx).and_then(|instances| numeric(instances.first()?.1.as_ref()?)))
            .collect();
        // periods in which a selected output has no value yet are skipped
        if let Some(tuple) = tuple {
            results.extend(tuple);
        }
    }
    Ok(results)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(f.into_inner()),
        Value::Signed(i) => Some(*i as f64),
        Value::Unsigned(u) => Some(*u as f64),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

impl MonitorBridge for RtLolaBridge {
    fn initialize(&mut self, spec: &MonitorSpecification, outputs: &[String]) -> Result<(), BridgeError> {
        if self.engine.is_some() {
            return Err(BridgeError::Init("monitor is already initialized".into()));
        }
        let config = ParserConfig::for_string(spec.as_str().to_string());
        let ir = rtlola_frontend::parse(&config).map_err(|e| BridgeError::Init(format!("{:?}", e)))?;
        let selected = outputs
            .iter()
            .map(|name| {
                ir.outputs
                    .iter()
                    .position(|o| &o.name == name)
                    .ok_or_else(|| BridgeError::Init(format!("unknown output stream `{}`", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let engine = match ir.inputs.len() {
            5 => Engine::Five(build::<5>(ir)?),
            6 => Engine::Six(build::<6>(ir)?),
            n => return Err(BridgeError::Init(format!("unsupported number of input streams: {}", n))),
        };
        debug!(outputs = ?selected, "RTLola monitor initialized");
        self.engine = Some(engine);
        self.outputs = selected;
        Ok(())
    }

    fn submit(&mut self, inputs: &[f64]) -> Result<Vec<f64>, BridgeError> {
        match &mut self.engine {
            None => Err(BridgeError::NotInitialized),
            Some(Engine::Five(monitor)) => step(monitor, inputs, &self.outputs),
            Some(Engine::Six(monitor)) => step(monitor, inputs, &self.outputs),
        }
    }
}
