use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use clap::ValueEnum;
use pcdf_rde::analyser::{AnalysisReport, SpecFragments};
use pcdf_rde::bridge::MonitorBridge;
use pcdf_rde::sink::LineSink;
use pcdf_rde::stream::invalid_nox_filter;
use pcdf_rde::{AnalyserConfig, AnalysisError, BridgeError, EventStream, FileEventStream, RdeAnalyser};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The different verbosities of the log written to StdErr.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum, Default)]
pub(crate) enum Verbosity {
    /// Suppresses any kind of logging.
    Silent,
    /// Prints only warnings and errors.
    #[default]
    Warnings,
    /// Prints the detected capabilities and a summary of the analysis.
    Info,
    /// Prints the assembled specification and details of the bootstrap.
    Debug,
    /// Prints every exchange with the monitor. Not suitable for long recordings.
    Trace,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Verbosity::Silent => "off",
            Verbosity::Warnings => "warn",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }

    /// Installs the global log subscriber. `RUST_LOG` takes precedence over the verbosity.
    pub(crate) fn init_logging(self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

impl Display for Verbosity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Verbosity::Silent => write!(f, "Silent"),
            Verbosity::Warnings => write!(f, "Warnings"),
            Verbosity::Info => write!(f, "Info"),
            Verbosity::Debug => write!(f, "Debug"),
            Verbosity::Trace => write!(f, "Trace"),
        }
    }
}

/// Everything needed to run one RDE analysis.
#[derive(Debug, Clone)]
pub(crate) struct RdeConfig {
    pub(crate) input: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) analyser: AnalyserConfig,
    /// Directory to load the specification fragments from instead of the embedded ones.
    pub(crate) fragments: Option<PathBuf>,
    /// Decode the recording while analysing instead of loading it first.
    pub(crate) single_pass: bool,
    /// Do not drop NOx frames carrying the invalid sensor value.
    pub(crate) keep_invalid_nox: bool,
}

impl RdeConfig {
    pub(crate) fn run(self) -> Result<AnalysisReport, AnalysisError> {
        let stream = if self.single_pass {
            FileEventStream::open_single_use(&self.input)?
        } else {
            FileEventStream::open(&self.input)?
        };
        let mut stream: Box<dyn EventStream> = if self.keep_invalid_nox {
            Box::new(stream)
        } else {
            Box::new(invalid_nox_filter(stream))
        };

        let mut analyser = RdeAnalyser::new(self.analyser);
        if let Some(dir) = &self.fragments {
            analyser = analyser.with_fragments(SpecFragments::from_dir(dir)?);
        }
        let mut bridge = monitor()?;
        let mut sink = LineSink::create(&self.output)?;
        info!(input = %self.input.display(), output = %self.output.display(), "starting analysis");
        analyser.monitor_stream(&mut stream, &mut bridge, &mut sink)
    }
}

#[cfg(feature = "rtlola")]
fn monitor() -> Result<Box<dyn MonitorBridge>, BridgeError> {
    Ok(Box::new(pcdf_rde::bridge::RtLolaBridge::new()))
}

#[cfg(not(feature = "rtlola"))]
fn monitor() -> Result<Box<dyn MonitorBridge>, BridgeError> {
    Err(BridgeError::Unavailable(
        "this binary was built without the `rtlola` feature".into(),
    ))
}
