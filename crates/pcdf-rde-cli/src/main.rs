use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, ValueEnum};
use clap_complete::generate;
use clap_complete::shells::*;
#[cfg(feature = "public")]
use human_panic::setup_panic;
use pcdf_rde::simulator::detect_simulator;
use pcdf_rde::{AnalyserConfig, FileEventStream};

use crate::config::{RdeConfig, Verbosity};

mod config;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "Checks whether a PCDF recording is suitable for a Real Driving Emissions test and monitors it with \
                  an RTLola specification tailored to the car."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Sets the log verbosity
    #[arg(short, long, value_enum, default_value_t, global = true)]
    verbosity: Verbosity,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Command {
    /// Run the RDE analysis of a recording
    Rde {
        #[command(flatten)]
        files: RdeFiles,

        #[command(flatten)]
        monitor: RdeMonitor,
    },

    /// Decide whether a recording was produced with an OBD simulator
    Simulator {
        /// Path to the recording
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Generate a SHELL completion script and print it to stdout
    Completions {
        #[arg(value_enum, value_name = "SHELL")]
        shell: Shell,
    },
}

#[derive(ValueEnum, Copy, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
impl Shell {
    fn generate(&self) {
        let mut app = Cli::command();
        let mut fd = std::io::stdout();
        match self {
            Shell::Bash => generate(Bash, &mut app, "pcdf-rde", &mut fd),
            Shell::Zsh => generate(Zsh, &mut app, "pcdf-rde", &mut fd),
            Shell::Fish => generate(Fish, &mut app, "pcdf-rde", &mut fd),
            Shell::PowerShell => generate(PowerShell, &mut app, "pcdf-rde", &mut fd),
            Shell::Elvish => generate(Elvish, &mut app, "pcdf-rde", &mut fd),
        }
    }
}

#[derive(Clone, Debug, Args)]
#[command(next_help_heading = "Files")]
struct RdeFiles {
    /// Path to the recording
    #[arg(short, long)]
    input: PathBuf,
    /// Path of the annotated recording, an existing file is replaced
    #[arg(short, long)]
    output: PathBuf,
    /// Load the specification fragments from this directory instead of the embedded ones
    #[arg(long, value_name = "DIR")]
    fragments: Option<PathBuf>,
    /// Decode the recording while analysing it instead of loading it first
    #[arg(long)]
    single_pass: bool,
}

#[derive(Clone, Debug, Args)]
#[command(next_help_heading = "Monitor")]
struct RdeMonitor {
    /// The output streams of the specification to write, separated by commas
    #[arg(long, required = true, value_delimiter = ',', value_name = "STREAMS")]
    outputs: Vec<String>,
    /// Keep NOx frames carrying the invalid sensor value
    #[arg(long)]
    keep_invalid_nox: bool,
    /// The source tag of the written output events
    #[arg(long, default_value = pcdf_rde::analyser::DEFAULT_PRODUCER)]
    producer: String,
}

impl From<(RdeFiles, RdeMonitor)> for RdeConfig {
    fn from((files, monitor): (RdeFiles, RdeMonitor)) -> Self {
        RdeConfig {
            input: files.input,
            output: files.output,
            analyser: AnalyserConfig::new(monitor.outputs).with_producer(monitor.producer),
            fragments: files.fragments,
            single_pass: files.single_pass,
            keep_invalid_nox: monitor.keep_invalid_nox,
        }
    }
}

fn main() {
    #[cfg(feature = "public")]
    {
        setup_panic!(Metadata {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            authors: "RTLola Team <contact@rtlola.org>".into(),
            homepage: "www.rtlola.org".into(),
        });
    }

    let cli = Cli::parse();
    cli.verbosity.init_logging();

    match cli.command {
        Command::Rde { files, monitor } => {
            let config = RdeConfig::from((files, monitor));
            let output = config.output.clone();
            match config.run() {
                Ok(report) => {
                    println!("{}", report.profile);
                    println!(
                        "{} events analysed, {} submissions, {} outputs written to {}",
                        report.events,
                        report.submissions,
                        report.outputs,
                        output.display()
                    );
                },
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                },
            }
        },
        Command::Simulator { input } => {
            let result = FileEventStream::open_single_use(&input).and_then(|mut stream| detect_simulator(&mut stream));
            match result {
                Ok(result) => println!("{result}"),
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                },
            }
        },
        Command::Completions { shell } => shell.generate(),
    }
}
