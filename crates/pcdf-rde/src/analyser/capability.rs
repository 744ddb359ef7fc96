//! Detection of the sensor profile of a car.
//!
//! The bootstrap prefix of a recording announces the PIDs supported by the car and its fuel type.
//! From those, [detect] selects one diagnostic command per monitor input [Channel], or rejects the car.

use std::fmt::{Display, Formatter};

use tracing::{info, warn};

use crate::error::DetectionError;
use crate::event::{Event, ObdCommand, ObdPayload};

/// The inputs of the monitor, in the order in which they are declared in the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Vehicle speed in km/h.
    Velocity,
    /// Altitude in meters, taken from the GPS receiver.
    Altitude,
    /// Ambient air temperature in Kelvin.
    Temperature,
    /// NOx concentration in ppm.
    Nox,
    /// Mass air flow in g/s.
    MassAirFlow,
    /// Fuel rate in L/h.
    FuelRate,
    /// Fuel-air equivalence ratio.
    FuelAirEquivalence,
}

impl Channel {
    /// All channels in declaration order.
    pub const ALL: [Channel; 7] = [
        Channel::Velocity,
        Channel::Altitude,
        Channel::Temperature,
        Channel::Nox,
        Channel::MassAirFlow,
        Channel::FuelRate,
        Channel::FuelAirEquivalence,
    ];

    /// The position of the channel in [Channel::ALL].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The channel fed by responses to `command`, if any.
    pub fn for_command(command: ObdCommand) -> Option<Channel> {
        let channel = match command {
            ObdCommand::Speed => Channel::Velocity,
            ObdCommand::AmbientAirTemperature => Channel::Temperature,
            ObdCommand::NoxSensor
            | ObdCommand::NoxSensorCorrected
            | ObdCommand::NoxSensorAlternative
            | ObdCommand::NoxSensorCorrectedAlternative => Channel::Nox,
            ObdCommand::MafAirFlowRate | ObdCommand::MafAirFlowRateSensor => Channel::MassAirFlow,
            ObdCommand::EngineFuelRate | ObdCommand::EngineFuelRateMulti => Channel::FuelRate,
            ObdCommand::FuelAirEquivalenceRatio => Channel::FuelAirEquivalence,
            _ => return None,
        };
        Some(channel)
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::Velocity => "speed data",
            Channel::Altitude => "altitude",
            Channel::Temperature => "ambient air temperature",
            Channel::Nox => "NOx sensor",
            Channel::MassAirFlow => "mass air flow",
            Channel::FuelRate => "fuel rate",
            Channel::FuelAirEquivalence => "fuel air equivalence ratio",
        };
        write!(f, "{}", name)
    }
}

/// The fuel types an RDE test can be performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelType {
    #[allow(missing_docs)]
    Diesel,
    #[allow(missing_docs)]
    Gasoline,
}

impl FuelType {
    /// Parses the fuel type as reported by the car; only the exact names `Diesel` and `Gasoline` are accepted.
    pub fn from_report(report: &str) -> Result<FuelType, DetectionError> {
        match report {
            "Diesel" => Ok(FuelType::Diesel),
            "Gasoline" => Ok(FuelType::Gasoline),
            other => Err(DetectionError::UnsupportedFuelType(other.to_string())),
        }
    }
}

impl Display for FuelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FuelType::Diesel => write!(f, "Diesel"),
            FuelType::Gasoline => write!(f, "Gasoline"),
        }
    }
}

/// The sensors of a car selected for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityProfile {
    commands: Vec<ObdCommand>,
    fuel_type: FuelType,
    fuel_rate_available: bool,
    fae_available: bool,
}

impl CapabilityProfile {
    /// The selected commands in detection order.
    pub fn commands(&self) -> &[ObdCommand] {
        &self.commands
    }

    #[allow(missing_docs)]
    pub fn fuel_type(&self) -> FuelType {
        self.fuel_type
    }

    /// Whether the car reports its fuel rate directly.
    pub fn fuel_rate_available(&self) -> bool {
        self.fuel_rate_available
    }

    /// Whether the fuel-air equivalence ratio is used to estimate the fuel rate.
    pub fn fae_available(&self) -> bool {
        self.fae_available
    }

    /// Whether `command` is one of the selected commands.
    pub fn contains(&self, command: ObdCommand) -> bool {
        self.commands.contains(&command)
    }

    /// The number of selected commands; one channel each.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Always false for a detected profile.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The channels fed by the selected commands and the GPS receiver, in declaration order.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.commands.iter().filter_map(|c| Channel::for_command(*c)).collect();
        channels.push(Channel::Altitude);
        channels.sort();
        channels
    }
}

impl Display for CapabilityProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let commands: Vec<String> = self.commands.iter().map(ToString::to_string).collect();
        write!(f, "{} [{}]", self.fuel_type, commands.join(", "))
    }
}

/// What the bootstrap prefix of a recording announced about the car.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bootstrap {
    /// The union of all announced supported PIDs of mode 1.
    pub supported_pids: Vec<u8>,
    /// The reported fuel type, if any.
    pub fuel_type: Option<String>,
}

impl Bootstrap {
    /// Whether `event` belongs to the bootstrap prefix.
    ///
    /// The prefix ends with the first diagnostic response that is neither an identification frame nor one of the
    /// frames only sent once at the start of a recording. Responses to unknown commands end the prefix as well.
    pub fn is_bootstrap_event(event: &Event) -> bool {
        match event.obd() {
            Some(response) => {
                response
                    .command()
                    .map_or(false, |command| command.is_not_trackable() || command.is_single_time())
            },
            None => true,
        }
    }

    /// Records the information carried by a bootstrap event.
    pub fn observe(&mut self, event: &Event) {
        let Some(response) = event.obd() else {
            return;
        };
        match (&response.payload, response.command()) {
            (ObdPayload::SupportedPids(pids), Some(ObdCommand::SupportedPids(_))) => {
                for pid in &pids.supported_pids {
                    if !self.supported_pids.contains(pid) {
                        self.supported_pids.push(*pid);
                    }
                }
            },
            (ObdPayload::FuelType(report), _) => self.fuel_type = Some(report.fuel_type.clone()),
            _ => {},
        }
    }

    /// Derives the profile of the car; see [detect].
    pub fn detect(&self) -> Result<CapabilityProfile, DetectionError> {
        if self.supported_pids.is_empty() {
            return Err(DetectionError::IncompleteBootstrap {
                missing: "supported PIDs",
            });
        }
        let fuel_type = self.fuel_type.as_deref().ok_or(DetectionError::IncompleteBootstrap {
            missing: "fuel type",
        })?;
        detect(&self.supported_pids, fuel_type)
    }
}

const NOX_CANDIDATES: [ObdCommand; 4] = [
    ObdCommand::NoxSensor,
    ObdCommand::NoxSensorCorrected,
    ObdCommand::NoxSensorAlternative,
    ObdCommand::NoxSensorCorrectedAlternative,
];
const FUEL_RATE_CANDIDATES: [ObdCommand; 2] = [ObdCommand::EngineFuelRate, ObdCommand::EngineFuelRateMulti];
const MAF_CANDIDATES: [ObdCommand; 2] = [ObdCommand::MafAirFlowRate, ObdCommand::MafAirFlowRateSensor];

/// Selects the commands to monitor from the PIDs supported by the car.
///
/// The checks run in a fixed order and the first failing one aborts the detection:
/// 1. the fuel type must be `Diesel` or `Gasoline`,
/// 2. speed (0x0D) and
/// 3. ambient air temperature (0x46) must be supported,
/// 4. a NOx sensor is selected by priority 0x83, 0xA1, 0xA7, 0xA8,
/// 5. the fuel rate is optional, selected by priority 0x5E, 0x9D,
/// 6. the mass air flow is selected by priority 0x10, 0x66,
/// 7. the fuel-air equivalence ratio (0x44) is selected only if the fuel rate is not available.
pub fn detect(supported_pids: &[u8], fuel_type: &str) -> Result<CapabilityProfile, DetectionError> {
    let fuel_type = FuelType::from_report(fuel_type)?;
    let mut commands = vec![
        require(supported_pids, Channel::Velocity, &[ObdCommand::Speed])?,
        require(supported_pids, Channel::Temperature, &[ObdCommand::AmbientAirTemperature])?,
        require(supported_pids, Channel::Nox, &NOX_CANDIDATES)?,
    ];

    let fuel_rate = select(supported_pids, &FUEL_RATE_CANDIDATES);
    match fuel_rate {
        Some(command) => commands.push(command),
        None => warn!("fuel rate not provided by the car, estimating it from the mass air flow"),
    }

    commands.push(require(supported_pids, Channel::MassAirFlow, &MAF_CANDIDATES)?);

    let fae = fuel_rate
        .is_none()
        .then(|| select(supported_pids, &[ObdCommand::FuelAirEquivalenceRatio]))
        .flatten();
    match fae {
        Some(command) => commands.push(command),
        None if fuel_rate.is_none() => info!("fuel air equivalence ratio not provided by the car"),
        None => {},
    }

    let profile = CapabilityProfile {
        commands,
        fuel_type,
        fuel_rate_available: fuel_rate.is_some(),
        fae_available: fae.is_some(),
    };
    info!(%profile, "car compatible for RDE tests");
    Ok(profile)
}

fn select(supported_pids: &[u8], candidates: &[ObdCommand]) -> Option<ObdCommand> {
    candidates.iter().copied().find(|c| supported_pids.contains(&c.pid()))
}

fn require(supported_pids: &[u8], channel: Channel, candidates: &[ObdCommand]) -> Result<ObdCommand, DetectionError> {
    select(supported_pids, candidates).ok_or_else(|| {
        DetectionError::MissingCapability {
            channel,
            candidates: candidates.iter().map(|c| c.pid()).collect(),
        }
    })
}
