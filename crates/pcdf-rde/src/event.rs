//! The PCDF event model.
//!
//! Every line of a PCDF recording holds one JSON encoded [Event].
//! Diagnostic responses carry a payload whose layout is determined by their [ObdCommand].
//! The model is closed: events are matched exhaustively and commands outside of the known set are kept as a
//! [Generic](ObdPayload::Generic) payload that survives a decode/encode round trip unchanged.

use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// The reserved sensor reading marking an unavailable NOx value.
pub const INVALID_SENSOR_VALUE: i32 = 65535;

/// Density of diesel fuel in g/L, used to convert fuel mass flow into a volume flow.
const FUEL_DENSITY: f64 = 832.0;

/// Unstructured fields of a record.
pub type Fields = Map<String, Value>;

/// A single decoded record of a PCDF recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The producer of the event.
    pub source: String,
    /// Nanoseconds since the start of the recording device's clock.
    pub timestamp: i64,
    /// What kind of event this is.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The closed set of event kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// A position fix of the GPS receiver.
    #[serde(rename = "GPS")]
    Gps(GpsFix),
    /// A response of the car to a diagnostic request.
    #[serde(rename = "OBD_RESPONSE")]
    ObdResponse(ObdResponse),
    /// A value computed by the monitor.
    #[serde(rename = "RTLOLA")]
    MonitorOutput(MonitorOutput),
    /// Information about the recording itself.
    #[serde(rename = "META")]
    Meta(Fields),
    /// Application specific records.
    #[serde(rename = "CUSTOM")]
    Custom(Fields),
}

/// A GPS fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    #[allow(missing_docs)]
    pub latitude: f64,
    #[allow(missing_docs)]
    pub longitude: f64,
    /// Altitude above sea level in meters.
    pub altitude: f64,
    /// Ground speed in m/s, if the receiver reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// A named value computed by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorOutput {
    /// The name of the output stream.
    pub name: String,
    #[allow(missing_docs)]
    pub value: f64,
}

/// A monitor output ready to be written next to the original events.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    /// Tag identifying the analyser as the producer.
    pub producer: String,
    /// Timestamp of the event that caused the output.
    pub timestamp: i64,
    /// The name of the requested output.
    pub name: String,
    #[allow(missing_docs)]
    pub value: f64,
}

impl From<OutputEvent> for Event {
    fn from(out: OutputEvent) -> Self {
        Event {
            source: out.producer,
            timestamp: out.timestamp,
            kind: EventKind::MonitorOutput(MonitorOutput {
                name: out.name,
                value: out.value,
            }),
        }
    }
}

impl Event {
    /// Decodes one record line.
    pub fn decode(line: &str) -> Result<Event, DecodeError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Encodes the event into a single record line without trailing newline.
    pub fn encode(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the diagnostic response if this event is one.
    pub fn obd(&self) -> Option<&ObdResponse> {
        match &self.kind {
            EventKind::ObdResponse(obd) => Some(obd),
            _ => None,
        }
    }

    /// Whether this event is a NOx frame in which any sensor reports [INVALID_SENSOR_VALUE].
    pub fn has_invalid_nox(&self) -> bool {
        matches!(self.obd(), Some(ObdResponse { payload: ObdPayload::Nox(sensors), .. }) if sensors.has_invalid())
    }
}

/// The diagnostic commands known to the analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObdCommand {
    /// Mode 1 enumeration of the supported PIDs following the given one.
    SupportedPids(u8),
    /// Mode 9 enumeration of the supported PIDs.
    SupportedPidsMode9,
    /// Vehicle identification number.
    Vin,
    #[allow(missing_docs)]
    FuelType,
    /// Maximum values of some sensors.
    MaxValues,
    #[allow(missing_docs)]
    Speed,
    #[allow(missing_docs)]
    AmbientAirTemperature,
    #[allow(missing_docs)]
    MafAirFlowRate,
    /// Mass air flow reported by two redundant sensors.
    MafAirFlowRateSensor,
    #[allow(missing_docs)]
    NoxSensor,
    #[allow(missing_docs)]
    NoxSensorCorrected,
    #[allow(missing_docs)]
    NoxSensorAlternative,
    #[allow(missing_docs)]
    NoxSensorCorrectedAlternative,
    /// Engine fuel rate in L/h.
    EngineFuelRate,
    /// Engine and vehicle fuel rate in g/s.
    EngineFuelRateMulti,
    /// Commanded fuel-air equivalence ratio.
    FuelAirEquivalenceRatio,
}

impl ObdCommand {
    /// Looks up the command for a (mode, pid) pair.
    pub fn from_mode_pid(mode: u8, pid: u8) -> Option<ObdCommand> {
        let command = match (mode, pid) {
            (1, pid @ (0x00 | 0x20 | 0x40 | 0x60 | 0x80 | 0xA0 | 0xC0)) => ObdCommand::SupportedPids(pid),
            (9, 0x00) => ObdCommand::SupportedPidsMode9,
            (9, 0x02) => ObdCommand::Vin,
            (1, 0x51) => ObdCommand::FuelType,
            (1, 0x4F) => ObdCommand::MaxValues,
            (1, 0x0D) => ObdCommand::Speed,
            (1, 0x46) => ObdCommand::AmbientAirTemperature,
            (1, 0x10) => ObdCommand::MafAirFlowRate,
            (1, 0x66) => ObdCommand::MafAirFlowRateSensor,
            (1, 0x83) => ObdCommand::NoxSensor,
            (1, 0xA1) => ObdCommand::NoxSensorCorrected,
            (1, 0xA7) => ObdCommand::NoxSensorAlternative,
            (1, 0xA8) => ObdCommand::NoxSensorCorrectedAlternative,
            (1, 0x5E) => ObdCommand::EngineFuelRate,
            (1, 0x9D) => ObdCommand::EngineFuelRateMulti,
            (1, 0x44) => ObdCommand::FuelAirEquivalenceRatio,
            _ => return None,
        };
        Some(command)
    }

    #[allow(missing_docs)]
    pub fn mode(self) -> u8 {
        match self {
            ObdCommand::SupportedPidsMode9 | ObdCommand::Vin => 9,
            _ => 1,
        }
    }

    #[allow(missing_docs)]
    pub fn pid(self) -> u8 {
        match self {
            ObdCommand::SupportedPids(pid) => pid,
            ObdCommand::SupportedPidsMode9 => 0x00,
            ObdCommand::Vin => 0x02,
            ObdCommand::FuelType => 0x51,
            ObdCommand::MaxValues => 0x4F,
            ObdCommand::Speed => 0x0D,
            ObdCommand::AmbientAirTemperature => 0x46,
            ObdCommand::MafAirFlowRate => 0x10,
            ObdCommand::MafAirFlowRateSensor => 0x66,
            ObdCommand::NoxSensor => 0x83,
            ObdCommand::NoxSensorCorrected => 0xA1,
            ObdCommand::NoxSensorAlternative => 0xA7,
            ObdCommand::NoxSensorCorrectedAlternative => 0xA8,
            ObdCommand::EngineFuelRate => 0x5E,
            ObdCommand::EngineFuelRateMulti => 0x9D,
            ObdCommand::FuelAirEquivalenceRatio => 0x44,
        }
    }

    /// Commands that identify the car or its capabilities but carry no measurement.
    pub fn is_not_trackable(self) -> bool {
        matches!(
            self,
            ObdCommand::SupportedPids(_) | ObdCommand::SupportedPidsMode9 | ObdCommand::Vin
        )
    }

    /// Commands that are only requested once at the start of a recording.
    pub fn is_single_time(self) -> bool {
        matches!(self, ObdCommand::FuelType | ObdCommand::MaxValues)
    }
}

impl Display for ObdCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObdCommand::SupportedPids(_) | ObdCommand::SupportedPidsMode9 => "SUPPORTED_PIDS",
            ObdCommand::Vin => "VIN",
            ObdCommand::FuelType => "FUEL_TYPE",
            ObdCommand::MaxValues => "MAX_VALUES",
            ObdCommand::Speed => "SPEED",
            ObdCommand::AmbientAirTemperature => "AMBIENT_AIR_TEMPERATURE",
            ObdCommand::MafAirFlowRate => "MAF_AIR_FLOW_RATE",
            ObdCommand::MafAirFlowRateSensor => "MAF_AIR_FLOW_RATE_SENSOR",
            ObdCommand::NoxSensor => "NOX_SENSOR",
            ObdCommand::NoxSensorCorrected => "NOX_SENSOR_CORRECTED",
            ObdCommand::NoxSensorAlternative => "NOX_SENSOR_ALTERNATIVE",
            ObdCommand::NoxSensorCorrectedAlternative => "NOX_SENSOR_CORRECTED_ALTERNATIVE",
            ObdCommand::EngineFuelRate => "ENGINE_FUEL_RATE",
            ObdCommand::EngineFuelRateMulti => "ENGINE_FUEL_RATE_MULTI",
            ObdCommand::FuelAirEquivalenceRatio => "FUEL_AIR_EQUIVALENCE_RATIO",
        };
        write!(f, "{}(0x{:02X}, 0x{:02X})", name, self.mode(), self.pid())
    }
}

/// A response of the car to a diagnostic request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObdResponse {
    #[allow(missing_docs)]
    pub mode: u8,
    #[allow(missing_docs)]
    pub pid: u8,
    /// The raw response as hex string.
    pub bytes: String,
    /// The decoded content of the response.
    #[serde(flatten)]
    pub payload: ObdPayload,
}

#[derive(Deserialize)]
struct RawObdResponse {
    mode: u8,
    pid: u8,
    #[serde(default)]
    bytes: String,
    #[serde(flatten)]
    fields: Fields,
}

impl TryFrom<RawObdResponse> for ObdResponse {
    type Error = String;

    fn try_from(raw: RawObdResponse) -> Result<Self, Self::Error> {
        let RawObdResponse { mode, pid, bytes, fields } = raw;
        let payload = match ObdCommand::from_mode_pid(mode, pid) {
            Some(command) => ObdPayload::decode(command, fields)?,
            None => ObdPayload::Generic(fields),
        };
        Ok(ObdResponse {
            mode,
            pid,
            bytes,
            payload,
        })
    }
}

impl<'de> Deserialize<'de> for ObdResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawObdResponse::deserialize(deserializer)?;
        ObdResponse::try_from(raw).map_err(D::Error::custom)
    }
}

impl ObdResponse {
    /// The command this response answers, if it is a known one.
    pub fn command(&self) -> Option<ObdCommand> {
        ObdCommand::from_mode_pid(self.mode, self.pid)
    }

    /// Collapses multi-sensor payloads into their canonical reduced form.
    ///
    /// NOx frames become [NoxReduced], fuel rate frames become [FuelRateReduced]; everything else is unchanged.
    pub fn reduce(self) -> ObdResponse {
        let payload = match self.payload {
            ObdPayload::Nox(sensors) => ObdPayload::NoxReduced(NoxReduced { nox_ppm: sensors.reduced() }),
            ObdPayload::FuelRate(rate) => ObdPayload::FuelRateReduced(FuelRateReduced { fuel_rate: rate.reduced() }),
            ObdPayload::FuelRateMulti(rate) => {
                ObdPayload::FuelRateReduced(FuelRateReduced { fuel_rate: rate.reduced() })
            },
            other => other,
        };
        ObdResponse { payload, ..self }
    }
}

/// The decoded content of a diagnostic response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum ObdPayload {
    SupportedPids(SupportedPids),
    Vin(VehicleId),
    FuelType(FuelTypeReport),
    MaxValues(MaxValues),
    Speed(Speed),
    AmbientAirTemperature(AmbientAirTemperature),
    MafAirFlowRate(MafAirFlowRate),
    MafSensor(MafSensor),
    /// Any of the four NOx commands.
    Nox(NoxSensors),
    FuelRate(FuelRate),
    FuelRateMulti(FuelRateMulti),
    FuelAirEquivalenceRatio(FuelAirEquivalenceRatio),
    NoxReduced(NoxReduced),
    FuelRateReduced(FuelRateReduced),
    /// Fields of a command unknown to the analyser.
    Generic(Fields),
}

impl ObdPayload {
    // Errors surface as `DecodeError::Malformed` through the enclosing deserializer.
    fn decode(command: ObdCommand, fields: Fields) -> Result<ObdPayload, String> {
        fn parse<T: for<'de> Deserialize<'de>>(command: ObdCommand, fields: Fields) -> Result<T, String> {
            serde_json::from_value(Value::Object(fields)).map_err(|e| format!("invalid payload for {}: {}", command, e))
        }
        let payload = match command {
            ObdCommand::SupportedPids(_) | ObdCommand::SupportedPidsMode9 => ObdPayload::SupportedPids(parse(command, fields)?),
            ObdCommand::Vin => ObdPayload::Vin(parse(command, fields)?),
            ObdCommand::FuelType => ObdPayload::FuelType(parse(command, fields)?),
            ObdCommand::MaxValues => ObdPayload::MaxValues(parse(command, fields)?),
            ObdCommand::Speed => ObdPayload::Speed(parse(command, fields)?),
            ObdCommand::AmbientAirTemperature => ObdPayload::AmbientAirTemperature(parse(command, fields)?),
            ObdCommand::MafAirFlowRate => ObdPayload::MafAirFlowRate(parse(command, fields)?),
            ObdCommand::MafAirFlowRateSensor => ObdPayload::MafSensor(parse(command, fields)?),
            ObdCommand::NoxSensor
            | ObdCommand::NoxSensorCorrected
            | ObdCommand::NoxSensorAlternative
            | ObdCommand::NoxSensorCorrectedAlternative => {
                ObdPayload::Nox(parse(command, fields)?)
            },
            ObdCommand::EngineFuelRate => ObdPayload::FuelRate(parse(command, fields)?),
            ObdCommand::EngineFuelRateMulti => ObdPayload::FuelRateMulti(parse(command, fields)?),
            ObdCommand::FuelAirEquivalenceRatio => ObdPayload::FuelAirEquivalenceRatio(parse(command, fields)?),
        };
        Ok(payload)
    }

    /// The lowest valid NOx reading in ppm.
    pub fn nox(&self) -> Option<i32> {
        match self {
            ObdPayload::Nox(sensors) => sensors.reduced(),
            ObdPayload::NoxReduced(reduced) => reduced.nox_ppm,
            _ => None,
        }
    }

    /// The mass air flow in g/s; for two redundant sensors the average of the valid ones.
    pub fn mass_air_flow(&self) -> Option<f64> {
        match self {
            ObdPayload::MafAirFlowRate(MafAirFlowRate { rate }) if *rate >= 0.0 => Some(*rate),
            ObdPayload::MafSensor(sensor) => {
                let valid: Vec<f64> = [sensor.maf_sensor_a, sensor.maf_sensor_b]
                    .into_iter()
                    .filter(|v| *v >= 0.0)
                    .collect();
                if valid.is_empty() {
                    None
                } else {
                    Some(valid.iter().sum::<f64>() / valid.len() as f64)
                }
            },
            _ => None,
        }
    }

    /// The fuel rate in L/h.
    pub fn fuel_rate(&self) -> Option<f64> {
        match self {
            ObdPayload::FuelRate(rate) => rate.reduced(),
            ObdPayload::FuelRateMulti(rate) => rate.reduced(),
            ObdPayload::FuelRateReduced(reduced) => reduced.fuel_rate,
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn fuel_air_equivalence_ratio(&self) -> Option<f64> {
        match self {
            ObdPayload::FuelAirEquivalenceRatio(FuelAirEquivalenceRatio { ratio }) if *ratio >= 0.0 => Some(*ratio),
            _ => None,
        }
    }
}

/// Supported PIDs, given as absolute PID numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedPids {
    #[allow(missing_docs)]
    pub supported_pids: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct VehicleId {
    pub vin: String,
}

/// The fuel type as reported by the car, e.g. `Diesel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FuelTypeReport {
    pub fuel_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct MaxValues {
    pub fuel_air_equivalence_ratio: i32,
    pub oxygen_sensor_voltage: i32,
    pub oxygen_sensor_current: i32,
    pub intake_manifold_absolute_pressure: i32,
}

/// Vehicle speed in km/h.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Speed {
    pub speed: i32,
}

/// Ambient air temperature in °C.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AmbientAirTemperature {
    pub temperature: i32,
}

/// Mass air flow in g/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct MafAirFlowRate {
    pub rate: f64,
}

/// Mass air flow in g/s of two redundant sensors; negative values mark unavailable sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct MafSensor {
    pub maf_sensor_a: f64,
    pub maf_sensor_b: f64,
}

/// NOx concentrations in ppm of up to four sensors.
///
/// Negative values mark sensors that are not present, [INVALID_SENSOR_VALUE] marks an invalid reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct NoxSensors {
    pub sensor1_1: i32,
    pub sensor1_2: i32,
    pub sensor2_1: i32,
    pub sensor2_2: i32,
}

impl NoxSensors {
    fn values(&self) -> [i32; 4] {
        [self.sensor1_1, self.sensor1_2, self.sensor2_1, self.sensor2_2]
    }

    /// Whether any sensor reports [INVALID_SENSOR_VALUE].
    pub fn has_invalid(&self) -> bool {
        self.values().contains(&INVALID_SENSOR_VALUE)
    }

    /// The minimum of all valid readings.
    pub fn reduced(&self) -> Option<i32> {
        self.values()
            .into_iter()
            .filter(|v| *v >= 0 && *v != INVALID_SENSOR_VALUE)
            .min()
    }
}

/// Engine fuel rate in L/h.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FuelRate {
    pub engine_fuel_rate: f64,
}

impl FuelRate {
    fn reduced(&self) -> Option<f64> {
        (self.engine_fuel_rate >= 0.0).then_some(self.engine_fuel_rate)
    }
}

/// Engine and vehicle fuel rate in g/s; negative values mark unavailable readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FuelRateMulti {
    pub engine_fuel_rate: f64,
    pub vehicle_fuel_rate: f64,
}

impl FuelRateMulti {
    /// The engine rate if valid, otherwise the vehicle rate, converted to L/h.
    fn reduced(&self) -> Option<f64> {
        [self.engine_fuel_rate, self.vehicle_fuel_rate]
            .into_iter()
            .find(|rate| *rate >= 0.0)
            .map(|rate| rate * 3600.0 / FUEL_DENSITY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FuelAirEquivalenceRatio {
    pub ratio: f64,
}

/// The reduced form of any NOx frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoxReduced {
    /// The lowest valid reading in ppm, if any sensor was valid.
    pub nox_ppm: Option<i32>,
}

/// The reduced form of any fuel rate frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelRateReduced {
    /// The fuel rate in L/h, if any reading was valid.
    pub fuel_rate: Option<f64>,
}
