//! The steady state of an analysis: turning events into monitor inputs.

use tracing::trace;

use super::capability::{CapabilityProfile, Channel};
use crate::bridge::MonitorBridge;
use crate::error::BridgeError;
use crate::event::{Event, EventKind, ObdPayload, OutputEvent};

const CELSIUS_TO_KELVIN: f64 = 273.15;

/// The latest known value of each [Channel] and the logical time of the monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestValues {
    values: [Option<f64>; 7],
    time: f64,
}

impl LatestValues {
    #[allow(missing_docs)]
    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.values[channel.index()]
    }

    /// Replaces the value of `channel`.
    pub fn set(&mut self, channel: Channel, value: f64) {
        self.values[channel.index()] = Some(value);
    }

    /// The number of channels with a value.
    pub fn known(&self) -> usize {
        self.values.iter().flatten().count()
    }

    /// The logical time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Moves the logical time to `timestamp` (in ns) unless that would move it backwards.
    pub fn advance(&mut self, timestamp: i64) -> f64 {
        self.time = self.time.max(timestamp as f64 / 1_000_000_000.0);
        self.time
    }

    /// The known values in channel declaration order, followed by the logical time.
    pub fn inputs(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().chain(std::iter::once(self.time)).collect()
    }
}

/// Feeds the events following the bootstrap prefix to a monitor.
///
/// Once every channel of the profile and the altitude have a value, each event is answered with a submission of all
/// latest values to the monitor.
#[derive(Debug, Clone)]
pub struct StreamCollector {
    profile: CapabilityProfile,
    outputs: Vec<String>,
    producer: String,
    latest: LatestValues,
}

impl StreamCollector {
    /// Creates a collector for a car with the given profile, translating the monitor results into events for the
    /// requested `outputs`.
    pub fn new(profile: CapabilityProfile, outputs: Vec<String>, producer: String) -> Self {
        StreamCollector {
            profile,
            outputs,
            producer,
            latest: LatestValues::default(),
        }
    }

    #[allow(missing_docs)]
    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    #[allow(missing_docs)]
    pub fn latest(&self) -> &LatestValues {
        &self.latest
    }

    /// Whether all channels of the profile and the altitude have a value.
    pub fn is_complete(&self) -> bool {
        self.latest.known() == self.profile.len() + 1
    }

    /// Records the values carried by `event`.
    ///
    /// Diagnostic responses to commands outside of the profile are ignored.
    pub fn update(&mut self, event: &Event) {
        match &event.kind {
            EventKind::Gps(fix) => self.latest.set(Channel::Altitude, fix.altitude),
            EventKind::ObdResponse(response) => {
                let Some(command) = response.command() else {
                    return;
                };
                if !self.profile.contains(command) {
                    return;
                }
                let update = match response.clone().reduce().payload {
                    ObdPayload::Speed(speed) => Some((Channel::Velocity, f64::from(speed.speed))),
                    ObdPayload::AmbientAirTemperature(temp) => {
                        Some((Channel::Temperature, f64::from(temp.temperature) + CELSIUS_TO_KELVIN))
                    },
                    ObdPayload::MafAirFlowRate(maf) => Some((Channel::MassAirFlow, maf.rate)),
                    ObdPayload::MafSensor(maf) => Some((Channel::MassAirFlow, maf.maf_sensor_a)),
                    ObdPayload::NoxReduced(nox) => nox.nox_ppm.map(|ppm| (Channel::Nox, f64::from(ppm))),
                    ObdPayload::FuelRateReduced(rate) => rate.fuel_rate.map(|rate| (Channel::FuelRate, rate)),
                    ObdPayload::FuelAirEquivalenceRatio(fae) => Some((Channel::FuelAirEquivalence, fae.ratio)),
                    _ => None,
                };
                if let Some((channel, value)) = update {
                    self.latest.set(channel, value);
                }
            },
            _ => {},
        }
    }

    /// Processes one event and returns the monitor outputs it caused.
    ///
    /// Nothing is submitted before the collected values are complete.
    pub fn collect<B: MonitorBridge + ?Sized>(
        &mut self,
        event: &Event,
        bridge: &mut B,
    ) -> Result<Vec<OutputEvent>, BridgeError> {
        self.update(event);
        if !self.is_complete() {
            return Ok(Vec::new());
        }
        self.latest.advance(event.timestamp);
        let inputs = self.latest.inputs();
        trace!(?inputs, "submitting to monitor");
        let results = bridge.submit(&inputs)?;
        trace!(?results, "received from monitor");
        if self.outputs.is_empty() {
            return Ok(Vec::new());
        }
        if results.len() % self.outputs.len() != 0 {
            return Err(BridgeError::Call(format!(
                "received {} values for {} requested outputs",
                results.len(),
                self.outputs.len()
            )));
        }
        let outputs = results
            .into_iter()
            .zip(self.outputs.iter().cycle())
            .map(|(value, name)| {
                OutputEvent {
                    producer: self.producer.clone(),
                    timestamp: event.timestamp,
                    name: name.clone(),
                    value,
                }
            })
            .collect();
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::capability::detect;
    use crate::bridge::ScriptedBridge;

    fn event(line: &str) -> Event {
        Event::decode(line).unwrap()
    }

    fn gps(ts: i64, altitude: f64) -> Event {
        event(&format!(
            r#"{{"source":"GPS","type":"GPS","timestamp":{},"latitude":49.0,"longitude":7.0,"altitude":{:?}}}"#,
            ts, altitude
        ))
    }

    fn obd(ts: i64, pid: u8, fields: &str) -> Event {
        event(&format!(
            r#"{{"source":"OBD","type":"OBD_RESPONSE","timestamp":{},"bytes":"","mode":1,"pid":{},{}}}"#,
            ts, pid, fields
        ))
    }

    fn diesel_collector() -> StreamCollector {
        let profile = detect(&[0x0D, 0x46, 0x83, 0x5E, 0x10, 0x44, 0xA1], "Diesel").unwrap();
        StreamCollector::new(profile, vec!["d".into(), "nox_per_km".into()], "pcdf-rde".into())
    }

    fn initialized_bridge() -> ScriptedBridge {
        let mut bridge = ScriptedBridge::new();
        bridge.initialize(&Default::default(), &["d".to_string(), "nox_per_km".to_string()]).unwrap();
        bridge
    }

    #[test]
    fn latest_values_inputs_and_time() {
        let mut latest = LatestValues::default();
        latest.set(Channel::FuelRate, 4.0);
        latest.set(Channel::Velocity, 50.0);
        latest.set(Channel::Velocity, 52.0);
        assert_eq!(latest.known(), 2);
        assert_eq!(latest.advance(2_500_000_000), 2.5);
        assert_eq!(latest.advance(1_000_000_000), 2.5);
        assert_eq!(latest.inputs(), vec![52.0, 4.0, 2.5]);
    }

    #[test]
    fn values_are_converted_per_channel() {
        let mut collector = diesel_collector();
        collector.update(&obd(1, 0x0D, r#""speed":72"#));
        collector.update(&obd(2, 0x46, r#""temperature":20"#));
        collector.update(&obd(3, 0x83, r#""sensor1_1":40,"sensor1_2":-1,"sensor2_1":30,"sensor2_2":-1"#));
        collector.update(&obd(4, 0x5E, r#""engine_fuel_rate":3.5"#));
        collector.update(&obd(5, 0x10, r#""rate":12.25"#));
        collector.update(&gps(6, 230.5));
        let latest = collector.latest();
        assert_eq!(latest.get(Channel::Velocity), Some(72.0));
        assert_eq!(latest.get(Channel::Temperature), Some(20.0 + 273.15));
        assert_eq!(latest.get(Channel::Nox), Some(30.0));
        assert_eq!(latest.get(Channel::FuelRate), Some(3.5));
        assert_eq!(latest.get(Channel::MassAirFlow), Some(12.25));
        assert_eq!(latest.get(Channel::Altitude), Some(230.5));
        assert!(collector.is_complete());
    }

    #[test]
    fn responses_outside_of_the_profile_are_ignored() {
        let mut collector = diesel_collector();
        // supported but not selected: 0xA1 loses against 0x83, 0x44 is unused with a fuel rate
        collector.update(&obd(1, 0xA1, r#""sensor1_1":40,"sensor1_2":-1,"sensor2_1":30,"sensor2_2":-1"#));
        collector.update(&obd(2, 0x44, r#""ratio":0.98"#));
        collector.update(&obd(3, 0x66, r#""maf_sensor_a":1.0,"maf_sensor_b":2.0"#));
        assert_eq!(collector.latest().known(), 0);
    }

    #[test]
    fn maf_sensor_uses_first_sensor() {
        let profile = detect(&[0x0D, 0x46, 0x83, 0x66], "Gasoline").unwrap();
        let mut collector = StreamCollector::new(profile, vec![], "pcdf-rde".into());
        collector.update(&obd(1, 0x66, r#""maf_sensor_a":3.0,"maf_sensor_b":5.0"#));
        assert_eq!(collector.latest().get(Channel::MassAirFlow), Some(3.0));
    }

    #[test]
    fn nothing_is_submitted_before_completion() {
        let mut collector = diesel_collector();
        let mut bridge = initialized_bridge();
        let events = [
            obd(1_000_000_000, 0x0D, r#""speed":50"#),
            obd(2_000_000_000, 0x46, r#""temperature":20"#),
            obd(3_000_000_000, 0x83, r#""sensor1_1":40,"sensor1_2":-1,"sensor2_1":-1,"sensor2_2":-1"#),
            obd(4_000_000_000, 0x5E, r#""engine_fuel_rate":3.0"#),
            obd(5_000_000_000, 0x10, r#""rate":10.0"#),
        ];
        for ev in &events {
            assert!(collector.collect(ev, &mut bridge).unwrap().is_empty());
        }
        assert!(bridge.submissions().is_empty());
        collector.collect(&gps(6_000_000_000, 200.0), &mut bridge).unwrap();
        assert_eq!(
            bridge.submissions(),
            &[vec![50.0, 200.0, 20.0 + 273.15, 40.0, 10.0, 3.0, 6.0]]
        );
    }

    #[test]
    fn interleaved_gps_and_obd_complete_with_the_last_channel() {
        let profile = detect(&[0x0D, 0x46, 0x83, 0x10], "Diesel").unwrap();
        let mut collector = StreamCollector::new(profile, vec!["d".into()], "pcdf-rde".into());
        let mut bridge = ScriptedBridge::new();
        bridge.initialize(&Default::default(), &["d".to_string()]).unwrap();
        let s = 1_000_000_000;
        let events = [
            gps(s, 200.0),
            obd(2 * s, 0x0D, r#""speed":50"#),
            gps(3 * s, 201.0),
            obd(4 * s, 0x46, r#""temperature":20"#),
            gps(5 * s, 202.0),
            obd(6 * s, 0x83, r#""sensor1_1":40,"sensor1_2":-1,"sensor2_1":-1,"sensor2_2":-1"#),
            gps(7 * s, 203.0),
        ];
        for ev in &events {
            collector.collect(ev, &mut bridge).unwrap();
            assert!(!collector.is_complete());
        }
        assert!(bridge.submissions().is_empty());
        collector.collect(&obd(8 * s, 0x10, r#""rate":10.0"#), &mut bridge).unwrap();
        assert!(collector.is_complete());
        assert_eq!(
            bridge.submissions(),
            &[vec![50.0, 203.0, 20.0 + 273.15, 40.0, 10.0, 8.0]]
        );
    }

    #[test]
    fn outputs_are_named_in_request_order() {
        let mut collector = diesel_collector();
        let mut bridge = initialized_bridge();
        bridge.respond_with(vec![vec![], vec![1.0, 2.0, 3.0, 4.0]]);
        for ev in [
            obd(1, 0x0D, r#""speed":50"#),
            obd(2, 0x46, r#""temperature":20"#),
            obd(3, 0x83, r#""sensor1_1":40,"sensor1_2":-1,"sensor2_1":-1,"sensor2_2":-1"#),
            obd(4, 0x5E, r#""engine_fuel_rate":3.0"#),
            obd(5, 0x10, r#""rate":10.0"#),
            gps(6, 200.0),
        ] {
            assert!(collector.collect(&ev, &mut bridge).unwrap().is_empty());
        }
        let outputs = collector.collect(&gps(7_000_000_000, 201.0), &mut bridge).unwrap();
        let named: Vec<(&str, f64)> = outputs.iter().map(|o| (o.name.as_str(), o.value)).collect();
        assert_eq!(named, vec![("d", 1.0), ("nox_per_km", 2.0), ("d", 3.0), ("nox_per_km", 4.0)]);
        assert!(outputs.iter().all(|o| o.timestamp == 7_000_000_000 && o.producer == "pcdf-rde"));
    }

    #[test]
    fn incomplete_result_tuples_are_rejected() {
        let mut collector = diesel_collector();
        for ev in [
            obd(1, 0x0D, r#""speed":50"#),
            obd(2, 0x46, r#""temperature":20"#),
            obd(3, 0x83, r#""sensor1_1":40,"sensor1_2":-1,"sensor2_1":-1,"sensor2_2":-1"#),
            obd(4, 0x5E, r#""engine_fuel_rate":3.0"#),
            obd(5, 0x10, r#""rate":10.0"#),
        ] {
            collector.update(&ev);
        }
        let mut bridge = initialized_bridge();
        bridge.respond_with(vec![vec![1.0, 2.0, 3.0]]);
        assert!(matches!(
            collector.collect(&gps(6, 200.0), &mut bridge),
            Err(BridgeError::Call(_))
        ));
    }
}
