use std::fs;
use std::path::{Path, PathBuf};

use pcdf_rde::analyser::{AnalyserConfig, Channel, RdeAnalyser, SpecFragments, FRAGMENT_NAMES};
use pcdf_rde::bridge::ScriptedBridge;
use pcdf_rde::event::EventKind;
use pcdf_rde::sink::LineSink;
use pcdf_rde::stream::{invalid_nox_filter, EventStream, FileEventStream};
use pcdf_rde::{AnalysisError, DetectionError, Event, StreamError};
use tempfile::TempDir;

const S: i64 = 1_000_000_000;

fn meta() -> String {
    r#"{"source":"app","type":"META","timestamp":0,"version":"1.0.0"}"#.to_string()
}

fn obd(ts: i64, pid: u8, fields: &str) -> String {
    format!(
        r#"{{"source":"OBD","type":"OBD_RESPONSE","timestamp":{},"bytes":"","mode":1,"pid":{},{}}}"#,
        ts, pid, fields
    )
}

fn supported(pids: &[u8]) -> String {
    obd(1, 0x00, &format!(r#""supported_pids":{:?}"#, pids))
}

fn fuel_type(name: &str) -> String {
    obd(2, 0x51, &format!(r#""fuel_type":"{}""#, name))
}

fn gps(ts: i64, altitude: f64) -> String {
    format!(
        r#"{{"source":"GPS","type":"GPS","timestamp":{},"latitude":49.25,"longitude":7.04,"altitude":{:?}}}"#,
        ts, altitude
    )
}

fn nox(ts: i64, pid: u8, s11: i32, s12: i32, s21: i32, s22: i32) -> String {
    obd(
        ts,
        pid,
        &format!(
            r#""sensor1_1":{},"sensor1_2":{},"sensor2_1":{},"sensor2_2":{}"#,
            s11, s12, s21, s22
        ),
    )
}

struct Recording {
    dir: TempDir,
}

impl Recording {
    fn new() -> Self {
        Recording {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn write(&self, lines: &[String]) -> PathBuf {
        let path = self.dir.path().join("drive.ppcdf");
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("drive-rde.ppcdf")
    }
}

fn read_events(path: &Path) -> Vec<Event> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| Event::decode(line).unwrap())
        .collect()
}

fn outputs(events: &[Event]) -> Vec<(String, f64, i64)> {
    events
        .iter()
        .filter_map(|e| {
            match &e.kind {
                EventKind::MonitorOutput(out) => Some((out.name.clone(), out.value, e.timestamp)),
                _ => None,
            }
        })
        .collect()
}

fn diesel_drive() -> Vec<String> {
    vec![
        meta(),
        supported(&[0x0D, 0x46, 0x83, 0xA1, 0x5E, 0x10]),
        fuel_type("Diesel"),
        obd(3 * S, 0x0D, r#""speed":48"#),
        obd(4 * S, 0x46, r#""temperature":21"#),
        nox(5 * S, 0x83, 42, -1, 38, -1),
        obd(6 * S, 0x5E, r#""engine_fuel_rate":3.5"#),
        obd(7 * S, 0x10, r#""rate":14.5"#),
        gps(8 * S, 231.0),
        obd(9 * S, 0x0D, r#""speed":52"#),
    ]
}

#[test]
fn diesel_drive_is_monitored() {
    let recording = Recording::new();
    let input = recording.write(&diesel_drive());
    let mut stream = invalid_nox_filter(FileEventStream::open(&input).unwrap());
    let mut bridge = ScriptedBridge::new();
    bridge.respond_with(vec![vec![0.1, 0.0], vec![0.2, 12.5]]);
    let mut sink = LineSink::create(recording.output()).unwrap();

    let report = RdeAnalyser::new(AnalyserConfig::new(["d", "nox_per_km"]))
        .monitor_stream(&mut stream, &mut bridge, &mut sink)
        .unwrap();
    drop(sink);

    assert_eq!(report.events, diesel_drive().len());
    assert_eq!(report.submissions, 2);
    assert!(report.profile.fuel_rate_available());
    assert_eq!(
        report.profile.channels(),
        vec![
            Channel::Velocity,
            Channel::Altitude,
            Channel::Temperature,
            Channel::Nox,
            Channel::MassAirFlow,
            Channel::FuelRate
        ]
    );
    assert_eq!(
        bridge.submissions(),
        &[
            vec![48.0, 231.0, 21.0 + 273.15, 38.0, 14.5, 3.5, 8.0],
            vec![52.0, 231.0, 21.0 + 273.15, 38.0, 14.5, 3.5, 9.0],
        ]
    );

    let written = read_events(&recording.output());
    assert_eq!(written.len(), diesel_drive().len() + 4);
    assert_eq!(written[..9], read_events(&input)[..9]);
    assert_eq!(
        outputs(&written),
        vec![
            ("d".to_string(), 0.1, 8 * S),
            ("nox_per_km".to_string(), 0.0, 8 * S),
            ("d".to_string(), 0.2, 9 * S),
            ("nox_per_km".to_string(), 12.5, 9 * S),
        ]
    );
    assert!(written.iter().filter(|e| matches!(e.kind, EventKind::MonitorOutput(_))).all(|e| e.source == "pcdf-rde"));
}

#[test]
fn specification_follows_the_profile() {
    let recording = Recording::new();
    let input = recording.write(&diesel_drive());
    let mut bridge = ScriptedBridge::new();
    RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut FileEventStream::open(&input).unwrap(), &mut bridge, &mut Vec::new())
        .unwrap();
    let spec = bridge.specification().unwrap().as_str();
    assert!(spec.contains("input fuel_rate"));
    assert!(!spec.contains("input fuel_air_equivalence"));
    assert!(spec.contains("output nox_per_km"));
    let header = spec.find("input velocity").unwrap();
    let fuel_rate = spec.find("input fuel_rate").unwrap();
    assert!(header < fuel_rate);
}

#[test]
fn gasoline_drive_with_fuel_air_equivalence() {
    let lines = vec![
        supported(&[0x0D, 0x46, 0xA8, 0x66, 0x44]),
        fuel_type("Gasoline"),
        obd(3 * S, 0x44, r#""ratio":0.97"#),
        obd(4 * S, 0x66, r#""maf_sensor_a":9.0,"maf_sensor_b":11.0"#),
        nox(5 * S, 0xA8, 65535, 17, -1, -1),
        obd(6 * S, 0x46, r#""temperature":-3"#),
        gps(7 * S, 180.0),
        obd(8 * S, 0x0D, r#""speed":30"#),
    ];
    let recording = Recording::new();
    let input = recording.write(&lines);
    let mut bridge = ScriptedBridge::new();
    let report = RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut FileEventStream::open(&input).unwrap(), &mut bridge, &mut Vec::new())
        .unwrap();

    assert!(!report.profile.fuel_rate_available());
    assert!(report.profile.fae_available());
    assert!(report.specification.as_str().contains("input fuel_air_equivalence"));
    assert_eq!(
        bridge.submissions(),
        &[vec![30.0, 180.0, -3.0 + 273.15, 17.0, 9.0, 0.97, 8.0]]
    );
}

#[test]
fn invalid_nox_frames_are_dropped_before_the_monitor() {
    let mut lines = diesel_drive();
    // a frame with the sentinel would otherwise provide the first NOx value
    lines.insert(5, nox(4 * S + 1, 0x83, 65535, 80, -1, -1));
    let recording = Recording::new();
    let input = recording.write(&lines);

    let mut filtered = invalid_nox_filter(FileEventStream::open(&input).unwrap());
    let mut sink = Vec::new();
    let mut bridge = ScriptedBridge::new();
    RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut filtered, &mut bridge, &mut sink)
        .unwrap();
    assert_eq!(sink.len(), diesel_drive().len());
    assert!(!sink.iter().any(Event::has_invalid_nox));
    assert_eq!(bridge.submissions()[0][3], 38.0);

    // without the filter the frame reaches the sink, and the valid sensors still count
    let mut unfiltered = FileEventStream::open(&input).unwrap();
    let mut sink = Vec::new();
    RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut unfiltered, &mut ScriptedBridge::new(), &mut sink)
        .unwrap();
    assert_eq!(sink.len(), lines.len());
    assert_eq!(sink.iter().filter(|e| e.has_invalid_nox()).count(), 1);
}

#[test]
fn nox_sensor_priority() {
    for (pids, expected) in [
        (vec![0xA8, 0xA7, 0xA1, 0x83], 0x83),
        (vec![0xA8, 0xA7, 0xA1], 0xA1),
        (vec![0xA8, 0xA7], 0xA7),
        (vec![0xA8], 0xA8),
    ] {
        let mut supported_pids = vec![0x0D, 0x46, 0x10];
        supported_pids.extend(pids);
        let mut lines = vec![supported(&supported_pids), fuel_type("Diesel")];
        lines.extend([0x83, 0xA1, 0xA7, 0xA8].map(|pid| nox(3 * S, pid, i32::from(pid), -1, -1, -1)));
        lines.extend([
            obd(4 * S, 0x0D, r#""speed":20"#),
            obd(4 * S, 0x46, r#""temperature":20"#),
            obd(4 * S, 0x10, r#""rate":5.0"#),
            gps(5 * S, 100.0),
        ]);
        let recording = Recording::new();
        let input = recording.write(&lines);
        let mut bridge = ScriptedBridge::new();
        RdeAnalyser::new(AnalyserConfig::new(["d"]))
            .monitor_stream(&mut FileEventStream::open(&input).unwrap(), &mut bridge, &mut Vec::new())
            .unwrap();
        assert_eq!(bridge.submissions().len(), 1);
        assert_eq!(bridge.submissions()[0][3], f64::from(expected));
    }
}

#[test]
fn incompatible_cars_are_reported() {
    let cases: [(Vec<u8>, &str, &str); 5] = [
        (vec![0x0D, 0x46, 0x83, 0x10], "Electric", "fuel type unknown"),
        (vec![0x46, 0x83, 0x10], "Diesel", "speed data"),
        (vec![0x0D, 0x83, 0x10], "Diesel", "ambient air temperature"),
        (vec![0x0D, 0x46, 0x10], "Diesel", "NOx sensor"),
        (vec![0x0D, 0x46, 0x83, 0x5E], "Diesel", "mass air flow"),
    ];
    for (pids, fuel, message) in cases {
        let recording = Recording::new();
        let input = recording.write(&[supported(&pids), fuel_type(fuel), obd(3 * S, 0x0D, r#""speed":1"#)]);
        let mut bridge = ScriptedBridge::new();
        let err = RdeAnalyser::new(AnalyserConfig::new(["d"]))
            .monitor_stream(&mut FileEventStream::open(&input).unwrap(), &mut bridge, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Detection(_)), "{:?}", err);
        assert!(err.to_string().contains(message), "`{}` does not mention {}", err, message);
        assert!(bridge.specification().is_none());
    }
}

#[test]
fn missing_supported_pids() {
    let recording = Recording::new();
    let input = recording.write(&[meta(), fuel_type("Diesel"), obd(3 * S, 0x0D, r#""speed":1"#)]);
    let err = RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(
            &mut FileEventStream::open(&input).unwrap(),
            &mut ScriptedBridge::new(),
            &mut Vec::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Detection(DetectionError::IncompleteBootstrap { .. })
    ));
}

#[test]
fn time_never_moves_backwards() {
    let mut lines = diesel_drive();
    lines.push(obd(5 * S, 0x0D, r#""speed":53"#));
    lines.push(obd(12 * S, 0x0D, r#""speed":54"#));
    let recording = Recording::new();
    let input = recording.write(&lines);
    let mut bridge = ScriptedBridge::new();
    RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut FileEventStream::open(&input).unwrap(), &mut bridge, &mut Vec::new())
        .unwrap();
    let times: Vec<f64> = bridge.submissions().iter().map(|s| *s.last().unwrap()).collect();
    assert_eq!(times, vec![8.0, 9.0, 9.0, 12.0]);
}

#[test]
fn faulty_recordings_stay_faulty() {
    let mut lines = diesel_drive();
    lines.insert(4, "{\"source\":\"OBD\",".to_string());
    let recording = Recording::new();
    let input = recording.write(&lines);
    let mut stream = FileEventStream::open(&input).unwrap();

    let err = RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut stream, &mut ScriptedBridge::new(), &mut Vec::new())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Stream(StreamError::Decode { line: 5, .. })));

    let mut sink = Vec::new();
    let err = RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut stream, &mut ScriptedBridge::new(), &mut sink)
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Stream(StreamError::Decode { line: 5, .. })));
    assert!(sink.is_empty());
    assert!(stream.events().next().unwrap().is_err());
}

#[test]
fn single_pass_recording_can_only_be_analysed_once() {
    let recording = Recording::new();
    let input = recording.write(&diesel_drive());
    let mut stream = FileEventStream::open_single_use(&input).unwrap();
    RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut stream, &mut ScriptedBridge::new(), &mut Vec::new())
        .unwrap();
    let err = RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .monitor_stream(&mut stream, &mut ScriptedBridge::new(), &mut Vec::new())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Stream(StreamError::Exhausted)));
}

#[test]
fn fragments_from_a_directory() {
    let recording = Recording::new();
    let fragments = recording.dir.path().join("lola-spec");
    fs::create_dir(&fragments).unwrap();
    for name in FRAGMENT_NAMES {
        fs::write(fragments.join(name), format!("// {}\n", name)).unwrap();
    }
    let input = recording.write(&diesel_drive());
    let mut bridge = ScriptedBridge::new();
    RdeAnalyser::new(AnalyserConfig::new(["d"]))
        .with_fragments(SpecFragments::from_dir(&fragments).unwrap())
        .monitor_stream(&mut FileEventStream::open(&input).unwrap(), &mut bridge, &mut Vec::new())
        .unwrap();
    assert_eq!(
        bridge.specification().unwrap().as_str(),
        "// header.lola\n// fuel_rate_input.lola\n// fuel_rate_to_co2_diesel.lola\n// fuel_rate_to_emf_diesel.lola\n\
         // body_nox.lola\n"
    );
}
