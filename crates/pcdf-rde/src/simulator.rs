//! Tells apart recordings of real drives from recordings produced with an OBD simulator.
//!
//! A simulator reports vehicle speeds while the GPS receiver stays (almost) at rest, so the average GPS speed of such
//! a recording is far below the average speed reported by the car.

use std::fmt::{Display, Formatter};

use tracing::debug;

use crate::error::StreamError;
use crate::event::{EventKind, ObdPayload};
use crate::stream::EventStream;

/// GPS speeds below this fraction of the OBD speed indicate a simulator.
const SIMULATOR_RATIO: f64 = 0.8;

/// The origin of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimResult {
    /// The car data was produced by a simulator.
    Simulator,
    /// A real drive.
    Rde,
    /// Not enough speed information to decide.
    Monitoring,
}

impl Display for SimResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SimResult::Simulator => write!(f, "SIMULATOR"),
            SimResult::Rde => write!(f, "RDE"),
            SimResult::Monitoring => write!(f, "MONITORING"),
        }
    }
}

#[derive(Debug, Default)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Classifies the recording by comparing the average GPS speed with the average speed reported by the car.
///
/// GPS fixes without speed count as standing still.
/// Without GPS fixes, speed frames or with an average car speed of zero the result is [SimResult::Monitoring].
pub fn detect_simulator<S: EventStream + ?Sized>(stream: &mut S) -> Result<SimResult, StreamError> {
    let mut gps = Average::default();
    let mut obd = Average::default();
    for event in stream.events() {
        match event?.kind {
            EventKind::Gps(fix) => gps.add(fix.speed.map_or(0.0, |speed| speed * 3.6)),
            EventKind::ObdResponse(response) => {
                if let ObdPayload::Speed(speed) = response.payload {
                    obd.add(f64::from(speed.speed));
                }
            },
            _ => {},
        }
    }
    if gps.count == 0 || obd.count == 0 || obd.sum == 0.0 {
        return Ok(SimResult::Monitoring);
    }
    let ratio = gps.value() / obd.value();
    debug!(gps = gps.value(), obd = obd.value(), ratio, "average speeds in km/h");
    Ok(if ratio < SIMULATOR_RATIO { SimResult::Simulator } else { SimResult::Rde })
}
