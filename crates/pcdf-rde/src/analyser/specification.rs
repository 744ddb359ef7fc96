//! Assembly of the RTLola specification monitored for a car.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use tracing::debug;

use super::capability::{CapabilityProfile, FuelType};
use crate::error::AnalysisError;

/// The names of all fragments a specification is assembled from.
pub const FRAGMENT_NAMES: [&str; 11] = [
    HEADER,
    FUEL_RATE_INPUT,
    MAF_TO_FUEL_RATE_DIESEL,
    MAF_TO_FUEL_RATE_DIESEL_FAE,
    MAF_TO_FUEL_RATE_GASOLINE,
    MAF_TO_FUEL_RATE_GASOLINE_FAE,
    FUEL_RATE_TO_CO2_DIESEL,
    FUEL_RATE_TO_EMF_DIESEL,
    FUEL_RATE_TO_CO2_GASOLINE,
    FUEL_RATE_TO_EMF_GASOLINE,
    BODY_NOX,
];

const HEADER: &str = "header.lola";
const FUEL_RATE_INPUT: &str = "fuel_rate_input.lola";
const MAF_TO_FUEL_RATE_DIESEL: &str = "maf_to_fuel_rate_diesel.lola";
const MAF_TO_FUEL_RATE_DIESEL_FAE: &str = "maf_to_fuel_rate_diesel_fae.lola";
const MAF_TO_FUEL_RATE_GASOLINE: &str = "maf_to_fuel_rate_gasoline.lola";
const MAF_TO_FUEL_RATE_GASOLINE_FAE: &str = "maf_to_fuel_rate_gasoline_fae.lola";
const FUEL_RATE_TO_CO2_DIESEL: &str = "fuel_rate_to_co2_diesel.lola";
const FUEL_RATE_TO_EMF_DIESEL: &str = "fuel_rate_to_emf_diesel.lola";
const FUEL_RATE_TO_CO2_GASOLINE: &str = "fuel_rate_to_co2_gasoline.lola";
const FUEL_RATE_TO_EMF_GASOLINE: &str = "fuel_rate_to_emf_gasoline.lola";
const BODY_NOX: &str = "body_nox.lola";

/// The named text fragments a [MonitorSpecification] is assembled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFragments {
    fragments: HashMap<&'static str, String>,
}

impl SpecFragments {
    /// The fragments shipped with the analyser.
    pub fn embedded() -> Self {
        let fragments = [
            (HEADER, include_str!("../../lola-spec/header.lola")),
            (FUEL_RATE_INPUT, include_str!("../../lola-spec/fuel_rate_input.lola")),
            (MAF_TO_FUEL_RATE_DIESEL, include_str!("../../lola-spec/maf_to_fuel_rate_diesel.lola")),
            (MAF_TO_FUEL_RATE_DIESEL_FAE, include_str!("../../lola-spec/maf_to_fuel_rate_diesel_fae.lola")),
            (MAF_TO_FUEL_RATE_GASOLINE, include_str!("../../lola-spec/maf_to_fuel_rate_gasoline.lola")),
            (MAF_TO_FUEL_RATE_GASOLINE_FAE, include_str!("../../lola-spec/maf_to_fuel_rate_gasoline_fae.lola")),
            (FUEL_RATE_TO_CO2_DIESEL, include_str!("../../lola-spec/fuel_rate_to_co2_diesel.lola")),
            (FUEL_RATE_TO_EMF_DIESEL, include_str!("../../lola-spec/fuel_rate_to_emf_diesel.lola")),
            (FUEL_RATE_TO_CO2_GASOLINE, include_str!("../../lola-spec/fuel_rate_to_co2_gasoline.lola")),
            (FUEL_RATE_TO_EMF_GASOLINE, include_str!("../../lola-spec/fuel_rate_to_emf_gasoline.lola")),
            (BODY_NOX, include_str!("../../lola-spec/body_nox.lola")),
        ];
        SpecFragments {
            fragments: fragments.into_iter().map(|(name, text)| (name, text.to_string())).collect(),
        }
    }

    /// Loads every fragment from a file named after it in `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, AnalysisError> {
        let dir = dir.as_ref();
        let mut fragments = HashMap::with_capacity(FRAGMENT_NAMES.len());
        for name in FRAGMENT_NAMES {
            let text = fs::read_to_string(dir.join(name)).map_err(|source| {
                AnalysisError::Fragment {
                    name: name.to_string(),
                    source,
                }
            })?;
            fragments.insert(name, text);
        }
        debug!(dir = %dir.display(), "loaded specification fragments");
        Ok(SpecFragments { fragments })
    }

    fn get(&self, name: &str) -> &str {
        self.fragments.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Assembles the specification for a car with the given profile.
    ///
    /// The header comes first, followed by either the fuel rate input or its estimation from the mass air flow,
    /// the CO2 and exhaust mass flow computations for the fuel type and finally the body.
    pub fn build(&self, profile: &CapabilityProfile) -> MonitorSpecification {
        let fuel_rate = match (profile.fuel_rate_available(), profile.fuel_type(), profile.fae_available()) {
            (true, ..) => FUEL_RATE_INPUT,
            (false, FuelType::Diesel, true) => MAF_TO_FUEL_RATE_DIESEL_FAE,
            (false, FuelType::Diesel, false) => MAF_TO_FUEL_RATE_DIESEL,
            (false, FuelType::Gasoline, true) => MAF_TO_FUEL_RATE_GASOLINE_FAE,
            (false, FuelType::Gasoline, false) => MAF_TO_FUEL_RATE_GASOLINE,
        };
        let (co2, emf) = match profile.fuel_type() {
            FuelType::Diesel => (FUEL_RATE_TO_CO2_DIESEL, FUEL_RATE_TO_EMF_DIESEL),
            FuelType::Gasoline => (FUEL_RATE_TO_CO2_GASOLINE, FUEL_RATE_TO_EMF_GASOLINE),
        };
        let parts = [HEADER, fuel_rate, co2, emf, BODY_NOX];
        debug!(?parts, "assembling specification");
        MonitorSpecification(parts.map(|part| self.get(part)).concat())
    }
}

impl Default for SpecFragments {
    fn default() -> Self {
        Self::embedded()
    }
}

/// The text of an RTLola specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSpecification(String);

impl MonitorSpecification {
    /// Wraps a specification written by hand.
    pub fn new(text: impl Into<String>) -> Self {
        MonitorSpecification(text.into())
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MonitorSpecification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
