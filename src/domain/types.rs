use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes elapsed since the scenario's simulation start.
///
/// The original timeseries is indexed by fixed-size steps; callers convert
/// wall-clock timestamps into this unit before handing data to the core so
/// that the search engine never has to reason about timezones.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SimMinutes(pub f64);

impl SimMinutes {
    pub fn hour_of_day(&self) -> u32 {
        (((self.0 / 60.0).floor() as i64).rem_euclid(24)) as u32
    }
}

impl fmt::Display for SimMinutes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}min", self.0)
    }
}

/// A single known-or-unknown State of Charge sample.
///
/// spec note: "model as either a sum type or a sentinel magnitude; never mix" —
/// this crate picks the sum type and converts to the sentinel only at the
/// boundary where the original extractor expects one (see `events::sanitize`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SocSample {
    Known(f64),
    Unknown,
}

impl SocSample {
    pub fn value(&self) -> Option<f64> {
        match self {
            SocSample::Known(v) => Some(*v),
            SocSample::Unknown => None,
        }
    }
}

/// Opportunity-charged bus or depot-charged bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargingType {
    Oppb,
    Depb,
}

impl ChargingType {
    /// Identify the charging type from a vehicle id suffix, e.g. `"bus_042_oppb"`.
    pub fn from_vehicle_id(vehicle_id: &str) -> Option<Self> {
        if vehicle_id.ends_with("_oppb") {
            Some(ChargingType::Oppb)
        } else if vehicle_id.ends_with("_depb") {
            Some(ChargingType::Depb)
        } else {
            None
        }
    }
}

impl fmt::Display for ChargingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargingType::Oppb => "oppb",
            ChargingType::Depb => "depb",
        };
        write!(f, "{s}")
    }
}
