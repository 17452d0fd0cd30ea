#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Convention used whenever the core adds a station to the electrified set.
pub const OPPORTUNITY_STATION_TYPE: &str = "opps";
pub const OPPORTUNITY_CHARGING_STATIONS: u32 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSpec {
    #[serde(rename = "type")]
    pub station_type: String,
    pub n_charging_stations: u32,
}

impl StationSpec {
    pub fn opportunity() -> Self {
        Self {
            station_type: OPPORTUNITY_STATION_TYPE.to_string(),
            n_charging_stations: OPPORTUNITY_CHARGING_STATIONS,
        }
    }
}

/// The set of stations already chosen as opportunity chargers.
///
/// Kept as a `BTreeMap` rather than a `HashMap` so that fingerprinting
/// (`optimizer::memo::fingerprint`) does not need to sort separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElectrifiedStations(pub BTreeMap<String, StationSpec>);

impl ElectrifiedStations {
    pub fn contains(&self, station: &str) -> bool {
        self.0.contains_key(station)
    }

    pub fn electrify(&mut self, station: impl Into<String>) {
        self.0.entry(station.into()).or_insert_with(StationSpec::opportunity);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
