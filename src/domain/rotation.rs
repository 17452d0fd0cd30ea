use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::types::{ChargingType, SimMinutes};

/// One leg of a rotation: departs somewhere, arrives at `arrival_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub arrival_time: SimMinutes,
    pub departure_time: SimMinutes,
    pub arrival_name: String,
    pub distance_km: f64,
    pub consumption_kwh: f64,
}

/// A sequence of trips executed by one vehicle between depot departures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rotation {
    pub id: String,
    pub trips: Vec<Trip>,
    pub vehicle_id: String,
    pub vehicle_type: String,
    pub charging_type: ChargingType,
    pub capacity_kwh: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum RotationValidationError {
    #[error("rotation {id} has no trips")]
    EmptyRotation { id: String },
    #[error("rotation {id} trip {index} arrives before it departs")]
    InvalidTripOrder { id: String, index: usize },
    #[error("rotation {id} trip {index} departs before the previous trip arrives")]
    OverlappingTrips { id: String, index: usize },
}

impl Rotation {
    /// Validate the trip ordering invariant from the data model: arrival of
    /// trip i must precede the departure of trip i, and trip i+1 must not
    /// depart before trip i arrives.
    pub fn validate(&self) -> Result<(), RotationValidationError> {
        if self.trips.is_empty() {
            return Err(RotationValidationError::EmptyRotation {
                id: self.id.clone(),
            });
        }
        for (index, trip) in self.trips.iter().enumerate() {
            if trip.arrival_time.0 < trip.departure_time.0 {
                return Err(RotationValidationError::InvalidTripOrder {
                    id: self.id.clone(),
                    index,
                });
            }
        }
        for window in self.trips.windows(2) {
            if window[1].departure_time.0 < window[0].arrival_time.0 {
                return Err(RotationValidationError::OverlappingTrips {
                    id: self.id.clone(),
                    index: 1,
                });
            }
        }
        Ok(())
    }

    pub fn start_idx(&self, sim_start: SimMinutes, step_min: f64) -> usize {
        let first = self.trips.first().map(|t| t.departure_time.0).unwrap_or(sim_start.0);
        (((first - sim_start.0) / step_min).floor().max(0.0)) as usize
    }

    pub fn end_idx(&self, sim_start: SimMinutes, step_min: f64) -> usize {
        let last = self.trips.last().map(|t| t.arrival_time.0).unwrap_or(sim_start.0);
        (((last - sim_start.0) / step_min).floor().max(0.0)) as usize
    }
}

/// Per-station buffer time, optionally varying by hour-of-day window.
///
/// A station with only an `"else"` entry behaves exactly like a flat buffer;
/// richer tables support hour ranges such as `"6-9"`, including overnight
/// ranges where the end hour is numerically smaller than the start hour.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationBufferTimes {
    pub windows: HashMap<String, f64>,
}

impl StationBufferTimes {
    pub fn flat(minutes: f64) -> Self {
        let mut windows = HashMap::new();
        windows.insert("else".to_string(), minutes);
        Self { windows }
    }

    /// Resolve the buffer time in effect at `arrival_hour`, falling back to
    /// `default` if no window covers the hour (or this table is empty).
    pub fn resolve(&self, arrival_hour: u32, default: f64) -> f64 {
        if self.windows.is_empty() {
            return default;
        }
        let mut keys: Vec<&String> = self.windows.keys().collect();
        keys.sort();
        for key in &keys {
            if *key == "else" {
                continue;
            }
            if let Some((start, end)) = key.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    let hit = if end < start {
                        arrival_hour >= start || arrival_hour < end
                    } else {
                        arrival_hour >= start && arrival_hour < end
                    };
                    if hit {
                        return self.windows[*key];
                    }
                }
            }
        }
        *self.windows.get("else").unwrap_or(&default)
    }
}
