#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::types::ChargingType;

/// A charging curve: non-decreasing (soc, power_kw) breakpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingCurve(pub Vec<(f64, f64)>);

#[derive(Debug, Error, PartialEq)]
pub enum ChargingCurveError {
    #[error("charging curve is empty")]
    Empty,
    #[error("charging curve soc breakpoints must be non-decreasing, got {prev} then {next}")]
    NotMonotonic { prev: f64, next: f64 },
    #[error("charging curve soc breakpoints must lie in [0, 1], found {0}")]
    OutOfRange(f64),
}

impl ChargingCurve {
    pub fn validate(&self) -> Result<(), ChargingCurveError> {
        if self.0.is_empty() {
            return Err(ChargingCurveError::Empty);
        }
        let mut prev = f64::NEG_INFINITY;
        for &(soc, _power) in &self.0 {
            if !(0.0..=1.0).contains(&soc) {
                return Err(ChargingCurveError::OutOfRange(soc));
            }
            if soc < prev {
                return Err(ChargingCurveError::NotMonotonic { prev, next: soc });
            }
            prev = soc;
        }
        Ok(())
    }

    /// Linearly interpolate instantaneous power at the given soc.
    pub fn power_at(&self, soc: f64) -> f64 {
        let points = &self.0;
        if soc <= points[0].0 {
            return points[0].1;
        }
        if soc >= points[points.len() - 1].0 {
            return points[points.len() - 1].1;
        }
        for window in points.windows(2) {
            let (s0, p0) = window[0];
            let (s1, p1) = window[1];
            if soc >= s0 && soc <= s1 {
                if (s1 - s0).abs() < f64::EPSILON {
                    return p1;
                }
                let t = (soc - s0) / (s1 - s0);
                return p0 + t * (p1 - p0);
            }
        }
        points[points.len() - 1].1
    }
}

/// Battery capacity and charging curve for one (vehicle type, charging type) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleTypeEntry {
    pub capacity_kwh: f64,
    pub charging_curve: ChargingCurve,
}

/// `{v_type: {ch_type: entry}}`, flattened to a map keyed by both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleTypeRegistry {
    entries: HashMap<(String, ChargingType), VehicleTypeEntry>,
}

#[derive(Debug, Error)]
pub enum VehicleTypeLookupError {
    #[error("no vehicle type registered for ({0}, {1})")]
    NotFound(String, ChargingType),
}

impl VehicleTypeRegistry {
    pub fn insert(&mut self, vehicle_type: impl Into<String>, charging_type: ChargingType, entry: VehicleTypeEntry) {
        self.entries.insert((vehicle_type.into(), charging_type), entry);
    }

    pub fn lookup(
        &self,
        vehicle_type: &str,
        charging_type: ChargingType,
    ) -> Result<&VehicleTypeEntry, VehicleTypeLookupError> {
        self.entries
            .get(&(vehicle_type.to_string(), charging_type))
            .ok_or_else(|| VehicleTypeLookupError::NotFound(vehicle_type.to_string(), charging_type))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(String, ChargingType), &VehicleTypeEntry)> {
        self.entries.iter()
    }
}
