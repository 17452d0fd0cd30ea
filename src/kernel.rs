//! In-process update of a vehicle's SoC trace when one additional station
//! is electrified, substituting for a full external energy simulation.
//!
//! This is the performance-critical inner loop of the search driver: every
//! branch of the recursion calls it once per affected rotation instead of
//! invoking the external simulator.

use std::collections::HashMap;

use crate::domain::{ChargingType, Rotation, SimMinutes, StationBufferTimes};
use crate::error::OptimizerError;
use crate::evaluator::standing_time_for_arrival;
use crate::soc_curve::SocTimeTable;

const CLIP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub sim_start: SimMinutes,
    pub step_min: f64,
    pub default_buffer_min: f64,
    pub min_charging_time_min: f64,
}

fn time_to_idx(t: SimMinutes, sim_start: SimMinutes, step_min: f64) -> usize {
    (((t.0 - sim_start.0) / step_min).floor().max(0.0)) as usize
}

/// Apply the effect of newly electrifying `new_station` to `trace`, for
/// every trip in `rotation` that arrives there.
///
/// Implements the save → add-to-tail → restore → add-linspace sequence
/// exactly as described, followed by the iterative clip-to-≤1 correction.
pub fn apply_station(
    trace: &mut Vec<f64>,
    rotation: &Rotation,
    new_station: &str,
    curve_tables: &HashMap<(String, ChargingType), SocTimeTable>,
    buffer_tables: &HashMap<String, StationBufferTimes>,
    cfg: &KernelConfig,
) -> Result<(), OptimizerError> {
    let Some(curve) = curve_tables.get(&(rotation.vehicle_type.clone(), rotation.charging_type)) else {
        return Ok(());
    };

    for (i, trip) in rotation.trips.iter().enumerate() {
        if trip.arrival_name != new_station {
            continue;
        }
        let idx = time_to_idx(trip.arrival_time, cfg.sim_start, cfg.step_min);
        if idx >= trace.len() {
            continue;
        }
        let next_departure = rotation.trips.get(i + 1).map(|t| t.departure_time);
        let buffer_min = buffer_tables
            .get(new_station)
            .map(|t| t.resolve(trip.arrival_time.hour_of_day(), cfg.default_buffer_min))
            .unwrap_or(cfg.default_buffer_min);
        let standing = standing_time_for_arrival(trip.arrival_time, next_departure, buffer_min, cfg.min_charging_time_min);

        let soc0 = trace[idx];
        let delta = curve.delta_soc(soc0, standing);
        if delta <= 0.0 {
            continue;
        }

        let b = (buffer_min / cfg.step_min).round().max(0.0) as usize;
        let d = (standing / cfg.step_min).round().max(0.0) as usize + 1;
        let start = (idx + b).min(trace.len());
        let end = (start + d).min(trace.len());
        if start >= end {
            // No room for the charging window itself; still raise everything after.
            for v in trace[start..].iter_mut() {
                *v += delta;
            }
        } else {
            let old: Vec<f64> = trace[start..end].to_vec();
            for v in trace[start..].iter_mut() {
                *v += delta;
            }
            let window_len = end - start;
            for (j, slot) in trace[start..end].iter_mut().enumerate() {
                let lin = if window_len > 1 {
                    delta * (j as f64) / (window_len as f64 - 1.0)
                } else {
                    delta
                };
                *slot = old[j] + lin;
            }
        }

        clip_to_one(trace);
    }

    if trace.iter().any(|v| !v.is_finite() || *v > 1.0 + CLIP_EPSILON) {
        return Err(OptimizerError::KernelInvariant {
            vehicle_id: rotation.vehicle_id.clone(),
        });
    }
    Ok(())
}

/// Iteratively locate the rightmost local maximum exceeding 1, subtract the
/// excess from everything at or after it, and clamp any earlier overshoot
/// down to 1. Repeat until the trace's max is ≤ 1.
fn clip_to_one(trace: &mut [f64]) {
    loop {
        let mut rightmost = None;
        for i in 0..trace.len() {
            if trace[i] > 1.0 {
                let is_local_max = i + 1 >= trace.len() || trace[i + 1] - trace[i] < 0.0;
                if is_local_max {
                    rightmost = Some(i);
                }
            }
        }
        let Some(i) = rightmost else { break };
        let excess = trace[i] - 1.0;
        for v in trace[i..].iter_mut() {
            *v -= excess;
        }
        for v in trace[..i].iter_mut() {
            if *v > 1.0 {
                *v = 1.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChargingCurve, Trip, VehicleTypeEntry};
    use crate::soc_curve::CurveParams;

    fn rotation() -> Rotation {
        Rotation {
            id: "r1".into(),
            trips: vec![
                Trip {
                    arrival_time: SimMinutes(10.0),
                    departure_time: SimMinutes(0.0),
                    arrival_name: "stopA".into(),
                    distance_km: 5.0,
                    consumption_kwh: 10.0,
                },
                Trip {
                    arrival_time: SimMinutes(60.0),
                    departure_time: SimMinutes(40.0),
                    arrival_name: "stopB".into(),
                    distance_km: 5.0,
                    consumption_kwh: 10.0,
                },
            ],
            vehicle_id: "bus1_oppb".into(),
            vehicle_type: "articulated".into(),
            charging_type: ChargingType::Oppb,
            capacity_kwh: 300.0,
        }
    }

    fn curve_tables() -> HashMap<(String, ChargingType), SocTimeTable> {
        let _entry = VehicleTypeEntry {
            capacity_kwh: 300.0,
            charging_curve: ChargingCurve(vec![(0.0, 150.0), (1.0, 150.0)]),
        };
        let mut map = HashMap::new();
        map.insert(
            ("articulated".to_string(), ChargingType::Oppb),
            SocTimeTable::build(
                &ChargingCurve(vec![(0.0, 150.0), (1.0, 150.0)]),
                CurveParams {
                    capacity_kwh: 300.0,
                    grid_cap_kw: f64::INFINITY,
                    efficiency: 0.95,
                    step_min: 1.0,
                },
            ),
        );
        map
    }

    fn cfg() -> KernelConfig {
        KernelConfig {
            sim_start: SimMinutes(0.0),
            step_min: 1.0,
            default_buffer_min: 0.0,
            min_charging_time_min: 0.0,
        }
    }

    #[test]
    fn apply_station_raises_soc_without_exceeding_one() {
        let mut trace = vec![0.5; 100];
        let rotation = rotation();
        apply_station(&mut trace, &rotation, "stopA", &curve_tables(), &HashMap::new(), &cfg()).unwrap();
        assert!(trace[15] > 0.5);
        assert!(trace.iter().all(|v| *v <= 1.0 + 1e-9));
    }

    #[test]
    fn clip_to_one_removes_overshoot() {
        let mut trace = vec![0.5, 0.9, 1.3, 1.1, 0.8];
        clip_to_one(&mut trace);
        assert!(trace.iter().all(|v| *v <= 1.0 + 1e-9));
    }

    #[test]
    fn unrelated_station_is_a_no_op() {
        let mut trace = vec![0.5; 100];
        let before = trace.clone();
        apply_station(&mut trace, &rotation(), "otherStop", &curve_tables(), &HashMap::new(), &cfg()).unwrap();
        assert_eq!(trace, before);
    }
}
