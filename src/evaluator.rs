//! Ranks each candidate station in a group by the SoC energy it could
//! plausibly deliver across the group's events.

use std::collections::{BTreeSet, HashMap};

use ordered_float::OrderedFloat;

use crate::domain::{ChargingType, ElectrifiedStations, SimMinutes, StationBufferTimes};
use crate::events::Event;
use crate::grouping::Group;
use crate::optimizer::memo::{fingerprint, DecisionTreeMemo};
use crate::soc_curve::SocTimeTable;

#[derive(Debug, Clone)]
pub struct StationEval {
    pub station: String,
    pub pot_sum: f64,
    pub per_event: Vec<(usize, f64)>,
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub sim_start: SimMinutes,
    pub step_min: f64,
    pub soc_lower_threshold: f64,
    pub soc_upper_threshold: f64,
    pub default_buffer_min: f64,
    pub min_charging_time_min: f64,
}

fn time_to_idx(t: SimMinutes, sim_start: SimMinutes, step_min: f64) -> usize {
    (((t.0 - sim_start.0) / step_min).floor().max(0.0)) as usize
}

pub(crate) fn standing_time_for_arrival(
    arrival: SimMinutes,
    next_departure: Option<SimMinutes>,
    buffer_min: f64,
    min_charging_time_min: f64,
) -> f64 {
    let gap = match next_departure {
        Some(dep) => (dep.0 - arrival.0 - buffer_min).max(0.0),
        None => 0.0,
    };
    if gap < min_charging_time_min {
        0.0
    } else {
        gap
    }
}

/// Score every candidate station in `group` against the given sanitized
/// SoC traces (keyed by `vehicle_id`), substituting memoized
/// delta-missing-energy where the decision tree already visited
/// `electrified ∪ {station}`.
pub fn evaluate_stations(
    group: &Group,
    traces: &HashMap<String, Vec<f64>>,
    curve_tables: &HashMap<(String, ChargingType), SocTimeTable>,
    buffer_tables: &HashMap<String, StationBufferTimes>,
    cfg: &EvaluatorConfig,
    electrified: &ElectrifiedStations,
    memo: &DecisionTreeMemo,
) -> Vec<StationEval> {
    let mut by_station: HashMap<String, StationEval> = HashMap::new();

    for (event_idx, event) in group.events.iter().enumerate() {
        for (trip_idx, trip) in event.trips.iter().enumerate() {
            if !event.candidate_stations.contains(&trip.arrival_name) {
                continue;
            }
            let Some(trace) = traces.get(&event.vehicle_id) else {
                continue;
            };
            let idx = time_to_idx(trip.arrival_time, cfg.sim_start, cfg.step_min);
            let Some(&soc_at_arrival) = trace.get(idx) else {
                continue;
            };

            let max_soc = cfg.soc_upper_threshold;
            let lo = cfg.soc_lower_threshold;
            let delta_soc_pot = (max_soc - soc_at_arrival)
                .min(lo - event.min_soc)
                .min(soc_at_arrival - event.min_soc)
                .min(max_soc - lo);

            let next_departure = event.trips.get(trip_idx + 1).map(|t| t.departure_time);
            let buffer = buffer_tables
                .get(&trip.arrival_name)
                .map(|t| t.resolve(trip.arrival_time.hour_of_day(), cfg.default_buffer_min))
                .unwrap_or(cfg.default_buffer_min);
            let standing = standing_time_for_arrival(
                trip.arrival_time,
                next_departure,
                buffer,
                cfg.min_charging_time_min,
            );

            let Some(curve) = curve_tables.get(&(event.vehicle_type.clone(), event.charging_type)) else {
                continue;
            };
            let e_charge_pot = curve.delta_soc(soc_at_arrival, standing) * event.capacity_kwh;
            let e_pot = (delta_soc_pot * event.capacity_kwh).min(e_charge_pot).max(0.0);

            let entry = by_station
                .entry(trip.arrival_name.clone())
                .or_insert_with(|| StationEval {
                    station: trip.arrival_name.clone(),
                    pot_sum: 0.0,
                    per_event: Vec::new(),
                });
            entry.pot_sum += e_pot;
            entry.per_event.push((event_idx, e_pot));
        }
    }

    let mut result: Vec<StationEval> = by_station.into_values().collect();
    for entry in &mut result {
        let mut candidate_set: BTreeSet<String> = electrified.names().map(String::from).collect();
        candidate_set.insert(entry.station.clone());
        if let Some(memoized) = memo.get(&fingerprint(&candidate_set)) {
            entry.pot_sum = memoized.missing_energy;
        }
    }
    result.sort_by_key(|e| std::cmp::Reverse(OrderedFloat(e.pot_sum)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChargingCurve, Trip};
    use crate::soc_curve::CurveParams;

    fn cfg() -> EvaluatorConfig {
        EvaluatorConfig {
            sim_start: SimMinutes(0.0),
            step_min: 1.0,
            soc_lower_threshold: 0.2,
            soc_upper_threshold: 0.8,
            default_buffer_min: 0.0,
            min_charging_time_min: 0.0,
        }
    }

    fn group_with_one_event() -> Group {
        let trip = Trip {
            arrival_time: SimMinutes(10.0),
            departure_time: SimMinutes(40.0),
            arrival_name: "stopA".into(),
            distance_km: 5.0,
            consumption_kwh: 10.0,
        };
        let event = Event {
            rotation_id: "r1".into(),
            vehicle_id: "bus1_oppb".into(),
            vehicle_type: "articulated".into(),
            charging_type: ChargingType::Oppb,
            start_idx: 0,
            min_idx: 10,
            end_idx: 20,
            min_soc: 0.1,
            capacity_kwh: 300.0,
            trips: vec![trip],
            candidate_stations: ["stopA".to_string()].into_iter().collect(),
        };
        Group {
            events: vec![event],
            stations: ["stopA".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn scores_candidate_station_positively() {
        let group = group_with_one_event();
        let mut traces = HashMap::new();
        traces.insert("bus1_oppb".to_string(), vec![0.5; 50]);
        let mut curve_tables = HashMap::new();
        curve_tables.insert(
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
        let buffer_tables = HashMap::new();
        let electrified = ElectrifiedStations::default();
        let memo = DecisionTreeMemo::default();

        let evals = evaluate_stations(&group, &traces, &curve_tables, &buffer_tables, &cfg(), &electrified, &memo);
        assert_eq!(evals.len(), 1);
        assert!(evals[0].pot_sum > 0.0);
    }

    #[test]
    fn memo_substitutes_pot_sum() {
        let group = group_with_one_event();
        let mut traces = HashMap::new();
        traces.insert("bus1_oppb".to_string(), vec![0.5; 50]);
        let mut curve_tables = HashMap::new();
        curve_tables.insert(
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
        let buffer_tables = HashMap::new();
        let electrified = ElectrifiedStations::default();
        let mut memo = DecisionTreeMemo::default();
        let mut set = BTreeSet::new();
        set.insert("stopA".to_string());
        memo.record(fingerprint(&set), -42.0);

        let evals = evaluate_stations(&group, &traces, &curve_tables, &buffer_tables, &cfg(), &electrified, &memo);
        assert_eq!(evals[0].pot_sum, -42.0);
    }
}
