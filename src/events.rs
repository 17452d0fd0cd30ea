//! Mines below-threshold SoC excursions ("events") out of a baseline
//! vehicle-SoC timeseries, one rotation at a time.

use std::collections::BTreeSet;

use crate::domain::{ChargingType, Rotation, SimMinutes, SocSample, StationBufferTimes, Trip};

#[derive(Debug, Clone)]
pub struct Event {
    pub rotation_id: String,
    pub vehicle_id: String,
    pub vehicle_type: String,
    pub charging_type: ChargingType,
    pub start_idx: usize,
    pub min_idx: usize,
    pub end_idx: usize,
    pub min_soc: f64,
    pub capacity_kwh: f64,
    pub trips: Vec<Trip>,
    pub candidate_stations: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub sim_start: SimMinutes,
    pub step_min: f64,
    pub soc_lower_threshold: f64,
    pub soc_upper_threshold: f64,
    pub relative_soc: bool,
    pub filter_standing_time: bool,
    pub default_buffer_min: f64,
    pub min_charging_time_min: f64,
    pub exclusion_stations: BTreeSet<String>,
}

/// `999.0` marks a SoC sample that was never assigned a known value even
/// after back-propagation (i.e. every later sample in the rotation is also
/// unknown). The extractor treats it as comfortably "not in deficit".
pub const UNKNOWN_SENTINEL: f64 = 999.0;

/// Replace `Unknown` samples with the nearest later known value; fall back
/// to [`UNKNOWN_SENTINEL`] for trailing runs with no later known value at all.
pub fn sanitize(trace: &[SocSample]) -> Vec<f64> {
    let mut out = vec![0.0; trace.len()];
    let mut next_known: Option<f64> = None;
    for i in (0..trace.len()).rev() {
        match trace[i] {
            SocSample::Known(v) => {
                out[i] = v;
                next_known = Some(v);
            }
            SocSample::Unknown => {
                out[i] = next_known.unwrap_or(UNKNOWN_SENTINEL);
            }
        }
    }
    out
}

fn time_to_idx(t: SimMinutes, sim_start: SimMinutes, step_min: f64) -> usize {
    (((t.0 - sim_start.0) / step_min).floor().max(0.0)) as usize
}

/// Find the index of the minimum value within `[start, end)`; ties resolve
/// to the earliest index, matching a left-to-right scan.
fn argmin(soc: &[f64], start: usize, end: usize) -> usize {
    let mut best = start;
    for i in start..end {
        if soc[i] < soc[best] {
            best = i;
        }
    }
    best
}

fn buffer_time_for(trip: &Trip, table: Option<&StationBufferTimes>, default_buffer_min: f64) -> f64 {
    match table {
        Some(t) => t.resolve(trip.arrival_time.hour_of_day(), default_buffer_min),
        None => default_buffer_min,
    }
}

fn standing_time_min(trip: &Trip, next_departure: Option<SimMinutes>, buffer_min: f64, min_charging_time_min: f64) -> f64 {
    let gap = match next_departure {
        Some(dep) => (dep.0 - trip.arrival_time.0 - buffer_min).max(0.0),
        None => 0.0,
    };
    if gap < min_charging_time_min {
        0.0
    } else {
        gap
    }
}

/// Extract all events for one rotation against its sanitized SoC trace.
pub fn extract_events(
    trace: &[SocSample],
    rotation: &Rotation,
    capacity_kwh: f64,
    cfg: &ExtractorConfig,
    buffer_tables: &std::collections::HashMap<String, StationBufferTimes>,
) -> Vec<Event> {
    let soc = sanitize(trace);
    let rot_start = rotation.start_idx(cfg.sim_start, cfg.step_min);
    let rot_end = (rotation.end_idx(cfg.sim_start, cfg.step_min) + 1).min(soc.len());
    if rot_start >= rot_end {
        return Vec::new();
    }

    let (lo_cur, hi_cur) = if cfg.relative_soc {
        let start_soc = soc[rot_start];
        let gap = cfg.soc_upper_threshold - cfg.soc_lower_threshold;
        let lo = start_soc.min(cfg.soc_upper_threshold) - gap;
        (lo, lo + gap)
    } else {
        (cfg.soc_lower_threshold, cfg.soc_upper_threshold)
    };

    let mut events = Vec::new();
    let mut pending = vec![(rot_start, rot_end)];

    while let Some((w_start, w_end)) = pending.pop() {
        if w_start >= w_end {
            continue;
        }
        let min_idx = argmin(&soc, w_start, w_end);
        let min_soc = soc[min_idx];
        if min_soc >= lo_cur {
            continue;
        }

        let mut left = min_idx;
        while left > w_start && soc[left] < hi_cur {
            left -= 1;
        }
        let mut right = min_idx;
        while right + 1 < w_end && soc[right] < hi_cur {
            right += 1;
        }

        let trips_in_window: Vec<Trip> = rotation
            .trips
            .iter()
            .filter(|t| {
                let idx = time_to_idx(t.arrival_time, cfg.sim_start, cfg.step_min);
                idx >= left && idx <= right
            })
            .cloned()
            .collect();

        let candidate_stations = candidate_stations_for(rotation, cfg, buffer_tables, left, min_idx);

        events.push(Event {
            rotation_id: rotation.id.clone(),
            vehicle_id: rotation.vehicle_id.clone(),
            vehicle_type: rotation.vehicle_type.clone(),
            charging_type: rotation.charging_type,
            start_idx: left,
            min_idx,
            end_idx: right,
            min_soc,
            capacity_kwh,
            trips: trips_in_window,
            candidate_stations,
        });

        if left > w_start {
            pending.push((w_start, left));
        }
        if right + 1 < w_end {
            pending.push((right + 1, w_end));
        }
    }

    events
}

fn candidate_stations_for(
    rotation: &Rotation,
    cfg: &ExtractorConfig,
    buffer_tables: &std::collections::HashMap<String, StationBufferTimes>,
    start_idx: usize,
    min_idx: usize,
) -> BTreeSet<String> {
    let mut stations = BTreeSet::new();
    for (i, trip) in rotation.trips.iter().enumerate() {
        let idx = time_to_idx(trip.arrival_time, cfg.sim_start, cfg.step_min);
        if idx < start_idx || idx > min_idx {
            continue;
        }
        if cfg.filter_standing_time {
            let next_departure = rotation.trips.get(i + 1).map(|t| t.departure_time);
            let buffer = buffer_time_for(trip, buffer_tables.get(&trip.arrival_name), cfg.default_buffer_min);
            let standing = standing_time_min(trip, next_departure, buffer, cfg.min_charging_time_min);
            if standing <= 0.0 {
                continue;
            }
        }
        stations.insert(trip.arrival_name.clone());
    }
    for forbidden in &cfg.exclusion_stations {
        stations.remove(forbidden);
    }
    stations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SimMinutes;

    fn trip(arrival_min: f64, departure_min: f64, name: &str) -> Trip {
        Trip {
            arrival_time: SimMinutes(arrival_min),
            departure_time: SimMinutes(departure_min),
            arrival_name: name.to_string(),
            distance_km: 5.0,
            consumption_kwh: 10.0,
        }
    }

    fn rotation_with(trips: Vec<Trip>) -> Rotation {
        Rotation {
            id: "r1".into(),
            trips,
            vehicle_id: "bus1_oppb".into(),
            vehicle_type: "articulated".into(),
            charging_type: ChargingType::Oppb,
            capacity_kwh: 300.0,
        }
    }

    fn cfg() -> ExtractorConfig {
        ExtractorConfig {
            sim_start: SimMinutes(0.0),
            step_min: 1.0,
            soc_lower_threshold: 0.2,
            soc_upper_threshold: 0.8,
            relative_soc: false,
            filter_standing_time: false,
            default_buffer_min: 0.0,
            min_charging_time_min: 0.0,
            exclusion_stations: BTreeSet::new(),
        }
    }

    #[test]
    fn sanitize_back_propagates_and_falls_back_to_sentinel() {
        let trace = vec![
            SocSample::Unknown,
            SocSample::Known(0.5),
            SocSample::Unknown,
            SocSample::Unknown,
        ];
        let out = sanitize(&trace);
        assert_eq!(out, vec![0.5, 0.5, UNKNOWN_SENTINEL, UNKNOWN_SENTINEL]);
    }

    #[test]
    fn extracts_single_deficit_event() {
        let trips = vec![trip(0.0, 1.0, "depot"), trip(5.0, 6.0, "stopA")];
        let rotation = rotation_with(trips);
        let mut trace = vec![SocSample::Known(0.9); 10];
        trace[5] = SocSample::Known(0.1);
        let buffer_tables = std::collections::HashMap::new();

        let events = extract_events(&trace, &rotation, 300.0, &cfg(), &buffer_tables);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].min_idx, 5);
        assert!(events[0].min_soc < 0.2);
    }

    #[test]
    fn no_event_when_never_below_threshold() {
        let trips = vec![trip(0.0, 1.0, "depot")];
        let rotation = rotation_with(trips);
        let trace = vec![SocSample::Known(0.5); 5];
        let buffer_tables = std::collections::HashMap::new();
        let events = extract_events(&trace, &rotation, 300.0, &cfg(), &buffer_tables);
        assert!(events.is_empty());
    }

    #[test]
    fn forbidden_station_excluded_from_candidates() {
        let trips = vec![trip(0.0, 1.0, "depot"), trip(3.0, 4.0, "stopA")];
        let rotation = rotation_with(trips);
        let mut trace = vec![SocSample::Known(0.9); 10];
        trace[3] = SocSample::Known(0.1);
        let mut c = cfg();
        c.exclusion_stations.insert("stopA".to_string());
        let buffer_tables = std::collections::HashMap::new();

        let events = extract_events(&trace, &rotation, 300.0, &c, &buffer_tables);
        assert_eq!(events.len(), 1);
        assert!(!events[0].candidate_stations.contains("stopA"));
    }
}
