//! Wraps the whole optimization in a bounded restart loop (§4.8): after a
//! full pass, rotations that could not be electrified are excluded and a
//! fresh baseline is requested from the external simulator.

use std::collections::{BTreeSet, HashMap};

use crate::config::{Config, OptType};
use crate::domain::{ChargingCurve, ChargingType, ElectrifiedStations, Rotation, SimMinutes, SocSample, StationBufferTimes, VehicleTypeRegistry};
use crate::error::OptimizerError;
use crate::evaluator::EvaluatorConfig;
use crate::events::{extract_events, sanitize, ExtractorConfig};
use crate::grouping::group_events;
use crate::kernel::{self, KernelConfig};
use crate::optimizer::driver::{run_deep, run_greedy, SearchContext};
use crate::optimizer::memo::DecisionTreeMemo;
use crate::simulator::{BaselineScenario, EnergySimulator};
use crate::soc_curve::{CurveParams, SocTimeTable};

/// Threshold and timing parameters that the search needs but that §6's
/// INI key table does not carry (they come from the scenario/vehicle
/// definitions, not from operator-facing configuration).
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub soc_lower_threshold: f64,
    pub soc_upper_threshold: f64,
    pub relative_soc: bool,
    pub filter_standing_time: bool,
    pub default_buffer_min: f64,
    pub min_charging_time_min: f64,
}

#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub electrified: ElectrifiedStations,
    pub could_not_electrify: BTreeSet<String>,
    pub restart_loops_used: u32,
}

/// Builds one SoC-vs-time table per registry entry, applying any `[VEHICLE]`
/// overrides from `cfg` uniformly across every vehicle type and charging
/// type (mirroring how the override section is a single flat table, not
/// keyed per vehicle type).
fn build_curve_tables(
    registry: &VehicleTypeRegistry,
    grid_cap_kw: f64,
    cfg: &Config,
    step_min: f64,
) -> HashMap<(String, ChargingType), SocTimeTable> {
    registry
        .iter()
        .map(|((vehicle_type, charging_type), entry)| {
            let capacity_kwh = cfg.battery_capacity_kwh.unwrap_or(entry.capacity_kwh);
            let curve = cfg.charging_curve.as_ref().unwrap_or(&entry.charging_curve);
            let curve = match cfg.charging_power_kw {
                Some(max_power) => ChargingCurve(curve.0.iter().map(|&(soc, power)| (soc, power.min(max_power))).collect()),
                None => curve.clone(),
            };
            let table = SocTimeTable::build(
                &curve,
                CurveParams {
                    capacity_kwh,
                    grid_cap_kw,
                    efficiency: cfg.charge_eff,
                    step_min,
                },
            );
            ((vehicle_type.clone(), *charging_type), table)
        })
        .collect()
}

/// One full pass: simulate a baseline, extract events for every
/// non-excluded rotation, group them, and run the search driver on every
/// group. Returns the full electrified set (seed plus whatever the search
/// added) and the rotation ids that could not be electrified this pass.
fn run_one_pass(
    simulator: &dyn EnergySimulator,
    rotations: &[Rotation],
    registry: &VehicleTypeRegistry,
    buffer_tables: &HashMap<String, StationBufferTimes>,
    cfg: &Config,
    thresholds: &Thresholds,
    excluded_rotations: &BTreeSet<String>,
) -> Result<(ElectrifiedStations, BTreeSet<String>), OptimizerError> {
    let active: Vec<Rotation> = rotations
        .iter()
        .filter(|r| !excluded_rotations.contains(&r.id) && !cfg.exclusion_rots.contains(&r.id))
        .cloned()
        .collect();

    let mut seed = ElectrifiedStations::default();
    for station in &cfg.inclusion_stations {
        seed.electrify(station.clone());
    }

    let scenario: BaselineScenario = simulator.run(&active, &seed)?;
    let step_min = scenario.step_min();
    let sim_start = SimMinutes(scenario.start_time_min);
    let curve_tables = build_curve_tables(registry, scenario.cs_power_opps_kw, cfg, step_min);

    let rotations_by_id: HashMap<String, Rotation> = active.iter().cloned().map(|r| (r.id.clone(), r)).collect();

    let mut traces: HashMap<String, Vec<f64>> = HashMap::new();
    for rotation in &active {
        let Some(raw) = scenario.soc_traces.get(&rotation.vehicle_id) else {
            continue;
        };
        let samples: Vec<SocSample> = raw.iter().map(|v| v.map(SocSample::Known).unwrap_or(SocSample::Unknown)).collect();
        traces.insert(rotation.vehicle_id.clone(), sanitize(&samples));
    }

    // Force-electrify the inclusion set before any events are extracted, so
    // they never reappear as candidates and their effect is already baked
    // into the traces the extractor sees.
    let kernel_cfg = KernelConfig {
        sim_start,
        step_min,
        default_buffer_min: thresholds.default_buffer_min,
        min_charging_time_min: thresholds.min_charging_time_min,
    };
    for rotation in &active {
        let Some(trace) = traces.get_mut(&rotation.vehicle_id) else {
            continue;
        };
        for station in &cfg.inclusion_stations {
            kernel::apply_station(trace, rotation, station, &curve_tables, buffer_tables, &kernel_cfg)?;
        }
    }

    let mut excluded_for_candidates = cfg.exclusion_stations.clone();
    excluded_for_candidates.extend(cfg.inclusion_stations.iter().cloned());

    let extractor_cfg = ExtractorConfig {
        sim_start,
        step_min,
        soc_lower_threshold: thresholds.soc_lower_threshold,
        soc_upper_threshold: thresholds.soc_upper_threshold,
        relative_soc: thresholds.relative_soc,
        filter_standing_time: thresholds.filter_standing_time,
        default_buffer_min: thresholds.default_buffer_min,
        min_charging_time_min: thresholds.min_charging_time_min,
        exclusion_stations: excluded_for_candidates,
    };
    let evaluator_cfg = EvaluatorConfig {
        sim_start,
        step_min,
        soc_lower_threshold: thresholds.soc_lower_threshold,
        soc_upper_threshold: thresholds.soc_upper_threshold,
        default_buffer_min: thresholds.default_buffer_min,
        min_charging_time_min: thresholds.min_charging_time_min,
    };

    let mut all_events = Vec::new();
    for rotation in &active {
        let Some(trace_f64) = traces.get(&rotation.vehicle_id) else {
            continue;
        };
        let samples: Vec<SocSample> = trace_f64.iter().map(|v| SocSample::Known(*v)).collect();
        all_events.extend(extract_events(&samples, rotation, rotation.capacity_kwh, &extractor_cfg, buffer_tables));
    }

    let (groups, impossible) = group_events(all_events);
    let mut could_not_electrify: BTreeSet<String> = impossible.into_iter().map(|e| e.rotation_id).collect();

    let ctx = SearchContext {
        rotations: &rotations_by_id,
        curve_tables: &curve_tables,
        buffer_tables,
        extractor_cfg: extractor_cfg.clone(),
        evaluator_cfg: evaluator_cfg.clone(),
        kernel_cfg: kernel_cfg.clone(),
    };
    let mut memo = DecisionTreeMemo::default();
    let mut electrified = seed;

    for group in &groups {
        let outcome = match cfg.opt_type {
            OptType::Deep => run_deep(group, &traces, &mut memo, &ctx, &electrified, cfg.max_brute_loop)?,
            OptType::Greedy => {
                let mut branch_traces = traces.clone();
                run_greedy(group, &mut branch_traces, &mut memo, &ctx, &electrified)?
            }
        };
        electrified = outcome.electrified;
        could_not_electrify.extend(outcome.could_not_electrify);
    }

    Ok((electrified, could_not_electrify))
}

/// Run the optimization to completion, restarting up to
/// `cfg.max_restart_loops` times when `cfg.remove_impossible_rots` is set
/// and a pass leaves rotations unsolved.
pub fn run_with_restarts(
    simulator: &dyn EnergySimulator,
    rotations: &[Rotation],
    registry: &VehicleTypeRegistry,
    buffer_tables: &HashMap<String, StationBufferTimes>,
    cfg: &Config,
    thresholds: &Thresholds,
) -> Result<OptimizationOutcome, OptimizerError> {
    let mut excluded_rotations: BTreeSet<String> = BTreeSet::new();
    let mut restart_loops_used = 0;

    loop {
        let (electrified, could_not_electrify) =
            run_one_pass(simulator, rotations, registry, buffer_tables, cfg, thresholds, &excluded_rotations)?;

        if could_not_electrify.is_empty() || !cfg.remove_impossible_rots || restart_loops_used >= cfg.max_restart_loops {
            return Ok(OptimizationOutcome {
                electrified,
                could_not_electrify,
                restart_loops_used,
            });
        }

        excluded_rotations.extend(could_not_electrify);
        restart_loops_used += 1;
    }
}
