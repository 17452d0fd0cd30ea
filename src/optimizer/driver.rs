//! Recursively electrifies stations for one group, using either the
//! step-by-step or bounded-brute choice function, until no missing energy
//! remains or the search is exhausted.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{ChargingType, ElectrifiedStations, Rotation, SocSample, StationBufferTimes};
use crate::error::OptimizerError;
use crate::evaluator::{evaluate_stations, EvaluatorConfig};
use crate::events::{extract_events, Event, ExtractorConfig};
use crate::grouping::{group_events, Group};
use crate::kernel::{self, KernelConfig};
use crate::soc_curve::SocTimeTable;

use super::choice::{bounded_brute_choice, step_by_step_choice, ChoiceResult};
use super::memo::{fingerprint, DecisionTreeMemo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChoice {
    StepByStep,
    Brute,
}

pub struct SearchContext<'a> {
    pub rotations: &'a HashMap<String, Rotation>,
    pub curve_tables: &'a HashMap<(String, ChargingType), SocTimeTable>,
    pub buffer_tables: &'a HashMap<String, StationBufferTimes>,
    pub extractor_cfg: ExtractorConfig,
    pub evaluator_cfg: EvaluatorConfig,
    pub kernel_cfg: KernelConfig,
}

#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub electrified: ElectrifiedStations,
    pub could_not_electrify: BTreeSet<String>,
    pub success: bool,
}

fn missing_energy(events: &[Event], lo: f64) -> f64 {
    events.iter().map(|e| (e.min_soc - lo).min(0.0)).sum()
}

fn electrified_fingerprint(stations: &ElectrifiedStations) -> String {
    fingerprint(&stations.names().map(String::from).collect())
}

fn rollback_to(pre_optimized_set: &BTreeSet<String>) -> ElectrifiedStations {
    let mut rolled = ElectrifiedStations::default();
    for station in pre_optimized_set {
        rolled.electrify(station.clone());
    }
    rolled
}

/// One descent of the recursive search over `group`. `traces` holds the
/// current (mutable) sanitized SoC traces keyed by `vehicle_id`; callers
/// clone the baseline before a branch and only keep the mutation if the
/// branch succeeds.
pub fn group_optimization(
    group: &Group,
    base_group: &Group,
    traces: &mut HashMap<String, Vec<f64>>,
    electrified: &ElectrifiedStations,
    pre_optimized_set: Option<&BTreeSet<String>>,
    memo: &mut DecisionTreeMemo,
    ctx: &SearchContext,
    node_choice: NodeChoice,
) -> Result<GroupOutcome, OptimizerError> {
    let lo = ctx.evaluator_cfg.soc_lower_threshold;
    let me = missing_energy(&group.events, lo);
    if me >= 0.0 {
        return Ok(GroupOutcome {
            electrified: electrified.clone(),
            could_not_electrify: BTreeSet::new(),
            success: true,
        });
    }

    let ranked = evaluate_stations(
        group,
        traces,
        ctx.curve_tables,
        ctx.buffer_tables,
        &ctx.evaluator_cfg,
        electrified,
        memo,
    );

    let choice: ChoiceResult = match node_choice {
        NodeChoice::StepByStep => step_by_step_choice(&ranked, electrified, memo, pre_optimized_set, me),
        NodeChoice::Brute => match pre_optimized_set {
            Some(pre) => bounded_brute_choice(&ranked, pre, memo, me),
            None => ChoiceResult {
                station_ids: None,
                recursive: false,
            },
        },
    };

    let Some(chosen) = choice.station_ids else {
        return match pre_optimized_set {
            Some(pre) => Ok(GroupOutcome {
                electrified: rollback_to(pre),
                could_not_electrify: BTreeSet::new(),
                success: false,
            }),
            None => {
                let rotation_ids: BTreeSet<String> = group.events.iter().map(|e| e.rotation_id.clone()).collect();
                Ok(GroupOutcome {
                    electrified: electrified.clone(),
                    could_not_electrify: rotation_ids,
                    success: false,
                })
            }
        };
    };

    let mut new_electrified = electrified.clone();
    for station in &chosen {
        new_electrified.electrify(station.clone());
    }
    let newly_added: Vec<String> = chosen.iter().filter(|s| !electrified.contains(s)).cloned().collect();

    let rotation_ids: BTreeSet<String> = group.events.iter().map(|e| e.rotation_id.clone()).collect();
    for rot_id in &rotation_ids {
        let Some(rotation) = ctx.rotations.get(rot_id) else { continue };
        let Some(trace) = traces.get_mut(&rotation.vehicle_id) else { continue };
        for station in &newly_added {
            kernel::apply_station(trace, rotation, station, ctx.curve_tables, ctx.buffer_tables, &ctx.kernel_cfg)?;
        }
    }

    let mut new_events = Vec::new();
    for rot_id in &rotation_ids {
        let Some(rotation) = ctx.rotations.get(rot_id) else { continue };
        let Some(trace_f64) = traces.get(&rotation.vehicle_id) else { continue };
        let sanitized: Vec<SocSample> = trace_f64.iter().map(|v| SocSample::Known(*v)).collect();
        new_events.extend(extract_events(
            &sanitized,
            rotation,
            rotation.capacity_kwh,
            &ctx.extractor_cfg,
            ctx.buffer_tables,
        ));
    }

    let base_rotation_ids: BTreeSet<String> = base_group.events.iter().map(|e| e.rotation_id.clone()).collect();
    let mut base_events = Vec::new();
    for rot_id in &base_rotation_ids {
        let Some(rotation) = ctx.rotations.get(rot_id) else { continue };
        let Some(trace_f64) = traces.get(&rotation.vehicle_id) else { continue };
        let sanitized: Vec<SocSample> = trace_f64.iter().map(|v| SocSample::Known(*v)).collect();
        base_events.extend(extract_events(
            &sanitized,
            rotation,
            rotation.capacity_kwh,
            &ctx.extractor_cfg,
            ctx.buffer_tables,
        ));
    }
    let base_me = missing_energy(&base_events, lo);
    memo.record(electrified_fingerprint(&new_electrified), base_me);

    if !choice.recursive {
        return Ok(GroupOutcome {
            electrified: new_electrified,
            could_not_electrify: BTreeSet::new(),
            success: base_me >= 0.0,
        });
    }

    let (subgroups, impossible) = group_events(new_events);
    let mut could_not_electrify: BTreeSet<String> = impossible.into_iter().map(|e| e.rotation_id).collect();
    let mut running_electrified = new_electrified;
    let mut all_success = true;

    for subgroup in &subgroups {
        let outcome = group_optimization(subgroup, base_group, traces, &running_electrified, pre_optimized_set, memo, ctx, node_choice)?;
        running_electrified = outcome.electrified;
        could_not_electrify.extend(outcome.could_not_electrify);
        all_success &= outcome.success;
    }

    Ok(GroupOutcome {
        electrified: running_electrified,
        could_not_electrify,
        success: all_success,
    })
}

/// Single greedy pass until no missing energy remains or the search fails.
/// `seed` carries any stations already electrified up front (e.g. forced
/// inclusions) that the search should build on rather than rediscover.
pub fn run_greedy(
    group: &Group,
    traces: &mut HashMap<String, Vec<f64>>,
    memo: &mut DecisionTreeMemo,
    ctx: &SearchContext,
    seed: &ElectrifiedStations,
) -> Result<GroupOutcome, OptimizerError> {
    group_optimization(group, group, traces, seed, None, memo, ctx, NodeChoice::StepByStep)
}

/// Greedy once, then up to `max_brute_loop` diversifying brute passes that
/// probe whether one fewer station than the current best still suffices.
/// Each pass seeds the bounded brute choice with a set one smaller than the
/// current best (its size is what matters to the combination search, not
/// its membership), keeping whichever succeeding result is smallest.
pub fn run_deep(
    group: &Group,
    traces_baseline: &HashMap<String, Vec<f64>>,
    memo: &mut DecisionTreeMemo,
    ctx: &SearchContext,
    seed: &ElectrifiedStations,
    max_brute_loop: u32,
) -> Result<GroupOutcome, OptimizerError> {
    let mut greedy_traces = traces_baseline.clone();
    let mut best = run_greedy(group, &mut greedy_traces, memo, ctx, seed)?;

    for _ in 0..max_brute_loop {
        if !best.success || best.electrified.is_empty() {
            break;
        }
        let target_size = best.electrified.len() - 1;
        if target_size == 0 {
            break;
        }
        let pre_set: BTreeSet<String> = best.electrified.names().take(target_size).map(String::from).collect();
        let mut trial_traces = traces_baseline.clone();
        let outcome = group_optimization(group, group, &mut trial_traces, seed, Some(&pre_set), memo, ctx, NodeChoice::Brute)?;
        if outcome.success && outcome.electrified.len() < best.electrified.len() {
            best = outcome;
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChargingCurve, SimMinutes, Trip};
    use crate::soc_curve::CurveParams;

    fn trip(arrival: f64, departure: f64, name: &str) -> Trip {
        Trip {
            arrival_time: SimMinutes(arrival),
            departure_time: SimMinutes(departure),
            arrival_name: name.to_string(),
            distance_km: 5.0,
            consumption_kwh: 10.0,
        }
    }

    // arrival times strictly increase and each trip's arrival is at or
    // after its own departure, matching Rotation::validate's invariant.

    fn build_scenario() -> (
        HashMap<String, Rotation>,
        HashMap<(String, ChargingType), SocTimeTable>,
        HashMap<String, StationBufferTimes>,
    ) {
        let rotation = Rotation {
            id: "rot1".into(),
            trips: vec![trip(10.0, 0.0, "depot"), trip(40.0, 30.0, "stopA"), trip(100.0, 90.0, "depot2")],
            vehicle_id: "bus1_oppb".into(),
            vehicle_type: "articulated".into(),
            charging_type: ChargingType::Oppb,
            capacity_kwh: 300.0,
        };
        let mut rotations = HashMap::new();
        rotations.insert(rotation.id.clone(), rotation);

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
        (rotations, curve_tables, HashMap::new())
    }

    #[test]
    fn idempotent_on_already_sufficient_baseline() {
        let (rotations, curve_tables, buffer_tables) = build_scenario();
        let ctx = SearchContext {
            rotations: &rotations,
            curve_tables: &curve_tables,
            buffer_tables: &buffer_tables,
            extractor_cfg: ExtractorConfig {
                sim_start: SimMinutes(0.0),
                step_min: 1.0,
                soc_lower_threshold: 0.2,
                soc_upper_threshold: 0.8,
                relative_soc: false,
                filter_standing_time: false,
                default_buffer_min: 0.0,
                min_charging_time_min: 0.0,
                exclusion_stations: BTreeSet::new(),
            },
            evaluator_cfg: EvaluatorConfig {
                sim_start: SimMinutes(0.0),
                step_min: 1.0,
                soc_lower_threshold: 0.2,
                soc_upper_threshold: 0.8,
                default_buffer_min: 0.0,
                min_charging_time_min: 0.0,
            },
            kernel_cfg: KernelConfig {
                sim_start: SimMinutes(0.0),
                step_min: 1.0,
                default_buffer_min: 0.0,
                min_charging_time_min: 0.0,
            },
        };
        let group = Group {
            events: Vec::new(),
            stations: BTreeSet::new(),
        };
        let mut traces = HashMap::new();
        traces.insert("bus1_oppb".to_string(), vec![0.9; 120]);
        let mut memo = DecisionTreeMemo::default();

        let outcome = run_greedy(&group, &mut traces, &mut memo, &ctx, &ElectrifiedStations::default()).unwrap();
        assert!(outcome.success);
        assert!(outcome.electrified.is_empty());
    }
}
