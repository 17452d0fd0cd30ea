//! The two choice functions the search driver can call: a greedy
//! step-by-step picker and a bounded brute-force enumerator.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::domain::ElectrifiedStations;
use crate::evaluator::StationEval;

use super::memo::{fingerprint, DecisionTreeMemo};

#[derive(Debug, Clone)]
pub struct ChoiceResult {
    pub station_ids: Option<BTreeSet<String>>,
    pub recursive: bool,
}

impl ChoiceResult {
    fn none() -> Self {
        Self {
            station_ids: None,
            recursive: false,
        }
    }
}

/// Lazily yields ordered subsets of `items` of size `k`, in the order
/// `items` are given (lexicographic, without replacement).
pub fn combinations(items: &[String], k: usize) -> impl Iterator<Item = Vec<String>> + '_ {
    items.iter().cloned().combinations(k)
}

/// Step-by-step greedy choice (spec §4.5.1).
///
/// `missing_energy` is expected to be negative (a deficit); the bound prune
/// compares the sum of the top `Δ` potentials against `-missing_energy`.
pub fn step_by_step_choice(
    ranked: &[StationEval],
    electrified: &ElectrifiedStations,
    memo: &DecisionTreeMemo,
    pre_optimized_set: Option<&BTreeSet<String>>,
    missing_energy: f64,
) -> ChoiceResult {
    if ranked.is_empty() {
        return ChoiceResult::none();
    }

    if let Some(pre) = pre_optimized_set {
        let delta = pre.len() as i64 - electrified.len() as i64;
        if delta > 0 {
            let top_sum: f64 = ranked.iter().take(delta as usize).map(|e| e.pot_sum).sum();
            if top_sum <= -missing_energy {
                return ChoiceResult::none();
            }
        }
    }

    let mut least_visited: Option<(&StationEval, u32)> = None;
    for candidate in ranked {
        if electrified.contains(&candidate.station) {
            continue;
        }
        let mut extended: BTreeSet<String> = electrified.names().map(String::from).collect();
        extended.insert(candidate.station.clone());
        let fp = fingerprint(&extended);
        if !memo.contains(&fp) {
            return ChoiceResult {
                station_ids: Some(extended),
                recursive: true,
            };
        }
        let visits = memo.visit_counter(&fp);
        if least_visited.map(|(_, v)| visits < v).unwrap_or(true) {
            least_visited = Some((candidate, visits));
        }
    }

    // Every extension has already been visited by the memo. This is the
    // "for...else" branch: reachable, not dead, and the only way to reach
    // the least-visited tie-break. We keep descending (recursive = true)
    // so diversification can still make progress on a later pass.
    match least_visited {
        Some((candidate, _)) => {
            let mut extended: BTreeSet<String> = electrified.names().map(String::from).collect();
            extended.insert(candidate.station.clone());
            ChoiceResult {
                station_ids: Some(extended),
                recursive: true,
            }
        }
        None => ChoiceResult::none(),
    }
}

/// Bounded brute choice (spec §4.5.2): enumerate combinations of
/// `pre_optimized_set.len()` stations drawn from the ranked evaluator keys,
/// returning the first unseen combination whose summed potential clears
/// 80% of the absolute missing energy.
pub fn bounded_brute_choice(
    ranked: &[StationEval],
    pre_optimized_set: &BTreeSet<String>,
    memo: &DecisionTreeMemo,
    missing_energy: f64,
) -> ChoiceResult {
    let k = pre_optimized_set.len();
    if k == 0 || ranked.len() < k {
        return ChoiceResult::none();
    }
    let keys: Vec<String> = ranked.iter().map(|e| e.station.clone()).collect();
    let pot: std::collections::HashMap<&str, f64> =
        ranked.iter().map(|e| (e.station.as_str(), e.pot_sum)).collect();

    for combo in combinations(&keys, k) {
        let set: BTreeSet<String> = combo.into_iter().collect();
        let fp = fingerprint(&set);
        if memo.contains(&fp) {
            continue;
        }
        let sum: f64 = set.iter().map(|s| pot.get(s.as_str()).copied().unwrap_or(0.0)).sum();
        if sum > 0.8 * missing_energy.abs() {
            return ChoiceResult {
                station_ids: Some(set),
                recursive: false,
            };
        }
    }
    ChoiceResult::none()
}
