//! Partitions events into independent subproblems ("groups") by the
//! connectivity of their candidate-station sets.

use std::collections::BTreeSet;

use crate::events::Event;

#[derive(Debug, Clone)]
pub struct Group {
    pub events: Vec<Event>,
    pub stations: BTreeSet<String>,
}

/// Merge a list of station sets into connected components by repeated
/// pairwise-intersection union, continuing until a full pass makes no
/// further merges (a fixed point).
fn join_all_subsets(mut subsets: Vec<BTreeSet<String>>) -> Vec<BTreeSet<String>> {
    loop {
        let mut merged_any = false;
        let mut next: Vec<BTreeSet<String>> = Vec::new();
        'outer: for subset in subsets.drain(..) {
            for existing in next.iter_mut() {
                if !existing.is_disjoint(&subset) {
                    existing.extend(subset);
                    merged_any = true;
                    continue 'outer;
                }
            }
            next.push(subset);
        }
        subsets = next;
        if !merged_any {
            return subsets;
        }
    }
}

/// Split events into connected-component groups and the set of events with
/// no usable candidate station at all ("impossible", reported up to the
/// caller so their rotation can be marked could-not-be-electrified).
///
/// Groups are returned sorted ascending by member-station count, so the
/// search driver prunes the smaller (faster) subproblems first.
pub fn group_events(events: Vec<Event>) -> (Vec<Group>, Vec<Event>) {
    let mut possible = Vec::new();
    let mut impossible = Vec::new();
    for event in events {
        if event.candidate_stations.is_empty() {
            impossible.push(event);
        } else {
            possible.push(event);
        }
    }

    let subsets: Vec<BTreeSet<String>> = possible.iter().map(|e| e.candidate_stations.clone()).collect();
    let components = join_all_subsets(subsets);

    let mut groups: Vec<Group> = components
        .into_iter()
        .map(|stations| Group {
            events: Vec::new(),
            stations,
        })
        .collect();

    for event in possible {
        let idx = groups
            .iter()
            .position(|g| !g.stations.is_disjoint(&event.candidate_stations))
            .expect("every event's stations were folded into some component");
        groups[idx].events.push(event);
    }

    groups.sort_by_key(|g| g.stations.len());
    (groups, impossible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChargingType;

    fn event(stations: &[&str]) -> Event {
        Event {
            rotation_id: "r".into(),
            vehicle_id: "v".into(),
            vehicle_type: "t".into(),
            charging_type: ChargingType::Oppb,
            start_idx: 0,
            min_idx: 0,
            end_idx: 0,
            min_soc: 0.1,
            capacity_kwh: 300.0,
            trips: Vec::new(),
            candidate_stations: stations.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn disjoint_station_sets_form_independent_groups() {
        let events = vec![event(&["A", "B"]), event(&["C"])];
        let (groups, impossible) = group_events(events);
        assert!(impossible.is_empty());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn overlapping_station_sets_merge_transitively() {
        let events = vec![event(&["A", "B"]), event(&["B", "C"]), event(&["D"])];
        let (groups, _) = group_events(events);
        assert_eq!(groups.len(), 2);
        let big = groups.iter().find(|g| g.stations.len() == 3).unwrap();
        assert!(big.stations.contains("A") && big.stations.contains("C"));
    }

    #[test]
    fn empty_candidate_set_is_impossible() {
        let events = vec![event(&[])];
        let (groups, impossible) = group_events(events);
        assert!(groups.is_empty());
        assert_eq!(impossible.len(), 1);
    }

    #[test]
    fn groups_sorted_ascending_by_station_count() {
        let events = vec![event(&["A", "B", "C"]), event(&["D"])];
        let (groups, _) = group_events(events);
        assert!(groups[0].stations.len() <= groups[1].stations.len());
    }
}
