//! INI-style configuration (§6): an explicit record with the keys the
//! optimizer recognizes. Unknown keys inside a recognized section are
//! rejected rather than silently ignored.

use std::collections::BTreeSet;

use ini::Ini;

use crate::domain::ChargingCurve;
use crate::error::OptimizerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solver {
    Quick,
    Spiceev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptType {
    Greedy,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChoiceKind {
    StepByStep,
    Brute,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub exclusion_rots: BTreeSet<String>,
    pub exclusion_stations: BTreeSet<String>,
    pub inclusion_stations: BTreeSet<String>,

    pub battery_capacity_kwh: Option<f64>,
    pub charging_curve: Option<ChargingCurve>,
    pub charging_power_kw: Option<f64>,
    pub charge_eff: f64,

    pub solver: Solver,
    pub opt_type: OptType,
    pub rebase_scenario: bool,
    pub remove_impossible_rots: bool,
    pub node_choice: NodeChoiceKind,
    pub max_brute_loop: u32,
    pub max_restart_loops: u32,

    pub reduce_rots: bool,
    pub rots: Vec<String>,

    pub debug_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exclusion_rots: BTreeSet::new(),
            exclusion_stations: BTreeSet::new(),
            inclusion_stations: BTreeSet::new(),
            battery_capacity_kwh: None,
            charging_curve: None,
            charging_power_kw: None,
            charge_eff: 0.95,
            solver: Solver::Quick,
            opt_type: OptType::Greedy,
            rebase_scenario: false,
            remove_impossible_rots: false,
            node_choice: NodeChoiceKind::StepByStep,
            max_brute_loop: 10,
            max_restart_loops: 2,
            reduce_rots: false,
            rots: Vec::new(),
            debug_level: 1,
        }
    }
}

const SCENARIO_KEYS: &[&str] = &["exclusion_rots", "exclusion_stations", "inclusion_stations"];
const VEHICLE_KEYS: &[&str] = &["battery_capacity", "charging_curve", "charging_power", "charge_eff"];
const OPTIMIZER_KEYS: &[&str] = &[
    "solver",
    "opt_type",
    "rebase_scenario",
    "remove_impossible_rots",
    "node_choice",
    "max_brute_loop",
    "max_restart_loops",
];
const SPECIAL_KEYS: &[&str] = &["reduce_rots", "rots"];
const DEFAULT_KEYS: &[&str] = &["debug_level"];

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(section: &str, key: &str, raw: &str) -> Result<bool, OptimizerError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(OptimizerError::InvalidConfig {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(section: &str, key: &str, raw: &str) -> Result<T, OptimizerError> {
    raw.trim().parse().map_err(|_| OptimizerError::InvalidConfig {
        section: section.to_string(),
        key: key.to_string(),
    })
}

/// `soc:power_kw` breakpoints separated by commas, e.g. `0.0:150,0.8:150,1.0:50`.
fn parse_charging_curve(section: &str, key: &str, raw: &str) -> Result<ChargingCurve, OptimizerError> {
    let bad = || OptimizerError::InvalidConfig {
        section: section.to_string(),
        key: key.to_string(),
    };
    let points = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (soc, power) = pair.split_once(':').ok_or_else(bad)?;
            let soc: f64 = soc.trim().parse().map_err(|_| bad())?;
            let power: f64 = power.trim().parse().map_err(|_| bad())?;
            Ok((soc, power))
        })
        .collect::<Result<Vec<(f64, f64)>, OptimizerError>>()?;
    let curve = ChargingCurve(points);
    curve.validate().map_err(|_| bad())?;
    Ok(curve)
}

fn reject_unknown_keys(ini: &Ini, section: &str, known: &[&str]) -> Result<(), OptimizerError> {
    let Some(props) = ini.section(Some(section)) else {
        return Ok(());
    };
    for (key, _) in props.iter() {
        if !known.contains(&key) {
            return Err(OptimizerError::InvalidConfig {
                section: section.to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

impl Config {
    /// Parse an INI document into a `Config`, rejecting any key inside a
    /// recognized section ([SCENARIO], [VEHICLE], [OPTIMIZER], [SPECIAL],
    /// [DEFAULT]) that this table does not know about.
    pub fn from_ini_str(src: &str) -> Result<Self, OptimizerError> {
        let ini = Ini::load_from_str(src).map_err(|_| OptimizerError::InvalidConfig {
            section: "<document>".to_string(),
            key: "<parse>".to_string(),
        })?;

        reject_unknown_keys(&ini, "SCENARIO", SCENARIO_KEYS)?;
        reject_unknown_keys(&ini, "VEHICLE", VEHICLE_KEYS)?;
        reject_unknown_keys(&ini, "OPTIMIZER", OPTIMIZER_KEYS)?;
        reject_unknown_keys(&ini, "SPECIAL", SPECIAL_KEYS)?;
        reject_unknown_keys(&ini, "DEFAULT", DEFAULT_KEYS)?;

        let mut cfg = Config::default();

        if let Some(scenario) = ini.section(Some("SCENARIO")) {
            if let Some(v) = scenario.get("exclusion_rots") {
                cfg.exclusion_rots = parse_list(v).into_iter().collect();
            }
            if let Some(v) = scenario.get("exclusion_stations") {
                cfg.exclusion_stations = parse_list(v).into_iter().collect();
            }
            if let Some(v) = scenario.get("inclusion_stations") {
                cfg.inclusion_stations = parse_list(v).into_iter().collect();
            }
        }

        if let Some(vehicle) = ini.section(Some("VEHICLE")) {
            if let Some(v) = vehicle.get("battery_capacity") {
                cfg.battery_capacity_kwh = Some(parse_num("VEHICLE", "battery_capacity", v)?);
            }
            if let Some(v) = vehicle.get("charging_curve") {
                cfg.charging_curve = Some(parse_charging_curve("VEHICLE", "charging_curve", v)?);
            }
            if let Some(v) = vehicle.get("charging_power") {
                cfg.charging_power_kw = Some(parse_num("VEHICLE", "charging_power", v)?);
            }
            if let Some(v) = vehicle.get("charge_eff") {
                cfg.charge_eff = parse_num("VEHICLE", "charge_eff", v)?;
            }
        }

        if let Some(opt) = ini.section(Some("OPTIMIZER")) {
            if let Some(v) = opt.get("solver") {
                cfg.solver = match v {
                    "quick" => Solver::Quick,
                    "spiceev" => Solver::Spiceev,
                    _ => {
                        return Err(OptimizerError::InvalidConfig {
                            section: "OPTIMIZER".to_string(),
                            key: "solver".to_string(),
                        })
                    }
                };
            }
            if let Some(v) = opt.get("opt_type") {
                cfg.opt_type = match v {
                    "greedy" => OptType::Greedy,
                    "deep" => OptType::Deep,
                    _ => {
                        return Err(OptimizerError::InvalidConfig {
                            section: "OPTIMIZER".to_string(),
                            key: "opt_type".to_string(),
                        })
                    }
                };
            }
            if let Some(v) = opt.get("rebase_scenario") {
                cfg.rebase_scenario = parse_bool("OPTIMIZER", "rebase_scenario", v)?;
            }
            if let Some(v) = opt.get("remove_impossible_rots") {
                cfg.remove_impossible_rots = parse_bool("OPTIMIZER", "remove_impossible_rots", v)?;
            }
            if let Some(v) = opt.get("node_choice") {
                cfg.node_choice = match v {
                    "step-by-step" => NodeChoiceKind::StepByStep,
                    "brute" => NodeChoiceKind::Brute,
                    _ => {
                        return Err(OptimizerError::InvalidConfig {
                            section: "OPTIMIZER".to_string(),
                            key: "node_choice".to_string(),
                        })
                    }
                };
            }
            if let Some(v) = opt.get("max_brute_loop") {
                cfg.max_brute_loop = parse_num("OPTIMIZER", "max_brute_loop", v)?;
            }
            if let Some(v) = opt.get("max_restart_loops") {
                cfg.max_restart_loops = parse_num("OPTIMIZER", "max_restart_loops", v)?;
            }
        }

        if let Some(special) = ini.section(Some("SPECIAL")) {
            if let Some(v) = special.get("reduce_rots") {
                cfg.reduce_rots = parse_bool("SPECIAL", "reduce_rots", v)?;
            }
            if let Some(v) = special.get("rots") {
                cfg.rots = parse_list(v);
            }
        }

        if let Some(default) = ini.section(Some("DEFAULT")) {
            if let Some(v) = default.get("debug_level") {
                cfg.debug_level = parse_num("DEFAULT", "debug_level", v)?;
            }
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_key_table() {
        let src = r#"
[SCENARIO]
exclusion_rots = r1, r2
exclusion_stations = stopB
inclusion_stations = stopA

[OPTIMIZER]
solver = quick
opt_type = deep
remove_impossible_rots = true
node_choice = brute
max_brute_loop = 25

[SPECIAL]
reduce_rots = true
rots = r3, r4

[DEFAULT]
debug_level = 2
"#;
        let cfg = Config::from_ini_str(src).unwrap();
        assert_eq!(cfg.exclusion_rots.len(), 2);
        assert!(cfg.exclusion_stations.contains("stopB"));
        assert!(cfg.inclusion_stations.contains("stopA"));
        assert_eq!(cfg.solver, Solver::Quick);
        assert_eq!(cfg.opt_type, OptType::Deep);
        assert!(cfg.remove_impossible_rots);
        assert_eq!(cfg.node_choice, NodeChoiceKind::Brute);
        assert_eq!(cfg.max_brute_loop, 25);
        assert!(cfg.reduce_rots);
        assert_eq!(cfg.rots, vec!["r3".to_string(), "r4".to_string()]);
        assert_eq!(cfg.debug_level, 2);
    }

    #[test]
    fn parses_vehicle_overrides() {
        let src = "[VEHICLE]\nbattery_capacity = 250\ncharging_curve = 0.0:200,1.0:50\ncharging_power = 300\ncharge_eff = 0.9\n";
        let cfg = Config::from_ini_str(src).unwrap();
        assert_eq!(cfg.battery_capacity_kwh, Some(250.0));
        assert_eq!(cfg.charging_power_kw, Some(300.0));
        assert_eq!(cfg.charge_eff, 0.9);
        assert_eq!(cfg.charging_curve.unwrap().0, vec![(0.0, 200.0), (1.0, 50.0)]);
    }

    #[test]
    fn rejects_malformed_charging_curve() {
        let src = "[VEHICLE]\ncharging_curve = not-a-curve\n";
        let err = Config::from_ini_str(src).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_unknown_key_in_recognized_section() {
        let src = "[OPTIMIZER]\nbogus_key = 1\n";
        let err = Config::from_ini_str(src).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig { .. }));
    }

    #[test]
    fn defaults_when_sections_absent() {
        let cfg = Config::from_ini_str("").unwrap();
        assert_eq!(cfg.solver, Solver::Quick);
        assert_eq!(cfg.opt_type, OptType::Greedy);
        assert!(!cfg.remove_impossible_rots);
        assert_eq!(cfg.max_restart_loops, 2);
    }
}
