//! The opaque external-collaborator boundary (§6 of the configuration
//! table): schedule parsing, vehicle assignment, the full scenario solve,
//! and output writing all live outside this crate. This module only
//! defines the seam the core calls through and is called back by.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::ElectrifiedStations;
use crate::domain::Rotation;
use crate::error::OptimizerError;

/// Per-vehicle SoC trace plus the scenario-wide parameters the extractor
/// and kernel both need (§6's "Baseline scenario" input).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineScenario {
    pub start_time_min: f64,
    pub steps_per_hour: f64,
    pub cs_power_opps_kw: f64,
    /// `None` entries are samples not yet assigned a known SoC value.
    pub soc_traces: HashMap<String, Vec<Option<f64>>>,
}

impl BaselineScenario {
    pub fn step_min(&self) -> f64 {
        60.0 / self.steps_per_hour
    }
}

/// A synchronous external solver used for the initial baseline and for
/// rebase passes requested by the impossibility loop. Implementations own
/// schedule parsing, grid-side physics, and depot-charging queues — none
/// of that is this crate's concern.
pub trait EnergySimulator {
    fn run(&self, rotations: &[Rotation], electrified_stations: &ElectrifiedStations) -> Result<BaselineScenario, OptimizerError>;
}
