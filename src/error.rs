use thiserror::Error;

/// The crate's complete error taxonomy.
///
/// `NoCandidateStations`, `ExhaustedSearch` and `IncumbentDominates` are
/// locally recovered by the search driver and never escape as `Err` — they
/// fold into a group's `could_not_be_electrified` set. Only
/// `InvalidConfig`, `SimulatorFailure` and `KernelInvariant` propagate to
/// the caller.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("event for rotation {rotation_id} has an empty filtered candidate-station set")]
    NoCandidateStations { rotation_id: String },

    #[error("search exhausted for group with stations {stations:?} and no pre-optimized set to fall back to")]
    ExhaustedSearch { stations: Vec<String> },

    #[error("chooser returned null but a pre-optimized set of size {pre_optimized_len} dominates")]
    IncumbentDominates { pre_optimized_len: usize },

    #[error("required configuration key missing: [{section}] {key}")]
    InvalidConfig { section: String, key: String },

    #[error("external energy simulator failed: {0}")]
    SimulatorFailure(String),

    #[error("fast SoC kernel produced an invalid trace (NaN or value > 1+eps) for vehicle {vehicle_id}")]
    KernelInvariant { vehicle_id: String },
}
