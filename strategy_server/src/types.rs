use serde::{Deserialize, Serialize};

use race_twin::{DriverTwin, PitDecisionInput, RaceTwin};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub drivers: usize,
    pub race_twins: usize,
    pub ts_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct DriverTwinOut {
    pub twin: DriverTwin,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RaceTwinOut {
    pub race_twin: RaceTwin,
    pub warnings: Vec<String>,
}

/// Pit-decision body. `race_id` pulls a previously simulated race twin
/// from the cache when the body carries none inline.
#[derive(Debug, Deserialize)]
pub struct PitDecisionIn {
    #[serde(default)]
    pub race_id: Option<String>,
    #[serde(flatten)]
    pub input: PitDecisionInput,
}
