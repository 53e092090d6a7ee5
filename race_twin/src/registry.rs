use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::config::TwinConfig;
use crate::driver_twin::{DriverTwin, DriverTwinGenerator};
use crate::lap_window::{LapSample, LapWindow};
use crate::types::{DriverRecord, SectorTimes, TelemetrySample, TireCompound};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapUpdate {
    pub driver_id: String,
    pub lap_time: f64,
    #[serde(default)]
    pub sector_times: SectorTimes,
    #[serde(default)]
    pub telemetry: Vec<TelemetrySample>,
    #[serde(default)]
    pub tire_compound: TireCompound,
    #[serde(default = "first_lap")]
    pub current_lap: u32,
}

fn first_lap() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinChanges {
    pub pace_vector_delta: f64,
    pub consistency_delta: f64,
    pub aggression_delta: f64,
    pub is_new: bool,
    /// Per-sector strength deltas; empty for a driver's first twin.
    pub sector_changes: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinUpdate {
    pub twin: DriverTwin,
    pub changes: TwinChanges,
}

#[derive(Debug)]
struct DriverHistory {
    window: LapWindow,
    last: Option<DriverTwin>,
}

/// Per-driver lap history and latest twin, regenerated on every lap.
/// Shared between request handlers behind an `Arc`.
#[derive(Debug, Default)]
pub struct DriverTwinRegistry {
    cfg: TwinConfig,
    generator: DriverTwinGenerator,
    drivers: RwLock<HashMap<String, DriverHistory>>,
}

fn changes_between(old: Option<&DriverTwin>, new: &DriverTwin) -> TwinChanges {
    let Some(old) = old else {
        return TwinChanges {
            is_new: true,
            ..TwinChanges::default()
        };
    };
    let sector_changes = crate::types::Sector::ALL
        .iter()
        .map(|s| (s.to_string(), new.sector_strengths.get(*s) - old.sector_strengths.get(*s)))
        .collect();
    TwinChanges {
        pace_vector_delta: new.pace_vector - old.pace_vector,
        consistency_delta: new.consistency_index - old.consistency_index,
        aggression_delta: new.aggression_score - old.aggression_score,
        is_new: false,
        sector_changes,
    }
}

impl DriverTwinRegistry {
    pub fn new(cfg: TwinConfig) -> Self {
        Self {
            generator: DriverTwinGenerator::new(cfg.clone()),
            cfg,
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a lap to the driver's window and regenerates the twin.
    pub fn update(&self, update: LapUpdate) -> TwinUpdate {
        let mut drivers = self.drivers.write();
        let history = drivers.entry(update.driver_id.clone()).or_insert_with(|| DriverHistory {
            window: LapWindow::new(self.cfg.history_window),
            last: None,
        });
        history.window.add_lap(LapSample {
            lap: update.current_lap,
            lap_time: update.lap_time,
            sectors: update.sector_times,
            telemetry: update.telemetry,
        });

        let record = DriverRecord {
            id: update.driver_id.clone(),
            lap_times: history.window.lap_times(),
            sector_times: history.window.sector_times(),
            telemetry: history.window.telemetry(),
            tire_compound: update.tire_compound,
            current_lap: update.current_lap,
            ..DriverRecord::default()
        };
        let twin = self.generator.generate(&record);
        let changes = changes_between(history.last.as_ref(), &twin);
        history.last = Some(twin.clone());

        info!(
            "updated driver twin for {} at lap {} ({} laps in window)",
            update.driver_id,
            update.current_lap,
            history.window.window_len()
        );
        TwinUpdate { twin, changes }
    }

    pub fn get(&self, driver_id: &str) -> Option<DriverTwin> {
        self.drivers.read().get(driver_id).and_then(|h| h.last.clone())
    }

    pub fn all(&self) -> BTreeMap<String, DriverTwin> {
        self.drivers
            .read()
            .iter()
            .filter_map(|(id, h)| h.last.clone().map(|t| (id.clone(), t)))
            .collect()
    }

    /// Forgets a driver's history, e.g. between races. Returns whether the
    /// driver was known.
    pub fn reset_driver(&self, driver_id: &str) -> bool {
        let removed = self.drivers.write().remove(driver_id).is_some();
        if removed {
            info!("reset driver twin for {}", driver_id);
        }
        removed
    }
}
