use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "RACE_TWIN_CONFIG";

/// Tunables for the whole engine. Every field has a default, so a config file
/// only needs the values it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub simulation: SimulationConfig,
    pub pit_rejoin: PitRejoinConfig,
    pub decision: DecisionConfig,
    pub twin: TwinConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub min_simulations: usize,
    pub max_simulations: usize,
    pub min_lap_time: f64,
    pub base_pit_time: f64,
    pub pit_time_jitter: f64,
    pub harder_compound_probability: f64,
    pub late_pit_tire_age: u32,
    pub late_pit_probability: f64,
    pub min_laps_remaining: u32,
    pub reference_pit_loss: f64,
    pub parallel: bool,
    /// Wall-clock budget per race simulation, in milliseconds.
    pub deadline_ms: Option<u64>,
}

impl SimulationConfig {
    /// Clamps a requested iteration count into `[min_simulations, max_simulations]`.
    /// An inverted pair collapses to `min_simulations`.
    pub fn clamp_simulations(&self, requested: usize) -> usize {
        let min = self.min_simulations.max(1);
        requested.max(min).min(self.max_simulations.max(min))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_simulations: 100,
            max_simulations: 500,
            min_lap_time: 90.0,
            base_pit_time: 22.0,
            pit_time_jitter: 2.0,
            harder_compound_probability: 0.7,
            late_pit_tire_age: 25,
            late_pit_probability: 0.1,
            min_laps_remaining: 10,
            reference_pit_loss: 25.0,
            parallel: true,
            deadline_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitRejoinConfig {
    pub base_rejoin_penalty: f64,
    pub avg_gap_per_position: f64,
    pub window_open_lap: u32,
    pub ghost_degradation_per_lap: f64,
    pub max_ghost_positions_lost: u32,
}

impl Default for PitRejoinConfig {
    fn default() -> Self {
        Self {
            base_rejoin_penalty: 1.5,
            avg_gap_per_position: 1.0,
            window_open_lap: 15,
            ghost_degradation_per_lap: 0.1,
            max_ghost_positions_lost: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub degradation_weight: f64,
    pub traffic_weight: f64,
    pub race_twin_weight: f64,
    pub opponent_weight: f64,
    pub weather_weight: f64,
    pub pit_now_threshold: f64,
    pub pit_later_threshold: f64,
    pub critical_degradation: f64,
    pub high_degradation: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            degradation_weight: 0.35,
            traffic_weight: 0.25,
            race_twin_weight: 0.20,
            opponent_weight: 0.10,
            weather_weight: 0.10,
            pit_now_threshold: 0.75,
            pit_later_threshold: 0.55,
            critical_degradation: 0.05,
            high_degradation: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    pub min_laps: usize,
    pub fatigue_min_laps: usize,
    pub history_window: usize,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            min_laps: 5,
            fatigue_min_laps: 8,
            history_window: 50,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        if cfg.simulation.min_simulations > cfg.simulation.max_simulations {
            return Err(ConfigError::Invalid {
                path: path.to_string(),
                reason: format!(
                    "min_simulations ({}) exceeds max_simulations ({})",
                    cfg.simulation.min_simulations, cfg.simulation.max_simulations
                ),
            });
        }
        Ok(cfg)
    }

    /// Loads the file named by `RACE_TWIN_CONFIG`, or defaults.
    pub fn from_env() -> Self {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => match Self::load(&path) {
                Ok(cfg) => {
                    tracing::info!("loaded engine config from {}", path);
                    cfg
                }
                Err(e) => {
                    tracing::warn!("{}; falling back to default engine config", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"pit_rejoin": {"window_open_lap": 12}}"#).unwrap();
        assert_eq!(cfg.pit_rejoin.window_open_lap, 12);
        assert_eq!(cfg.pit_rejoin.base_rejoin_penalty, 1.5);
        assert_eq!(cfg.simulation.max_simulations, 500);
        assert_eq!(cfg.decision.degradation_weight, 0.35);
    }

    #[test]
    fn clamps_simulation_count() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.clamp_simulations(50), 100);
        assert_eq!(cfg.clamp_simulations(1000), 500);
        assert_eq!(cfg.clamp_simulations(250), 250);
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"simulation": {"min_simulations": 600}}"#).unwrap();
        assert_eq!(cfg.simulation.clamp_simulations(50), 600);
        assert_eq!(cfg.simulation.clamp_simulations(1000), 600);

        let path = std::env::temp_dir().join(format!("race_twin_inverted_{}.json", std::process::id()));
        fs::write(&path, r#"{"simulation": {"min_simulations": 600}}"#).unwrap();
        let err = EngineConfig::load(path.to_str().unwrap()).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("min_simulations"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load("/nonexistent/race_twin.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reads_json_file() {
        let path = std::env::temp_dir().join(format!("race_twin_cfg_{}.json", std::process::id()));
        fs::write(&path, r#"{"simulation": {"parallel": false, "deadline_ms": 250}}"#).unwrap();
        let cfg = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert!(!cfg.simulation.parallel);
        assert_eq!(cfg.simulation.deadline_ms, Some(250));
        fs::remove_file(&path).ok();

        let bad = std::env::temp_dir().join(format!("race_twin_bad_{}.json", std::process::id()));
        fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            EngineConfig::load(bad.to_str().unwrap()),
            Err(ConfigError::Parse { .. })
        ));
        fs::remove_file(&bad).ok();
    }
}
