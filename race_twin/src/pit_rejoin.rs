use serde::{Deserialize, Serialize};

use crate::config::PitRejoinConfig;
use crate::traffic::TrafficDensityModel;
use crate::types::{now_ms, PitAdvice, Sector};

fn rejoin_sector_multiplier(sector: Sector) -> f64 {
    match sector {
        Sector::S1 => 0.8,
        Sector::S2 => 1.2,
        Sector::S3 => 1.0,
    }
}

fn traffic_sector_multiplier(sector: Sector) -> f64 {
    match sector {
        Sector::S1 => 0.8,
        Sector::S2 => 1.3,
        Sector::S3 => 1.0,
    }
}

const TRAFFIC_PENALTY_PER_CAR: f64 = 0.1;
const CLEAR_WINDOW_LOSS: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitStopRequest {
    pub driver_id: String,
    pub current_position: u32,
    pub pit_lap: u32,
    pub pit_time: f64,
    pub traffic_density: f64,
    pub total_cars: u32,
    #[serde(default = "default_pit_sector")]
    pub sector: Sector,
}

fn default_pit_sector() -> Sector {
    Sector::S2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficImpact {
    pub cars_ahead: u32,
    pub traffic_loss_per_lap: f64,
    pub sector: Sector,
    pub density: f64,
    pub clear_window: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejoinOutcome {
    pub driver_id: String,
    pub pit_lap: u32,
    pub position_before_pit: u32,
    pub rejoin_position: u32,
    pub positions_lost: u32,
    pub time_lost: f64,
    pub ghost_position: u32,
    pub traffic_impact: TrafficImpact,
    pub rejoin_sector: Sector,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficForecastLap {
    pub lap: u32,
    pub traffic_density: f64,
    pub suitable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LapRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejoinPitWindow {
    pub optimal_lap: u32,
    pub optimal_window: LapRange,
    pub traffic_forecast: Vec<TrafficForecastLap>,
    pub degradation_urgent: bool,
    pub recommendation: PitAdvice,
}

/// Where a car comes out after a stop, and what it costs.
#[derive(Debug, Clone, Default)]
pub struct PitRejoinSimulator {
    cfg: PitRejoinConfig,
    traffic: TrafficDensityModel,
}

impl PitRejoinSimulator {
    pub fn new(cfg: PitRejoinConfig) -> Self {
        Self {
            cfg,
            traffic: TrafficDensityModel::new(),
        }
    }

    pub fn config(&self) -> &PitRejoinConfig {
        &self.cfg
    }

    /// Stationary time plus the merge penalty, which grows with traffic.
    pub fn time_lost(&self, pit_time: f64, traffic_density: f64, sector: Sector) -> f64 {
        let traffic_mult = 1.0 + traffic_density * 0.5;
        pit_time + self.cfg.base_rejoin_penalty * traffic_mult * rejoin_sector_multiplier(sector)
    }

    pub fn positions_lost(&self, time_lost: f64) -> u32 {
        if self.cfg.avg_gap_per_position <= 0.0 {
            return 0;
        }
        (time_lost / self.cfg.avg_gap_per_position).max(0.0).floor() as u32
    }

    /// Position the car would hold had it stayed out on worn tyres.
    pub fn ghost_position(&self, current_position: u32, pit_lap: u32) -> u32 {
        let laps_in_window = pit_lap.saturating_sub(self.cfg.window_open_lap);
        let ghost_loss = f64::from(laps_in_window) * self.cfg.ghost_degradation_per_lap;
        let lost = if self.cfg.avg_gap_per_position > 0.0 {
            (ghost_loss / self.cfg.avg_gap_per_position).floor() as u32
        } else {
            0
        };
        current_position + lost.min(self.cfg.max_ghost_positions_lost)
    }

    pub fn traffic_impact(&self, rejoin_position: u32, traffic_density: f64, sector: Sector) -> TrafficImpact {
        let cars_ahead = rejoin_position.saturating_sub(1);
        let traffic_loss_per_lap = if cars_ahead == 0 {
            0.0
        } else {
            let density_mult = 1.0 + traffic_density * 0.5;
            self.traffic.estimate_time_lost(traffic_density, sector)
                + f64::from(cars_ahead) * TRAFFIC_PENALTY_PER_CAR * traffic_sector_multiplier(sector) * density_mult
        };
        TrafficImpact {
            cars_ahead,
            traffic_loss_per_lap,
            sector,
            density: traffic_density,
            clear_window: traffic_loss_per_lap < CLEAR_WINDOW_LOSS,
        }
    }

    pub fn simulate(&self, req: &PitStopRequest) -> RejoinOutcome {
        let time_lost = self.time_lost(req.pit_time, req.traffic_density, req.sector);
        let positions_lost = self.positions_lost(time_lost);
        let rejoin_position = req
            .current_position
            .saturating_add(positions_lost)
            .min(req.total_cars.max(req.current_position));

        RejoinOutcome {
            driver_id: req.driver_id.clone(),
            pit_lap: req.pit_lap,
            position_before_pit: req.current_position,
            rejoin_position,
            positions_lost,
            time_lost,
            ghost_position: self.ghost_position(req.current_position, req.pit_lap),
            traffic_impact: self.traffic_impact(rejoin_position, req.traffic_density, req.sector),
            rejoin_sector: req.sector,
            ts_ms: now_ms(),
        }
    }

    /// Ten-lap traffic forecast with density falling 5% per lap; the window
    /// centres on the quietest lap.
    pub fn predict_optimal_pit_window(
        &self,
        traffic_density: f64,
        tire_age: u32,
        degradation_rate: f64,
        total_laps: u32,
        current_lap: u32,
    ) -> RejoinPitWindow {
        let last = (current_lap + 10).min(total_laps);
        let traffic_forecast: Vec<TrafficForecastLap> = (current_lap..last)
            .map(|lap| {
                let predicted = traffic_density * (1.0 - f64::from(lap - current_lap) * 0.05);
                TrafficForecastLap {
                    lap,
                    traffic_density: predicted.max(0.0),
                    suitable: predicted < 0.4,
                }
            })
            .collect();

        let optimal_lap = traffic_forecast
            .iter()
            .fold(None::<&TrafficForecastLap>, |best, f| match best {
                Some(b) if b.traffic_density <= f.traffic_density => Some(b),
                _ => Some(f),
            })
            .map(|f| f.lap)
            .unwrap_or(current_lap);

        let degradation_urgent = tire_age > 20 || degradation_rate > 0.003;
        RejoinPitWindow {
            optimal_lap,
            optimal_window: LapRange {
                start: current_lap.max(optimal_lap.saturating_sub(2)),
                end: total_laps.min(optimal_lap + 2),
            },
            traffic_forecast,
            degradation_urgent,
            recommendation: if degradation_urgent {
                PitAdvice::PitNow
            } else {
                PitAdvice::PitInWindow
            },
        }
    }
}
