use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stats;
use crate::types::{CarSnapshot, Sector};

/// Seconds lost in a fully congested sector.
pub fn base_sector_loss(sector: Sector) -> f64 {
    match sector {
        Sector::S1 => 0.3,
        Sector::S2 => 0.5,
        Sector::S3 => 0.4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleanAir {
    pub time_lost: f64,
    pub clean_air: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorTraffic {
    pub density: f64,
    pub drivers_count: usize,
    pub avg_time_lost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPattern {
    pub sector_traffic: BTreeMap<String, SectorTraffic>,
    pub overall_density: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrafficDensityModel;

impl TrafficDensityModel {
    pub fn new() -> Self {
        Self
    }

    /// Share of the field in `sector`, boosted when those cars run close
    /// together in the order. Clamped to [0, 1].
    pub fn calculate_density(&self, cars: &[CarSnapshot], sector: Sector) -> f64 {
        let in_sector: Vec<u32> = cars.iter().filter(|c| c.sector == sector).map(|c| c.position).collect();
        let mut density = in_sector.len() as f64 / cars.len().max(1) as f64;
        if in_sector.len() > 1 {
            let max = in_sector.iter().copied().max().unwrap_or(0);
            let min = in_sector.iter().copied().min().unwrap_or(0);
            let spread = f64::from(max - min);
            let proximity = 1.0 / (1.0 + spread / 5.0);
            density *= 1.0 + proximity;
        }
        density.clamp(0.0, 1.0)
    }

    pub fn estimate_time_lost(&self, density: f64, sector: Sector) -> f64 {
        base_sector_loss(sector) * density.clamp(0.0, 1.0).powf(1.5)
    }

    /// Lap-time penalty for a car with `cars_ahead` in front; the leader pays nothing.
    pub fn traffic_penalty(&self, cars_ahead: u32, density: f64, sector: Sector) -> f64 {
        if cars_ahead == 0 {
            return 0.0;
        }
        self.estimate_time_lost(density, sector) + 0.05 * f64::from(cars_ahead)
    }

    pub fn clean_air(&self, cars_ahead: u32, density: f64, sector: Sector) -> CleanAir {
        if cars_ahead == 0 {
            return CleanAir { time_lost: 0.0, clean_air: true };
        }
        let time_lost = self.traffic_penalty(cars_ahead, density, sector);
        CleanAir {
            time_lost,
            clean_air: time_lost < 0.2,
        }
    }

    /// Per-sector share of observations, one sector id per sample.
    pub fn analyze_traffic_pattern(&self, samples: &[Sector]) -> TrafficPattern {
        let total = samples.len().max(1) as f64;
        let mut sector_traffic = BTreeMap::new();
        let mut densities = Vec::with_capacity(3);
        for sector in Sector::ALL {
            let count = samples.iter().filter(|s| **s == sector).count();
            let density = count as f64 / total;
            densities.push(density);
            sector_traffic.insert(
                sector.to_string(),
                SectorTraffic {
                    density,
                    drivers_count: count,
                    avg_time_lost: self.estimate_time_lost(density, sector),
                },
            );
        }
        TrafficPattern {
            sector_traffic,
            overall_density: stats::mean(&densities),
        }
    }
}
