use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TwinConfig;
use crate::degradation::CurveType;
use crate::fit;
use crate::stats;
use crate::types::{now_ms, DriverRecord, Sector, SectorTimes, TelemetrySample, TireCompound};

const DEFAULT_BASE_PACE: f64 = 95.0;
const FATIGUE_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationProfile {
    pub rate: f64,
    pub exponent: f64,
    pub base_pace: f64,
    #[serde(rename = "type")]
    pub curve: CurveType,
    pub compound: TireCompound,
    pub confidence: f64,
}

/// Relative sector pace; above 1 means the driver is quicker there than in
/// their average sector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorStrengths {
    #[serde(rename = "S1")]
    pub s1: f64,
    #[serde(rename = "S2")]
    pub s2: f64,
    #[serde(rename = "S3")]
    pub s3: f64,
}

impl Default for SectorStrengths {
    fn default() -> Self {
        Self { s1: 1.0, s2: 1.0, s3: 1.0 }
    }
}

impl SectorStrengths {
    pub fn get(&self, sector: Sector) -> f64 {
        match sector {
            Sector::S1 => self.s1,
            Sector::S2 => self.s2,
            Sector::S3 => self.s3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatigueTrend {
    Improving,
    Stable,
    Degrading,
    Critical,
}

impl FatigueTrend {
    fn from_factor(factor: f64) -> Self {
        if factor < 0.01 {
            Self::Improving
        } else if factor < 0.02 {
            Self::Stable
        } else if factor < 0.035 {
            Self::Degrading
        } else {
            Self::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueDropoff {
    pub factor: f64,
    pub fatigue_constant: f64,
    pub critical_lap: u32,
    pub trend: FatigueTrend,
}

/// Behavioural profile of one driver. Regenerated, never mutated, when new
/// laps arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverTwin {
    pub driver_id: String,
    pub pace_vector: f64,
    pub consistency_index: f64,
    pub aggression_score: f64,
    pub degradation_profile: DegradationProfile,
    pub sector_strengths: SectorStrengths,
    pub fatigue_dropoff: FatigueDropoff,
    pub lap_count: usize,
    pub confidence: f64,
    /// Built from defaults because there were too few laps.
    #[serde(default)]
    pub low_data: bool,
    /// ms since epoch
    pub timestamp: i64,
}

/// Default per-lap degradation for a compound when nothing can be fitted.
pub fn default_degradation_rate(compound: TireCompound) -> f64 {
    match compound {
        TireCompound::Soft => 0.003,
        TireCompound::Hard => 0.0015,
        _ => 0.002,
    }
}

/// Twin confidence as a step function of the number of laps seen.
pub fn lap_count_confidence(lap_count: usize) -> f64 {
    match lap_count {
        0..=4 => 0.5,
        5..=9 => 0.7,
        10..=19 => 0.85,
        _ => 0.95,
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriverTwinGenerator {
    cfg: TwinConfig,
}

impl DriverTwinGenerator {
    pub fn new(cfg: TwinConfig) -> Self {
        Self { cfg }
    }

    /// Fits a twin from a driver's history, or returns a neutral low-data twin
    /// when there are too few laps.
    pub fn generate(&self, record: &DriverRecord) -> DriverTwin {
        let laps = &record.lap_times;
        if laps.len() < self.cfg.min_laps.max(1) {
            debug!(driver = %record.id, laps = laps.len(), "too few laps; default twin");
            return default_twin(&record.id, laps, record.tire_compound, record.current_lap);
        }

        let aggression_score = if record.telemetry.is_empty() {
            0.5
        } else {
            aggression_score(&record.telemetry)
        };

        DriverTwin {
            driver_id: record.id.clone(),
            pace_vector: pace_vector(laps),
            consistency_index: consistency_index(laps),
            aggression_score,
            degradation_profile: degradation_profile(laps, record.tire_compound),
            sector_strengths: sector_strengths(&record.sector_times),
            fatigue_dropoff: self.fatigue_dropoff(laps, record.current_lap),
            lap_count: laps.len(),
            confidence: lap_count_confidence(laps.len()),
            low_data: false,
            timestamp: now_ms(),
        }
    }

    fn fatigue_dropoff(&self, laps: &[f64], current_lap: u32) -> FatigueDropoff {
        if laps.len() < 5 {
            return FatigueDropoff {
                factor: 0.02,
                fatigue_constant: 30.0,
                critical_lap: current_lap + 25,
                trend: FatigueTrend::Stable,
            };
        }

        let base = stats::mean(&laps[..3]);
        let mut tau = 30.0;
        let mut factor = None;
        if laps.len() >= self.cfg.fatigue_min_laps {
            let x: Vec<f64> = (1..=laps.len()).map(|l| l as f64).collect();
            match fit::curve_fit(
                |lap, p| base * (1.0 + p[0] * (1.0 - (-lap / p[1]).exp())),
                &x,
                laps,
                &[0.02, 30.0],
                &[0.0, 10.0],
                &[0.1, 100.0],
            ) {
                Ok(f) => {
                    factor = Some(f.params[0]);
                    tau = f.params[1];
                }
                Err(e) => debug!("fatigue fit failed ({}); using early/late comparison", e),
            }
        }
        let factor = factor.unwrap_or_else(|| early_late_fatigue(laps));

        let factor = factor.clamp(0.0, 0.05);
        let tau = tau.clamp(10.0, 100.0);
        let critical_lap = if factor > FATIGUE_THRESHOLD {
            let laps_to_critical = -tau * (1.0 - FATIGUE_THRESHOLD / factor).ln();
            current_lap.saturating_add(laps_to_critical.max(0.0) as u32)
        } else {
            current_lap + 30
        };

        FatigueDropoff {
            factor,
            fatigue_constant: tau,
            critical_lap,
            trend: FatigueTrend::from_factor(factor),
        }
    }
}

fn early_late_fatigue(laps: &[f64]) -> f64 {
    let w = laps.len().min(5);
    let early = stats::mean(&laps[..w]);
    let recent = stats::mean(&laps[laps.len() - w..]);
    if early > 0.0 {
        (recent - early) / (early * laps.len() as f64)
    } else {
        0.02
    }
}

fn default_twin(driver_id: &str, laps: &[f64], compound: TireCompound, current_lap: u32) -> DriverTwin {
    let base_pace = if laps.is_empty() { DEFAULT_BASE_PACE } else { stats::mean(laps) };
    DriverTwin {
        driver_id: driver_id.to_string(),
        pace_vector: 0.0,
        consistency_index: 0.7,
        aggression_score: 0.5,
        degradation_profile: DegradationProfile {
            rate: default_degradation_rate(compound),
            exponent: 1.0,
            base_pace,
            curve: CurveType::Linear,
            compound,
            confidence: 0.5,
        },
        sector_strengths: SectorStrengths::default(),
        fatigue_dropoff: FatigueDropoff {
            factor: 0.02,
            fatigue_constant: 30.0,
            critical_lap: current_lap + 20,
            trend: FatigueTrend::Stable,
        },
        lap_count: laps.len(),
        confidence: 0.5,
        low_data: true,
        timestamp: now_ms(),
    }
}

/// `(mean - best) / best`, clipped to [-0.1, 0.1].
pub fn pace_vector(laps: &[f64]) -> f64 {
    if laps.len() < 2 {
        return 0.0;
    }
    let best = laps.iter().copied().fold(f64::INFINITY, f64::min);
    if best <= 0.0 || !best.is_finite() {
        return 0.0;
    }
    ((stats::mean(laps) - best) / best).clamp(-0.1, 0.1)
}

/// One minus the coefficient of variation of the outlier-trimmed laps.
pub fn consistency_index(laps: &[f64]) -> f64 {
    if laps.len() < 2 {
        return 0.7;
    }
    let kept = stats::iqr_filter(laps);
    let mean = stats::mean(&kept);
    if mean <= 0.0 {
        return 0.7;
    }
    let cv = stats::std_dev(&kept) / mean;
    (1.0 - cv).clamp(0.0, 1.0)
}

/// Weighted blend of five telemetry traits, each normalised to [0, 1].
pub fn aggression_score(telemetry: &[TelemetrySample]) -> f64 {
    let throttle: Vec<f64> = telemetry.iter().filter_map(|t| t.throttle).collect();
    if throttle.is_empty() {
        return 0.5;
    }
    let brake: Vec<f64> = telemetry.iter().filter_map(|t| t.brake).collect();
    let speed: Vec<f64> = telemetry.iter().filter_map(|t| t.speed).collect();
    let steering: Vec<f64> = telemetry.iter().filter_map(|t| t.steering).collect();
    let g_force: Vec<f64> = telemetry.iter().filter_map(|t| t.g_force).collect();

    let throttle_factor = if throttle.len() > 1 {
        let rises: Vec<f64> = throttle.windows(2).map(|w| w[1] - w[0]).filter(|d| *d > 0.0).collect();
        stats::mean(&rises) * 10.0
    } else {
        0.5
    };

    let brake_factor = if brake.is_empty() {
        0.3
    } else {
        let peak = brake.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        peak * 0.5 + stats::variance(&brake) * 5.0
    };

    let speed_factor = if speed.len() > 1 {
        let max = speed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = stats::mean(&speed);
        if avg > 0.0 {
            (max - avg) / avg * 0.5 + stats::variance(&speed) / (avg * avg) * 10.0
        } else {
            0.0
        }
    } else {
        0.3
    };

    let steering_factor = if steering.len() > 1 {
        stats::variance(&steering) * 20.0
    } else {
        0.2
    };

    let g_factor = if g_force.is_empty() {
        0.2
    } else {
        g_force.iter().map(|g| g.abs()).fold(0.0, f64::max) / 5.0
    };

    let unit = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    let score = unit(throttle_factor) * 0.25
        + unit(brake_factor) * 0.20
        + unit(speed_factor) * 0.20
        + unit(steering_factor) * 0.15
        + unit(g_factor) * 0.20;
    score.clamp(0.0, 1.0)
}

/// Fits `base * (1 + rate * lap^exponent)` (or the linear form on short
/// histories). The rate is capped at 0.01 before the compound multiplier is
/// applied, so a SOFT rate can reach 0.015.
pub fn degradation_profile(laps: &[f64], compound: TireCompound) -> DegradationProfile {
    let n = laps.len();
    if n < 3 {
        return DegradationProfile {
            rate: default_degradation_rate(compound),
            exponent: 1.0,
            base_pace: if n == 0 { DEFAULT_BASE_PACE } else { stats::mean(laps) },
            curve: CurveType::Linear,
            compound,
            confidence: 0.5,
        };
    }

    let base = stats::mean(&laps[..3]);
    let x: Vec<f64> = (1..=n).map(|l| l as f64).collect();
    let mut confidence = 0.5;
    let mut exponent = 1.0;
    let mut curve = CurveType::Linear;

    let fitted = if n >= 5 {
        fit::curve_fit(
            |lap, p| base * (1.0 + p[0] * lap.powf(p[1])),
            &x,
            laps,
            &[0.002, 1.0],
            &[0.0, 0.5],
            &[0.01, 2.0],
        )
        .map(|f| {
            exponent = f.params[1];
            curve = CurveType::Exponential;
            confidence = f.r_squared.unwrap_or(0.5).clamp(0.5, 1.0);
            f.params[0]
        })
    } else {
        fit::curve_fit(|lap, p| base * (1.0 + p[0] * lap), &x, laps, &[0.002], &[0.0], &[0.01]).map(|f| f.params[0])
    };

    let rate = match fitted {
        Ok(rate) => rate,
        Err(e) => {
            debug!("degradation fit failed ({}); using finite difference", e);
            exponent = 1.0;
            curve = CurveType::Linear;
            if n >= 5 {
                (stats::mean(&laps[n - 5..]) - stats::mean(&laps[..5])) / (base * n as f64)
            } else {
                (laps[n - 1] - laps[0]) / (base * n as f64)
            }
        }
    };

    let capped = if rate.is_finite() { rate.clamp(0.0, 0.01) } else { 0.0 };
    let rate = capped * compound.wear_multiplier();
    DegradationProfile {
        rate,
        exponent,
        base_pace: base,
        curve,
        compound,
        confidence: confidence.max((n as f64 / 20.0).min(1.0)),
    }
}

/// Per-sector strength from outlier-trimmed mean sector times, clipped to
/// [0.8, 1.2]. Neutral unless at least two laps have all three sectors.
pub fn sector_strengths(sector_times: &[SectorTimes]) -> SectorStrengths {
    if sector_times.len() < 2 {
        return SectorStrengths::default();
    }
    let column = |sector: Sector| -> Vec<f64> {
        sector_times.iter().map(|s| s.get(sector)).filter(|v| *v > 0.0).collect()
    };
    let (c1, c2, c3) = (column(Sector::S1), column(Sector::S2), column(Sector::S3));
    if c1.is_empty() || c2.is_empty() || c3.is_empty() {
        return SectorStrengths::default();
    }
    let avg = [stats::robust_mean(&c1), stats::robust_mean(&c2), stats::robust_mean(&c3)];
    let overall = avg.iter().sum::<f64>() / 3.0;
    if overall <= 0.0 {
        return SectorStrengths::default();
    }
    let strength = |a: f64| if a > 0.0 { (overall / a).clamp(0.8, 1.2) } else { 1.0 };
    SectorStrengths {
        s1: strength(avg[0]),
        s2: strength(avg[1]),
        s3: strength(avg[2]),
    }
}
