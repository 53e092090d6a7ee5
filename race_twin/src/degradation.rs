use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FitError;
use crate::fit;
use crate::types::TireCompound;

const TEMP_COEFFICIENT: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    Linear,
    Exponential,
}

/// Best curve found by [`DegradationModel::fit_degradation_curve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationFit {
    pub model_type: CurveType,
    pub degradation_rate: f64,
    pub base_time: f64,
    pub r_squared: f64,
    pub linear_r_squared: f64,
    pub exponential_r_squared: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitWindow {
    pub optimal_pit_lap: Option<u32>,
    pub current_time: f64,
    pub fresher_time: f64,
    pub time_gain_per_lap: f64,
    pub pit_loss: f64,
}

/// Tyre pace-loss curves for one compound at one track temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegradationModel {
    pub compound: TireCompound,
    pub track_temp: f64,
}

impl Default for DegradationModel {
    fn default() -> Self {
        Self::new(TireCompound::Soft, 25.0)
    }
}

/// Relative pace loss per lap for each compound.
pub fn base_rate(compound: TireCompound) -> f64 {
    match compound {
        TireCompound::SuperSoft => 0.10,
        TireCompound::Soft => 0.08,
        TireCompound::Medium => 0.05,
        TireCompound::Hard => 0.03,
        TireCompound::Intermediate => 0.12,
        TireCompound::Wet => 0.15,
    }
}

/// Track temperature window (°C) in which the compound works best.
pub fn optimal_temp_range(compound: TireCompound) -> (f64, f64) {
    match compound {
        TireCompound::Medium => (35.0, 45.0),
        TireCompound::Hard => (40.0, 50.0),
        _ => (30.0, 40.0),
    }
}

/// Fractional pace loss for a tyre of `tire_age` laps, capped at 10%.
pub fn calculate_degradation(tire_age: u32, compound: TireCompound, track_temp: f64) -> f64 {
    let temp_factor = 1.0 + (track_temp - 25.0) * 0.01;
    let deg = 0.002 * compound.wear_multiplier() * temp_factor * f64::from(tire_age);
    deg.clamp(0.0, 0.1)
}

impl DegradationModel {
    pub fn new(compound: TireCompound, track_temp: f64) -> Self {
        Self { compound, track_temp }
    }

    pub fn rate(&self) -> f64 {
        base_rate(self.compound)
    }

    /// `base * (1 + rate)^lap`
    pub fn exponential_degradation(&self, lap: u32, base_time: f64, rate: Option<f64>) -> f64 {
        let rate = rate.unwrap_or_else(|| self.rate());
        base_time * (1.0 + rate).powf(f64::from(lap))
    }

    /// `base * (1 + rate * lap)`
    pub fn linear_degradation(&self, lap: u32, base_time: f64, rate: Option<f64>) -> f64 {
        let rate = rate.unwrap_or_else(|| self.rate());
        base_time + rate * base_time * f64::from(lap)
    }

    /// Linear degradation inflated by distance from the compound's optimal
    /// temperature, and by a further 20% once that distance exceeds 5 °C.
    pub fn temperature_adjusted_degradation(&self, lap: u32, base_time: f64, current_temp: Option<f64>) -> f64 {
        let temp = current_temp.unwrap_or(self.track_temp);
        let (lo, hi) = optimal_temp_range(self.compound);
        let delta = temp - (lo + hi) / 2.0;
        let mut time = self.linear_degradation(lap, base_time, None) * (1.0 + delta.abs() * TEMP_COEFFICIENT);
        if delta.abs() > 5.0 {
            time *= 1.2;
        }
        time
    }

    /// Fits both a linear trend and `a * (1 + b)^lap` and keeps the better one.
    ///
    /// `lap_numbers` defaults to `0..n`.
    pub fn fit_degradation_curve(&self, lap_times: &[f64], lap_numbers: Option<&[f64]>) -> Result<DegradationFit, FitError> {
        if lap_times.len() < 3 {
            return Err(FitError::InsufficientData { needed: 3, got: lap_times.len() });
        }
        let default_laps: Vec<f64>;
        let laps = match lap_numbers {
            Some(l) => l,
            None => {
                default_laps = (0..lap_times.len()).map(|i| i as f64).collect();
                &default_laps
            }
        };

        let linear = fit::linear_fit(laps, lap_times)?;
        let linear_r2 = linear.r_squared.unwrap_or(0.0);

        let exp = fit::curve_fit(
            |x, p| p[0] * (1.0 + p[1]).powf(x),
            laps,
            lap_times,
            &[lap_times[0], 0.01],
            &[f64::NEG_INFINITY, -0.5],
            &[f64::INFINITY, 1.0],
        );
        let (exp_r2, exp_params) = match exp {
            Ok(f) => (f.r_squared.unwrap_or(0.0), f.params),
            Err(e) => {
                debug!("exponential degradation fit failed: {}", e);
                (0.0, vec![lap_times[0], 0.01])
            }
        };

        let fitted = if exp_r2 > linear_r2 {
            DegradationFit {
                model_type: CurveType::Exponential,
                degradation_rate: exp_params[1],
                base_time: exp_params[0],
                r_squared: exp_r2,
                linear_r_squared: linear_r2,
                exponential_r_squared: exp_r2,
            }
        } else {
            DegradationFit {
                model_type: CurveType::Linear,
                degradation_rate: linear.slope,
                base_time: linear.intercept,
                r_squared: linear_r2,
                linear_r_squared: linear_r2,
                exponential_r_squared: exp_r2,
            }
        };
        Ok(fitted)
    }

    /// Predicted lap times over a stint, starting from lap 0.
    pub fn predict_stint(&self, base_time: f64, stint_length: u32, model_type: CurveType) -> Vec<f64> {
        (0..stint_length)
            .map(|lap| match model_type {
                CurveType::Exponential => self.exponential_degradation(lap, base_time, None),
                CurveType::Linear => self.linear_degradation(lap, base_time, None),
            })
            .collect()
    }

    /// First lap on which the time lost to degraded tyres exceeds `pit_loss`.
    pub fn calculate_pit_window(&self, current_time: f64, rate: f64, pit_loss: f64) -> PitWindow {
        let base = current_time / (1.0 + rate);
        let optimal_pit_lap = (1..100u32).find(|lap| {
            let degraded = self.linear_degradation(*lap, base, Some(rate));
            degraded - base > pit_loss
        });
        PitWindow {
            optimal_pit_lap,
            current_time,
            fresher_time: base,
            time_gain_per_lap: rate * base,
            pit_loss,
        }
    }
}

/// Lap-time gain from burning fuel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelEffectModel {
    /// kg per lap
    pub consumption_per_lap: f64,
    /// seconds per 10 kg burned
    pub effect_per_10kg: f64,
}

impl Default for FuelEffectModel {
    fn default() -> Self {
        Self {
            consumption_per_lap: 2.0,
            effect_per_10kg: 0.03,
        }
    }
}

impl FuelEffectModel {
    /// Negative: the car is lighter and faster. `starting_fuel` is the load
    /// at the start of the stint, which bounds what can have burned.
    pub fn fuel_effect(&self, lap: u32, starting_fuel: f64) -> f64 {
        let burned = (f64::from(lap) * self.consumption_per_lap).min(starting_fuel.max(0.0));
        -(burned / 10.0) * self.effect_per_10kg
    }
}
