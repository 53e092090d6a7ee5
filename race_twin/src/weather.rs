use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::WeatherRecord;

const OPTIMAL_TRACK_TEMP: f64 = 27.5;
const TEMP_EFFECT_PER_DEG: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackCondition {
    Dry,
    Damp,
    Wet,
    Mixed,
}

impl TrackCondition {
    fn pace_base(&self) -> f64 {
        match self {
            Self::Dry => 1.0,
            Self::Damp => 1.08,
            Self::Wet => 1.15,
            Self::Mixed => 1.12,
        }
    }

    fn degradation_base(&self) -> f64 {
        match self {
            Self::Dry => 1.0,
            Self::Damp => 0.85,
            Self::Wet => 0.7,
            Self::Mixed => 0.9,
        }
    }
}

impl fmt::Display for TrackCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dry => "dry",
            Self::Damp => "damp",
            Self::Wet => "wet",
            Self::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    #[serde(flatten)]
    pub weather: WeatherRecord,
    pub condition: TrackCondition,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherModel;

impl WeatherModel {
    pub fn new() -> Self {
        Self
    }

    pub fn determine_condition(&self, w: &WeatherRecord) -> TrackCondition {
        if w.rainfall > 0.5 {
            TrackCondition::Wet
        } else if w.rainfall > 0.1 || w.humidity > 80.0 {
            TrackCondition::Damp
        } else if w.track_temp < 15.0 || w.track_temp > 50.0 {
            TrackCondition::Mixed
        } else {
            TrackCondition::Dry
        }
    }

    /// Lap-time multiplier; above 1 is slower.
    pub fn pace_modifier(&self, w: &WeatherRecord) -> f64 {
        let base = self.determine_condition(w).pace_base();
        base * (1.0 + (w.track_temp - OPTIMAL_TRACK_TEMP).abs() * TEMP_EFFECT_PER_DEG)
    }

    /// Degradation-rate multiplier; hotter track wears tyres faster.
    pub fn degradation_modifier(&self, w: &WeatherRecord) -> f64 {
        let base = self.determine_condition(w).degradation_base();
        let temp_effect = (1.0 + (w.track_temp - 25.0) * 0.01).clamp(0.5, 2.0);
        base * temp_effect
    }

    pub fn adjust_lap_time(&self, base_lap_time: f64, w: &WeatherRecord) -> f64 {
        base_lap_time * self.pace_modifier(w)
    }

    pub fn adjust_degradation_rate(&self, base_rate: f64, w: &WeatherRecord) -> f64 {
        base_rate * self.degradation_modifier(w)
    }

    /// Linear drift: the track cools and dries out.
    pub fn predict_evolution(&self, current: &WeatherRecord, laps_ahead: u32) -> WeatherForecast {
        let laps = f64::from(laps_ahead);
        let weather = WeatherRecord {
            track_temp: (current.track_temp - laps * 0.1).max(15.0),
            ambient_temp: current.ambient_temp - laps * 0.05,
            humidity: current.humidity,
            rainfall: (current.rainfall - laps * 0.05).max(0.0),
        };
        WeatherForecast {
            condition: self.determine_condition(&weather),
            weather,
        }
    }
}
