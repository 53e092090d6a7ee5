use serde::{Deserialize, Serialize};
use std::fmt;

/// Tyre compound. Unknown names deserialize to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum TireCompound {
    SuperSoft,
    Soft,
    #[default]
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl TireCompound {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "SUPER_SOFT" | "SUPERSOFT" => Self::SuperSoft,
            "SOFT" => Self::Soft,
            "MEDIUM" => Self::Medium,
            "HARD" => Self::Hard,
            "INTERMEDIATE" | "INTER" => Self::Intermediate,
            "WET" => Self::Wet,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperSoft => "SUPER_SOFT",
            Self::Soft => "SOFT",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
            Self::Intermediate => "INTERMEDIATE",
            Self::Wet => "WET",
        }
    }

    /// Multiplier applied to fitted or base degradation rates.
    pub fn wear_multiplier(&self) -> f64 {
        match self {
            Self::Soft => 1.5,
            Self::Hard => 0.7,
            _ => 1.0,
        }
    }

    /// Next compound in the SOFT -> MEDIUM -> HARD ladder. Compounds outside
    /// the ladder are treated as MEDIUM.
    pub fn next_harder(&self) -> Self {
        match self {
            Self::Soft => Self::Medium,
            _ => Self::Hard,
        }
    }

    /// Same-compound stay for the ladder; off-ladder compounds land on MEDIUM.
    pub fn ladder_stay(&self) -> Self {
        match self {
            Self::Soft | Self::Medium | Self::Hard => *self,
            _ => Self::Medium,
        }
    }
}

impl From<String> for TireCompound {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for TireCompound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Track sector. Unknown ids deserialize to `S3`, whose entry in every
/// per-sector table is the neutral one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String")]
pub enum Sector {
    S1,
    S2,
    #[default]
    S3,
}

impl Sector {
    pub const ALL: [Sector; 3] = [Sector::S1, Sector::S2, Sector::S3];

    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "S1" => Self::S1,
            "S2" => Self::S2,
            _ => Self::S3,
        }
    }

    /// Sector the simulator treats a given lap as being decided in.
    pub fn for_lap(lap: u32) -> Self {
        Self::ALL[(lap.saturating_sub(1) % 3) as usize]
    }
}

impl From<String> for Sector {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::S1 => "S1",
            Self::S2 => "S2",
            Self::S3 => "S3",
        };
        f.write_str(s)
    }
}

/// Sector split times for one lap, in seconds. Missing or non-positive values
/// are ignored by the profilers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorTimes {
    #[serde(rename = "S1", default)]
    pub s1: f64,
    #[serde(rename = "S2", default)]
    pub s2: f64,
    #[serde(rename = "S3", default)]
    pub s3: f64,
}

impl SectorTimes {
    pub fn new(s1: f64, s2: f64, s3: f64) -> Self {
        Self { s1, s2, s3 }
    }

    pub fn get(&self, sector: Sector) -> f64 {
        match sector {
            Sector::S1 => self.s1,
            Sector::S2 => self.s2,
            Sector::S3 => self.s3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub throttle: Option<f64>,
    pub brake: Option<f64>,
    pub speed: Option<f64>,
    pub steering: Option<f64>,
    pub g_force: Option<f64>,
}

fn default_position() -> u32 {
    1
}

/// One driver's state as handed over by the ingestion layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverRecord {
    pub id: String,
    #[serde(default = "default_position")]
    pub position: u32,
    #[serde(default)]
    pub lap_times: Vec<f64>,
    #[serde(default)]
    pub sector_times: Vec<SectorTimes>,
    #[serde(default)]
    pub telemetry: Vec<TelemetrySample>,
    #[serde(default)]
    pub tire_age: u32,
    #[serde(default)]
    pub tire_compound: TireCompound,
    #[serde(default)]
    pub current_lap: u32,
    /// Previously generated twin; used as-is instead of regenerating.
    #[serde(default)]
    pub twin: Option<crate::driver_twin::DriverTwin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherRecord {
    pub track_temp: f64,
    pub ambient_temp: f64,
    /// Percent, 0-100.
    pub humidity: f64,
    /// mm/h.
    pub rainfall: f64,
}

impl Default for WeatherRecord {
    fn default() -> Self {
        Self {
            track_temp: 25.0,
            ambient_temp: 25.0,
            humidity: 50.0,
            rainfall: 0.0,
        }
    }
}

/// Planned pit laps for one driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitPlan {
    pub driver_id: String,
    #[serde(default)]
    pub planned_pits: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpponentRecord {
    pub id: String,
    /// Gap in seconds; sign ignored when finding the closest opponent.
    #[serde(default)]
    pub gap: f64,
    pub tire_age: Option<u32>,
    #[serde(default)]
    pub just_pitted: bool,
}

/// Degradation-driven pit advice shared by the rejoin and strategy models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PitAdvice {
    PitNow,
    PitInWindow,
    PitEarly,
    ExtendStint,
}

/// Where a car is on track, for traffic density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarSnapshot {
    pub id: String,
    pub position: u32,
    #[serde(default)]
    pub sector: Sector,
}

pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
