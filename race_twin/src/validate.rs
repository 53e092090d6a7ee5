//! Boundary checks for incoming requests. Each validator collects every
//! problem before failing; on success it returns advisory warnings.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::monte_carlo::PaceSimulationRequest;
use crate::pit_decision::PitDecisionInput;
use crate::pit_rejoin::PitStopRequest;
use crate::registry::LapUpdate;
use crate::simulator::RaceSimulationRequest;
use crate::strategy::StrategyInput;
use crate::types::{DriverRecord, SectorTimes, WeatherRecord};

pub const MAX_LAP_TIME: f64 = 300.0;
pub const MAX_TOTAL_LAPS: u32 = 200;
pub const MAX_TIRE_AGE: u32 = 100;

type Warnings = Vec<String>;

fn finish(errors: Vec<String>, warnings: Warnings) -> Result<Warnings, ValidationError> {
    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ValidationError { errors })
    }
}

fn check_lap_time(label: &str, t: f64, errors: &mut Vec<String>) {
    if !(t > 0.0) {
        errors.push(format!("{} must be positive", label));
    } else if t > MAX_LAP_TIME {
        errors.push(format!("{} is unreasonably high: {}s", label, t));
    }
}

fn check_sectors(label: &str, s: &SectorTimes, errors: &mut Vec<String>) {
    for (name, v) in [("S1", s.s1), ("S2", s.s2), ("S3", s.s3)] {
        if !(v > 0.0) {
            errors.push(format!("{}.{} must be positive", label, name));
        }
    }
}

fn check_weather(w: &WeatherRecord, errors: &mut Vec<String>) {
    if !(-50.0..=60.0).contains(&w.track_temp) {
        errors.push("track_temp must be between -50 and 60°C".to_string());
    }
    if !(0.0..=100.0).contains(&w.humidity) {
        errors.push("humidity must be between 0 and 100".to_string());
    }
    if !(w.rainfall >= 0.0) {
        errors.push("rainfall must be non-negative".to_string());
    }
}

/// Input for building a driver twin from lap history.
pub fn validate_driver_record(d: &DriverRecord) -> Result<Warnings, ValidationError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    if d.id.trim().is_empty() {
        errors.push("driver_id is required".to_string());
    }
    if d.lap_times.is_empty() {
        errors.push("lap_times cannot be empty".to_string());
    }
    for (i, t) in d.lap_times.iter().enumerate() {
        check_lap_time(&format!("lap_times[{}]", i), *t, &mut errors);
    }
    for (i, s) in d.sector_times.iter().enumerate() {
        check_sectors(&format!("sector_times[{}]", i), s, &mut errors);
    }
    if !d.lap_times.is_empty() && d.lap_times.len() < 3 {
        warnings.push("Less than 3 lap times provided - analysis may be less accurate".to_string());
    }
    finish(errors, warnings)
}

pub fn validate_lap_update(u: &LapUpdate) -> Result<Warnings, ValidationError> {
    let mut errors = Vec::new();
    if u.driver_id.trim().is_empty() {
        errors.push("driver_id is required".to_string());
    }
    check_lap_time("lap_time", u.lap_time, &mut errors);
    if u.current_lap < 1 {
        errors.push("current_lap must be >= 1".to_string());
    }
    if u.sector_times != SectorTimes::default() {
        check_sectors("sector_times", &u.sector_times, &mut errors);
    }
    finish(errors, Vec::new())
}

pub fn validate_race_request(r: &RaceSimulationRequest) -> Result<Warnings, ValidationError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    if r.race_id.trim().is_empty() {
        errors.push("race_id is required".to_string());
    }
    if r.drivers.is_empty() {
        errors.push("drivers cannot be empty".to_string());
    }
    let mut seen = HashSet::new();
    for (i, d) in r.drivers.iter().enumerate() {
        if d.id.trim().is_empty() {
            errors.push(format!("drivers[{}].id is required", i));
        } else if !seen.insert(d.id.as_str()) {
            errors.push(format!("drivers[{}].id '{}' is duplicated", i, d.id));
        }
        if d.position < 1 {
            errors.push(format!("drivers[{}].position must be >= 1", i));
        }
        if d.tire_age > MAX_TIRE_AGE {
            errors.push(format!("drivers[{}].tire_age is unreasonably high", i));
        }
        for (j, t) in d.lap_times.iter().enumerate() {
            check_lap_time(&format!("drivers[{}].lap_times[{}]", i, j), *t, &mut errors);
        }
    }
    if r.total_laps < 1 {
        errors.push("total_laps must be >= 1".to_string());
    } else if r.total_laps > MAX_TOTAL_LAPS {
        errors.push("total_laps is unreasonably high".to_string());
    }
    if r.current_lap < 1 {
        errors.push("current_lap must be >= 1".to_string());
    } else if r.current_lap > r.total_laps {
        errors.push("current_lap cannot exceed total_laps".to_string());
    }
    if let Some(w) = &r.weather {
        check_weather(w, &mut errors);
    }
    if r.drivers.len() == 1 {
        warnings.push("Less than 2 drivers provided - race simulation may be less meaningful".to_string());
    }
    finish(errors, warnings)
}

pub fn validate_pit_decision(p: &PitDecisionInput) -> Result<Warnings, ValidationError> {
    let mut errors = Vec::new();
    if p.driver_id.trim().is_empty() {
        errors.push("driver_id is required".to_string());
    }
    if p.tire_age > MAX_TIRE_AGE {
        errors.push("tire_age is unreasonably high".to_string());
    }
    if p.current_position < 1 {
        errors.push("position must be >= 1".to_string());
    }
    if !(0.0..=0.1).contains(&p.degradation_rate) {
        errors.push("degradation_rate must be between 0 and 0.1".to_string());
    }
    if !(0.0..=1.0).contains(&p.traffic_density) {
        errors.push("traffic_density must be between 0 and 1".to_string());
    }
    if p.total_laps < 1 {
        errors.push("total_laps must be >= 1".to_string());
    }
    if let Some(w) = &p.weather {
        check_weather(w, &mut errors);
    }
    finish(errors, Vec::new())
}

pub fn validate_pace_request(r: &PaceSimulationRequest) -> Result<Warnings, ValidationError> {
    let mut errors = Vec::new();
    if r.driver_paces.is_empty() {
        errors.push("driver_paces cannot be empty".to_string());
    }
    for (id, pace) in &r.driver_paces {
        check_lap_time(&format!("driver_paces.{}", id), *pace, &mut errors);
    }
    if r.n_laps < 1 || r.n_laps > MAX_TOTAL_LAPS {
        errors.push(format!("n_laps must be between 1 and {}", MAX_TOTAL_LAPS));
    }
    if r.iterations > 10_000 {
        errors.push("iterations must be at most 10000".to_string());
    }
    finish(errors, Vec::new())
}

pub fn validate_strategy_input(s: &StrategyInput) -> Result<Warnings, ValidationError> {
    let mut errors = Vec::new();
    if s.driver_id.trim().is_empty() {
        errors.push("driver_id is required".to_string());
    }
    if s.current_lap < 1 {
        errors.push("current_lap must be >= 1".to_string());
    } else if s.current_lap > s.total_laps {
        errors.push("current_lap cannot exceed total_laps".to_string());
    }
    if s.current_position < 1 {
        errors.push("position must be >= 1".to_string());
    }
    if !(0.0..=0.1).contains(&s.degradation_rate) {
        errors.push("degradation_rate must be between 0 and 0.1".to_string());
    }
    if !(0.0..=1.0).contains(&s.traffic_density) {
        errors.push("traffic_density must be between 0 and 1".to_string());
    }
    check_lap_time("driver_pace", s.driver_pace, &mut errors);
    finish(errors, Vec::new())
}

pub fn validate_pit_stop(p: &PitStopRequest) -> Result<Warnings, ValidationError> {
    let mut errors = Vec::new();
    if p.driver_id.trim().is_empty() {
        errors.push("driver_id is required".to_string());
    }
    if p.current_position < 1 {
        errors.push("position must be >= 1".to_string());
    }
    if p.total_cars < p.current_position {
        errors.push("total_cars must be >= position".to_string());
    }
    if !(p.pit_time > 0.0) {
        errors.push("pit_time must be positive".to_string());
    }
    if !(0.0..=1.0).contains(&p.traffic_density) {
        errors.push("traffic_density must be between 0 and 1".to_string());
    }
    finish(errors, Vec::new())
}
