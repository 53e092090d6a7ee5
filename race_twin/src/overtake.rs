use serde::{Deserialize, Serialize};

use crate::types::Sector;

/// How readily each sector allows a pass.
pub fn sector_factor(sector: Sector) -> f64 {
    match sector {
        Sector::S1 => 0.3,
        Sector::S2 => 0.5,
        Sector::S3 => 0.4,
    }
}

/// One car in a pairwise overtake comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertakeCandidate {
    pub id: String,
    /// km/h
    pub speed: f64,
    pub position: u32,
    pub tire_age: u32,
    #[serde(default)]
    pub sector: Sector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertakeOdds {
    pub attacker: String,
    pub defender: String,
    pub probability: f64,
    pub likely: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OvertakeProbabilityModel;

impl OvertakeProbabilityModel {
    pub fn new() -> Self {
        Self
    }

    pub fn probability(
        &self,
        attacker_speed: f64,
        defender_speed: f64,
        attacker_position: u32,
        defender_position: u32,
        attacker_tire_age: u32,
        defender_tire_age: u32,
        sector: Sector,
    ) -> f64 {
        let speed_advantage = if defender_speed > 0.0 {
            (attacker_speed - defender_speed) / defender_speed * 0.5
        } else {
            0.0
        };
        let proximity = match attacker_position.abs_diff(defender_position) {
            0 => 0.0,
            d => 1.0 / f64::from(d),
        };
        let tire_advantage =
            ((f64::from(defender_tire_age) - f64::from(attacker_tire_age)) / 20.0).clamp(0.0, 0.5);

        let p = 0.1 + 0.4 * speed_advantage + 0.2 * proximity + 0.2 * tire_advantage + 0.1 * sector_factor(sector);
        p.clamp(0.0, 1.0)
    }

    /// Odds for every car against each car running ahead of it.
    pub fn predict_overtakes(&self, cars: &[OvertakeCandidate]) -> Vec<OvertakeOdds> {
        let mut out = Vec::new();
        for attacker in cars {
            for defender in cars {
                if attacker.position <= defender.position || attacker.id == defender.id {
                    continue;
                }
                let probability = self.probability(
                    attacker.speed,
                    defender.speed,
                    attacker.position,
                    defender.position,
                    attacker.tire_age,
                    defender.tire_age,
                    attacker.sector,
                );
                out.push(OvertakeOdds {
                    attacker: attacker.id.clone(),
                    defender: defender.id.clone(),
                    probability,
                    likely: probability > 0.5,
                });
            }
        }
        out
    }
}
