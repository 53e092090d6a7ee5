use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::degradation::{base_rate, DegradationModel, FuelEffectModel};
use crate::stats;
use crate::types::TireCompound;

const MIN_STINT_LAPS: u32 = 10;
const FULL_TANK: f64 = 100.0;

fn default_laps() -> u32 {
    50
}

fn default_iterations() -> usize {
    1000
}

/// Base-pace race simulation input: one base lap time per driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaceSimulationRequest {
    pub driver_paces: BTreeMap<String, f64>,
    #[serde(default = "default_laps")]
    pub n_laps: u32,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Zero-based laps on which each driver stops.
    #[serde(default)]
    pub pit_strategy: BTreeMap<String, Vec<u32>>,
    /// Compound per stint; drivers without an entry run SOFT.
    #[serde(default)]
    pub compounds: BTreeMap<String, Vec<TireCompound>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceRaceResult {
    pub final_positions: BTreeMap<String, u32>,
    pub final_times: BTreeMap<String, f64>,
    pub pit_stops: BTreeMap<String, Vec<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LikelyPosition {
    pub position: u32,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceSimulationSummary {
    pub iterations: usize,
    pub average_times: BTreeMap<String, TimeStats>,
    pub position_probabilities: BTreeMap<String, BTreeMap<u32, f64>>,
    pub most_likely_positions: BTreeMap<String, LikelyPosition>,
    /// The first ten iterations, for inspection.
    pub simulations: Vec<PaceRaceResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitStrategyPlan {
    pub recommended_pit_laps: Vec<u32>,
    pub degradation_per_lap: f64,
    pub pit_loss: f64,
    pub expected_gain: f64,
}

struct Stint {
    index: usize,
    laps: u32,
    compound: TireCompound,
    /// Load at the start of the stint; burn is derived from `laps`.
    starting_fuel: f64,
}

/// Race simulator driven by base pace, compound wear and fuel burn only.
#[derive(Debug, Clone)]
pub struct PaceMonteCarlo {
    pit_loss: f64,
    /// Uniform execution noise as a fraction of lap time.
    lap_time_noise: f64,
    fuel: FuelEffectModel,
}

impl Default for PaceMonteCarlo {
    fn default() -> Self {
        Self::new(25.0, 0.02)
    }
}

impl PaceMonteCarlo {
    pub fn new(pit_loss: f64, lap_time_noise: f64) -> Self {
        Self {
            pit_loss,
            lap_time_noise: lap_time_noise.abs(),
            fuel: FuelEffectModel::default(),
        }
    }

    pub fn simulate_lap_time<R: Rng + ?Sized>(
        &self,
        base_time: f64,
        laps_in_stint: u32,
        compound: TireCompound,
        starting_fuel: f64,
        rng: &mut R,
    ) -> f64 {
        let worn = DegradationModel::new(compound, 25.0).linear_degradation(laps_in_stint, base_time, None);
        let time = worn + self.fuel.fuel_effect(laps_in_stint, starting_fuel);
        let noise = self.lap_time_noise;
        time * rng.gen_range(1.0 - noise..=1.0 + noise)
    }

    pub fn simulate_one_race<R: Rng + ?Sized>(&self, req: &PaceSimulationRequest, rng: &mut R) -> PaceRaceResult {
        let ids: Vec<&String> = req.driver_paces.keys().collect();
        let mut times = vec![0.0_f64; ids.len()];
        let mut stops: Vec<Vec<u32>> = vec![Vec::new(); ids.len()];
        let mut stints: Vec<Stint> = ids
            .iter()
            .map(|id| Stint {
                index: 0,
                laps: 0,
                compound: stint_compound(req, id, 0).unwrap_or(TireCompound::Soft),
                starting_fuel: FULL_TANK,
            })
            .collect();

        for lap in 0..req.n_laps {
            for (i, id) in ids.iter().enumerate() {
                let stint = &mut stints[i];
                if req.pit_strategy.get(*id).is_some_and(|laps| laps.contains(&lap)) {
                    times[i] += self.pit_loss;
                    stops[i].push(lap);
                    stint.index += 1;
                    stint.laps = 0;
                    if let Some(next) = stint_compound(req, id, stint.index) {
                        stint.compound = next;
                    }
                    stint.starting_fuel = FULL_TANK;
                }
                let base = req.driver_paces[*id];
                times[i] += self.simulate_lap_time(base, stint.laps, stint.compound, stint.starting_fuel, rng);
                stint.laps += 1;
            }
        }

        let mut order: Vec<usize> = (0..ids.len()).collect();
        order.sort_by(|a, b| times[*a].total_cmp(&times[*b]));
        PaceRaceResult {
            final_positions: order
                .iter()
                .enumerate()
                .map(|(pos, i)| (ids[*i].clone(), pos as u32 + 1))
                .collect(),
            final_times: ids.iter().zip(&times).map(|(id, t)| ((*id).clone(), *t)).collect(),
            pit_stops: ids.iter().cloned().cloned().zip(stops).collect(),
        }
    }

    /// Runs `iterations` races (at least one), each on its own seeded
    /// generator, and summarises times and finishing positions.
    pub fn simulate<R: Rng + ?Sized>(&self, req: &PaceSimulationRequest, rng: &mut R) -> PaceSimulationSummary {
        let iterations = req.iterations.max(1);
        let seeds: Vec<u64> = (0..iterations).map(|_| rng.gen()).collect();
        let results: Vec<PaceRaceResult> = seeds
            .into_par_iter()
            .map(|seed| self.simulate_one_race(req, &mut SmallRng::seed_from_u64(seed)))
            .collect();

        let n = iterations as f64;
        let field = req.driver_paces.len() as u32;
        let mut average_times = BTreeMap::new();
        let mut position_probabilities = BTreeMap::new();
        let mut most_likely_positions = BTreeMap::new();
        for id in req.driver_paces.keys() {
            let times: Vec<f64> = results.iter().filter_map(|r| r.final_times.get(id).copied()).collect();
            average_times.insert(
                id.clone(),
                TimeStats {
                    mean: stats::mean(&times),
                    median: stats::median(&times),
                    std: stats::sample_std_dev(&times),
                    min: times.iter().copied().fold(f64::INFINITY, f64::min),
                    max: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                },
            );

            let probs: BTreeMap<u32, f64> = (1..=field)
                .map(|pos| {
                    let count = results.iter().filter(|r| r.final_positions.get(id) == Some(&pos)).count();
                    (pos, count as f64 / n)
                })
                .collect();
            let likely = probs.iter().fold(LikelyPosition { position: 1, probability: -1.0 }, |best, (pos, p)| {
                if *p > best.probability {
                    LikelyPosition {
                        position: *pos,
                        probability: *p,
                    }
                } else {
                    best
                }
            });
            most_likely_positions.insert(id.clone(), likely);
            position_probabilities.insert(id.clone(), probs);
        }

        info!("pace simulation: {} drivers, {} laps, {} iterations", field, req.n_laps, iterations);
        PaceSimulationSummary {
            iterations,
            average_times,
            position_probabilities,
            most_likely_positions,
            simulations: results.into_iter().take(10).collect(),
        }
    }

    /// First lap of each stint (at least ten laps long) at which accumulated
    /// wear costs more than a stop.
    pub fn optimize_pit_strategy(
        &self,
        driver_pace: f64,
        n_laps: u32,
        compound: TireCompound,
        max_pit_stops: usize,
    ) -> PitStrategyPlan {
        let degradation_per_lap = base_rate(compound) * driver_pace;
        let mut recommended_pit_laps: Vec<u32> = Vec::new();
        for _ in 0..max_pit_stops {
            let start = recommended_pit_laps.last().copied().unwrap_or(0);
            let next = (start + MIN_STINT_LAPS..n_laps)
                .find(|lap| degradation_per_lap * f64::from(lap - start) > self.pit_loss);
            match next {
                Some(lap) => recommended_pit_laps.push(lap),
                None => break,
            }
        }
        debug!(?recommended_pit_laps, degradation_per_lap, "pit strategy optimised");
        PitStrategyPlan {
            recommended_pit_laps,
            degradation_per_lap,
            pit_loss: self.pit_loss,
            expected_gain: degradation_per_lap * 20.0 - self.pit_loss,
        }
    }
}

fn stint_compound(req: &PaceSimulationRequest, id: &str, stint: usize) -> Option<TireCompound> {
    req.compounds.get(id).and_then(|c| c.get(stint).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_drivers() -> PaceSimulationRequest {
        PaceSimulationRequest {
            driver_paces: [("A".to_string(), 90.0), ("B".to_string(), 91.0)].into_iter().collect(),
            n_laps: 10,
            iterations: 100,
            ..PaceSimulationRequest::default()
        }
    }

    #[test]
    fn faster_driver_wins_more_often() {
        let mc = PaceMonteCarlo::default();
        let summary = mc.simulate(&two_drivers(), &mut SmallRng::seed_from_u64(42));
        assert!(summary.average_times["A"].mean < summary.average_times["B"].mean);
        assert!(summary.position_probabilities["A"][&1] > 0.5);
        assert_eq!(summary.most_likely_positions["A"].position, 1);
        assert_eq!(summary.simulations.len(), 10);
        println!(
            "✓ A wins {:.0}% of races",
            summary.position_probabilities["A"][&1] * 100.0
        );
    }

    #[test]
    fn fuel_gain_never_reverses_in_long_stint() {
        let mc = PaceMonteCarlo::new(25.0, 0.0);
        let wear = DegradationModel::new(TireCompound::Hard, 25.0);
        let mut rng = SmallRng::seed_from_u64(5);
        let mut previous = 0.0;
        for lap in 0..60 {
            let time = mc.simulate_lap_time(90.0, lap, TireCompound::Hard, FULL_TANK, &mut rng);
            let fuel_part = time - wear.linear_degradation(lap, 90.0, None);
            assert!(fuel_part <= previous + 1e-9, "lap {}: {} after {}", lap, fuel_part, previous);
            previous = fuel_part;
        }
        assert!((previous + 0.3).abs() < 1e-9);
        println!("✓ fuel gain settles at {:.3}s once the tank is empty", previous);
    }

    #[test]
    fn position_probabilities_sum_to_one() {
        let mc = PaceMonteCarlo::default();
        let summary = mc.simulate(&two_drivers(), &mut SmallRng::seed_from_u64(1));
        for probs in summary.position_probabilities.values() {
            let total: f64 = probs.values().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        let a = summary.average_times["A"];
        assert!(a.min <= a.median && a.median <= a.max);
        assert!(a.std > 0.0);
    }

    #[test]
    fn planned_stop_costs_pit_loss() {
        let mc = PaceMonteCarlo::new(25.0, 0.0);
        let mut req = two_drivers();
        req.pit_strategy.insert("A".into(), vec![5]);
        req.compounds.insert("A".into(), vec![TireCompound::Soft, TireCompound::Hard]);
        let r = mc.simulate_one_race(&req, &mut SmallRng::seed_from_u64(3));
        assert_eq!(r.pit_stops["A"], vec![5]);
        assert!(r.pit_stops["B"].is_empty());

        // Noise-free: stint of 5 soft laps + pit loss + 5 fresh hard laps.
        let soft: f64 = (0..5).map(|l| 90.0 * (1.0 + 0.08 * l as f64) - 0.006 * l as f64).sum();
        let hard: f64 = (0..5).map(|l| 90.0 * (1.0 + 0.03 * l as f64) - 0.006 * l as f64).sum();
        assert!((r.final_times["A"] - (soft + 25.0 + hard)).abs() < 1e-9);
    }

    #[test]
    fn noise_stays_within_band() {
        let mc = PaceMonteCarlo::default();
        let mut rng = SmallRng::seed_from_u64(8);
        for _ in 0..200 {
            let t = mc.simulate_lap_time(100.0, 0, TireCompound::Medium, 100.0, &mut rng);
            assert!((98.0..=102.0).contains(&t));
        }
    }

    #[test]
    fn pit_strategy_search() {
        let mc = PaceMonteCarlo::default();
        // 0.08 * 90 = 7.2 s/lap: loss passes 25 s after 4 laps, so the
        // ten-lap minimum stint decides.
        let plan = mc.optimize_pit_strategy(90.0, 50, TireCompound::Soft, 2);
        assert_eq!(plan.recommended_pit_laps, vec![10, 20]);
        assert!((plan.degradation_per_lap - 7.2).abs() < 1e-9);

        let short = mc.optimize_pit_strategy(90.0, 15, TireCompound::Soft, 3);
        assert_eq!(short.recommended_pit_laps, vec![10]);
    }
}
