use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

use crate::config::{EngineConfig, SimulationConfig};
use crate::degradation::DegradationModel;
use crate::driver_twin::{default_degradation_rate, DriverTwin, DriverTwinGenerator};
use crate::error::SimulationError;
use crate::overtake::OvertakeProbabilityModel;
use crate::pit_rejoin::{PitRejoinSimulator, PitStopRequest, TrafficImpact};
use crate::stats;
use crate::strategy::{Level, Recommendation, StrategyInput, StrategyOptimizer};
use crate::traffic::TrafficDensityModel;
use crate::types::{now_ms, CarSnapshot, DriverRecord, PitPlan, Sector, TireCompound, WeatherRecord};
use crate::weather::WeatherModel;

const DEFAULT_LAP_TIME: f64 = 95.0;
/// km/h; pace vectors are mapped onto this for the overtake model.
const BASE_SPEED: f64 = 150.0;
const FOCUS_TRAFFIC_DENSITY: f64 = 0.5;
const DEFAULT_WINDOW: (u32, u32) = (18, 22);

fn first_lap() -> u32 {
    1
}

fn default_simulations() -> usize {
    500
}

/// Everything needed to simulate the rest of a race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSimulationRequest {
    pub race_id: String,
    pub drivers: Vec<DriverRecord>,
    pub total_laps: u32,
    #[serde(default = "first_lap")]
    pub current_lap: u32,
    #[serde(default)]
    pub weather: Option<WeatherRecord>,
    #[serde(default)]
    pub pit_strategies: Vec<PitPlan>,
    /// Clamped to the configured bounds before running.
    #[serde(default = "default_simulations")]
    pub num_simulations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitStopRecord {
    pub lap: u32,
    pub pit_time: f64,
    pub old_compound: TireCompound,
    pub new_compound: TireCompound,
    pub rejoin_position: u32,
    pub positions_lost: u32,
    pub time_lost: f64,
    pub traffic_impact: TrafficImpact,
}

/// One iteration's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub finishing_order: Vec<String>,
    pub pit_stops: BTreeMap<String, Vec<PitStopRecord>>,
    pub total_times: BTreeMap<String, f64>,
    /// Racing laps only; pit time is in `pit_stops`.
    #[serde(default)]
    pub lap_times: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPosition {
    pub driver_id: String,
    /// Most frequent finishing position.
    pub position: u32,
    pub probability: f64,
    pub position_distribution: BTreeMap<u32, f64>,
    pub mean_total_time: f64,
    pub win_probability: f64,
    pub podium_probability: f64,
    pub points_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitLapWindow {
    pub start: u32,
    pub end: u32,
    /// Modal pit lap; `None` when no iteration pitted.
    pub most_common: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitRecommendations {
    pub optimal_window: PitLapWindow,
    pub undercut_viable: bool,
    pub undercut_time_gain: f64,
    pub overcut_viable: bool,
    pub overcut_time_gain: f64,
    pub recommendation: Recommendation,
    pub pit_stops_per_simulation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TireCliff {
    pub lap: u32,
    pub critical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficSimulation {
    pub clear_window: bool,
    pub busy: bool,
    pub traffic_density: f64,
    /// Seconds per lap after rejoining.
    pub average_traffic_penalty: f64,
    pub clear_window_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UndercutOutcomes {
    pub viable: bool,
    pub time_gain: f64,
    pub confidence: Level,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloOutcomes {
    pub driver_id: String,
    pub win_probability: f64,
    pub podium_probability: f64,
    pub points_probability: f64,
}

/// Aggregated outcome of a Monte Carlo race simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceTwin {
    pub race_id: String,
    pub simulations: usize,
    pub iterations_completed: usize,
    /// Set when cancellation or the deadline stopped the run early.
    pub truncated: bool,
    pub current_lap: u32,
    pub total_laps: u32,
    pub expected_finishing_positions: Vec<ExpectedPosition>,
    pub pit_recommendations: PitRecommendations,
    pub tire_cliff_prediction: TireCliff,
    pub traffic_simulation: TrafficSimulation,
    pub undercut_outcomes: UndercutOutcomes,
    pub monte_carlo_outcomes: MonteCarloOutcomes,
    pub confidence: f64,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

/// Cooperative stop signal, checked before every iteration.
#[derive(Debug, Clone, Default)]
pub struct SimulationControl {
    deadline: Option<Instant>,
    cancel: Arc<AtomicBool>,
}

impl SimulationControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn from_config(cfg: &SimulationConfig) -> Self {
        match cfg.deadline_ms {
            Some(ms) => Self::new().with_timeout(Duration::from_millis(ms)),
            None => Self::new(),
        }
    }

    /// Flag shared with whoever may cancel the run from another thread.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.cancel.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::TimedOut),
            _ => None,
        }
    }
}

/// Raw iterations, in seed order, before aggregation.
#[derive(Debug, Clone)]
pub struct IterationBatch {
    pub requested: usize,
    pub results: Vec<SimulationResult>,
    pub stopped: Option<StopReason>,
}

#[derive(Debug, Clone)]
struct RaceState {
    position: u32,
    lap_times: Vec<f64>,
    pit_stops: Vec<PitStopRecord>,
    tire_age: u32,
    tire_compound: TireCompound,
    total_time: f64,
}

/// Per-call data shared read-only by every iteration.
struct Prepared<'a> {
    req: &'a RaceSimulationRequest,
    twins: Vec<DriverTwin>,
    noise: Vec<Option<Normal<f64>>>,
    planned: Vec<Vec<u32>>,
}

/// Monte Carlo race simulator producing a [`RaceTwin`].
#[derive(Debug, Clone, Default)]
pub struct RaceTwinSimulator {
    cfg: SimulationConfig,
    generator: DriverTwinGenerator,
    rejoin: PitRejoinSimulator,
    traffic: TrafficDensityModel,
    overtake: OvertakeProbabilityModel,
    weather: WeatherModel,
    strategy: StrategyOptimizer,
}

impl RaceTwinSimulator {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            cfg: cfg.simulation.clone(),
            generator: DriverTwinGenerator::new(cfg.twin.clone()),
            rejoin: PitRejoinSimulator::new(cfg.pit_rejoin.clone()),
            traffic: TrafficDensityModel::new(),
            overtake: OvertakeProbabilityModel::new(),
            weather: WeatherModel::new(),
            strategy: StrategyOptimizer::new(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.cfg
    }

    pub fn clamp_simulations(&self, requested: usize) -> usize {
        self.cfg.clamp_simulations(requested)
    }

    /// Runs the full simulation with no deadline.
    pub fn simulate_race<R: Rng + ?Sized>(
        &self,
        req: &RaceSimulationRequest,
        rng: &mut R,
    ) -> Result<RaceTwin, SimulationError> {
        self.simulate_race_with_control(req, rng, &SimulationControl::new())
    }

    pub fn simulate_race_with_control<R: Rng + ?Sized>(
        &self,
        req: &RaceSimulationRequest,
        rng: &mut R,
        control: &SimulationControl,
    ) -> Result<RaceTwin, SimulationError> {
        let span = info_span!("simulate_race", race_id = %req.race_id);
        let _enter = span.enter();

        let prepared = self.prepare(req)?;
        let batch = self.run_prepared(&prepared, rng, control);
        if batch.results.is_empty() {
            return Err(match batch.stopped {
                Some(StopReason::TimedOut) => SimulationError::TimedOut { completed: 0 },
                _ => SimulationError::Cancelled { completed: 0 },
            });
        }
        if let Some(reason) = batch.stopped {
            warn!(
                "race {} stopped early ({:?}) after {}/{} iterations",
                req.race_id,
                reason,
                batch.results.len(),
                batch.requested
            );
        }
        let twin = self.aggregate(&prepared, &batch.results, batch.requested, batch.stopped.is_some());
        info!(
            "simulated race {}: {} iterations, {} drivers, laps {}-{}",
            req.race_id,
            twin.iterations_completed,
            req.drivers.len(),
            req.current_lap,
            req.total_laps
        );
        Ok(twin)
    }

    /// Runs the iterations without aggregating them.
    pub fn run_iterations<R: Rng + ?Sized>(
        &self,
        req: &RaceSimulationRequest,
        rng: &mut R,
        control: &SimulationControl,
    ) -> Result<IterationBatch, SimulationError> {
        let prepared = self.prepare(req)?;
        Ok(self.run_prepared(&prepared, rng, control))
    }

    fn prepare<'a>(&self, req: &'a RaceSimulationRequest) -> Result<Prepared<'a>, SimulationError> {
        if req.drivers.is_empty() {
            return Err(SimulationError::NoDrivers);
        }
        let twins: Vec<DriverTwin> = req
            .drivers
            .iter()
            .map(|d| d.twin.clone().unwrap_or_else(|| self.generator.generate(d)))
            .collect();
        let noise = twins
            .iter()
            .map(|t| Normal::new(0.0, (1.0 - t.consistency_index).max(0.0) * 0.5).ok())
            .collect();
        let planned = req
            .drivers
            .iter()
            .map(|d| {
                req.pit_strategies
                    .iter()
                    .filter(|p| p.driver_id == d.id)
                    .flat_map(|p| p.planned_pits.iter().copied())
                    .collect()
            })
            .collect();
        Ok(Prepared {
            req,
            twins,
            noise,
            planned,
        })
    }

    fn run_prepared<R: Rng + ?Sized>(
        &self,
        p: &Prepared<'_>,
        rng: &mut R,
        control: &SimulationControl,
    ) -> IterationBatch {
        let requested = self.clamp_simulations(p.req.num_simulations);
        let seeds: Vec<u64> = (0..requested).map(|_| rng.gen()).collect();
        debug!(requested, parallel = self.cfg.parallel, "running race iterations");

        let run = |seed: u64| -> Option<SimulationResult> {
            if control.stop_reason().is_some() {
                return None;
            }
            let mut iter_rng = SmallRng::seed_from_u64(seed);
            Some(self.run_single(p, &mut iter_rng))
        };
        let outcomes: Vec<Option<SimulationResult>> = if self.cfg.parallel {
            seeds.into_par_iter().map(run).collect()
        } else {
            seeds.into_iter().map(run).collect()
        };

        let results: Vec<SimulationResult> = outcomes.into_iter().flatten().collect();
        let stopped = if results.len() < requested {
            control.stop_reason().or(Some(StopReason::Cancelled))
        } else {
            None
        };
        IterationBatch {
            requested,
            results,
            stopped,
        }
    }

    fn run_single(&self, p: &Prepared<'_>, rng: &mut SmallRng) -> SimulationResult {
        let drivers = &p.req.drivers;
        let mut states: Vec<RaceState> = drivers
            .iter()
            .map(|d| RaceState {
                position: d.position,
                lap_times: Vec::with_capacity(p.req.total_laps.saturating_sub(p.req.current_lap) as usize + 1),
                pit_stops: Vec::new(),
                tire_age: d.tire_age,
                tire_compound: d.tire_compound,
                total_time: 0.0,
            })
            .collect();

        for lap in p.req.current_lap..=p.req.total_laps {
            for idx in 0..states.len() {
                let lap_time = self.lap_time(p, idx, &states, lap, rng);
                let state = &mut states[idx];
                state.total_time += lap_time;
                state.lap_times.push(lap_time);
                state.tire_age += 1;

                let rate = p.twins[idx].degradation_profile.rate;
                if self.should_pit(&p.planned[idx], &states[idx], rate, lap, p.req.total_laps, rng) {
                    let stop = self.pit_stop(&states, idx, lap, &drivers[idx].id, rng);
                    let state = &mut states[idx];
                    state.total_time += stop.pit_time;
                    state.tire_age = 0;
                    state.tire_compound = stop.new_compound;
                    state.position = stop.rejoin_position;
                    state.pit_stops.push(stop);
                }

                self.attempt_overtake(&mut states, &p.twins, idx, lap, rng);
            }
            rerank(&mut states);
        }

        let mut order: Vec<usize> = (0..states.len()).collect();
        order.sort_by(|a, b| states[*a].total_time.total_cmp(&states[*b].total_time));
        SimulationResult {
            finishing_order: order.iter().map(|i| drivers[*i].id.clone()).collect(),
            pit_stops: drivers
                .iter()
                .zip(states.iter_mut())
                .map(|(d, s)| (d.id.clone(), std::mem::take(&mut s.pit_stops)))
                .collect(),
            total_times: drivers.iter().zip(&states).map(|(d, s)| (d.id.clone(), s.total_time)).collect(),
            lap_times: drivers
                .iter()
                .zip(states.iter_mut())
                .map(|(d, s)| (d.id.clone(), std::mem::take(&mut s.lap_times)))
                .collect(),
        }
    }

    fn lap_time(&self, p: &Prepared<'_>, idx: usize, states: &[RaceState], lap: u32, rng: &mut SmallRng) -> f64 {
        let twin = &p.twins[idx];
        let state = &states[idx];
        let profile = &twin.degradation_profile;

        let seed_pace = if profile.base_pace > 0.0 {
            profile.base_pace
        } else {
            DEFAULT_LAP_TIME * (1.0 + twin.pace_vector)
        };
        // The fitted rate belongs to the compound the twin was built on.
        let fitted = if state.tire_compound == profile.compound {
            profile.rate
        } else {
            default_degradation_rate(state.tire_compound)
        };
        let (rate, track_temp) = match &p.req.weather {
            Some(w) => (self.weather.adjust_degradation_rate(fitted, w), w.track_temp),
            None => (fitted, 25.0),
        };

        let mut time = DegradationModel::new(state.tire_compound, track_temp).exponential_degradation(
            state.tire_age,
            seed_pace,
            Some(rate),
        );
        if let Some(w) = &p.req.weather {
            time = self.weather.adjust_lap_time(time, w);
        }
        time += self.traffic_penalty(states, state.position, Sector::for_lap(lap), rng);
        if let Some(noise) = &p.noise[idx] {
            time += noise.sample(rng);
        }
        time.max(self.cfg.min_lap_time)
    }

    fn field_density(&self, states: &[RaceState], sector: Sector) -> f64 {
        let cars: Vec<CarSnapshot> = states
            .iter()
            .map(|s| CarSnapshot {
                id: String::new(),
                position: s.position,
                sector,
            })
            .collect();
        self.traffic.calculate_density(&cars, sector)
    }

    fn traffic_penalty(&self, states: &[RaceState], position: u32, sector: Sector, rng: &mut SmallRng) -> f64 {
        let cars_ahead = position.saturating_sub(1);
        if cars_ahead == 0 {
            return 0.0;
        }
        let density = self.field_density(states, sector);
        let penalty = self.traffic.traffic_penalty(cars_ahead, density, sector) + rng.gen_range(-0.02..0.08);
        penalty.max(0.0)
    }

    fn should_pit(
        &self,
        planned: &[u32],
        state: &RaceState,
        rate: f64,
        lap: u32,
        total_laps: u32,
        rng: &mut SmallRng,
    ) -> bool {
        if planned.contains(&lap) {
            return true;
        }
        let critical_age = if rate >= 0.003 { 15 } else { 20 };
        if state.tire_age >= critical_age && total_laps.saturating_sub(lap) >= self.cfg.min_laps_remaining {
            return true;
        }
        state.tire_age > self.cfg.late_pit_tire_age && rng.gen::<f64>() < self.cfg.late_pit_probability
    }

    fn pit_stop(&self, states: &[RaceState], idx: usize, lap: u32, driver_id: &str, rng: &mut SmallRng) -> PitStopRecord {
        let state = &states[idx];
        let jitter = self.cfg.pit_time_jitter.abs();
        let pit_time = self.cfg.base_pit_time + rng.gen_range(-jitter..=jitter);
        let new_compound = if rng.gen::<f64>() < self.cfg.harder_compound_probability {
            state.tire_compound.next_harder()
        } else {
            state.tire_compound.ladder_stay()
        };

        let outcome = self.rejoin.simulate(&PitStopRequest {
            driver_id: driver_id.to_string(),
            current_position: state.position,
            pit_lap: lap,
            pit_time,
            traffic_density: self.field_density(states, Sector::S2),
            total_cars: states.len() as u32,
            sector: Sector::S2,
        });
        PitStopRecord {
            lap,
            pit_time,
            old_compound: state.tire_compound,
            new_compound,
            rejoin_position: outcome.rejoin_position,
            positions_lost: outcome.positions_lost,
            time_lost: outcome.time_lost,
            traffic_impact: outcome.traffic_impact,
        }
    }

    fn attempt_overtake(&self, states: &mut [RaceState], twins: &[DriverTwin], idx: usize, lap: u32, rng: &mut SmallRng) {
        let position = states[idx].position;
        if position <= 1 {
            return;
        }
        let Some(ahead) = states.iter().position(|s| s.position == position - 1) else {
            return;
        };
        let speed = |pace_vector: f64| BASE_SPEED * (1.0 - pace_vector * 2.0);
        let p = self.overtake.probability(
            speed(twins[idx].pace_vector),
            speed(twins[ahead].pace_vector),
            position,
            position - 1,
            states[idx].tire_age,
            states[ahead].tire_age,
            Sector::for_lap(lap),
        );
        if rng.gen::<f64>() < p {
            states[ahead].position = position;
            states[idx].position = position - 1;
        }
    }

    fn aggregate(
        &self,
        p: &Prepared<'_>,
        results: &[SimulationResult],
        requested: usize,
        truncated: bool,
    ) -> RaceTwin {
        let req = p.req;
        let positions = self.expected_positions(&req.drivers, results);
        let focus = &req.drivers[0];
        let monte_carlo_outcomes = positions
            .iter()
            .find(|e| e.driver_id == focus.id)
            .map(|e| MonteCarloOutcomes {
                driver_id: e.driver_id.clone(),
                win_probability: e.win_probability,
                podium_probability: e.podium_probability,
                points_probability: e.points_probability,
            })
            .unwrap_or(MonteCarloOutcomes {
                driver_id: focus.id.clone(),
                win_probability: 0.0,
                podium_probability: 0.0,
                points_probability: 0.0,
            });

        RaceTwin {
            race_id: req.race_id.clone(),
            simulations: requested,
            iterations_completed: results.len(),
            truncated,
            current_lap: req.current_lap,
            total_laps: req.total_laps,
            expected_finishing_positions: positions,
            pit_recommendations: self.pit_recommendations(p, results),
            tire_cliff_prediction: tire_cliff(&p.twins, req.current_lap),
            traffic_simulation: self.traffic_simulation(&req.drivers, results),
            undercut_outcomes: self.undercut_outcomes(results),
            monte_carlo_outcomes,
            confidence: (f64::from(req.current_lap) / 10.0).min(1.0),
            ts_ms: now_ms(),
        }
    }

    fn expected_positions(&self, drivers: &[DriverRecord], results: &[SimulationResult]) -> Vec<ExpectedPosition> {
        let index: HashMap<&str, usize> = drivers.iter().enumerate().map(|(i, d)| (d.id.as_str(), i)).collect();
        let mut counts: Vec<BTreeMap<u32, usize>> = vec![BTreeMap::new(); drivers.len()];
        let mut times: Vec<Vec<f64>> = vec![Vec::with_capacity(results.len()); drivers.len()];
        for r in results {
            for (pos, id) in r.finishing_order.iter().enumerate() {
                if let Some(&i) = index.get(id.as_str()) {
                    *counts[i].entry(pos as u32 + 1).or_insert(0) += 1;
                }
            }
            for (id, t) in &r.total_times {
                if let Some(&i) = index.get(id.as_str()) {
                    times[i].push(*t);
                }
            }
        }

        let n = results.len().max(1) as f64;
        let mut out: Vec<ExpectedPosition> = drivers
            .iter()
            .zip(counts.iter().zip(&times))
            .map(|(d, (hist, t))| {
                let (position, count) = hist
                    .iter()
                    .fold((1, 0), |best, (pos, c)| if *c > best.1 { (*pos, *c) } else { best });
                let share_up_to = |max: u32| hist.range(..=max).map(|(_, c)| *c).sum::<usize>() as f64 / n;
                ExpectedPosition {
                    driver_id: d.id.clone(),
                    position,
                    probability: count as f64 / n,
                    position_distribution: hist.iter().map(|(pos, c)| (*pos, *c as f64 / n)).collect(),
                    mean_total_time: stats::mean(t),
                    win_probability: share_up_to(1),
                    podium_probability: share_up_to(3),
                    points_probability: share_up_to(10),
                }
            })
            .collect();
        out.sort_by_key(|e| e.position);
        out
    }

    fn pit_recommendations(&self, p: &Prepared<'_>, results: &[SimulationResult]) -> PitRecommendations {
        let pit_laps: Vec<u32> = results
            .iter()
            .flat_map(|r| r.pit_stops.values())
            .flat_map(|stops| stops.iter().map(|s| s.lap))
            .collect();
        let optimal_window = match mode(&pit_laps) {
            Some(lap) => PitLapWindow {
                start: lap.saturating_sub(2).max(1),
                end: lap + 2,
                most_common: Some(lap),
            },
            None => PitLapWindow {
                start: DEFAULT_WINDOW.0,
                end: DEFAULT_WINDOW.1,
                most_common: None,
            },
        };

        let focus = &p.req.drivers[0];
        let twin = &p.twins[0];
        let plan = self.strategy.optimize(&StrategyInput {
            driver_id: focus.id.clone(),
            current_lap: p.req.current_lap,
            total_laps: p.req.total_laps,
            current_position: focus.position,
            tire_age: focus.tire_age,
            tire_compound: focus.tire_compound,
            degradation_rate: twin.degradation_profile.rate,
            traffic_density: FOCUS_TRAFFIC_DENSITY,
            driver_pace: if twin.degradation_profile.base_pace > 0.0 {
                twin.degradation_profile.base_pace
            } else {
                DEFAULT_LAP_TIME
            },
        });

        PitRecommendations {
            optimal_window,
            undercut_viable: plan.undercut_analysis.viable,
            undercut_time_gain: plan.undercut_analysis.time_gain,
            overcut_viable: plan.overcut_analysis.viable,
            overcut_time_gain: plan.overcut_analysis.time_gain,
            recommendation: plan.recommendation,
            pit_stops_per_simulation: pit_laps.len() as f64 / results.len().max(1) as f64,
        }
    }

    fn traffic_simulation(&self, drivers: &[DriverRecord], results: &[SimulationResult]) -> TrafficSimulation {
        let impacts: Vec<&TrafficImpact> = results
            .iter()
            .flat_map(|r| r.pit_stops.values())
            .flat_map(|stops| stops.iter().map(|s| &s.traffic_impact))
            .collect();
        let penalties: Vec<f64> = impacts.iter().map(|i| i.traffic_loss_per_lap).collect();
        let average_traffic_penalty = if penalties.is_empty() { 0.2 } else { stats::mean(&penalties) };
        let clear_window_probability = if impacts.is_empty() {
            0.5
        } else {
            impacts.iter().filter(|i| i.clear_window).count() as f64 / impacts.len() as f64
        };

        let cars: Vec<CarSnapshot> = drivers
            .iter()
            .map(|d| CarSnapshot {
                id: d.id.clone(),
                position: d.position,
                sector: Sector::S2,
            })
            .collect();
        let traffic_density = self.traffic.calculate_density(&cars, Sector::S2);

        TrafficSimulation {
            clear_window: clear_window_probability > 0.6,
            busy: traffic_density > 0.7,
            traffic_density,
            average_traffic_penalty,
            clear_window_probability,
        }
    }

    /// Stops that cost less than the reference pit loss count as undercut gains.
    fn undercut_outcomes(&self, results: &[SimulationResult]) -> UndercutOutcomes {
        let gains: Vec<f64> = results
            .iter()
            .flat_map(|r| r.pit_stops.values())
            .flat_map(|stops| stops.iter())
            .map(|s| self.cfg.reference_pit_loss - s.time_lost)
            .filter(|g| *g > 0.0)
            .collect();
        let time_gain = if gains.is_empty() { 0.0 } else { stats::mean(&gains) };
        UndercutOutcomes {
            viable: time_gain > 1.0,
            time_gain,
            confidence: if time_gain > 2.0 {
                Level::High
            } else if time_gain > 1.0 {
                Level::Medium
            } else {
                Level::Low
            },
            success_rate: gains.len() as f64 / results.len().max(1) as f64,
        }
    }
}

fn rerank(states: &mut [RaceState]) {
    let mut order: Vec<usize> = (0..states.len()).collect();
    order.sort_by(|a, b| states[*a].total_time.total_cmp(&states[*b].total_time));
    for (rank, idx) in order.into_iter().enumerate() {
        states[idx].position = rank as u32 + 1;
    }
}

/// Most frequent value; ties go to the smaller one.
fn mode(values: &[u32]) -> Option<u32> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(*v).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(u32, usize)>, (v, c)| match best {
            Some((_, bc)) if bc >= c => best,
            _ => Some((v, c)),
        })
        .map(|(v, _)| v)
}

fn tire_cliff(twins: &[DriverTwin], current_lap: u32) -> TireCliff {
    let lap = twins
        .iter()
        .map(|t| t.fatigue_dropoff.critical_lap)
        .min()
        .unwrap_or(current_lap + 20);
    TireCliff {
        lap,
        critical: lap <= current_lap + 10,
    }
}
