use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use parking_lot::RwLock;
use rand::{rngs::SmallRng, SeedableRng};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tracing_subscriber::EnvFilter;

use race_twin::monte_carlo::{PaceMonteCarlo, PaceSimulationRequest, PaceSimulationSummary};
use race_twin::pit_rejoin::{PitRejoinSimulator, PitStopRequest, RejoinOutcome};
use race_twin::registry::{LapUpdate, TwinUpdate};
use race_twin::strategy::{StrategyInput, StrategyOptimizer, StrategyPlan};
use race_twin::types::now_ms;
use race_twin::{
    validate, AdvancedPitDecisionEngine, DriverRecord, DriverTwin, DriverTwinGenerator, DriverTwinRegistry,
    EngineConfig, PitDecision, RaceSimulationRequest, RaceTwin, RaceTwinSimulator, SimulationControl,
    SimulationError, ValidationError,
};

mod types;

use types::{DriverTwinOut, Health, PitDecisionIn, RaceTwinOut};

/// Race twins kept for `GET /race-twin/:race_id`; the oldest is evicted first.
const MAX_CACHED_RACES: usize = 64;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------- Server state ----------

#[derive(Clone)]
struct AppState {
    cfg: Arc<EngineConfig>,
    generator: Arc<DriverTwinGenerator>,
    registry: Arc<DriverTwinRegistry>,
    simulator: Arc<RaceTwinSimulator>,
    engine: Arc<AdvancedPitDecisionEngine>,
    rejoin: Arc<PitRejoinSimulator>,
    pace: Arc<PaceMonteCarlo>,
    optimizer: StrategyOptimizer,
    race_twins: Arc<RwLock<HashMap<String, RaceTwin>>>,
}

impl AppState {
    fn new(cfg: EngineConfig) -> Self {
        Self {
            generator: Arc::new(DriverTwinGenerator::new(cfg.twin.clone())),
            registry: Arc::new(DriverTwinRegistry::new(cfg.twin.clone())),
            simulator: Arc::new(RaceTwinSimulator::new(&cfg)),
            engine: Arc::new(AdvancedPitDecisionEngine::new(cfg.decision.clone())),
            rejoin: Arc::new(PitRejoinSimulator::new(cfg.pit_rejoin.clone())),
            pace: Arc::new(PaceMonteCarlo::default()),
            optimizer: StrategyOptimizer::new(),
            race_twins: Arc::new(RwLock::new(HashMap::new())),
            cfg: Arc::new(cfg),
        }
    }
}

// ---------- Error mapping ----------

fn invalid(e: ValidationError) -> ApiError {
    tracing::warn!("rejected request: {}", e);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": "validation failed", "errors": e.errors })),
    )
}

fn not_found(what: &str, id: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": format!("{} not found: {}", what, id) })))
}

fn simulation_failed(e: SimulationError) -> ApiError {
    let status = match e {
        SimulationError::Cancelled { .. } | SimulationError::TimedOut { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SimulationError::NoDrivers => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
}

// ---------- Handlers ----------

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        drivers: state.registry.all().len(),
        race_twins: state.race_twins.read().len(),
        ts_ms: now_ms(),
    })
}

async fn create_driver_twin(
    State(state): State<AppState>,
    Json(record): Json<DriverRecord>,
) -> ApiResult<DriverTwinOut> {
    let warnings = validate::validate_driver_record(&record).map_err(invalid)?;
    let twin = state.generator.generate(&record);
    tracing::info!(
        "driver twin {} from {} laps (confidence {:.2})",
        twin.driver_id,
        twin.lap_count,
        twin.confidence
    );
    Ok(Json(DriverTwinOut { twin, warnings }))
}

async fn update_driver_twin(State(state): State<AppState>, Json(update): Json<LapUpdate>) -> ApiResult<TwinUpdate> {
    validate::validate_lap_update(&update).map_err(invalid)?;
    Ok(Json(state.registry.update(update)))
}

async fn get_driver_twin(State(state): State<AppState>, Path(driver_id): Path<String>) -> ApiResult<DriverTwin> {
    state
        .registry
        .get(&driver_id)
        .map(Json)
        .ok_or_else(|| not_found("driver twin", &driver_id))
}

async fn create_race_twin(
    State(state): State<AppState>,
    Json(mut req): Json<RaceSimulationRequest>,
) -> ApiResult<RaceTwinOut> {
    let warnings = validate::validate_race_request(&req).map_err(invalid)?;

    // Drivers the registry already tracks reuse their live twin.
    for driver in req.drivers.iter_mut().filter(|d| d.twin.is_none()) {
        driver.twin = state.registry.get(&driver.id);
    }

    let simulator = Arc::clone(&state.simulator);
    let control = SimulationControl::from_config(&state.cfg.simulation);
    let (req, result) = tokio::task::spawn_blocking(move || {
        let result = simulator.simulate_race_with_control(&req, &mut SmallRng::from_entropy(), &control);
        (req, result)
    })
    .await
    .map_err(internal)?;
    let race_twin = result.map_err(simulation_failed)?;

    cache_race_twin(&state.race_twins, req.race_id.clone(), race_twin.clone());
    Ok(Json(RaceTwinOut { race_twin, warnings }))
}

fn cache_race_twin(cache: &RwLock<HashMap<String, RaceTwin>>, race_id: String, twin: RaceTwin) {
    let mut cache = cache.write();
    if !cache.contains_key(&race_id) && cache.len() >= MAX_CACHED_RACES {
        let oldest = cache.iter().min_by_key(|(_, t)| t.ts_ms).map(|(id, _)| id.clone());
        if let Some(oldest) = oldest {
            cache.remove(&oldest);
            tracing::info!("evicted race twin {}", oldest);
        }
    }
    cache.insert(race_id, twin);
}

async fn delete_race_twin(State(state): State<AppState>, Path(race_id): Path<String>) -> Result<StatusCode, ApiError> {
    match state.race_twins.write().remove(&race_id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found("race twin", &race_id)),
    }
}

async fn delete_driver_twin(State(state): State<AppState>, Path(driver_id): Path<String>) -> Result<StatusCode, ApiError> {
    if state.registry.reset_driver(&driver_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("driver twin", &driver_id))
    }
}

async fn get_race_twin(State(state): State<AppState>, Path(race_id): Path<String>) -> ApiResult<RaceTwin> {
    state
        .race_twins
        .read()
        .get(&race_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found("race twin", &race_id))
}

async fn pit_decision(State(state): State<AppState>, Json(body): Json<PitDecisionIn>) -> ApiResult<PitDecision> {
    let PitDecisionIn { race_id, mut input } = body;
    validate::validate_pit_decision(&input).map_err(invalid)?;

    if input.race_twin.is_none() {
        if let Some(race_id) = race_id {
            let cached = state.race_twins.read().get(&race_id).cloned();
            input.race_twin = Some(cached.ok_or_else(|| not_found("race twin", &race_id))?);
        }
    }
    if input.driver_twin.is_none() {
        input.driver_twin = state.registry.get(&input.driver_id);
    }

    Ok(Json(state.engine.make_pit_decision(&input)))
}

async fn optimize_strategy(State(state): State<AppState>, Json(input): Json<StrategyInput>) -> ApiResult<StrategyPlan> {
    validate::validate_strategy_input(&input).map_err(invalid)?;
    Ok(Json(state.optimizer.optimize(&input)))
}

async fn pit_rejoin(State(state): State<AppState>, Json(req): Json<PitStopRequest>) -> ApiResult<RejoinOutcome> {
    validate::validate_pit_stop(&req).map_err(invalid)?;
    Ok(Json(state.rejoin.simulate(&req)))
}

async fn monte_carlo(
    State(state): State<AppState>,
    Json(req): Json<PaceSimulationRequest>,
) -> ApiResult<PaceSimulationSummary> {
    validate::validate_pace_request(&req).map_err(invalid)?;
    let pace = Arc::clone(&state.pace);
    let summary = tokio::task::spawn_blocking(move || pace.simulate(&req, &mut SmallRng::from_entropy()))
        .await
        .map_err(internal)?;
    Ok(Json(summary))
}

fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/driver-twin", post(create_driver_twin))
        .route("/driver-twin/update", post(update_driver_twin))
        .route("/driver-twin/:driver_id", get(get_driver_twin).delete(delete_driver_twin))
        .route("/race-twin", post(create_race_twin))
        .route("/race-twin/:race_id", get(get_race_twin).delete(delete_race_twin))
        .route("/pit-decision", post(pit_decision))
        .route("/strategy/optimize", post(optimize_strategy))
        .route("/pit-rejoin", post(pit_rejoin))
        .route("/monte-carlo", post(monte_carlo))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port: u16 = std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080);
    let cfg = EngineConfig::from_env();
    tracing::info!(
        "simulations clamped to [{}, {}], deadline {:?} ms",
        cfg.simulation.min_simulations,
        cfg.simulation.max_simulations,
        cfg.simulation.deadline_ms
    );

    let app = router(AppState::new(cfg));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_twin::pit_decision::PitCall;
    use race_twin::PitDecisionInput;

    fn state() -> AppState {
        AppState::new(EngineConfig::default())
    }

    fn race() -> RaceSimulationRequest {
        let driver = |id: &str, position: u32, base: f64| DriverRecord {
            id: id.into(),
            position,
            lap_times: (0..6).map(|i| base + 0.05 * i as f64).collect(),
            tire_age: 8,
            current_lap: 10,
            ..DriverRecord::default()
        };
        RaceSimulationRequest {
            race_id: "monza".into(),
            drivers: vec![driver("car_1", 1, 81.5), driver("car_2", 2, 81.9)],
            total_laps: 30,
            current_lap: 10,
            weather: None,
            pit_strategies: Vec::new(),
            num_simulations: 100,
        }
    }

    #[tokio::test]
    async fn race_twin_is_cached_and_used_by_pit_decision() {
        let state = state();
        let Json(out) = create_race_twin(State(state.clone()), Json(race())).await.unwrap();
        assert_eq!(out.race_twin.race_id, "monza");
        println!("✓ simulated {} iterations", out.race_twin.iterations_completed);

        let Json(cached) = get_race_twin(State(state.clone()), Path("monza".into())).await.unwrap();
        assert_eq!(cached.expected_finishing_positions, out.race_twin.expected_finishing_positions);

        let body = PitDecisionIn {
            race_id: Some("monza".into()),
            input: PitDecisionInput {
                driver_id: "car_1".into(),
                current_lap: 10,
                total_laps: 30,
                tire_age: 30,
                tire_compound: race_twin::TireCompound::Soft,
                current_position: 1,
                degradation_rate: 0.002,
                traffic_density: 0.3,
                ..PitDecisionInput::default()
            },
        };
        let Json(decision) = pit_decision(State(state), Json(body)).await.unwrap();
        assert!(decision.factor_breakdown.race_twin.available);
        assert_eq!(decision.decision, PitCall::PitNow);
        println!("✓ decision used the cached race twin");
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let state = state();
        let (status, _) = get_race_twin(State(state.clone()), Path("nope".into())).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_driver_twin(State(state.clone()), Path("nope".into())).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let body = PitDecisionIn {
            race_id: Some("nope".into()),
            input: PitDecisionInput {
                driver_id: "car_1".into(),
                current_lap: 5,
                total_laps: 30,
                current_position: 1,
                ..PitDecisionInput::default()
            },
        };
        let (status, _) = pit_decision(State(state), Json(body)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_input_is_unprocessable() {
        let mut req = race();
        req.current_lap = 31;
        let (status, Json(body)) = create_race_twin(State(state()), Json(req)).await.unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0], "current_lap cannot exceed total_laps");
    }

    #[tokio::test]
    async fn timed_out_simulation_is_unavailable() {
        let mut cfg = EngineConfig::default();
        cfg.simulation.deadline_ms = Some(0);
        let (status, _) = create_race_twin(State(AppState::new(cfg)), Json(race())).await.unwrap_err();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn lap_updates_build_registry_twin() {
        let state = state();
        for lap in 1..=6u32 {
            let update = LapUpdate {
                driver_id: "car_7".into(),
                lap_time: 90.0 + 0.1 * f64::from(lap),
                sector_times: Default::default(),
                telemetry: Vec::new(),
                tire_compound: Default::default(),
                current_lap: lap,
            };
            update_driver_twin(State(state.clone()), Json(update)).await.unwrap();
        }
        let Json(twin) = get_driver_twin(State(state.clone()), Path("car_7".into())).await.unwrap();
        assert_eq!(twin.lap_count, 6);
        let Json(health) = health(State(state)).await;
        assert_eq!(health.drivers, 1);
    }

    #[tokio::test]
    async fn cached_twins_can_be_deleted() {
        let state = state();
        create_race_twin(State(state.clone()), Json(race())).await.unwrap();
        let status = delete_race_twin(State(state.clone()), Path("monza".into())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = get_race_twin(State(state.clone()), Path("monza".into())).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = delete_race_twin(State(state.clone()), Path("monza".into())).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let update = LapUpdate {
            driver_id: "car_9".into(),
            lap_time: 90.0,
            sector_times: Default::default(),
            telemetry: Vec::new(),
            tire_compound: Default::default(),
            current_lap: 1,
        };
        update_driver_twin(State(state.clone()), Json(update)).await.unwrap();
        let status = delete_driver_twin(State(state.clone()), Path("car_9".into())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = delete_driver_twin(State(state.clone()), Path("car_9".into())).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        let Json(health) = health(State(state)).await;
        assert_eq!(health.drivers, 0);
        assert_eq!(health.race_twins, 0);
        println!("✓ race and driver twins removed");
    }

    #[tokio::test]
    async fn race_cache_evicts_oldest() {
        let state = state();
        let Json(out) = create_race_twin(State(state.clone()), Json(race())).await.unwrap();
        for i in 0..MAX_CACHED_RACES + 5 {
            let mut twin = out.race_twin.clone();
            twin.race_id = format!("race_{i}");
            twin.ts_ms = out.race_twin.ts_ms + i as i64 + 1;
            cache_race_twin(&state.race_twins, twin.race_id.clone(), twin);
        }
        let cache = state.race_twins.read();
        assert_eq!(cache.len(), MAX_CACHED_RACES);
        assert!(!cache.contains_key("monza"));
        assert!(!cache.contains_key("race_4"));
        assert!(cache.contains_key("race_5"));
        assert!(cache.contains_key(&format!("race_{}", MAX_CACHED_RACES + 4)));
        println!("✓ cache held at {} entries", cache.len());
    }
}
