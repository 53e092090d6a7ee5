//! Property-based tests for the bounded outputs of the models.

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use race_twin::degradation::calculate_degradation;
use race_twin::overtake::OvertakeProbabilityModel;
use race_twin::pit_decision::PitCall;
use race_twin::traffic::TrafficDensityModel;
use race_twin::types::{CarSnapshot, OpponentRecord, SectorTimes, TelemetrySample};
use race_twin::{
    AdvancedPitDecisionEngine, DriverRecord, DriverTwinGenerator, PitDecisionInput, RaceSimulationRequest,
    RaceTwinSimulator, Sector, TireCompound, WeatherRecord,
};

fn compound_strategy() -> impl Strategy<Value = TireCompound> {
    prop_oneof![
        Just(TireCompound::SuperSoft),
        Just(TireCompound::Soft),
        Just(TireCompound::Medium),
        Just(TireCompound::Hard),
        Just(TireCompound::Intermediate),
        Just(TireCompound::Wet),
    ]
}

fn sector_strategy() -> impl Strategy<Value = Sector> {
    prop_oneof![Just(Sector::S1), Just(Sector::S2), Just(Sector::S3)]
}

/// Strategy: a lap history with matching sector splits.
fn laps_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(85.0..130.0f64, 0..30)
}

fn weather_strategy() -> impl Strategy<Value = Option<WeatherRecord>> {
    prop::option::of((10.0..50.0f64, 0.0..100.0f64, 0.0..3.0f64).prop_map(|(track_temp, humidity, rainfall)| {
        WeatherRecord {
            track_temp,
            humidity,
            rainfall,
            ..WeatherRecord::default()
        }
    }))
}

fn opponents_strategy() -> impl Strategy<Value = Vec<OpponentRecord>> {
    prop::collection::vec(
        (-20.0..20.0f64, prop::option::of(0u32..40), any::<bool>()).prop_map(|(gap, tire_age, just_pitted)| {
            OpponentRecord {
                id: "rival".into(),
                gap,
                tire_age,
                just_pitted,
            }
        }),
        0..4,
    )
}

proptest! {
    // 1. Twin fields stay in their documented ranges
    #[test]
    fn twin_bounds(laps in laps_strategy(), compound in compound_strategy(), throttle in prop::option::of(0.0..1.0f64)) {
        let record = DriverRecord {
            id: "car".into(),
            sector_times: laps.iter().map(|t| SectorTimes::new(t * 0.3, t * 0.37, t * 0.33)).collect(),
            telemetry: throttle
                .map(|v| vec![TelemetrySample { throttle: Some(v), speed: Some(250.0), ..TelemetrySample::default() }; 4])
                .unwrap_or_default(),
            lap_times: laps,
            tire_compound: compound,
            current_lap: 20,
            ..DriverRecord::default()
        };
        let twin = DriverTwinGenerator::default().generate(&record);
        prop_assert!((-0.1..=0.1).contains(&twin.pace_vector), "pace_vector={}", twin.pace_vector);
        prop_assert!((0.0..=1.0).contains(&twin.consistency_index));
        prop_assert!((0.0..=1.0).contains(&twin.aggression_score));
        prop_assert!((0.0..=1.0).contains(&twin.confidence));
        for s in Sector::ALL {
            prop_assert!((0.8..=1.2).contains(&twin.sector_strengths.get(s)));
        }
    }

    // 2. Every decision is one of the three calls with a bounded confidence
    #[test]
    fn decision_bounds(
        tire_age in 0u32..=60,
        compound in compound_strategy(),
        degradation_rate in 0.0..=0.1f64,
        traffic_density in 0.0..=1.0f64,
        current_position in 1u32..=20,
        current_lap in 1u32..=60,
        weather in weather_strategy(),
        opponents in opponents_strategy(),
    ) {
        let input = PitDecisionInput {
            driver_id: "car".into(),
            current_lap,
            total_laps: 60,
            tire_age,
            tire_compound: compound,
            current_position,
            degradation_rate,
            traffic_density,
            weather,
            opponents,
            ..PitDecisionInput::default()
        };
        let d = AdvancedPitDecisionEngine::default().make_pit_decision(&input);
        prop_assert!(matches!(d.decision, PitCall::PitNow | PitCall::PitLater | PitCall::ExtendStint));
        prop_assert!((0.0..=1.0).contains(&d.confidence));
        prop_assert!((0.0..=1.0).contains(&d.factor_breakdown.degradation.score));
        prop_assert!((0.0..=1.0).contains(&d.factor_breakdown.traffic.score));
        prop_assert!((0.0..=1.0).contains(&d.factor_breakdown.opponent.score));
        prop_assert!((0.0..=1.0).contains(&d.factor_breakdown.weather.score));

        let track_temp = weather.map_or(25.0, |w| w.track_temp);
        if calculate_degradation(tire_age, compound, track_temp) >= 0.05 {
            prop_assert_eq!(d.decision, PitCall::PitNow);
        }
    }

    // 3. Overtake odds are probabilities
    #[test]
    fn overtake_bounds(
        attacker in 200.0..340.0f64,
        defender in 200.0..340.0f64,
        a_pos in 1u32..=20,
        d_pos in 1u32..=20,
        a_age in 0u32..50,
        d_age in 0u32..50,
        sector in sector_strategy(),
    ) {
        let p = OvertakeProbabilityModel::new().probability(attacker, defender, a_pos, d_pos, a_age, d_age, sector);
        prop_assert!((0.0..=1.0).contains(&p));
    }

    // 4. Density is bounded and time loss non-negative
    #[test]
    fn traffic_bounds(cars in prop::collection::vec((1u32..=20, sector_strategy()), 0..20), sector in sector_strategy()) {
        let cars: Vec<CarSnapshot> = cars
            .into_iter()
            .enumerate()
            .map(|(i, (position, sector))| CarSnapshot { id: format!("car_{i}"), position, sector })
            .collect();
        let model = TrafficDensityModel::new();
        let density = model.calculate_density(&cars, sector);
        prop_assert!((0.0..=1.0).contains(&density));
        prop_assert!(model.estimate_time_lost(density, sector) >= 0.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    // 5. Position distributions sum to one for every driver
    #[test]
    fn race_distributions_sum_to_one(
        paces in prop::collection::vec(93.0..98.0f64, 1..5),
        seed in any::<u64>(),
        current_lap in 1u32..=20,
    ) {
        let drivers: Vec<DriverRecord> = paces
            .iter()
            .enumerate()
            .map(|(i, pace)| DriverRecord {
                id: format!("car_{i}"),
                position: i as u32 + 1,
                lap_times: (0..6).map(|l| pace + 0.05 * l as f64).collect(),
                tire_age: 5 + i as u32,
                current_lap,
                ..DriverRecord::default()
            })
            .collect();
        let req = RaceSimulationRequest {
            race_id: "prop".into(),
            drivers,
            total_laps: 25,
            current_lap,
            weather: None,
            pit_strategies: Vec::new(),
            num_simulations: 100,
        };
        let twin = RaceTwinSimulator::default()
            .simulate_race(&req, &mut SmallRng::seed_from_u64(seed))
            .unwrap();
        prop_assert_eq!(twin.expected_finishing_positions.len(), paces.len());
        for pos in &twin.expected_finishing_positions {
            let total: f64 = pos.position_distribution.values().sum();
            prop_assert!((total - 1.0).abs() < 1e-6, "{} sums to {}", pos.driver_id, total);
        }
        prop_assert!((0.0..=1.0).contains(&twin.confidence));
    }
}
