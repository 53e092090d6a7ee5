use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::config::DecisionConfig;
use crate::degradation::calculate_degradation;
use crate::driver_twin::DriverTwin;
use crate::simulator::RaceTwin;
use crate::strategy::Urgency;
use crate::types::{now_ms, OpponentRecord, TireCompound, WeatherRecord};
use crate::weather::{TrackCondition, WeatherModel};

const FORECAST_LAPS: u32 = 5;

/// Everything the engine may weigh. Only the first block is required;
/// each optional input feeds one factor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PitDecisionInput {
    pub driver_id: String,
    pub current_lap: u32,
    pub total_laps: u32,
    pub tire_age: u32,
    #[serde(default)]
    pub tire_compound: TireCompound,
    pub current_position: u32,
    pub degradation_rate: f64,
    pub traffic_density: f64,
    #[serde(default)]
    pub race_twin: Option<RaceTwin>,
    #[serde(default)]
    pub driver_twin: Option<DriverTwin>,
    #[serde(default)]
    pub opponents: Vec<OpponentRecord>,
    #[serde(default)]
    pub weather: Option<WeatherRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PitCall {
    PitNow,
    PitLater,
    ExtendStint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceLevel {
    High,
    MediumHigh,
    Medium,
    LowMedium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::MediumHigh
        } else if score >= 0.4 {
            Self::Medium
        } else if score >= 0.2 {
            Self::LowMedium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    Light,
    Moderate,
    Heavy,
}

impl TrafficLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Heavy => "heavy",
        }
    }
}

fn urgency_label(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Low => "low",
        Urgency::Medium => "medium",
        Urgency::High => "high",
        Urgency::Critical => "critical",
    }
}

/// One weighted factor and what it saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor<D> {
    pub score: f64,
    pub weight: f64,
    pub weighted_contribution: f64,
    pub available: bool,
    pub explanation: String,
    pub detail: D,
}

impl<D> Factor<D> {
    fn new(score: f64, weight: f64, available: bool, explanation: String, detail: D) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            score,
            weight,
            weighted_contribution: score * weight,
            available,
            explanation,
            detail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationForecast {
    pub lap: u32,
    pub degradation: f64,
    pub pace_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationDetail {
    pub urgency: Urgency,
    pub current_degradation: f64,
    pub degradation_rate: f64,
    pub tire_age: u32,
    pub predicted: Vec<DegradationForecast>,
    pub critical_lap: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficForecast {
    pub lap: u32,
    pub predicted_density: f64,
    pub clear: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficDetail {
    pub traffic_level: TrafficLevel,
    pub traffic_density: f64,
    pub cars_ahead: u32,
    pub clear_window_now: bool,
    pub forecast: Vec<TrafficForecast>,
    /// Quietest forecast lap, when it is clear.
    pub best_window_lap: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceTwinInsights {
    pub in_optimal_window: Option<bool>,
    pub window_start: Option<u32>,
    pub window_end: Option<u32>,
    pub laps_to_window: Option<u32>,
    pub past_window: bool,
    pub undercut_gain: Option<f64>,
    pub cliff_lap: Option<u32>,
    pub clear_window: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentDetail {
    pub closest_opponent: String,
    pub opponent_tire_age: u32,
    /// Own tyre age minus the opponent's.
    pub tire_age_delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherDetail {
    pub condition: TrackCondition,
    pub track_temp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub degradation: Factor<DegradationDetail>,
    pub traffic: Factor<TrafficDetail>,
    pub race_twin: Factor<RaceTwinInsights>,
    pub opponent: Factor<Option<OpponentDetail>>,
    pub weather: Factor<Option<WeatherDetail>>,
    pub overall_confidence: f64,
    pub confidence_level: ConfidenceLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitDecision {
    pub driver_id: String,
    pub current_lap: u32,
    pub decision: PitCall,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub factor_breakdown: FactorBreakdown,
    pub reasoning: Vec<String>,
    pub recommended_lap: Option<u32>,
    pub race_twin_integration: RaceTwinInsights,
    pub ts_ms: i64,
}

/// Weighted five-factor pit call. A pure function of its input; missing
/// optional inputs score a neutral 0.5 and lower the confidence.
#[derive(Debug, Clone, Default)]
pub struct AdvancedPitDecisionEngine {
    cfg: DecisionConfig,
    weather: WeatherModel,
}

impl AdvancedPitDecisionEngine {
    pub fn new(cfg: DecisionConfig) -> Self {
        Self {
            cfg,
            weather: WeatherModel::new(),
        }
    }

    pub fn make_pit_decision(&self, input: &PitDecisionInput) -> PitDecision {
        let span = info_span!("make_pit_decision", driver_id = %input.driver_id, lap = input.current_lap);
        let _enter = span.enter();

        let degradation = self.degradation_factor(input);
        let traffic = self.traffic_factor(input);
        let race_twin = self.race_twin_factor(input.race_twin.as_ref(), input.current_lap);
        let opponent = self.opponent_factor(&input.opponents, input.tire_age);
        let weather = self.weather_factor(input.weather.as_ref());

        let total = degradation.weighted_contribution
            + traffic.weighted_contribution
            + race_twin.weighted_contribution
            + opponent.weighted_contribution
            + weather.weighted_contribution;
        let available = [
            degradation.available,
            traffic.available,
            race_twin.available,
            opponent.available,
            weather.available,
        ]
        .iter()
        .filter(|a| **a)
        .count();
        let confidence = (total * (0.7 + 0.3 * available as f64 / 5.0)).clamp(0.0, 1.0);
        let confidence_level = ConfidenceLevel::from_score(confidence);
        debug!(total, available, confidence, "factors scored");

        let (decision, recommended_lap, mut reasoning) = if degradation.detail.urgency == Urgency::Critical {
            (
                PitCall::PitNow,
                Some(input.current_lap),
                vec![
                    format!(
                        "Critical tire degradation detected ({:.1}%)",
                        degradation.detail.current_degradation * 100.0
                    ),
                    format!("Tire age: {} laps - exceeds safe threshold", input.tire_age),
                ],
            )
        } else if confidence >= self.cfg.pit_now_threshold {
            (
                PitCall::PitNow,
                Some(input.current_lap),
                vec![
                    format!("High confidence score ({:.2}) indicates optimal pit window", confidence),
                    format!("Traffic conditions: {}", traffic.detail.traffic_level.as_str()),
                    format!("Degradation urgency: {}", urgency_label(degradation.detail.urgency)),
                ],
            )
        } else if confidence >= self.cfg.pit_later_threshold {
            let lap = traffic
                .detail
                .best_window_lap
                .filter(|lap| *lap <= input.current_lap + FORECAST_LAPS)
                .unwrap_or(input.current_lap + 2);
            (
                PitCall::PitLater,
                Some(lap),
                vec![
                    format!("Moderate confidence ({:.2}) - pit window opening soon", confidence),
                    format!("Recommended lap: {}", lap),
                    match traffic.detail.best_window_lap {
                        Some(best) => format!("Traffic window: lap {}", best),
                        None => "Traffic window: none in the next 5 laps".to_string(),
                    },
                ],
            )
        } else {
            (
                PitCall::ExtendStint,
                None,
                vec![
                    format!("Low confidence ({:.2}) - extend current stint", confidence),
                    format!("Tires still viable (age: {} laps)", input.tire_age),
                    "Better pit window expected later".to_string(),
                ],
            )
        };

        let insights = race_twin.detail.clone();
        if let Some(gain) = insights.undercut_gain {
            reasoning.push(format!("Undercut opportunity: {:.1}s potential gain", gain));
        }
        if let Some(lap) = insights.cliff_lap {
            reasoning.push(format!("Tire cliff imminent at lap {}", lap));
        }

        info!(
            "pit decision for {} at lap {}: {:?} (confidence {:.2})",
            input.driver_id, input.current_lap, decision, confidence
        );

        PitDecision {
            driver_id: input.driver_id.clone(),
            current_lap: input.current_lap,
            decision,
            confidence,
            confidence_level,
            factor_breakdown: FactorBreakdown {
                degradation,
                traffic,
                race_twin,
                opponent,
                weather,
                overall_confidence: confidence,
                confidence_level,
            },
            reasoning,
            recommended_lap,
            race_twin_integration: insights,
            ts_ms: now_ms(),
        }
    }

    fn degradation_factor(&self, input: &PitDecisionInput) -> Factor<DegradationDetail> {
        let track_temp = input.weather.map_or(25.0, |w| w.track_temp);
        let current = calculate_degradation(input.tire_age, input.tire_compound, track_temp);
        let predicted: Vec<DegradationForecast> = (1..=FORECAST_LAPS)
            .map(|offset| {
                let degradation = calculate_degradation(input.tire_age + offset, input.tire_compound, track_temp);
                DegradationForecast {
                    lap: input.current_lap + offset,
                    degradation,
                    pace_loss: degradation * 0.5,
                }
            })
            .collect();

        let critical = self.cfg.critical_degradation;
        let (urgency, mut score) = if current >= critical {
            (Urgency::Critical, 0.9)
        } else if current >= self.cfg.high_degradation {
            (Urgency::High, 0.7)
        } else if predicted.iter().take(3).any(|p| p.degradation >= critical) {
            (Urgency::Medium, 0.5)
        } else {
            (Urgency::Low, 0.2)
        };
        if input
            .driver_twin
            .as_ref()
            .is_some_and(|t| t.degradation_profile.rate > input.degradation_rate)
        {
            score = f64::min(1.0, score + 0.1);
        }

        let critical_lap = predicted.iter().find(|p| p.degradation >= critical).map(|p| p.lap);
        let explanation = format!(
            "Tire degradation at {:.1}% ({} urgency). Predicted to reach critical threshold at lap {}",
            current * 100.0,
            urgency_label(urgency),
            critical_lap.map_or("N/A".to_string(), |l| l.to_string())
        );
        Factor::new(
            score,
            self.cfg.degradation_weight,
            true,
            explanation,
            DegradationDetail {
                urgency,
                current_degradation: current,
                degradation_rate: input.degradation_rate,
                tire_age: input.tire_age,
                predicted,
                critical_lap,
            },
        )
    }

    fn traffic_factor(&self, input: &PitDecisionInput) -> Factor<TrafficDetail> {
        let density = input.traffic_density;
        let (traffic_level, score) = if density >= 0.7 {
            (TrafficLevel::Heavy, 0.3)
        } else if density >= 0.4 {
            (TrafficLevel::Moderate, 0.5)
        } else {
            (TrafficLevel::Light, 0.8)
        };
        let clear_window_now = traffic_level == TrafficLevel::Light;

        // Traffic thins out by up to 20% over a race.
        let total = f64::from(input.total_laps.max(1));
        let forecast: Vec<TrafficForecast> = (1..=FORECAST_LAPS)
            .map(|offset| {
                let lap = input.current_lap + offset;
                let predicted = density * (1.0 - f64::from(lap) / total * 0.2);
                TrafficForecast {
                    lap,
                    predicted_density: predicted.clamp(0.0, 1.0),
                    clear: predicted < 0.4,
                }
            })
            .collect();
        let best = forecast.iter().fold(None::<&TrafficForecast>, |best, f| match best {
            Some(b) if b.predicted_density <= f.predicted_density => Some(b),
            _ => Some(f),
        });
        let best_window_lap = best.filter(|b| b.clear).map(|b| b.lap);

        let explanation = if clear_window_now {
            format!(
                "Traffic density: {:.1}% ({}). Clear window available now",
                density * 100.0,
                traffic_level.as_str()
            )
        } else {
            format!(
                "Traffic density: {:.1}% ({}). Best window predicted at lap {}",
                density * 100.0,
                traffic_level.as_str(),
                best.map_or(input.current_lap + 1, |b| b.lap)
            )
        };
        Factor::new(
            score,
            self.cfg.traffic_weight,
            true,
            explanation,
            TrafficDetail {
                traffic_level,
                traffic_density: density,
                cars_ahead: input.current_position.saturating_sub(1),
                clear_window_now,
                forecast,
                best_window_lap,
            },
        )
    }

    fn race_twin_factor(&self, race_twin: Option<&RaceTwin>, current_lap: u32) -> Factor<RaceTwinInsights> {
        let weight = self.cfg.race_twin_weight;
        let Some(twin) = race_twin else {
            return Factor::new(
                0.5,
                weight,
                false,
                "Race Twin data not available - using neutral score".to_string(),
                RaceTwinInsights::default(),
            );
        };

        let mut insights = RaceTwinInsights::default();
        let window = twin.pit_recommendations.optimal_window;
        let mut score = if (window.start..=window.end).contains(&current_lap) {
            insights.in_optimal_window = Some(true);
            insights.window_start = Some(window.start);
            insights.window_end = Some(window.end);
            0.8
        } else if current_lap < window.start {
            insights.in_optimal_window = Some(false);
            insights.laps_to_window = Some(window.start - current_lap);
            0.4
        } else {
            insights.in_optimal_window = Some(false);
            insights.past_window = true;
            0.3
        };

        let undercut = &twin.undercut_outcomes;
        if undercut.viable {
            if undercut.time_gain > 2.0 {
                score = 0.9;
                insights.undercut_gain = Some(undercut.time_gain);
            } else if undercut.time_gain > 1.0 {
                score = 0.7;
                insights.undercut_gain = Some(undercut.time_gain);
            }
        }

        let cliff = twin.tire_cliff_prediction;
        if cliff.critical && i64::from(cliff.lap) - i64::from(current_lap) <= 3 {
            score = f64::max(score, 0.9);
            insights.cliff_lap = Some(cliff.lap);
        }

        if twin.traffic_simulation.clear_window {
            score = f64::min(1.0, score + 0.1);
            insights.clear_window = true;
        }

        let explanation = format!(
            "Race Twin analysis: in window {}, Undercut: {}, Tire cliff: {}",
            insights
                .in_optimal_window
                .map_or("N/A".to_string(), |b| b.to_string()),
            undercut.viable,
            cliff.critical
        );
        Factor::new(score, weight, true, explanation, insights)
    }

    fn opponent_factor(&self, opponents: &[OpponentRecord], tire_age: u32) -> Factor<Option<OpponentDetail>> {
        let weight = self.cfg.opponent_weight;
        let closest = opponents.iter().fold(None::<&OpponentRecord>, |best, o| match best {
            Some(b) if b.gap.abs() <= o.gap.abs() => Some(b),
            _ => Some(o),
        });
        let Some(closest) = closest else {
            return Factor::new(0.5, weight, false, "Opponent data not available".to_string(), None);
        };

        let opponent_tire_age = closest.tire_age.unwrap_or(tire_age);
        let delta = i64::from(tire_age) - i64::from(opponent_tire_age);
        let mut score = if delta < -5 {
            0.3
        } else if delta > 5 {
            0.8
        } else {
            0.5
        };
        if closest.just_pitted {
            score = 0.7;
        }

        let verdict = if delta < -5 {
            "We can extend"
        } else if delta > 5 {
            "We should pit soon"
        } else {
            "Similar tire age"
        };
        Factor::new(
            score,
            weight,
            true,
            format!(
                "Opponent tire age: {} laps (delta: {:+}). {}",
                opponent_tire_age, delta, verdict
            ),
            Some(OpponentDetail {
                closest_opponent: closest.id.clone(),
                opponent_tire_age,
                tire_age_delta: delta,
            }),
        )
    }

    fn weather_factor(&self, weather: Option<&WeatherRecord>) -> Factor<Option<WeatherDetail>> {
        let weight = self.cfg.weather_weight;
        let Some(w) = weather else {
            return Factor::new(0.5, weight, false, "Weather data not available".to_string(), None);
        };
        let condition = self.weather.determine_condition(w);
        let mut score = if condition == TrackCondition::Wet { 0.4 } else { 0.5 };
        if w.track_temp > 35.0 {
            score = f64::min(1.0, score + 0.2);
        } else if w.track_temp < 15.0 {
            score = f64::max(0.0, score - 0.1);
        }
        Factor::new(
            score,
            weight,
            true,
            format!("Weather: {}, Track temp: {}°C", condition, w.track_temp),
            Some(WeatherDetail {
                condition,
                track_temp: w.track_temp,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{
        MonteCarloOutcomes, PitLapWindow, PitRecommendations, TireCliff, TrafficSimulation, UndercutOutcomes,
    };
    use crate::strategy::{Level, Recommendation, StrategyCall};

    fn input(tire_age: u32, compound: TireCompound, density: f64) -> PitDecisionInput {
        PitDecisionInput {
            driver_id: "car_7".into(),
            current_lap: 20,
            total_laps: 50,
            tire_age,
            tire_compound: compound,
            current_position: 4,
            degradation_rate: 0.002,
            traffic_density: density,
            ..PitDecisionInput::default()
        }
    }

    fn race_twin(window: (u32, u32), undercut_gain: f64, cliff: (u32, bool), clear: bool) -> RaceTwin {
        RaceTwin {
            race_id: "race_1".into(),
            simulations: 100,
            iterations_completed: 100,
            truncated: false,
            current_lap: 20,
            total_laps: 50,
            expected_finishing_positions: Vec::new(),
            pit_recommendations: PitRecommendations {
                optimal_window: PitLapWindow {
                    start: window.0,
                    end: window.1,
                    most_common: Some(window.0 + 2),
                },
                undercut_viable: false,
                undercut_time_gain: 0.0,
                overcut_viable: false,
                overcut_time_gain: 0.0,
                recommendation: Recommendation {
                    strategy: StrategyCall::StandardPit,
                    lap: Some(window.0 + 2),
                    reasoning: String::new(),
                    confidence: Level::Medium,
                },
                pit_stops_per_simulation: 1.0,
            },
            tire_cliff_prediction: TireCliff {
                lap: cliff.0,
                critical: cliff.1,
            },
            traffic_simulation: TrafficSimulation {
                clear_window: clear,
                busy: false,
                traffic_density: 0.3,
                average_traffic_penalty: 0.1,
                clear_window_probability: if clear { 0.8 } else { 0.2 },
            },
            undercut_outcomes: UndercutOutcomes {
                viable: undercut_gain > 1.0,
                time_gain: undercut_gain,
                confidence: Level::Low,
                success_rate: 0.5,
            },
            monte_carlo_outcomes: MonteCarloOutcomes {
                driver_id: "car_7".into(),
                win_probability: 0.1,
                podium_probability: 0.4,
                points_probability: 1.0,
            },
            confidence: 1.0,
            ts_ms: 0,
        }
    }

    #[test]
    fn neutral_without_optional_inputs() {
        let engine = AdvancedPitDecisionEngine::default();
        let d = engine.make_pit_decision(&input(10, TireCompound::Medium, 0.5));
        assert!(!d.factor_breakdown.race_twin.available);
        assert!(!d.factor_breakdown.opponent.available);
        assert!(!d.factor_breakdown.weather.available);
        assert_eq!(d.factor_breakdown.race_twin.score, 0.5);
        // 0.395 weighted, two of five factors available.
        assert!((d.confidence - 0.395 * 0.82).abs() < 1e-9);
        assert_eq!(d.decision, PitCall::ExtendStint);
        assert_eq!(d.confidence_level, ConfidenceLevel::LowMedium);
        assert_eq!(d.recommended_lap, None);
        assert_eq!(d.reasoning.len(), 3);
    }

    #[test]
    fn critical_wear_forces_pit_now() {
        let engine = AdvancedPitDecisionEngine::default();
        let mut i = input(30, TireCompound::Soft, 0.95);
        i.opponents = vec![OpponentRecord {
            id: "car_8".into(),
            gap: 1.0,
            tire_age: Some(40),
            just_pitted: false,
        }];
        let d = engine.make_pit_decision(&i);
        assert_eq!(d.factor_breakdown.degradation.detail.urgency, Urgency::Critical);
        assert_eq!(d.decision, PitCall::PitNow);
        assert_eq!(d.recommended_lap, Some(20));
        assert!(d.reasoning[0].starts_with("Critical tire degradation"));
    }

    #[test]
    fn strong_signals_pit_now() {
        let engine = AdvancedPitDecisionEngine::default();
        let mut i = input(20, TireCompound::Medium, 0.2);
        i.race_twin = Some(race_twin((18, 22), 0.0, (60, false), true));
        i.opponents = vec![
            OpponentRecord {
                id: "far".into(),
                gap: -12.0,
                tire_age: Some(2),
                just_pitted: false,
            },
            OpponentRecord {
                id: "near".into(),
                gap: -0.8,
                tire_age: Some(10),
                just_pitted: false,
            },
        ];
        i.weather = Some(WeatherRecord {
            track_temp: 40.0,
            ..WeatherRecord::default()
        });
        let d = engine.make_pit_decision(&i);
        let b = &d.factor_breakdown;
        assert_eq!(b.degradation.detail.urgency, Urgency::High);
        assert!((b.race_twin.score - 0.9).abs() < 1e-12);
        assert_eq!(b.opponent.detail.as_ref().unwrap().closest_opponent, "near");
        assert!((b.opponent.score - 0.8).abs() < 1e-12);
        assert!((b.weather.score - 0.7).abs() < 1e-12);
        assert!((d.confidence - 0.775).abs() < 1e-9);
        assert_eq!(d.decision, PitCall::PitNow);
        assert_eq!(d.confidence_level, ConfidenceLevel::MediumHigh);
        assert_eq!(d.race_twin_integration.in_optimal_window, Some(true));
    }

    #[test]
    fn moderate_confidence_waits_for_clear_lap() {
        let engine = AdvancedPitDecisionEngine::default();
        let mut i = input(16, TireCompound::Soft, 0.3);
        i.weather = Some(WeatherRecord::default());
        let d = engine.make_pit_decision(&i);
        assert_eq!(d.factor_breakdown.degradation.detail.urgency, Urgency::High);
        assert_eq!(d.factor_breakdown.traffic.detail.best_window_lap, Some(25));
        assert_eq!(d.decision, PitCall::PitLater);
        assert_eq!(d.recommended_lap, Some(25));
    }

    #[test]
    fn driver_twin_wear_raises_score() {
        let engine = AdvancedPitDecisionEngine::default();
        let mut i = input(10, TireCompound::Medium, 0.5);
        let base = engine.make_pit_decision(&i).factor_breakdown.degradation.score;
        let mut twin = crate::driver_twin::DriverTwinGenerator::default().generate(&crate::types::DriverRecord {
            id: "car_7".into(),
            ..Default::default()
        });
        twin.degradation_profile.rate = 0.004;
        i.driver_twin = Some(twin);
        let raised = engine.make_pit_decision(&i).factor_breakdown.degradation.score;
        assert!((raised - base - 0.1).abs() < 1e-12);
    }

    #[test]
    fn race_twin_window_position() {
        let engine = AdvancedPitDecisionEngine::default();
        let early = engine.race_twin_factor(Some(&race_twin((25, 29), 0.0, (60, false), false)), 20);
        assert!((early.score - 0.4).abs() < 1e-12);
        assert_eq!(early.detail.laps_to_window, Some(5));

        let late = engine.race_twin_factor(Some(&race_twin((10, 14), 0.0, (60, false), false)), 20);
        assert!((late.score - 0.3).abs() < 1e-12);
        assert!(late.detail.past_window);

        let cliff = engine.race_twin_factor(Some(&race_twin((10, 14), 1.5, (22, true), false)), 20);
        assert!((cliff.score - 0.9).abs() < 1e-12);
        assert_eq!(cliff.detail.cliff_lap, Some(22));
        assert_eq!(cliff.detail.undercut_gain, Some(1.5));
    }

    #[test]
    fn opponent_just_pitted() {
        let engine = AdvancedPitDecisionEngine::default();
        let f = engine.opponent_factor(
            &[OpponentRecord {
                id: "car_2".into(),
                gap: 2.0,
                tire_age: None,
                just_pitted: true,
            }],
            15,
        );
        assert!((f.score - 0.7).abs() < 1e-12);
        assert_eq!(f.detail.unwrap().tire_age_delta, 0);
    }

    #[test]
    fn wet_and_cold_weather() {
        let engine = AdvancedPitDecisionEngine::default();
        let wet = engine.weather_factor(Some(&WeatherRecord {
            rainfall: 2.0,
            ..WeatherRecord::default()
        }));
        assert!((wet.score - 0.4).abs() < 1e-12);
        let cold = engine.weather_factor(Some(&WeatherRecord {
            track_temp: 10.0,
            ..WeatherRecord::default()
        }));
        assert!((cold.score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn confidence_labels() {
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.6), ConfidenceLevel::MediumHigh);
        assert_eq!(ConfidenceLevel::from_score(0.4), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.2), ConfidenceLevel::LowMedium);
        assert_eq!(ConfidenceLevel::from_score(0.1), ConfidenceLevel::Low);
        assert_eq!(serde_json::to_string(&ConfidenceLevel::MediumHigh).unwrap(), "\"medium-high\"");
    }
}
