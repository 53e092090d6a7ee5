use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{now_ms, PitAdvice, TireCompound};

const DEGRADATION_THRESHOLD: f64 = 0.02;
const FRESH_TIRE_ADVANTAGE: f64 = 0.015;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

/// Coarse three-step label for confidence and risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyCall {
    Undercut,
    Overcut,
    PitNow,
    StandardPit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInput {
    pub driver_id: String,
    pub current_lap: u32,
    pub total_laps: u32,
    pub current_position: u32,
    pub tire_age: u32,
    #[serde(default)]
    pub tire_compound: TireCompound,
    pub degradation_rate: f64,
    pub traffic_density: f64,
    /// Current lap time in seconds.
    pub driver_pace: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimalWindow {
    pub start: u32,
    pub end: u32,
    pub optimal: u32,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndercutAnalysis {
    pub viable: bool,
    pub time_gain: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_lap: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laps_undercut: Option<u32>,
    pub traffic_impact: f64,
    pub confidence: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvercutAnalysis {
    pub viable: bool,
    pub time_gain: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_lap: Option<u32>,
    pub opponent_degradation: f64,
    pub traffic_impact: f64,
    pub confidence: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationDecision {
    pub decision: PitAdvice,
    pub urgency: Urgency,
    pub current_degradation: f64,
    pub predicted_degradation: f64,
    pub degradation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: f64,
    pub level: Level,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub strategy: StrategyCall,
    pub lap: Option<u32>,
    pub reasoning: String,
    pub confidence: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPlan {
    pub driver_id: String,
    pub current_lap: u32,
    pub optimal_pit_window: OptimalWindow,
    pub undercut_analysis: UndercutAnalysis,
    pub overcut_analysis: OvercutAnalysis,
    pub degradation_decision: DegradationDecision,
    pub risk_score: RiskScore,
    pub recommendation: Recommendation,
    pub ts_ms: i64,
}

/// Undercut/overcut feasibility and a degradation-aware pit call.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyOptimizer;

impl StrategyOptimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn optimize(&self, input: &StrategyInput) -> StrategyPlan {
        let window = self.optimal_pit_window(
            input.current_lap,
            input.total_laps,
            input.tire_age,
            input.degradation_rate,
            input.traffic_density,
        );
        let undercut = self.undercut_analysis(input.current_lap, &window, input.driver_pace, input.traffic_density);
        let overcut = self.overcut_analysis(input.current_lap, &window, input.tire_age, input.traffic_density);
        let degradation = self.degradation_decision(input.tire_age, input.degradation_rate, &window, input.current_lap);
        let risk = self.risk_score(input.tire_age, input.degradation_rate, input.traffic_density, input.current_position);
        let recommendation = self.recommend(&undercut, &overcut, &degradation, &window);

        debug!(
            driver = %input.driver_id,
            optimal = window.optimal,
            strategy = ?recommendation.strategy,
            "strategy optimised"
        );

        StrategyPlan {
            driver_id: input.driver_id.clone(),
            current_lap: input.current_lap,
            optimal_pit_window: window,
            undercut_analysis: undercut,
            overcut_analysis: overcut,
            degradation_decision: degradation,
            risk_score: risk,
            recommendation,
            ts_ms: now_ms(),
        }
    }

    /// Lap at which pace loss reaches 2%, nudged by traffic and kept within
    /// `[current_lap + 1, total_laps - 10]`.
    pub fn optimal_pit_window(
        &self,
        current_lap: u32,
        total_laps: u32,
        tire_age: u32,
        degradation_rate: f64,
        traffic_density: f64,
    ) -> OptimalWindow {
        let critical = if degradation_rate > 0.0 {
            current_lap.saturating_add((DEGRADATION_THRESHOLD / degradation_rate) as u32)
        } else {
            current_lap + 20
        };
        let adjusted = if traffic_density > 0.7 {
            critical.saturating_sub(2)
        } else if traffic_density < 0.3 {
            critical.saturating_add(2)
        } else {
            critical
        };
        let optimal = (current_lap + 1).max(adjusted.min(total_laps.saturating_sub(10)));
        let urgency = if tire_age > 20 {
            Urgency::High
        } else if tire_age > 15 {
            Urgency::Medium
        } else {
            Urgency::Low
        };
        OptimalWindow {
            start: (current_lap + 1).max(optimal.saturating_sub(2)),
            end: total_laps.saturating_sub(5).min(optimal + 2),
            optimal,
            urgency,
        }
    }

    /// Pit early and use fresh-tyre pace before the rival stops.
    pub fn undercut_analysis(
        &self,
        current_lap: u32,
        window: &OptimalWindow,
        driver_pace: f64,
        traffic_density: f64,
    ) -> UndercutAnalysis {
        let gain_per_lap = driver_pace * FRESH_TIRE_ADVANTAGE;
        let opponent_pit = window.optimal + 3;
        let undercut_lap = (current_lap + 1).max(window.start.saturating_sub(2));
        let traffic_penalty = traffic_density * 0.5;

        if opponent_pit <= undercut_lap {
            return UndercutAnalysis {
                viable: false,
                time_gain: 0.0,
                recommended_lap: None,
                laps_undercut: None,
                traffic_impact: traffic_penalty,
                confidence: Level::Low,
                reason: Some("Opponent will pit before or at same time".to_string()),
            };
        }

        let laps = opponent_pit - undercut_lap;
        let net_gain = gain_per_lap * f64::from(laps) - traffic_penalty;
        let viable = net_gain > 1.0 && traffic_density < 0.5;
        UndercutAnalysis {
            viable,
            time_gain: net_gain.max(0.0),
            recommended_lap: Some(if viable { undercut_lap } else { window.optimal }),
            laps_undercut: Some(laps),
            traffic_impact: traffic_penalty,
            confidence: label(net_gain, 2.0, 1.0),
            reason: None,
        }
    }

    /// Stay out while the rival's older tyres fade.
    pub fn overcut_analysis(
        &self,
        current_lap: u32,
        window: &OptimalWindow,
        tire_age: u32,
        traffic_density: f64,
    ) -> OvercutAnalysis {
        let opponent_pit = window.optimal + 2;
        let overcut_lap = opponent_pit + 3;
        let traffic_penalty = traffic_density * 0.3;

        if overcut_lap > window.end {
            return OvercutAnalysis {
                viable: false,
                time_gain: 0.0,
                recommended_lap: None,
                opponent_degradation: 0.0,
                traffic_impact: traffic_penalty,
                confidence: Level::Low,
                reason: Some("Overcut window exceeds optimal pit window".to_string()),
            };
        }

        let opponent_age_at_pit = f64::from(opponent_pit) - f64::from(current_lap) + f64::from(tire_age);
        let opponent_degradation = opponent_age_at_pit * 0.002;
        let net_gain = opponent_degradation * 3.0 - traffic_penalty;
        let viable = net_gain > 0.5 && tire_age < 18;
        OvercutAnalysis {
            viable,
            time_gain: net_gain.max(0.0),
            recommended_lap: Some(if viable { overcut_lap } else { window.optimal }),
            opponent_degradation,
            traffic_impact: traffic_penalty,
            confidence: label(net_gain, 1.5, 0.5),
            reason: None,
        }
    }

    pub fn degradation_decision(
        &self,
        tire_age: u32,
        degradation_rate: f64,
        window: &OptimalWindow,
        current_lap: u32,
    ) -> DegradationDecision {
        let current = f64::from(tire_age) * degradation_rate;
        let laps_to_window = f64::from(window.optimal) - f64::from(current_lap);
        let predicted = (f64::from(tire_age) + laps_to_window) * degradation_rate;

        let (decision, urgency) = if current >= 0.05 {
            (PitAdvice::PitNow, Urgency::Critical)
        } else if predicted >= 0.04 {
            (PitAdvice::PitInWindow, Urgency::High)
        } else if degradation_rate > 0.003 {
            (PitAdvice::PitEarly, Urgency::Medium)
        } else {
            (PitAdvice::ExtendStint, Urgency::Low)
        };
        DegradationDecision {
            decision,
            urgency,
            current_degradation: current,
            predicted_degradation: predicted,
            degradation_rate,
        }
    }

    pub fn risk_score(&self, tire_age: u32, degradation_rate: f64, traffic_density: f64, position: u32) -> RiskScore {
        let mut risks = Vec::new();
        let mut score: f64 = 0.0;
        if tire_age > 25 {
            risks.push("Critical tire age - high failure risk".to_string());
            score += 0.4;
        } else if tire_age > 20 {
            risks.push("High tire age - performance degradation".to_string());
            score += 0.3;
        }
        if degradation_rate > 0.004 {
            risks.push("High degradation rate - pace loss accelerating".to_string());
            score += 0.3;
        }
        if traffic_density > 0.7 {
            risks.push("Heavy traffic - difficult pit rejoin".to_string());
            score += 0.2;
        }
        if position <= 3 {
            risks.push("Podium position - strategy critical".to_string());
            score += 0.1;
        }
        RiskScore {
            score: score.min(1.0),
            level: label(score, 0.6, 0.3),
            risks,
        }
    }

    fn recommend(
        &self,
        undercut: &UndercutAnalysis,
        overcut: &OvercutAnalysis,
        degradation: &DegradationDecision,
        window: &OptimalWindow,
    ) -> Recommendation {
        if undercut.viable && undercut.time_gain > 2.0 {
            return Recommendation {
                strategy: StrategyCall::Undercut,
                lap: undercut.recommended_lap,
                reasoning: format!("Strong undercut opportunity - {:.2}s potential gain", undercut.time_gain),
                confidence: undercut.confidence,
            };
        }
        if overcut.viable && overcut.time_gain > 1.5 {
            return Recommendation {
                strategy: StrategyCall::Overcut,
                lap: overcut.recommended_lap,
                reasoning: format!("Overcut viable - opponent tires degrading, {:.2}s gain", overcut.time_gain),
                confidence: overcut.confidence,
            };
        }
        if degradation.decision == PitAdvice::PitNow {
            return Recommendation {
                strategy: StrategyCall::PitNow,
                lap: None,
                reasoning: "Critical degradation - pit immediately".to_string(),
                confidence: Level::High,
            };
        }
        Recommendation {
            strategy: StrategyCall::StandardPit,
            lap: Some(window.optimal),
            reasoning: "Follow standard pit window strategy".to_string(),
            confidence: Level::Medium,
        }
    }
}

fn label(value: f64, high: f64, medium: f64) -> Level {
    if value > high {
        Level::High
    } else if value > medium {
        Level::Medium
    } else {
        Level::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> StrategyInput {
        StrategyInput {
            driver_id: "car_1".into(),
            current_lap: 15,
            total_laps: 50,
            current_position: 5,
            tire_age: 18,
            tire_compound: TireCompound::Medium,
            degradation_rate: 0.0025,
            traffic_density: 0.4,
            driver_pace: 95.0,
        }
    }

    #[test]
    fn window_from_degradation() {
        let opt = StrategyOptimizer::new();
        let w = opt.optimal_pit_window(15, 50, 18, 0.0025, 0.4);
        assert_eq!(w.optimal, 23);
        assert_eq!((w.start, w.end), (21, 25));
        assert_eq!(w.urgency, Urgency::Medium);

        // Light traffic pushes the stop later; heavy traffic pulls it earlier.
        assert_eq!(opt.optimal_pit_window(15, 50, 5, 0.0025, 0.1).optimal, 25);
        assert_eq!(opt.optimal_pit_window(15, 50, 5, 0.0025, 0.9).optimal, 21);
        // No wear: 20 laps out, clamped to total - 10.
        assert_eq!(opt.optimal_pit_window(25, 50, 5, 0.0, 0.5).optimal, 40);
        // Late in the race the window never goes behind the next lap.
        let late = opt.optimal_pit_window(48, 50, 30, 0.01, 0.5);
        assert_eq!(late.optimal, 49);
        assert_eq!(late.start, 49);
    }

    #[test]
    fn undercut_needs_clear_track() {
        let opt = StrategyOptimizer::new();
        let w = opt.optimal_pit_window(15, 50, 18, 0.0025, 0.4);
        let u = opt.undercut_analysis(15, &w, 95.0, 0.4);
        // 1.425 s/lap over 7 laps minus 0.2 s of traffic.
        assert_eq!(u.laps_undercut, Some(7));
        assert!((u.time_gain - (1.425 * 7.0 - 0.2)).abs() < 1e-9);
        assert!(u.viable);
        assert_eq!(u.recommended_lap, Some(19));
        assert_eq!(u.confidence, Level::High);

        let busy = opt.undercut_analysis(15, &w, 95.0, 0.6);
        assert!(!busy.viable);
        assert_eq!(busy.recommended_lap, Some(w.optimal));
    }

    #[test]
    fn overcut_outside_window() {
        let opt = StrategyOptimizer::new();
        let w = opt.optimal_pit_window(15, 50, 18, 0.0025, 0.4);
        let o = opt.overcut_analysis(15, &w, 18, 0.4);
        assert!(!o.viable);
        assert!(o.reason.is_some());
        assert_eq!(o.time_gain, 0.0);
    }

    #[test]
    fn overcut_inside_wide_window() {
        let opt = StrategyOptimizer::new();
        let w = OptimalWindow { start: 20, end: 40, optimal: 25, urgency: Urgency::Low };
        let o = opt.overcut_analysis(15, &w, 10, 0.0);
        // Opponent stops at 27 on 22-lap tyres: 0.044 * 3.
        assert!((o.opponent_degradation - 0.044).abs() < 1e-12);
        assert!(!o.viable);
        assert_eq!(o.recommended_lap, Some(25));
    }

    #[test]
    fn degradation_thresholds() {
        let opt = StrategyOptimizer::new();
        let w = OptimalWindow { start: 20, end: 30, optimal: 25, urgency: Urgency::Low };
        assert_eq!(opt.degradation_decision(30, 0.002, &w, 20).decision, PitAdvice::PitNow);
        assert_eq!(opt.degradation_decision(10, 0.003, &w, 20).decision, PitAdvice::PitInWindow);
        assert_eq!(opt.degradation_decision(2, 0.0035, &w, 20).decision, PitAdvice::PitEarly);
        let calm = opt.degradation_decision(2, 0.001, &w, 20);
        assert_eq!(calm.decision, PitAdvice::ExtendStint);
        assert_eq!(calm.urgency, Urgency::Low);
    }

    #[test]
    fn risk_accumulates() {
        let opt = StrategyOptimizer::new();
        let r = opt.risk_score(30, 0.005, 0.8, 2);
        assert!((r.score - 1.0).abs() < 1e-9);
        assert_eq!(r.level, Level::High);
        assert_eq!(r.risks.len(), 4);
        let calm = opt.risk_score(5, 0.001, 0.2, 10);
        assert_eq!(calm.score, 0.0);
        assert_eq!(calm.level, Level::Low);
    }

    #[test]
    fn full_plan_prefers_undercut() {
        let plan = StrategyOptimizer::new().optimize(&input());
        assert_eq!(plan.recommendation.strategy, StrategyCall::Undercut);
        assert_eq!(plan.recommendation.lap, Some(19));

        let mut stale = input();
        stale.traffic_density = 0.9;
        stale.tire_age = 30;
        stale.degradation_rate = 0.002;
        let plan = StrategyOptimizer::new().optimize(&stale);
        assert_eq!(plan.recommendation.strategy, StrategyCall::PitNow);
        assert_eq!(plan.recommendation.lap, None);
    }
}
