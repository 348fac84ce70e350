use serde::{Deserialize, Serialize};

use super::policy::MerchantPolicy;
use super::signals::{Signal, SignalStatus};

/// Composite output of the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub composite_score: u8,
    pub confidence: u8,
    /// Fewer detectors reported than the policy's minimum coverage.
    pub reduced_confidence: bool,
    /// Which override (if any) lifted the composite above the weighted mean.
    pub override_applied: Option<ScoreOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOverride {
    FailFloor,
    HardFail,
}

/// Weighted mean of the available signals, clamped to 0..=100.
///
/// Returns `None` when no available signal carries weight.
pub fn weighted_mean(signals: &[Signal]) -> Option<u8> {
    let (weighted, total_weight) = signals.iter().filter(|signal| signal.is_available()).fold(
        (0.0_f64, 0.0_f64),
        |(sum, weights), signal| {
            let weight = f64::from(signal.weight.max(0.0));
            (sum + f64::from(signal.score) * weight, weights + weight)
        },
    );

    if total_weight <= f64::EPSILON {
        return None;
    }
    Some((weighted / total_weight).round().clamp(0.0, 100.0) as u8)
}

/// Combine signals into the composite score and confidence.
///
/// `configured` is the number of detectors the engine attempted, so an unavailable
/// source counts against confidence even if it produced no signal at all.
pub fn aggregate(signals: &[Signal], configured: usize, policy: &MerchantPolicy) -> Aggregate {
    let available = signals
        .iter()
        .filter(|signal| signal.is_available())
        .count();
    let configured = configured.max(signals.len());
    let coverage = if configured == 0 {
        0.0
    } else {
        available as f32 / configured as f32
    };
    let confidence = (coverage * 100.0).round().clamp(0.0, 100.0) as u8;

    let mean = weighted_mean(signals);
    let reduced_confidence = mean.is_none() || coverage < policy.aggregation.minimum_coverage;
    let mut composite = mean.unwrap_or(0);
    let mut override_applied = None;

    let mut failing = signals
        .iter()
        .filter(|signal| signal.status == SignalStatus::Fail)
        .peekable();
    let any_fail = failing.peek().is_some();
    let hard_fail = failing.any(|signal| policy.aggregation.hard_fail_kinds.contains(&signal.kind));

    if any_fail && composite < policy.aggregation.fail_floor {
        composite = policy.aggregation.fail_floor;
        override_applied = Some(ScoreOverride::FailFloor);
    }
    if hard_fail && composite < policy.risk_levels.high {
        composite = policy.risk_levels.high;
        override_applied = Some(ScoreOverride::HardFail);
    }

    Aggregate {
        composite_score: composite.min(100),
        confidence,
        reduced_confidence,
        override_applied,
    }
}
