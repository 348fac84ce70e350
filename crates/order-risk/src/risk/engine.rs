use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::aggregator::{aggregate, ScoreOverride};
use super::chargeback::chargeback_likelihood;
use super::decision::{decide, hard_blocks, Decision, DecisionInputs, HardBlock, RiskLevel};
use super::detectors::{ExternalSource, LookupError};
use super::domain::{MerchantId, OrderContext, OrderId};
use super::policy::ValidatedPolicy;
use super::signals::{DetectorKind, Signal};

/// Identifier for one immutable assessment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssessmentId(pub String);

impl AssessmentId {
    pub fn generate() -> Self {
        Self(format!("asm-{}", uuid::Uuid::new_v4().simple()))
    }
}

/// Immutable result of one scan. Corrections produce a new assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub assessment_id: AssessmentId,
    pub order_id: OrderId,
    pub merchant_id: MerchantId,
    pub signals: Vec<Signal>,
    pub composite_score: u8,
    pub confidence: u8,
    pub reduced_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_override: Option<ScoreOverride>,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    pub hard_blocks: Vec<HardBlock>,
    pub reasons: Vec<String>,
    pub chargeback_likelihood: u8,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn unavailable_signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter().filter(|signal| !signal.is_available())
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} ({} risk, score {}, confidence {}%)",
            self.decision.label(),
            self.risk_level.label(),
            self.composite_score,
            self.confidence
        );
        if !self.reasons.is_empty() {
            summary.push_str(": ");
            summary.push_str(&self.reasons.join("; "));
        }
        summary
    }
}

/// Runs every configured detector and folds the results into an assessment.
pub struct RiskEngine {
    sources: Vec<Arc<dyn ExternalSource>>,
}

impl RiskEngine {
    /// Engine running only the local detectors.
    pub fn local_only() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn new(sources: Vec<Arc<dyn ExternalSource>>) -> Self {
        Self { sources }
    }

    pub fn with_source(mut self, source: Arc<dyn ExternalSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Number of detectors the engine attempts per assessment.
    pub fn configured_detectors(&self) -> usize {
        DetectorKind::LOCAL.len()
            + self
                .sources
                .iter()
                .map(|source| source.kinds().len())
                .sum::<usize>()
    }

    /// Collect every signal. External sources run concurrently, each bounded by the
    /// policy's detector timeout; a failed or slow source yields unavailable signals.
    pub async fn collect_signals(
        &self,
        ctx: &OrderContext,
        policy: &ValidatedPolicy,
    ) -> Vec<Signal> {
        let timeout_ms = policy.detector_timeout_ms;
        let timeout = Duration::from_millis(timeout_ms);

        let lookups = self.sources.iter().map(|source| async move {
            let outcome = match tokio::time::timeout(timeout, source.signals(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(LookupError::Timeout(timeout_ms)),
            };
            (source, outcome)
        });
        let external = join_all(lookups).await;

        let mut signals: Vec<Signal> = DetectorKind::LOCAL
            .iter()
            .map(|kind| kind.detect(ctx))
            .collect();

        for (source, outcome) in external {
            match outcome {
                Ok(found) => {
                    for kind in source.kinds() {
                        let signal = found
                            .iter()
                            .find(|signal| signal.kind == *kind)
                            .cloned()
                            .unwrap_or_else(|| {
                                Signal::unavailable(
                                    *kind,
                                    format!("{} omitted signal", source.name()),
                                )
                            });
                        signals.push(signal);
                    }
                }
                Err(err) => {
                    warn!(source = source.name(), error = %err, "external detector unavailable");
                    signals.extend(source.kinds().iter().map(|kind| {
                        Signal::unavailable(*kind, format!("{} unavailable: {err}", source.name()))
                    }));
                }
            }
        }

        signals
            .into_iter()
            .map(|signal| {
                let weight = policy.weight_for(signal.kind);
                signal.with_weight(weight)
            })
            .collect()
    }

    /// Produce an assessment from already-collected signals. Pure given its inputs.
    pub fn evaluate(
        &self,
        order_id: OrderId,
        ctx: &OrderContext,
        signals: Vec<Signal>,
        policy: &ValidatedPolicy,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let aggregate = aggregate(&signals, self.configured_detectors(), policy);
        let blocks = hard_blocks(ctx, policy);
        let outcome = decide(
            DecisionInputs {
                composite_score: aggregate.composite_score,
                hard_blocks: &blocks,
                reduced_confidence: aggregate.reduced_confidence,
                order_amount_cents: ctx.order_amount_cents,
            },
            policy,
        );
        let likelihood = chargeback_likelihood(ctx, &signals, aggregate.composite_score, policy);

        debug!(
            order_id = %order_id,
            composite = aggregate.composite_score,
            confidence = aggregate.confidence,
            decision = outcome.decision.label(),
            "order assessed"
        );

        RiskAssessment {
            assessment_id: AssessmentId::generate(),
            order_id,
            merchant_id: ctx.merchant_id.clone(),
            signals,
            composite_score: aggregate.composite_score,
            confidence: aggregate.confidence,
            reduced_confidence: aggregate.reduced_confidence,
            score_override: aggregate.override_applied,
            risk_level: outcome.risk_level,
            decision: outcome.decision,
            hard_blocks: blocks,
            reasons: outcome.reasons,
            chargeback_likelihood: likelihood,
            assessed_at: now,
        }
    }

    pub async fn assess(
        &self,
        order_id: OrderId,
        ctx: &OrderContext,
        policy: &ValidatedPolicy,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let signals = self.collect_signals(ctx, policy).await;
        self.evaluate(order_id, ctx, signals, policy, now)
    }
}
