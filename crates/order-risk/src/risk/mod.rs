//! Signal detection, aggregation, and the pure decision engine behind the pre-auth gate.

pub mod aggregator;
pub mod chargeback;
pub mod decision;
pub mod detectors;
pub mod domain;
pub mod engine;
pub mod policy;
pub mod signals;

#[cfg(test)]
mod tests;

pub use aggregator::{aggregate, Aggregate, ScoreOverride};
pub use decision::{
    decide, hard_blocks, Decision, DecisionInputs, DecisionOutcome, HardBlock, RiskLevel,
};
pub use detectors::{BureauClient, BureauReport, BureauSource, ExternalSource, LookupError};
pub use domain::{
    Address, CustomerHistory, IpGeolocation, MerchantId, OrderContext, OrderId, SessionTiming,
    ValidationError,
};
pub use engine::{AssessmentId, RiskAssessment, RiskEngine};
pub use policy::{
    AggregationRules, ChargebackPenalties, DisposableEmailPolicy, MerchantPolicy, PolicyError,
    PolicyRegistry, RiskLevelThresholds, ValidatedPolicy,
};
pub use signals::{DetectorKind, Signal, SignalStatus};
