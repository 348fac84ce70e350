use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::super::domain::OrderContext;
use super::super::signals::{DetectorKind, Signal, SignalStatus};

/// Identity/credit bureau response for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BureauReport {
    pub credit_score: u16,
    /// Revolving utilization, 0.0–1.0.
    pub utilization: f32,
    pub derogatory_marks: u32,
    pub identity_verified: bool,
    pub synthetic_fraud_score: u8,
    pub velocity_alerts: u32,
    #[serde(default)]
    pub on_time_payment_pct: Option<f32>,
}

/// Failure reaching an external collaborator; recovered by marking signals unavailable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup timed out after {0} ms")]
    Timeout(u64),
    #[error("lookup service unavailable: {0}")]
    Unavailable(String),
    #[error("no record for customer")]
    NoRecord,
}

/// Narrow interface to the identity/credit bureau.
#[async_trait]
pub trait BureauClient: Send + Sync {
    async fn lookup(&self, ctx: &OrderContext) -> Result<BureauReport, LookupError>;
}

/// A collaborator that contributes one or more signals from an external lookup.
#[async_trait]
pub trait ExternalSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kinds this source reports; each becomes `Unavailable` when the lookup fails.
    fn kinds(&self) -> &'static [DetectorKind];

    async fn signals(&self, ctx: &OrderContext) -> Result<Vec<Signal>, LookupError>;
}

/// Adapts a [`BureauClient`] into the bureau-derived signal set.
pub struct BureauSource<C> {
    client: C,
}

impl<C> BureauSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> ExternalSource for BureauSource<C>
where
    C: BureauClient,
{
    fn name(&self) -> &'static str {
        "bureau"
    }

    fn kinds(&self) -> &'static [DetectorKind] {
        &DetectorKind::BUREAU
    }

    async fn signals(&self, ctx: &OrderContext) -> Result<Vec<Signal>, LookupError> {
        let report = self.client.lookup(ctx).await?;
        Ok(bureau_signals(&report))
    }
}

/// Derive every bureau-backed signal from one report.
pub fn bureau_signals(report: &BureauReport) -> Vec<Signal> {
    vec![
        credit_score(report.credit_score),
        payment_history(report.on_time_payment_pct),
        credit_utilization(report.utilization),
        derogatory_marks(report.derogatory_marks),
        identity_verification(report.identity_verified),
        synthetic_identity(report.synthetic_fraud_score),
        bureau_velocity(report.velocity_alerts),
    ]
}

pub(crate) fn credit_score(score: u16) -> Signal {
    let risk = match score {
        750.. => 5,
        700..=749 => 15,
        650..=699 => 30,
        600..=649 => 50,
        550..=599 => 65,
        _ => 80,
    };
    Signal::scored(
        DetectorKind::CreditScore,
        risk,
        format!("credit score {score}"),
    )
}

pub(crate) fn payment_history(on_time_pct: Option<f32>) -> Signal {
    let kind = DetectorKind::PaymentHistory;
    let Some(pct) = on_time_pct.filter(|pct| pct.is_finite()) else {
        return Signal::unavailable(kind, "bureau returned no payment history");
    };
    let risk = if pct >= 97.0 {
        5
    } else if pct >= 92.0 {
        15
    } else if pct >= 85.0 {
        25
    } else if pct >= 75.0 {
        50
    } else {
        75
    };
    Signal::scored(kind, risk, format!("{pct:.0}% of payments on time"))
}

pub(crate) fn credit_utilization(utilization: f32) -> Signal {
    let utilization = if utilization.is_finite() {
        utilization.max(0.0)
    } else {
        0.0
    };
    let risk = if utilization > 0.9 {
        60
    } else if utilization > 0.7 {
        40
    } else if utilization > 0.3 {
        15
    } else {
        0
    };
    Signal::scored(
        DetectorKind::CreditUtilization,
        risk,
        format!("{:.0}% revolving utilization", utilization * 100.0),
    )
}

pub(crate) fn derogatory_marks(marks: u32) -> Signal {
    let risk = match marks {
        0 => 0,
        1 => 30,
        2 => 50,
        _ => 75,
    };
    Signal::scored(
        DetectorKind::DerogatoryMarks,
        risk,
        format!("{marks} derogatory mark(s)"),
    )
}

pub(crate) fn identity_verification(verified: bool) -> Signal {
    let kind = DetectorKind::IdentityVerification;
    if verified {
        Signal::pass(kind, "identity verified by bureau")
    } else {
        Signal::new(
            kind,
            SignalStatus::Fail,
            90,
            "bureau could not verify identity",
        )
    }
}

pub(crate) fn synthetic_identity(score: u8) -> Signal {
    let score = score.min(100);
    Signal::scored(
        DetectorKind::SyntheticIdentity,
        score,
        format!("synthetic identity score {score}"),
    )
}

pub(crate) fn bureau_velocity(alerts: u32) -> Signal {
    let risk = match alerts {
        0 => 0,
        1 => 40,
        _ => 70,
    };
    Signal::scored(
        DetectorKind::BureauVelocity,
        risk,
        format!("{alerts} bureau velocity alert(s)"),
    )
}
