use serde::{Deserialize, Serialize};

/// Closed set of detectors the engine knows how to run.
///
/// Local kinds are pure functions of the order context; bureau kinds are derived from one
/// identity/credit bureau lookup and may come back `Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    DeviceFingerprint,
    Geolocation,
    Velocity,
    EmailValidity,
    PhoneValidity,
    AddressMatch,
    OrderValueAnomaly,
    CheckoutBehavior,
    CreditScore,
    PaymentHistory,
    CreditUtilization,
    DerogatoryMarks,
    IdentityVerification,
    SyntheticIdentity,
    BureauVelocity,
}

impl DetectorKind {
    pub const LOCAL: [DetectorKind; 8] = [
        DetectorKind::DeviceFingerprint,
        DetectorKind::Geolocation,
        DetectorKind::Velocity,
        DetectorKind::EmailValidity,
        DetectorKind::PhoneValidity,
        DetectorKind::AddressMatch,
        DetectorKind::OrderValueAnomaly,
        DetectorKind::CheckoutBehavior,
    ];

    pub const BUREAU: [DetectorKind; 7] = [
        DetectorKind::CreditScore,
        DetectorKind::PaymentHistory,
        DetectorKind::CreditUtilization,
        DetectorKind::DerogatoryMarks,
        DetectorKind::IdentityVerification,
        DetectorKind::SyntheticIdentity,
        DetectorKind::BureauVelocity,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DetectorKind::DeviceFingerprint => "device_fingerprint",
            DetectorKind::Geolocation => "geolocation",
            DetectorKind::Velocity => "velocity",
            DetectorKind::EmailValidity => "email_validity",
            DetectorKind::PhoneValidity => "phone_validity",
            DetectorKind::AddressMatch => "address_match",
            DetectorKind::OrderValueAnomaly => "order_value_anomaly",
            DetectorKind::CheckoutBehavior => "checkout_behavior",
            DetectorKind::CreditScore => "credit_score",
            DetectorKind::PaymentHistory => "payment_history",
            DetectorKind::CreditUtilization => "credit_utilization",
            DetectorKind::DerogatoryMarks => "derogatory_marks",
            DetectorKind::IdentityVerification => "identity_verification",
            DetectorKind::SyntheticIdentity => "synthetic_identity",
            DetectorKind::BureauVelocity => "bureau_velocity",
        }
    }

    /// Weight used when the merchant policy does not override it.
    pub const fn default_weight(self) -> f32 {
        match self {
            DetectorKind::IdentityVerification | DetectorKind::SyntheticIdentity => 1.0,
            DetectorKind::Velocity => 0.9,
            DetectorKind::Geolocation | DetectorKind::CreditScore => 0.8,
            DetectorKind::EmailValidity | DetectorKind::PaymentHistory => 0.7,
            DetectorKind::DeviceFingerprint
            | DetectorKind::AddressMatch
            | DetectorKind::BureauVelocity => 0.6,
            DetectorKind::OrderValueAnomaly | DetectorKind::DerogatoryMarks => 0.5,
            DetectorKind::PhoneValidity
            | DetectorKind::CheckoutBehavior
            | DetectorKind::CreditUtilization => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pass,
    Warn,
    Fail,
    Unavailable,
}

impl SignalStatus {
    /// Status implied by a risk score when the detector has no explicit verdict.
    pub fn from_score(score: u8) -> Self {
        if score < 30 {
            SignalStatus::Pass
        } else if score < 60 {
            SignalStatus::Warn
        } else {
            SignalStatus::Fail
        }
    }
}

/// One detector's normalized risk contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub kind: DetectorKind,
    pub status: SignalStatus,
    pub score: u8,
    pub weight: f32,
    pub details: String,
}

impl Signal {
    pub fn new(
        kind: DetectorKind,
        status: SignalStatus,
        score: u8,
        details: impl Into<String>,
    ) -> Self {
        Self {
            name: kind.label().to_string(),
            kind,
            status,
            score: score.min(100),
            weight: kind.default_weight(),
            details: details.into(),
        }
    }

    pub fn pass(kind: DetectorKind, details: impl Into<String>) -> Self {
        Self::new(kind, SignalStatus::Pass, 0, details)
    }

    pub fn scored(kind: DetectorKind, score: u8, details: impl Into<String>) -> Self {
        Self::new(kind, SignalStatus::from_score(score), score, details)
    }

    pub fn unavailable(kind: DetectorKind, details: impl Into<String>) -> Self {
        Self::new(kind, SignalStatus::Unavailable, 0, details)
    }

    /// Rebind the weight before the signal is sealed into an assessment.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = if weight.is_finite() {
            weight.clamp(0.0, 1.0)
        } else {
            self.kind.default_weight()
        };
        self
    }

    pub fn is_available(&self) -> bool {
        self.status != SignalStatus::Unavailable
    }
}
