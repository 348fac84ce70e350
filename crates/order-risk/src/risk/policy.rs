//! Merchant-owned policy describing thresholds, hard blocks, and aggregation rules.
//!
//! Policies are validated once when loaded. Everything downstream takes a
//! [`ValidatedPolicy`], so a misconfigured policy can never reach per-order evaluation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::ops::Deref;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::domain::MerchantId;
use super::signals::DetectorKind;

/// Score boundaries for risk levels: `< medium` LOW, `< high` MEDIUM, `< critical` HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub medium: u8,
    pub high: u8,
    pub critical: u8,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 25,
            high: 50,
            critical: 75,
        }
    }
}

/// How disposable email domains are treated by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposableEmailPolicy {
    /// Only the email detector's score counts.
    #[default]
    Score,
    /// Disposable domains are a hard block.
    Block,
}

/// Aggregation overrides protecting severe red flags from being averaged away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRules {
    /// Minimum composite whenever any signal fails.
    pub fail_floor: u8,
    /// Failing kinds that force the composite to at least the HIGH threshold.
    pub hard_fail_kinds: BTreeSet<DetectorKind>,
    /// Fraction of configured detectors that must report for full confidence.
    pub minimum_coverage: f32,
}

impl Default for AggregationRules {
    fn default() -> Self {
        Self {
            fail_floor: 30,
            hard_fail_kinds: BTreeSet::from([
                DetectorKind::IdentityVerification,
                DetectorKind::SyntheticIdentity,
            ]),
            minimum_coverage: 0.6,
        }
    }
}

/// Penalty weights for the derived chargeback likelihood display score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargebackPenalties {
    /// Share of the composite score carried into the estimate.
    pub composite_factor: f32,
    pub first_time_customer: u8,
    pub high_value: u8,
    pub geo_mismatch: u8,
    pub per_failed_signal: u8,
    pub cap: u8,
}

impl Default for ChargebackPenalties {
    fn default() -> Self {
        Self {
            composite_factor: 0.6,
            first_time_customer: 10,
            high_value: 10,
            geo_mismatch: 10,
            per_failed_signal: 5,
            cap: 95,
        }
    }
}

/// Per-merchant configuration consumed read-only by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantPolicy {
    pub merchant_id: MerchantId,
    pub approve_threshold: u8,
    pub decline_threshold: u8,
    pub risk_levels: RiskLevelThresholds,
    /// Orders above this amount never auto-approve.
    pub review_amount_ceiling_cents: Option<u64>,
    /// First-time customers above this amount are hard-blocked.
    pub first_time_customer_max_cents: Option<u64>,
    pub max_orders_per_email_24h: Option<u32>,
    pub max_orders_per_device_24h: Option<u32>,
    /// ISO 3166-1 alpha-2 codes; matched against billing, shipping, and IP country.
    pub blocked_countries: BTreeSet<String>,
    pub disposable_email: DisposableEmailPolicy,
    pub signal_weights: BTreeMap<DetectorKind, f32>,
    pub aggregation: AggregationRules,
    pub review_expiry_hours: u32,
    pub detector_timeout_ms: u64,
    /// Offset of the merchant's local day from UTC, used by the monitoring sweep.
    pub utc_offset_minutes: i32,
    pub chargeback_penalties: ChargebackPenalties,
}

impl Default for MerchantPolicy {
    fn default() -> Self {
        Self {
            merchant_id: MerchantId::default(),
            approve_threshold: 30,
            decline_threshold: 70,
            risk_levels: RiskLevelThresholds::default(),
            review_amount_ceiling_cents: None,
            first_time_customer_max_cents: None,
            max_orders_per_email_24h: Some(10),
            max_orders_per_device_24h: Some(10),
            blocked_countries: BTreeSet::new(),
            disposable_email: DisposableEmailPolicy::Score,
            signal_weights: BTreeMap::new(),
            aggregation: AggregationRules::default(),
            review_expiry_hours: 48,
            detector_timeout_ms: 1_000,
            utc_offset_minutes: 0,
            chargeback_penalties: ChargebackPenalties::default(),
        }
    }
}

impl MerchantPolicy {
    pub fn for_merchant(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: MerchantId(merchant_id.into()),
            ..Self::default()
        }
    }

    /// Check internal consistency; the only way to obtain a [`ValidatedPolicy`].
    pub fn validate(mut self) -> Result<ValidatedPolicy, PolicyError> {
        if self.merchant_id.0.trim().is_empty() {
            return Err(PolicyError::MissingMerchant);
        }
        if self.approve_threshold > 100 || self.decline_threshold > 100 {
            return Err(PolicyError::ThresholdOutOfRange);
        }
        if self.decline_threshold < self.approve_threshold {
            return Err(PolicyError::DeclineBelowApprove {
                approve: self.approve_threshold,
                decline: self.decline_threshold,
            });
        }
        let levels = self.risk_levels;
        if !(levels.medium < levels.high && levels.high < levels.critical && levels.critical <= 100)
        {
            return Err(PolicyError::RiskLevelsNotAscending(levels));
        }
        if self.aggregation.fail_floor > 100 {
            return Err(PolicyError::ThresholdOutOfRange);
        }
        let coverage = self.aggregation.minimum_coverage;
        if !coverage.is_finite() || !(0.0..=1.0).contains(&coverage) {
            return Err(PolicyError::InvalidCoverage(coverage));
        }
        for (kind, weight) in &self.signal_weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(weight) {
                return Err(PolicyError::InvalidWeight {
                    kind: *kind,
                    weight: *weight,
                });
            }
        }
        if self.review_expiry_hours == 0 {
            return Err(PolicyError::ZeroReviewWindow);
        }
        if self.detector_timeout_ms == 0 {
            return Err(PolicyError::ZeroDetectorTimeout);
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(PolicyError::InvalidUtcOffset(self.utc_offset_minutes));
        }
        let penalties = self.chargeback_penalties;
        if !penalties.composite_factor.is_finite()
            || penalties.composite_factor < 0.0
            || penalties.cap > 100
        {
            return Err(PolicyError::InvalidPenalties);
        }

        self.blocked_countries = self
            .blocked_countries
            .iter()
            .map(|country| country.trim().to_ascii_uppercase())
            .filter(|country| !country.is_empty())
            .collect();

        Ok(ValidatedPolicy(self))
    }

    pub fn weight_for(&self, kind: DetectorKind) -> f32 {
        self.signal_weights
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_weight())
    }
}

/// A policy that passed [`MerchantPolicy::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedPolicy(MerchantPolicy);

impl ValidatedPolicy {
    pub fn into_inner(self) -> MerchantPolicy {
        self.0
    }
}

impl Deref for ValidatedPolicy {
    type Target = MerchantPolicy;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Validated policies keyed by merchant, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<MerchantId, ValidatedPolicy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the default merchant's default policy.
    pub fn with_defaults() -> Result<Self, PolicyError> {
        let mut registry = Self::new();
        registry.insert(MerchantPolicy::default().validate()?);
        Ok(registry)
    }

    /// Parse a JSON array of merchant policies, validating each one.
    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let policies: Vec<MerchantPolicy> =
            serde_json::from_str(raw).map_err(|err| PolicyError::Parse(err.to_string()))?;
        let mut registry = Self::new();
        for policy in policies {
            let merchant = policy.merchant_id.clone();
            let validated = policy.validate()?;
            if registry.policies.contains_key(&merchant) {
                return Err(PolicyError::DuplicateMerchant(merchant));
            }
            registry.insert(validated);
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = fs::read_to_string(path).map_err(|err| PolicyError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::from_json(&raw)
    }

    pub fn insert(&mut self, policy: ValidatedPolicy) {
        self.policies.insert(policy.merchant_id.clone(), policy);
    }

    pub fn get(&self, merchant_id: &MerchantId) -> Option<&ValidatedPolicy> {
        self.policies.get(merchant_id)
    }

    pub fn resolve(&self, merchant_id: &MerchantId) -> Result<&ValidatedPolicy, PolicyError> {
        self.get(merchant_id)
            .ok_or_else(|| PolicyError::UnknownMerchant(merchant_id.clone()))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Policy misconfiguration, fatal at load time, or a lookup for an unconfigured merchant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("policy is missing a merchant id")]
    MissingMerchant,
    #[error("thresholds must lie within 0..=100")]
    ThresholdOutOfRange,
    #[error("decline threshold {decline} is below approve threshold {approve}")]
    DeclineBelowApprove { approve: u8, decline: u8 },
    #[error("risk level thresholds must ascend: {0:?}")]
    RiskLevelsNotAscending(RiskLevelThresholds),
    #[error("minimum detector coverage {0} must lie within 0.0..=1.0")]
    InvalidCoverage(f32),
    #[error("weight {weight} for {kind:?} must lie within 0.0..=1.0")]
    InvalidWeight { kind: DetectorKind, weight: f32 },
    #[error("review expiry must be at least one hour")]
    ZeroReviewWindow,
    #[error("detector timeout must be positive")]
    ZeroDetectorTimeout,
    #[error("utc offset {0} minutes is outside +/-14h")]
    InvalidUtcOffset(i32),
    #[error("chargeback penalties must be non-negative with a cap of at most 100")]
    InvalidPenalties,
    #[error("no policy configured for merchant {0}")]
    UnknownMerchant(MerchantId),
    #[error("merchant {0} configured twice")]
    DuplicateMerchant(MerchantId),
    #[error("unable to parse policy document: {0}")]
    Parse(String),
    #[error("unable to read policy file {path}: {reason}")]
    Read { path: String, reason: String },
}
