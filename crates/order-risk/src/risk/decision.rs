use serde::{Deserialize, Serialize};

use super::detectors::is_disposable_domain;
use super::domain::OrderContext;
use super::policy::{DisposableEmailPolicy, MerchantPolicy, RiskLevelThresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8, thresholds: &RiskLevelThresholds) -> Self {
        if score < thresholds.medium {
            RiskLevel::Low
        } else if score < thresholds.high {
            RiskLevel::Medium
        } else if score < thresholds.critical {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Review,
    Decline,
}

impl Decision {
    pub const fn label(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Review => "review",
            Decision::Decline => "decline",
        }
    }
}

/// Policy rule forcing a decline regardless of the composite score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum HardBlock {
    BlockedCountry { country: String, source: String },
    DisposableEmail { domain: String },
    EmailVelocity { orders: u32, cap: u32 },
    DeviceVelocity { orders: u32, cap: u32 },
    FirstTimeCustomerAmount { amount_cents: u64, cap_cents: u64 },
}

impl HardBlock {
    pub fn summary(&self) -> String {
        match self {
            HardBlock::BlockedCountry { country, source } => {
                format!("{source} country {country} is blocked")
            }
            HardBlock::DisposableEmail { domain } => {
                format!("disposable email domain {domain} is not accepted")
            }
            HardBlock::EmailVelocity { orders, cap } => {
                format!("{orders} orders from this email in 24h exceeds cap {cap}")
            }
            HardBlock::DeviceVelocity { orders, cap } => {
                format!("{orders} orders from this device in 24h exceeds cap {cap}")
            }
            HardBlock::FirstTimeCustomerAmount {
                amount_cents,
                cap_cents,
            } => format!(
                "first order of {} exceeds first-time limit {}",
                format_cents(*amount_cents),
                format_cents(*cap_cents)
            ),
        }
    }
}

pub(crate) fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Evaluate the policy's hard-block rules against the order.
pub fn hard_blocks(ctx: &OrderContext, policy: &MerchantPolicy) -> Vec<HardBlock> {
    let mut blocks = Vec::new();

    if !policy.blocked_countries.is_empty() {
        let candidates = [
            (
                "billing",
                ctx.billing_address.as_ref().map(|a| a.country_code()),
            ),
            (
                "shipping",
                ctx.shipping_address.as_ref().map(|a| a.country_code()),
            ),
            (
                "ip",
                ctx.ip_geolocation
                    .as_ref()
                    .map(|geo| geo.country.trim().to_ascii_uppercase()),
            ),
        ];
        for (source, country) in candidates {
            if let Some(country) = country.filter(|c| policy.blocked_countries.contains(c)) {
                blocks.push(HardBlock::BlockedCountry {
                    country,
                    source: source.to_string(),
                });
            }
        }
    }

    if policy.disposable_email == DisposableEmailPolicy::Block {
        if let Some(domain) = ctx.email_domain().filter(|d| is_disposable_domain(d)) {
            blocks.push(HardBlock::DisposableEmail { domain });
        }
    }

    if let Some(history) = &ctx.customer_history {
        if let Some(cap) = policy.max_orders_per_email_24h {
            if history.orders_last_24h_email > cap {
                blocks.push(HardBlock::EmailVelocity {
                    orders: history.orders_last_24h_email,
                    cap,
                });
            }
        }
        if let Some(cap) = policy.max_orders_per_device_24h {
            if history.orders_last_24h_device > cap {
                blocks.push(HardBlock::DeviceVelocity {
                    orders: history.orders_last_24h_device,
                    cap,
                });
            }
        }
    }

    if let Some(cap) = policy.first_time_customer_max_cents {
        if ctx.is_first_time_customer() && ctx.order_amount_cents > cap {
            blocks.push(HardBlock::FirstTimeCustomerAmount {
                amount_cents: ctx.order_amount_cents,
                cap_cents: cap,
            });
        }
    }

    blocks
}

/// Facts the decision engine maps onto a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionInputs<'a> {
    pub composite_score: u8,
    pub hard_blocks: &'a [HardBlock],
    pub reduced_confidence: bool,
    pub order_amount_cents: u64,
}

/// Risk level, decision, and the reasons behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub risk_level: RiskLevel,
    pub decision: Decision,
    pub reasons: Vec<String>,
}

/// Pure mapping from composite score and policy to a decision. Hard blocks always win.
pub fn decide(inputs: DecisionInputs<'_>, policy: &MerchantPolicy) -> DecisionOutcome {
    let score = inputs.composite_score.min(100);
    let risk_level = RiskLevel::from_score(score, &policy.risk_levels);
    let mut reasons = Vec::new();

    if !inputs.hard_blocks.is_empty() {
        reasons.extend(inputs.hard_blocks.iter().map(HardBlock::summary));
        return DecisionOutcome {
            risk_level,
            decision: Decision::Decline,
            reasons,
        };
    }

    if score >= policy.decline_threshold {
        reasons.push(format!(
            "composite score {score} at or above decline threshold {}",
            policy.decline_threshold
        ));
        return DecisionOutcome {
            risk_level,
            decision: Decision::Decline,
            reasons,
        };
    }

    if score >= policy.approve_threshold {
        reasons.push(format!(
            "composite score {score} between approve threshold {} and decline threshold {}",
            policy.approve_threshold, policy.decline_threshold
        ));
    }
    if inputs.reduced_confidence {
        reasons.push("too few detectors reported to approve automatically".to_string());
    }
    if let Some(ceiling) = policy.review_amount_ceiling_cents {
        if inputs.order_amount_cents > ceiling {
            reasons.push(format!(
                "order amount {} above review ceiling {}",
                format_cents(inputs.order_amount_cents),
                format_cents(ceiling)
            ));
        }
    }

    let decision = if reasons.is_empty() {
        Decision::Approve
    } else {
        Decision::Review
    };

    DecisionOutcome {
        risk_level,
        decision,
        reasons,
    }
}
