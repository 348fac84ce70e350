//! Derived chargeback likelihood shown alongside the composite score.
//!
//! This is a display metric built from additive penalties; it is not a calibrated
//! probability and never feeds the decision.

use super::domain::OrderContext;
use super::policy::MerchantPolicy;
use super::signals::{Signal, SignalStatus};

pub fn chargeback_likelihood(
    ctx: &OrderContext,
    signals: &[Signal],
    composite_score: u8,
    policy: &MerchantPolicy,
) -> u8 {
    let penalties = &policy.chargeback_penalties;
    let mut estimate = f32::from(composite_score) * penalties.composite_factor;

    if ctx.is_first_time_customer() {
        estimate += f32::from(penalties.first_time_customer);
    }

    let high_value = policy
        .review_amount_ceiling_cents
        .map(|ceiling| ctx.order_amount_cents > ceiling)
        .unwrap_or(false);
    if high_value {
        estimate += f32::from(penalties.high_value);
    }

    let ip_country = ctx
        .ip_geolocation
        .as_ref()
        .map(|geo| geo.country.trim().to_ascii_uppercase());
    let billing_country = ctx
        .billing_address
        .as_ref()
        .map(|address| address.country_code());
    if let (Some(ip), Some(billing)) = (ip_country, billing_country) {
        if ip != billing {
            estimate += f32::from(penalties.geo_mismatch);
        }
    }

    let failed = signals
        .iter()
        .filter(|signal| signal.status == SignalStatus::Fail)
        .count();
    estimate += f32::from(penalties.per_failed_signal) * failed as f32;

    estimate.round().clamp(0.0, f32::from(penalties.cap)) as u8
}
