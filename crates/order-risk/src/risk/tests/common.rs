use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::risk::detectors::{BureauClient, BureauReport, LookupError};
use crate::risk::domain::{
    Address, CustomerHistory, IpGeolocation, MerchantId, OrderContext, OrderId, SessionTiming,
};
use crate::risk::policy::{MerchantPolicy, ValidatedPolicy};
use crate::risk::signals::{DetectorKind, Signal, SignalStatus};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn address() -> Address {
    Address {
        line1: "410 Terry Ave N".to_string(),
        line2: None,
        city: "Seattle".to_string(),
        postal_code: "98109".to_string(),
        country: "US".to_string(),
    }
}

/// A returning customer with a clean, fully-populated checkout.
pub(super) fn order_context() -> OrderContext {
    OrderContext {
        order_id: Some(OrderId("ord-1001".to_string())),
        merchant_id: MerchantId::default(),
        customer_email: "dana.smith@example.com".to_string(),
        customer_phone: Some("+1 (206) 555-0142".to_string()),
        order_amount_cents: 8_450,
        billing_address: Some(address()),
        shipping_address: Some(address()),
        ip_address: Some("203.0.113.24".to_string()),
        ip_geolocation: Some(IpGeolocation {
            country: "US".to_string(),
            region: Some("WA".to_string()),
            is_proxy: false,
        }),
        device_fingerprint: Some("d41d8cd98f00b204e9800998ecf8427e".to_string()),
        card_bin: Some("411111".to_string()),
        session_timing: Some(SessionTiming {
            seconds_on_site: 640,
            checkout_seconds: 95,
            card_details_pasted: false,
        }),
        customer_history: Some(CustomerHistory {
            prior_orders: 6,
            average_order_cents: Some(7_900),
            orders_last_24h_email: 0,
            orders_last_24h_device: 0,
        }),
    }
}

pub(super) fn policy() -> ValidatedPolicy {
    MerchantPolicy::default()
        .validate()
        .expect("default policy is valid")
}

pub(super) fn clean_report() -> BureauReport {
    BureauReport {
        credit_score: 780,
        utilization: 0.12,
        derogatory_marks: 0,
        identity_verified: true,
        synthetic_fraud_score: 0,
        velocity_alerts: 0,
        on_time_payment_pct: Some(99.0),
    }
}

pub(super) fn signal(kind: DetectorKind, status: SignalStatus, score: u8, weight: f32) -> Signal {
    Signal::new(kind, status, score, "fixture").with_weight(weight)
}

pub(super) struct StaticBureau(pub(super) BureauReport);

#[async_trait]
impl BureauClient for StaticBureau {
    async fn lookup(&self, _ctx: &OrderContext) -> Result<BureauReport, LookupError> {
        Ok(self.0.clone())
    }
}

pub(super) struct OfflineBureau;

#[async_trait]
impl BureauClient for OfflineBureau {
    async fn lookup(&self, _ctx: &OrderContext) -> Result<BureauReport, LookupError> {
        Err(LookupError::Unavailable("connection refused".to_string()))
    }
}

pub(super) struct SlowBureau(pub(super) Duration);

#[async_trait]
impl BureauClient for SlowBureau {
    async fn lookup(&self, _ctx: &OrderContext) -> Result<BureauReport, LookupError> {
        tokio::time::sleep(self.0).await;
        Ok(clean_report())
    }
}
