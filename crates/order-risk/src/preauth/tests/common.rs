use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::alerts::{AlertEmitter, AlertError, RiskAlert};
use crate::preauth::gate::PreAuthGate;
use crate::risk::domain::{
    Address, CustomerHistory, IpGeolocation, MerchantId, OrderContext, OrderId, SessionTiming,
};
use crate::risk::engine::RiskEngine;
use crate::risk::policy::{MerchantPolicy, ValidatedPolicy};
use crate::store::InMemoryStore;

pub(super) type MemoryGate = PreAuthGate<InMemoryStore, InMemoryStore, MemoryAlerts>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

fn address() -> Address {
    Address {
        line1: "88 Queen St W".to_string(),
        line2: Some("Unit 4".to_string()),
        city: "Toronto".to_string(),
        postal_code: "M5H 2M5".to_string(),
        country: "CA".to_string(),
    }
}

/// Returning customer whose checkout passes every local detector.
pub(super) fn order_context(order_id: &str) -> OrderContext {
    OrderContext {
        order_id: Some(OrderId(order_id.to_string())),
        merchant_id: MerchantId::default(),
        customer_email: "priya.nair@example.org".to_string(),
        customer_phone: Some("+1 416 555 0199".to_string()),
        order_amount_cents: 12_900,
        billing_address: Some(address()),
        shipping_address: Some(address()),
        ip_address: Some("198.51.100.7".to_string()),
        ip_geolocation: Some(IpGeolocation {
            country: "CA".to_string(),
            region: Some("ON".to_string()),
            is_proxy: false,
        }),
        device_fingerprint: Some("9f86d081884c7d659a2feaa0c55ad015".to_string()),
        card_bin: Some("520082".to_string()),
        session_timing: Some(SessionTiming {
            seconds_on_site: 410,
            checkout_seconds: 75,
            card_details_pasted: false,
        }),
        customer_history: Some(CustomerHistory {
            prior_orders: 3,
            average_order_cents: Some(11_000),
            orders_last_24h_email: 0,
            orders_last_24h_device: 0,
        }),
    }
}

/// A single malformed device fingerprint: lifted to the fail floor, so it lands in review.
pub(super) fn review_context(order_id: &str) -> OrderContext {
    let mut ctx = order_context(order_id);
    ctx.device_fingerprint = Some("abc123".to_string());
    ctx
}

/// Several failing detectors at once without tripping any hard block.
pub(super) fn risky_context(order_id: &str) -> OrderContext {
    let mut ctx = review_context(order_id);
    ctx.customer_email = "flash.buyer@mailinator.com".to_string();
    ctx.ip_geolocation = Some(IpGeolocation {
        country: "CA".to_string(),
        region: None,
        is_proxy: true,
    });
    ctx.session_timing = Some(SessionTiming {
        seconds_on_site: 12,
        checkout_seconds: 4,
        card_details_pasted: true,
    });
    ctx.customer_history = Some(CustomerHistory {
        prior_orders: 3,
        average_order_cents: Some(11_000),
        orders_last_24h_email: 6,
        orders_last_24h_device: 2,
    });
    ctx
}

pub(super) fn policy() -> ValidatedPolicy {
    MerchantPolicy::default()
        .validate()
        .expect("default policy is valid")
}

pub(super) fn build_gate() -> (MemoryGate, Arc<InMemoryStore>, Arc<MemoryAlerts>) {
    let store = Arc::new(InMemoryStore::new());
    let alerts = Arc::new(MemoryAlerts::default());
    let gate = PreAuthGate::new(
        Arc::new(RiskEngine::local_only()),
        store.clone(),
        store.clone(),
        alerts.clone(),
    );
    (gate, store, alerts)
}

#[derive(Default, Clone)]
pub(super) struct MemoryAlerts {
    events: Arc<Mutex<Vec<RiskAlert>>>,
}

impl MemoryAlerts {
    pub(super) fn events(&self) -> Vec<RiskAlert> {
        self.events.lock().expect("alert mutex poisoned").clone()
    }
}

impl AlertEmitter for MemoryAlerts {
    fn emit(&self, alert: RiskAlert) -> Result<(), AlertError> {
        self.events
            .lock()
            .expect("alert mutex poisoned")
            .push(alert);
        Ok(())
    }
}

pub(super) struct OfflineAlerts;

impl AlertEmitter for OfflineAlerts {
    fn emit(&self, _alert: RiskAlert) -> Result<(), AlertError> {
        Err(AlertError::Transport("smtp relay down".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
