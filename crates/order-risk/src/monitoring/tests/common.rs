use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::alerts::{AlertEmitter, AlertError, RiskAlert};
use crate::monitoring::evidence::{
    CustomerMessage, EvidenceBuilder, FulfillmentBundle, FulfillmentError, FulfillmentRecords,
    LineItem, ProofOfDelivery, TermsAcceptance,
};
use crate::monitoring::feed::{DisputeFeed, FeedError};
use crate::monitoring::record::{DisputeEvent, MonitoringStatus, PostAuthOrder};
use crate::monitoring::repository::MonitoringRepository;
use crate::monitoring::scheduler::{MonitoringScheduler, SweepSettings};
use crate::risk::domain::{MerchantId, OrderId};
use crate::risk::engine::AssessmentId;
use crate::store::InMemoryStore;

pub(super) type MemoryScheduler = MonitoringScheduler<InMemoryStore, InMemoryStore, MemoryAlerts>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 14, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn id(raw: &str) -> OrderId {
    OrderId(raw.to_string())
}

/// Monitoring record that has already been swept `days` times, the last one yesterday.
pub(super) fn monitored(order_id: &str, days: u16) -> PostAuthOrder {
    let created = now() - chrono::Duration::days(i64::from(days) + 1);
    PostAuthOrder {
        order_id: id(order_id),
        merchant_id: MerchantId::default(),
        amount_cents: 18_450,
        email: "leo.martins@example.net".to_string(),
        card_bin: Some("400022".to_string()),
        ip_address: Some("192.0.2.44".to_string()),
        pre_auth_score: 12,
        pre_auth_assessment_id: AssessmentId(format!("asm-{order_id}")),
        status: MonitoringStatus::UnderMonitoring,
        days_monitored: days,
        utc_offset_minutes: 0,
        last_swept_day: (days > 0).then(|| (now() - chrono::Duration::days(1)).date_naive()),
        created_at: created,
        last_checked_at: created,
        chargeback: None,
        cleared_at: None,
        evidence: Vec::new(),
    }
}

pub(super) fn dispute() -> DisputeEvent {
    DisputeEvent {
        reason: "fraudulent: cardholder does not recognize".to_string(),
        amount_cents: 18_450,
        filed_at: now() - chrono::Duration::hours(2),
    }
}

pub(super) fn bundle() -> FulfillmentBundle {
    FulfillmentBundle {
        proof_of_delivery: Some(ProofOfDelivery {
            carrier: "UPS".to_string(),
            tracking_number: "1Z999AA10123456784".to_string(),
            delivered_at: Some(at(3, 16) - chrono::Duration::days(30)),
            signed_by: Some("L MARTINS".to_string()),
        }),
        messages: vec![
            CustomerMessage {
                sent_at: at(1, 10) - chrono::Duration::days(35),
                channel: "email".to_string(),
                direction: "outbound".to_string(),
                summary: "Order confirmation".to_string(),
            },
            CustomerMessage {
                sent_at: at(1, 11) - chrono::Duration::days(20),
                channel: "chat".to_string(),
                direction: "inbound".to_string(),
                summary: "Asked about sizing, said \"fits great\"".to_string(),
            },
        ],
        line_items: vec![LineItem {
            sku: "JKT-042-M".to_string(),
            description: "Waxed canvas jacket".to_string(),
            quantity: 1,
            unit_price_cents: 18_450,
        }],
        terms_acceptance: Some(TermsAcceptance {
            accepted_at: at(1, 9) - chrono::Duration::days(35),
            terms_version: "2025-01".to_string(),
            ip_address: Some("192.0.2.44".to_string()),
        }),
    }
}

pub(super) fn seed(store: &InMemoryStore, records: impl IntoIterator<Item = PostAuthOrder>) {
    for record in records {
        MonitoringRepository::insert(store, record).expect("seed record");
    }
}

pub(super) fn fetch(store: &InMemoryStore, order_id: &str) -> PostAuthOrder {
    MonitoringRepository::fetch(store, &id(order_id))
        .expect("fetch")
        .expect("record present")
}

pub(super) fn build_scheduler(
    feed: Arc<dyn DisputeFeed>,
    records: Arc<dyn FulfillmentRecords>,
) -> (MemoryScheduler, Arc<InMemoryStore>, Arc<MemoryAlerts>) {
    let store = Arc::new(InMemoryStore::new());
    let alerts = Arc::new(MemoryAlerts::default());
    let evidence = EvidenceBuilder::new(store.clone(), store.clone(), records);
    let scheduler = MonitoringScheduler::new(
        store.clone(),
        feed,
        alerts.clone(),
        evidence,
        SweepSettings {
            concurrency: 4,
            feed_timeout: Duration::from_millis(200),
            fulfillment_timeout: Duration::from_millis(300),
        },
    );
    (scheduler, store, alerts)
}

pub(super) fn quiet_scheduler() -> (MemoryScheduler, Arc<InMemoryStore>, Arc<MemoryAlerts>) {
    build_scheduler(
        Arc::new(ScriptedFeed::default()),
        Arc::new(StaticFulfillment(bundle())),
    )
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

/// Feed returning each scripted dispute once; selected orders can be made to fail.
#[derive(Default)]
pub(super) struct ScriptedFeed {
    disputes: Mutex<HashMap<OrderId, DisputeEvent>>,
    failing: Mutex<HashSet<OrderId>>,
}

impl ScriptedFeed {
    pub(super) fn with_dispute(order_id: &str, event: DisputeEvent) -> Self {
        let feed = Self::default();
        feed.disputes
            .lock()
            .expect("feed mutex poisoned")
            .insert(id(order_id), event);
        feed
    }

    pub(super) fn set_failing(&self, order_id: &str, failing: bool) {
        let mut guard = self.failing.lock().expect("feed mutex poisoned");
        if failing {
            guard.insert(id(order_id));
        } else {
            guard.remove(&id(order_id));
        }
    }
}

#[async_trait]
impl DisputeFeed for ScriptedFeed {
    async fn poll(&self, order: &PostAuthOrder) -> Result<Option<DisputeEvent>, FeedError> {
        if self
            .failing
            .lock()
            .expect("feed mutex poisoned")
            .contains(&order.order_id)
        {
            return Err(FeedError::Unavailable("processor API 503".to_string()));
        }
        Ok(self
            .disputes
            .lock()
            .expect("feed mutex poisoned")
            .remove(&order.order_id))
    }
}

pub(super) struct SlowFeed(pub(super) Duration);

#[async_trait]
impl DisputeFeed for SlowFeed {
    async fn poll(&self, _order: &PostAuthOrder) -> Result<Option<DisputeEvent>, FeedError> {
        tokio::time::sleep(self.0).await;
        Ok(None)
    }
}

pub(super) struct StaticFulfillment(pub(super) FulfillmentBundle);

#[async_trait]
impl FulfillmentRecords for StaticFulfillment {
    async fn fetch(&self, _order_id: &OrderId) -> Result<FulfillmentBundle, FulfillmentError> {
        Ok(self.0.clone())
    }
}

/// Fulfillment system that accepts the request and never answers.
pub(super) struct StalledFulfillment;

#[async_trait]
impl FulfillmentRecords for StalledFulfillment {
    async fn fetch(&self, _order_id: &OrderId) -> Result<FulfillmentBundle, FulfillmentError> {
        std::future::pending().await
    }
}

/// Fulfillment system that is down until `recover` is called.
#[derive(Default)]
pub(super) struct FlakyFulfillment {
    healthy: AtomicBool,
}

impl FlakyFulfillment {
    pub(super) fn recover(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FulfillmentRecords for FlakyFulfillment {
    async fn fetch(&self, _order_id: &OrderId) -> Result<FulfillmentBundle, FulfillmentError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(bundle())
        } else {
            Err(FulfillmentError::Unavailable(
                "warehouse API timeout".to_string(),
            ))
        }
    }
}
