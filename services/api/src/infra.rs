use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use order_risk::alerts::LogAlerts;
use order_risk::config::PipelineConfig;
use order_risk::error::AppError;
use order_risk::monitoring::{
    DisputeFeed, EvidenceBuilder, FulfillmentBundle, FulfillmentError, FulfillmentRecords,
    MonitoringError, MonitoringScheduler, NoDisputes, SweepReport, SweepSettings,
};
use order_risk::preauth::{GateError, PreAuthGate};
use order_risk::risk::{OrderId, PolicyError, PolicyRegistry, RiskEngine};
use order_risk::store::InMemoryStore;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

pub(crate) type ServiceGate = PreAuthGate<InMemoryStore, InMemoryStore, LogAlerts>;
pub(crate) type ServiceScheduler = MonitoringScheduler<InMemoryStore, InMemoryStore, LogAlerts>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Gate, scheduler, and policies sharing one store.
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) gate: ServiceGate,
    pub(crate) scheduler: Arc<ServiceScheduler>,
    pub(crate) policies: Arc<PolicyRegistry>,
    pub(crate) store: Arc<InMemoryStore>,
}

/// External collaborators a pipeline is wired to.
pub(crate) struct Collaborators {
    pub(crate) engine: RiskEngine,
    pub(crate) feed: Arc<dyn DisputeFeed>,
    pub(crate) fulfillment: Arc<dyn FulfillmentRecords>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            engine: RiskEngine::local_only(),
            feed: Arc::new(NoDisputes),
            fulfillment: Arc::new(UnconfiguredFulfillment),
        }
    }
}

impl Pipeline {
    pub(crate) fn assemble(
        policies: PolicyRegistry,
        collaborators: Collaborators,
        settings: SweepSettings,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let alerts = Arc::new(LogAlerts);
        let gate = PreAuthGate::new(
            Arc::new(collaborators.engine),
            store.clone(),
            store.clone(),
            alerts.clone(),
        );
        let evidence =
            EvidenceBuilder::new(store.clone(), store.clone(), collaborators.fulfillment);
        let scheduler = Arc::new(MonitoringScheduler::new(
            store.clone(),
            collaborators.feed,
            alerts,
            evidence,
            settings,
        ));

        Self {
            gate,
            scheduler,
            policies: Arc::new(policies),
            store,
        }
    }

    /// Pipeline for the HTTP service. No bureau, dispute feed, or fulfillment
    /// system is wired in yet, so disputes arrive only through the push endpoint.
    pub(crate) fn from_config(config: &PipelineConfig) -> Result<Self, AppError> {
        let policies = load_policies(config)?;
        info!(merchants = policies.len(), "merchant policies loaded");
        Ok(Self::assemble(
            policies,
            Collaborators::default(),
            SweepSettings::from(config),
        ))
    }

    /// Scheduled maintenance: expire stale reviews, then sweep monitored orders.
    pub(crate) async fn run_daily(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        daily_maintenance(
            self.gate.expire_stale_reviews(now),
            self.scheduler.sweep(now),
        )
        .await
    }
}

/// An expiry failure is logged and never skips the sweep.
async fn daily_maintenance<E, S>(expiry: E, sweep: S) -> Result<SweepReport, AppError>
where
    E: Future<Output = Result<Vec<OrderId>, GateError>>,
    S: Future<Output = Result<SweepReport, MonitoringError>>,
{
    let expired = match expiry.await {
        Ok(expired) => expired.len(),
        Err(err) => {
            error!(%err, "review expiry failed; sweeping anyway");
            0
        }
    };
    let report = sweep.await?;
    info!(
        expired,
        examined = report.examined,
        advanced = report.advanced,
        cleared = report.cleared,
        chargebacks = report.chargebacks,
        failures = report.failures.len(),
        "scheduled maintenance finished"
    );
    Ok(report)
}

pub(crate) fn load_policies(config: &PipelineConfig) -> Result<PolicyRegistry, PolicyError> {
    match &config.policy_path {
        Some(path) => PolicyRegistry::load(path),
        None => PolicyRegistry::with_defaults(),
    }
}

/// Stand-in until a fulfillment system is connected; every build yields a failed
/// package that can be rebuilt later.
pub(crate) struct UnconfiguredFulfillment;

#[async_trait]
impl FulfillmentRecords for UnconfiguredFulfillment {
    async fn fetch(&self, _order_id: &OrderId) -> Result<FulfillmentBundle, FulfillmentError> {
        Err(FulfillmentError::Unavailable(
            "no fulfillment system configured".to_string(),
        ))
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
