use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alerts::{emit_quietly, AlertEmitter, AlertKind, RiskAlert};
use crate::config::PipelineConfig;
use crate::locks::KeyedLocks;
use crate::risk::decision::format_cents;
use crate::risk::domain::OrderId;
use crate::store::RepositoryError;

use super::evidence::{
    EvidenceBuilder, EvidenceError, EvidencePackage, EvidenceRepository, EvidenceStatus,
    DEFAULT_FULFILLMENT_TIMEOUT,
};
use super::feed::{DisputeFeed, FeedError};
use super::record::{DisputeEvent, MonitoringStatus, PostAuthOrder, RecordError, SweepOutcome};
use super::repository::{MonitoringFilter, MonitoringRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    pub concurrency: usize,
    pub feed_timeout: Duration,
    pub fulfillment_timeout: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            feed_timeout: Duration::from_secs(5),
            fulfillment_timeout: DEFAULT_FULFILLMENT_TIMEOUT,
        }
    }
}

impl From<&PipelineConfig> for SweepSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.sweep_concurrency.max(1),
            feed_timeout: config.feed_timeout,
            fulfillment_timeout: config.fulfillment_timeout,
        }
    }
}

/// Per-order sweep failure; the order is retried on the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("sweep of {order_id} failed: {reason}")]
pub struct SweepFailure {
    pub order_id: OrderId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub swept_at: DateTime<Utc>,
    pub examined: usize,
    pub advanced: usize,
    pub cleared: usize,
    pub chargebacks: usize,
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(swept_at: DateTime<Utc>, examined: usize) -> Self {
        Self {
            swept_at,
            examined,
            advanced: 0,
            cleared: 0,
            chargebacks: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    fn tally(&mut self, outcome: SweepOutcome) {
        match outcome {
            SweepOutcome::Skipped => self.skipped += 1,
            SweepOutcome::Advanced { .. } => self.advanced += 1,
            SweepOutcome::Cleared => self.cleared += 1,
            SweepOutcome::ChargebackFiled { .. } => self.chargebacks += 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("order {0} is not monitored")]
    NotFound(OrderId),
    #[error("order {order_id}: {source}")]
    Record {
        order_id: OrderId,
        source: RecordError,
    },
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Daily chargeback watch over approved orders.
pub struct MonitoringScheduler<M, V, A> {
    repository: Arc<M>,
    feed: Arc<dyn DisputeFeed>,
    alerts: Arc<A>,
    evidence: EvidenceBuilder<M, V>,
    locks: Arc<KeyedLocks<OrderId>>,
    settings: SweepSettings,
}

impl<M, V, A> MonitoringScheduler<M, V, A>
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
    A: AlertEmitter + 'static,
{
    pub fn new(
        repository: Arc<M>,
        feed: Arc<dyn DisputeFeed>,
        alerts: Arc<A>,
        evidence: EvidenceBuilder<M, V>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            repository,
            feed,
            alerts,
            evidence: evidence.with_fulfillment_timeout(settings.fulfillment_timeout),
            locks: Arc::new(KeyedLocks::new()),
            settings,
        }
    }

    /// Advance every monitored order by one merchant-local day. Safe to run any
    /// number of times per day; only the first run for a given day advances a record.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, MonitoringError> {
        let candidates = self.repository.list(&MonitoringFilter {
            status: Some(MonitoringStatus::UnderMonitoring),
            merchant_id: None,
        })?;
        let mut report = SweepReport::new(now, candidates.len());

        let mut outcomes = stream::iter(candidates)
            .map(|record| async move {
                let result = self.sweep_order(&record.order_id, now).await;
                (record.order_id, result)
            })
            .buffer_unordered(self.settings.concurrency.max(1));

        while let Some((order_id, result)) = outcomes.next().await {
            match result {
                Ok(outcome) => report.tally(outcome),
                Err(err) => {
                    warn!(order_id = %order_id, error = %err, "monitoring sweep failed for order");
                    report.failures.push(SweepFailure {
                        order_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            examined = report.examined,
            advanced = report.advanced,
            cleared = report.cleared,
            chargebacks = report.chargebacks,
            failures = report.failures.len(),
            "monitoring sweep finished"
        );
        Ok(report)
    }

    async fn sweep_order(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, MonitoringError> {
        let guard = self.locks.lock(order_id).await;

        let Some(record) = self.repository.fetch(order_id)? else {
            return Ok(SweepOutcome::Skipped);
        };
        if record.status.is_terminal() {
            return Ok(SweepOutcome::Skipped);
        }
        let day = record.local_day(now);
        if record.last_swept_day.is_some_and(|last| last >= day)
            || self.repository.is_swept(order_id, day)?
        {
            debug!(order_id = %order_id, %day, "day already swept");
            return Ok(SweepOutcome::Skipped);
        }

        let dispute = self.poll_feed(&record).await?;

        let mut next = record;
        let outcome =
            next.advance(day, dispute, now)
                .map_err(|source| MonitoringError::Record {
                    order_id: order_id.clone(),
                    source,
                })?;
        if !self.repository.apply_sweep(next.clone(), day)? {
            return Ok(SweepOutcome::Skipped);
        }
        drop(guard);

        debug!(order_id = %order_id, %day, days = next.days_monitored, ?outcome, "order swept");
        match outcome {
            SweepOutcome::ChargebackFiled { .. } => self.on_dispute(&next, now).await,
            SweepOutcome::Cleared => {
                info!(order_id = %order_id, "monitoring window closed without dispute")
            }
            _ => {}
        }
        Ok(outcome)
    }

    async fn poll_feed(&self, record: &PostAuthOrder) -> Result<Option<DisputeEvent>, FeedError> {
        let timeout = self.settings.feed_timeout;
        match tokio::time::timeout(timeout, self.feed.poll(record)).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Record a dispute pushed by the processor outside the daily sweep.
    pub async fn report_dispute(
        &self,
        order_id: &OrderId,
        event: DisputeEvent,
        now: DateTime<Utc>,
    ) -> Result<PostAuthOrder, MonitoringError> {
        let guard = self.locks.lock(order_id).await;
        let mut record = self
            .repository
            .fetch(order_id)?
            .ok_or_else(|| MonitoringError::NotFound(order_id.clone()))?;
        record
            .record_dispute(event, now)
            .map_err(|source| MonitoringError::Record {
                order_id: order_id.clone(),
                source,
            })?;
        self.repository.update(record.clone())?;
        drop(guard);

        self.on_dispute(&record, now).await;
        Ok(self.repository.fetch(order_id)?.unwrap_or(record))
    }

    pub fn get_monitored_orders(
        &self,
        filter: &MonitoringFilter,
    ) -> Result<Vec<PostAuthOrder>, MonitoringError> {
        Ok(self.repository.list(filter)?)
    }

    pub async fn build_evidence(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<EvidencePackage, EvidenceError> {
        self.evidence.build(order_id, now).await
    }

    pub fn evidence_packages(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<EvidencePackage>, EvidenceError> {
        self.evidence.packages(order_id)
    }

    /// Alert and evidence generation are both best effort. The build is bounded by
    /// the fulfillment timeout, so a stalled fulfillment system cannot hold up a sweep.
    async fn on_dispute(&self, record: &PostAuthOrder, now: DateTime<Utc>) {
        let mut details = BTreeMap::new();
        details.insert(
            "days_monitored".to_string(),
            record.days_monitored.to_string(),
        );
        if let Some(chargeback) = &record.chargeback {
            details.insert("reason".to_string(), chargeback.reason.clone());
            details.insert("amount".to_string(), format_cents(chargeback.amount_cents));
        }
        emit_quietly(
            self.alerts.as_ref(),
            RiskAlert {
                kind: AlertKind::DisputeFiled,
                order_id: record.order_id.clone(),
                merchant_id: record.merchant_id.clone(),
                raised_at: now,
                details,
            },
        );

        match self.evidence.build(&record.order_id, now).await {
            Ok(package) if package.status == EvidenceStatus::Failed => {
                warn!(order_id = %record.order_id, "evidence package failed; rebuild on request")
            }
            Ok(_) => {}
            Err(err) => warn!(order_id = %record.order_id, error = %err, "evidence build skipped"),
        }
    }
}
