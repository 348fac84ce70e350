use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::alerts::{emit_quietly, AlertEmitter, AlertKind, RiskAlert};
use crate::locks::KeyedLocks;
use crate::monitoring::record::PostAuthOrder;
use crate::monitoring::repository::MonitoringRepository;
use crate::risk::decision::{Decision, RiskLevel};
use crate::risk::domain::{MerchantId, OrderContext, OrderId, ValidationError};
use crate::risk::engine::{RiskAssessment, RiskEngine};
use crate::risk::policy::ValidatedPolicy;
use crate::store::RepositoryError;

use super::order::{PreAuthOrder, PreAuthStatus, ReviewAction, TransitionError};
use super::repository::PreAuthRepository;

/// Result of linking an approved order to post-auth monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum MoveOutcome {
    Created(PostAuthOrder),
    AlreadyLinked(PostAuthOrder),
}

impl MoveOutcome {
    pub fn record(&self) -> &PostAuthOrder {
        match self {
            MoveOutcome::Created(record) | MoveOutcome::AlreadyLinked(record) => record,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("order {0} not found")]
    NotFound(OrderId),
    #[error("policy for merchant {policy} cannot score an order for merchant {merchant}")]
    PolicyMismatch {
        merchant: MerchantId,
        policy: MerchantId,
    },
    #[error("review window for order {order_id} elapsed at {expired_at}")]
    ReviewWindowElapsed {
        order_id: OrderId,
        expired_at: DateTime<Utc>,
    },
    #[error("reviewer is required")]
    MissingReviewer,
    #[error("pre-auth scan aborted: {0}")]
    Aborted(String),
}

/// Synchronous entry point ahead of payment capture.
pub struct PreAuthGate<P, M, A> {
    engine: Arc<RiskEngine>,
    orders: Arc<P>,
    monitoring: Arc<M>,
    alerts: Arc<A>,
    locks: Arc<KeyedLocks<OrderId>>,
}

impl<P, M, A> Clone for PreAuthGate<P, M, A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            orders: self.orders.clone(),
            monitoring: self.monitoring.clone(),
            alerts: self.alerts.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<P, M, A> PreAuthGate<P, M, A>
where
    P: PreAuthRepository + 'static,
    M: MonitoringRepository + 'static,
    A: AlertEmitter + 'static,
{
    pub fn new(
        engine: Arc<RiskEngine>,
        orders: Arc<P>,
        monitoring: Arc<M>,
        alerts: Arc<A>,
    ) -> Self {
        Self {
            engine,
            orders,
            monitoring,
            alerts,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Score an order and persist the outcome. Repeated calls for the same order id
    /// return the stored record unless it was declined or expired, in which case the
    /// order is scanned again and the new assessment appended to its log.
    pub async fn run_pre_auth_check(
        &self,
        ctx: OrderContext,
        policy: &ValidatedPolicy,
        now: DateTime<Utc>,
    ) -> Result<PreAuthOrder, GateError> {
        ctx.validate()?;
        if ctx.merchant_id != policy.merchant_id {
            return Err(GateError::PolicyMismatch {
                merchant: ctx.merchant_id.clone(),
                policy: policy.merchant_id.clone(),
            });
        }
        let order_id = ctx.order_id.clone().unwrap_or_else(OrderId::generate);

        // Detached so the scan still lands in the store if the caller goes away.
        let gate = self.clone();
        let policy = policy.clone();
        tokio::spawn(async move { gate.scan(order_id, ctx, policy, now).await })
            .await
            .map_err(|err| GateError::Aborted(err.to_string()))?
    }

    async fn scan(
        &self,
        order_id: OrderId,
        ctx: OrderContext,
        policy: ValidatedPolicy,
        now: DateTime<Utc>,
    ) -> Result<PreAuthOrder, GateError> {
        let _guard = self.locks.lock(&order_id).await;

        let existing = self.orders.fetch(&order_id)?;
        if let Some(order) = &existing {
            if !order.status.allows_rescan() {
                debug!(
                    order_id = %order_id,
                    status = order.status.label(),
                    "returning stored pre-auth record"
                );
                return Ok(order.clone());
            }
        }

        let assessment = self
            .engine
            .assess(order_id.clone(), &ctx, &policy, now)
            .await;
        let order = match existing {
            Some(mut order) => {
                order.rescan(&ctx, assessment.clone(), &policy, now)?;
                order
            }
            None => {
                let mut order = PreAuthOrder::open(&ctx, assessment.clone(), &policy, now);
                order.apply_assessment(now)?;
                order
            }
        };
        self.orders.record_scan(assessment, order.clone())?;

        info!(
            order_id = %order.order_id,
            merchant_id = %order.merchant_id,
            decision = order.assessment.decision.label(),
            score = order.assessment.composite_score,
            status = order.status.label(),
            "pre-auth check complete"
        );
        self.alert_if_risky(&order, now);
        Ok(order)
    }

    fn alert_if_risky(&self, order: &PreAuthOrder, now: DateTime<Utc>) {
        let assessment = &order.assessment;
        let kind = match (assessment.decision, assessment.risk_level) {
            (Decision::Decline, _) => AlertKind::OrderDeclined,
            (_, level) if level >= RiskLevel::High => AlertKind::HighRiskOrder,
            _ => return,
        };

        let mut details = BTreeMap::new();
        details.insert(
            "decision".to_string(),
            assessment.decision.label().to_string(),
        );
        details.insert(
            "risk_level".to_string(),
            assessment.risk_level.label().to_string(),
        );
        details.insert("score".to_string(), assessment.composite_score.to_string());
        details.insert("summary".to_string(), assessment.summary());
        emit_quietly(
            self.alerts.as_ref(),
            RiskAlert {
                kind,
                order_id: order.order_id.clone(),
                merchant_id: order.merchant_id.clone(),
                raised_at: now,
                details,
            },
        );
    }

    /// Manual decision on a pending order. Once the review window has elapsed the
    /// order is expired instead and the review is refused.
    pub async fn review(
        &self,
        order_id: &OrderId,
        action: ReviewAction,
        reviewer: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PreAuthOrder, GateError> {
        let reviewer = reviewer.trim();
        if reviewer.is_empty() {
            return Err(GateError::MissingReviewer);
        }

        let _guard = self.locks.lock(order_id).await;
        let mut order = self.load(order_id)?;

        if order.review_window_elapsed(now) {
            let expired_at = order.expires_at;
            order.transition(PreAuthStatus::Expired, now)?;
            self.orders.save(order)?;
            info!(order_id = %order_id, "review arrived after window; order expired");
            return Err(GateError::ReviewWindowElapsed {
                order_id: order_id.clone(),
                expired_at,
            });
        }

        order.record_review(action, reviewer, note, now)?;
        self.orders.save(order.clone())?;
        info!(
            order_id = %order_id,
            reviewer,
            status = order.status.label(),
            "manual review recorded"
        );
        Ok(order)
    }

    /// Expire every pending order whose review window has passed.
    pub async fn expire_stale_reviews(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderId>, GateError> {
        let mut expired = Vec::new();
        for candidate in self.orders.pending_review()? {
            if !candidate.review_window_elapsed(now) {
                continue;
            }
            let _guard = self.locks.lock(&candidate.order_id).await;
            let Some(mut order) = self.orders.fetch(&candidate.order_id)? else {
                continue;
            };
            if !order.review_window_elapsed(now) {
                continue;
            }
            order.transition(PreAuthStatus::Expired, now)?;
            self.orders.save(order)?;
            expired.push(candidate.order_id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "stale reviews expired");
        }
        Ok(expired)
    }

    /// Hand an approved order to post-auth monitoring. At most one monitoring
    /// record ever exists per order; repeat calls return it unchanged.
    pub async fn move_pre_auth_to_monitoring(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<MoveOutcome, GateError> {
        let _guard = self.locks.lock(order_id).await;
        let mut order = self.load(order_id)?;

        if order.status == PreAuthStatus::MovedToPostAuth {
            let existing = self
                .monitoring
                .fetch(order_id)?
                .ok_or(RepositoryError::NotFound)?;
            return Ok(MoveOutcome::AlreadyLinked(existing));
        }

        order.transition(PreAuthStatus::MovedToPostAuth, now)?;
        let outcome = match self
            .monitoring
            .insert(PostAuthOrder::from_pre_auth(&order, now))
        {
            Ok(record) => MoveOutcome::Created(record),
            // A previous attempt linked the order but did not finish updating it.
            Err(RepositoryError::Conflict) => {
                let existing = self
                    .monitoring
                    .fetch(order_id)?
                    .ok_or(RepositoryError::NotFound)?;
                MoveOutcome::AlreadyLinked(existing)
            }
            Err(err) => return Err(err.into()),
        };
        self.orders.save(order)?;

        info!(order_id = %order_id, "order moved to post-auth monitoring");
        Ok(outcome)
    }

    pub fn get(&self, order_id: &OrderId) -> Result<PreAuthOrder, GateError> {
        self.load(order_id)
    }

    /// Append-only assessment history, oldest first.
    pub fn assessments(&self, order_id: &OrderId) -> Result<Vec<RiskAssessment>, GateError> {
        let history = self.orders.assessments(order_id)?;
        if history.is_empty() {
            return Err(GateError::NotFound(order_id.clone()));
        }
        Ok(history)
    }

    fn load(&self, order_id: &OrderId) -> Result<PreAuthOrder, GateError> {
        self.orders
            .fetch(order_id)?
            .ok_or_else(|| GateError::NotFound(order_id.clone()))
    }
}
