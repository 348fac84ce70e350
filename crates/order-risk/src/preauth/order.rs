use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::decision::Decision;
use crate::risk::domain::{MerchantId, OrderContext, OrderId};
use crate::risk::engine::RiskAssessment;
use crate::risk::policy::MerchantPolicy;

/// Lifecycle of an order before payment capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreAuthStatus {
    Created,
    AutoApproved,
    AutoDeclined,
    PendingReview,
    ManualApproved,
    ManualDeclined,
    Expired,
    MovedToPostAuth,
}

impl PreAuthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PreAuthStatus::Created => "created",
            PreAuthStatus::AutoApproved => "auto_approved",
            PreAuthStatus::AutoDeclined => "auto_declined",
            PreAuthStatus::PendingReview => "pending_review",
            PreAuthStatus::ManualApproved => "manual_approved",
            PreAuthStatus::ManualDeclined => "manual_declined",
            PreAuthStatus::Expired => "expired",
            PreAuthStatus::MovedToPostAuth => "moved_to_post_auth",
        }
    }

    /// Whether `self -> next` is a legal step. Declined and expired orders may be
    /// reopened for a fresh scan.
    pub fn can_transition_to(self, next: PreAuthStatus) -> bool {
        use PreAuthStatus::*;
        matches!(
            (self, next),
            (Created, AutoApproved | AutoDeclined | PendingReview)
                | (PendingReview, ManualApproved | ManualDeclined | Expired)
                | (AutoApproved | ManualApproved, MovedToPostAuth)
                | (AutoDeclined | ManualDeclined | Expired, Created)
        )
    }

    pub fn is_approved(self) -> bool {
        matches!(
            self,
            PreAuthStatus::AutoApproved | PreAuthStatus::ManualApproved
        )
    }

    /// Only refused or lapsed orders are scanned again; everything else is returned as-is.
    pub fn allows_rescan(self) -> bool {
        matches!(
            self,
            PreAuthStatus::AutoDeclined | PreAuthStatus::ManualDeclined | PreAuthStatus::Expired
        )
    }
}

impl fmt::Display for PreAuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Illegal lifecycle step; the record is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("order {order_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub order_id: OrderId,
    pub from: PreAuthStatus,
    pub to: PreAuthStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Decline,
}

impl ReviewAction {
    fn target(self) -> PreAuthStatus {
        match self {
            ReviewAction::Approve => PreAuthStatus::ManualApproved,
            ReviewAction::Decline => PreAuthStatus::ManualDeclined,
        }
    }
}

/// Gate record for one order, carrying the assessment that produced its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAuthOrder {
    pub order_id: OrderId,
    pub merchant_id: MerchantId,
    pub customer_email: String,
    pub order_amount_cents: u64,
    pub card_bin: Option<String>,
    pub ip_address: Option<String>,
    pub utc_offset_minutes: i32,
    pub assessment: RiskAssessment,
    pub status: PreAuthStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_at: Option<DateTime<Utc>>,
}

impl PreAuthOrder {
    /// Fresh record in `Created`, with the review window starting at `now`.
    pub fn open(
        ctx: &OrderContext,
        assessment: RiskAssessment,
        policy: &MerchantPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: assessment.order_id.clone(),
            merchant_id: ctx.merchant_id.clone(),
            customer_email: ctx.customer_email.trim().to_string(),
            order_amount_cents: ctx.order_amount_cents,
            card_bin: ctx.card_bin.clone(),
            ip_address: ctx.ip_address.clone(),
            utc_offset_minutes: policy.utc_offset_minutes,
            assessment,
            status: PreAuthStatus::Created,
            created_at: now,
            expires_at: review_deadline(now, policy),
            reviewed_by: None,
            review_note: None,
            decided_at: None,
            moved_at: None,
        }
    }

    pub fn transition(
        &mut self,
        next: PreAuthStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                order_id: self.order_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            PreAuthStatus::MovedToPostAuth => self.moved_at = Some(now),
            PreAuthStatus::Created => {}
            _ => self.decided_at = Some(now),
        }
        Ok(())
    }

    /// Move out of `Created` according to the embedded assessment.
    pub fn apply_assessment(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        let next = match self.assessment.decision {
            Decision::Approve => PreAuthStatus::AutoApproved,
            Decision::Decline => PreAuthStatus::AutoDeclined,
            Decision::Review => PreAuthStatus::PendingReview,
        };
        self.transition(next, now)
    }

    /// Reopen a declined or expired order with a newer assessment.
    pub fn rescan(
        &mut self,
        ctx: &OrderContext,
        assessment: RiskAssessment,
        policy: &MerchantPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(PreAuthStatus::Created, now)?;
        self.customer_email = ctx.customer_email.trim().to_string();
        self.order_amount_cents = ctx.order_amount_cents;
        self.card_bin = ctx.card_bin.clone();
        self.ip_address = ctx.ip_address.clone();
        self.utc_offset_minutes = policy.utc_offset_minutes;
        self.assessment = assessment;
        self.expires_at = review_deadline(now, policy);
        self.reviewed_by = None;
        self.review_note = None;
        self.decided_at = None;
        self.apply_assessment(now)
    }

    pub fn record_review(
        &mut self,
        action: ReviewAction,
        reviewer: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(action.target(), now)?;
        self.reviewed_by = Some(reviewer.to_string());
        self.review_note = note;
        Ok(())
    }

    pub fn review_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == PreAuthStatus::PendingReview && now > self.expires_at
    }
}

fn review_deadline(now: DateTime<Utc>, policy: &MerchantPolicy) -> DateTime<Utc> {
    now + Duration::hours(i64::from(policy.review_expiry_hours))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    pub reviewer: String,
    #[serde(default)]
    pub note: Option<String>,
}
