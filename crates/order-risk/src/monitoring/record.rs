use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::preauth::order::PreAuthOrder;
use crate::risk::domain::{MerchantId, OrderId};
use crate::risk::engine::AssessmentId;

use super::evidence::PackageId;

/// Length of the chargeback exposure window tracked after approval.
pub const MONITORING_WINDOW_DAYS: u16 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitoringStatus {
    UnderMonitoring,
    ChargebackFiled,
    Cleared,
}

impl MonitoringStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MonitoringStatus::UnderMonitoring => "under_monitoring",
            MonitoringStatus::ChargebackFiled => "chargeback_filed",
            MonitoringStatus::Cleared => "cleared",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, MonitoringStatus::UnderMonitoring)
    }
}

impl fmt::Display for MonitoringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dispute notification from the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeEvent {
    pub reason: String,
    pub amount_cents: u64,
    pub filed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chargeback {
    pub reason: String,
    pub amount_cents: u64,
    pub filed_at: DateTime<Utc>,
}

impl From<DisputeEvent> for Chargeback {
    fn from(event: DisputeEvent) -> Self {
        Self {
            reason: event.reason,
            amount_cents: event.amount_cents,
            filed_at: event.filed_at,
        }
    }
}

/// What one daily sweep did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SweepOutcome {
    Skipped,
    Advanced { days_monitored: u16 },
    Cleared,
    ChargebackFiled { days_monitored: u16 },
}

/// Approved order being watched for chargebacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAuthOrder {
    pub order_id: OrderId,
    pub merchant_id: MerchantId,
    pub amount_cents: u64,
    pub email: String,
    pub card_bin: Option<String>,
    pub ip_address: Option<String>,
    pub pre_auth_score: u8,
    pub pre_auth_assessment_id: AssessmentId,
    pub status: MonitoringStatus,
    pub days_monitored: u16,
    pub utc_offset_minutes: i32,
    pub last_swept_day: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chargeback: Option<Chargeback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evidence: Vec<PackageId>,
}

impl PostAuthOrder {
    pub fn from_pre_auth(order: &PreAuthOrder, now: DateTime<Utc>) -> Self {
        Self {
            order_id: order.order_id.clone(),
            merchant_id: order.merchant_id.clone(),
            amount_cents: order.order_amount_cents,
            email: order.customer_email.clone(),
            card_bin: order.card_bin.clone(),
            ip_address: order.ip_address.clone(),
            pre_auth_score: order.assessment.composite_score,
            pre_auth_assessment_id: order.assessment.assessment_id.clone(),
            status: MonitoringStatus::UnderMonitoring,
            days_monitored: 0,
            utc_offset_minutes: order.utc_offset_minutes,
            last_swept_day: None,
            created_at: now,
            last_checked_at: now,
            chargeback: None,
            cleared_at: None,
            evidence: Vec::new(),
        }
    }

    /// Calendar day at the merchant's location.
    pub fn local_day(&self, now: DateTime<Utc>) -> NaiveDate {
        local_day(now, self.utc_offset_minutes)
    }

    /// Apply one daily sweep for `day`. A record advances at most once per local day
    /// and never after reaching a terminal state.
    pub fn advance(
        &mut self,
        day: NaiveDate,
        dispute: Option<DisputeEvent>,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, RecordError> {
        if self.status.is_terminal() {
            return Err(RecordError::Terminal(self.status));
        }
        if let Some(last) = self.last_swept_day {
            if day <= last {
                return Err(RecordError::AlreadySwept(day));
            }
        }

        self.days_monitored = (self.days_monitored + 1).min(MONITORING_WINDOW_DAYS);
        self.last_swept_day = Some(day);
        self.last_checked_at = now;

        if let Some(event) = dispute {
            self.file_chargeback(event);
            return Ok(SweepOutcome::ChargebackFiled {
                days_monitored: self.days_monitored,
            });
        }

        if self.days_monitored >= MONITORING_WINDOW_DAYS {
            self.status = MonitoringStatus::Cleared;
            self.cleared_at = Some(now);
            return Ok(SweepOutcome::Cleared);
        }

        Ok(SweepOutcome::Advanced {
            days_monitored: self.days_monitored,
        })
    }

    /// Pushed dispute outside the daily sweep; the day counter is frozen where it is.
    pub fn record_dispute(
        &mut self,
        event: DisputeEvent,
        now: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        if self.status.is_terminal() {
            return Err(RecordError::Terminal(self.status));
        }
        self.last_checked_at = now;
        self.file_chargeback(event);
        Ok(())
    }

    pub fn link_evidence(&mut self, package_id: PackageId) {
        if !self.evidence.contains(&package_id) {
            self.evidence.push(package_id);
        }
    }

    fn file_chargeback(&mut self, event: DisputeEvent) {
        self.status = MonitoringStatus::ChargebackFiled;
        self.chargeback = Some(event.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("monitoring already finished with status {0}")]
    Terminal(MonitoringStatus),
    #[error("day {0} was already swept")]
    AlreadySwept(NaiveDate),
}

pub fn local_day(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    match FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}
