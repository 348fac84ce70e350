use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::risk::domain::{MerchantId, OrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighRiskOrder,
    OrderDeclined,
    DisputeFiled,
}

/// Payload handed to the alert collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: AlertKind,
    pub order_id: OrderId,
    pub merchant_id: MerchantId,
    pub raised_at: DateTime<Utc>,
    pub details: BTreeMap<String, String>,
}

/// Outbound hook for high-risk and dispute notifications (e-mail, chat, case tools).
pub trait AlertEmitter: Send + Sync {
    fn emit(&self, alert: RiskAlert) -> Result<(), AlertError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert transport unavailable: {0}")]
    Transport(String),
}

/// Fire-and-forget: delivery failures are logged, never surfaced to the caller.
pub(crate) fn emit_quietly<A: AlertEmitter + ?Sized>(emitter: &A, alert: RiskAlert) {
    let order_id = alert.order_id.clone();
    let kind = alert.kind;
    if let Err(err) = emitter.emit(alert) {
        warn!(order_id = %order_id, ?kind, error = %err, "alert delivery failed");
    }
}

/// Emitter that writes alerts to the log stream; used when no transport is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerts;

impl AlertEmitter for LogAlerts {
    fn emit(&self, alert: RiskAlert) -> Result<(), AlertError> {
        warn!(
            order_id = %alert.order_id,
            merchant_id = %alert.merchant_id,
            kind = ?alert.kind,
            details = ?alert.details,
            "risk alert raised"
        );
        Ok(())
    }
}
