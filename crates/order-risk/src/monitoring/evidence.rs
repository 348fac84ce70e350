use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::locks::KeyedLocks;
use crate::risk::domain::{MerchantId, OrderId};
use crate::store::RepositoryError;

use super::record::{Chargeback, MonitoringStatus, PostAuthOrder};
use super::repository::MonitoringRepository;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(pub String);

impl PackageId {
    pub fn generate() -> Self {
        Self(format!("evp-{}", uuid::Uuid::new_v4().simple()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Generating,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub order_id: OrderId,
    pub merchant_id: MerchantId,
    pub amount_cents: u64,
    pub email: String,
    pub card_bin: Option<String>,
    pub ip_address: Option<String>,
    pub pre_auth_score: u8,
    pub approved_at: DateTime<Utc>,
    pub chargeback: Option<Chargeback>,
}

impl TransactionDetails {
    fn from_record(record: &PostAuthOrder) -> Self {
        Self {
            order_id: record.order_id.clone(),
            merchant_id: record.merchant_id.clone(),
            amount_cents: record.amount_cents,
            email: record.email.clone(),
            card_bin: record.card_bin.clone(),
            ip_address: record.ip_address.clone(),
            pre_auth_score: record.pre_auth_score,
            approved_at: record.created_at,
            chargeback: record.chargeback.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfDelivery {
    pub carrier: String,
    pub tracking_number: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub signed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerMessage {
    pub sent_at: DateTime<Utc>,
    pub channel: String,
    pub direction: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsAcceptance {
    pub accepted_at: DateTime<Utc>,
    pub terms_version: String,
    pub ip_address: Option<String>,
}

/// Everything the fulfillment side knows about an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentBundle {
    pub proof_of_delivery: Option<ProofOfDelivery>,
    pub messages: Vec<CustomerMessage>,
    pub line_items: Vec<LineItem>,
    pub terms_acceptance: Option<TermsAcceptance>,
}

#[async_trait]
pub trait FulfillmentRecords: Send + Sync {
    async fn fetch(&self, order_id: &OrderId) -> Result<FulfillmentBundle, FulfillmentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FulfillmentError {
    #[error("fulfillment records unavailable: {0}")]
    Unavailable(String),
    #[error("no fulfillment records for order")]
    Missing,
    #[error("fulfillment lookup timed out after {0} ms")]
    Timeout(u64),
}

/// Dispute evidence for one chargeback. Write-once after completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub package_id: PackageId,
    pub order_id: OrderId,
    pub status: EvidenceStatus,
    pub transaction_details: TransactionDetails,
    pub proof_of_delivery: Option<ProofOfDelivery>,
    pub customer_communication: Vec<CustomerMessage>,
    pub product_details: Vec<LineItem>,
    pub terms_acceptance: Option<TermsAcceptance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct CommunicationRow<'a> {
    sent_at: String,
    channel: &'a str,
    direction: &'a str,
    summary: &'a str,
}

impl EvidencePackage {
    fn generating(record: &PostAuthOrder, now: DateTime<Utc>) -> Self {
        Self {
            package_id: PackageId::generate(),
            order_id: record.order_id.clone(),
            status: EvidenceStatus::Generating,
            transaction_details: TransactionDetails::from_record(record),
            proof_of_delivery: None,
            customer_communication: Vec::new(),
            product_details: Vec::new(),
            terms_acceptance: None,
            failure_reason: None,
            created_at: now,
            completed_at: None,
        }
    }

    fn complete(&mut self, bundle: FulfillmentBundle, now: DateTime<Utc>) {
        self.proof_of_delivery = bundle.proof_of_delivery;
        self.customer_communication = bundle.messages;
        self.product_details = bundle.line_items;
        self.terms_acceptance = bundle.terms_acceptance;
        self.status = EvidenceStatus::Completed;
        self.completed_at = Some(now);
    }

    fn fail(&mut self, reason: String) {
        self.status = EvidenceStatus::Failed;
        self.failure_reason = Some(reason);
    }

    pub fn to_json(&self) -> Result<String, EvidenceError> {
        serde_json::to_string_pretty(self).map_err(|err| EvidenceError::Export(err.to_string()))
    }

    /// Customer communication log as CSV, one row per message.
    pub fn communication_log_csv(&self) -> Result<String, EvidenceError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for message in &self.customer_communication {
            writer.serialize(CommunicationRow {
                sent_at: message.sent_at.to_rfc3339(),
                channel: &message.channel,
                direction: &message.direction,
                summary: &message.summary,
            })?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| EvidenceError::Export(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| EvidenceError::Export(err.to_string()))
    }
}

pub trait EvidenceRepository: Send + Sync {
    /// Upsert; overwriting a completed package fails with `Conflict`.
    fn save(&self, package: EvidencePackage) -> Result<(), RepositoryError>;
    fn fetch(&self, package_id: &PackageId) -> Result<Option<EvidencePackage>, RepositoryError>;
    fn for_order(&self, order_id: &OrderId) -> Result<Vec<EvidencePackage>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("order {0} is not monitored")]
    NotFound(OrderId),
    #[error("order {order_id} has no filed chargeback (status {status})")]
    NotDisputed {
        order_id: OrderId,
        status: MonitoringStatus,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("evidence export failed: {0}")]
    Export(String),
    #[error("evidence build aborted: {0}")]
    Aborted(String),
}

impl From<csv::Error> for EvidenceError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

pub const DEFAULT_FULFILLMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Assembles evidence packages from the monitored record and fulfillment data.
pub struct EvidenceBuilder<M, V> {
    orders: Arc<M>,
    packages: Arc<V>,
    records: Arc<dyn FulfillmentRecords>,
    locks: Arc<KeyedLocks<OrderId>>,
    fulfillment_timeout: Duration,
}

impl<M, V> Clone for EvidenceBuilder<M, V> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            packages: self.packages.clone(),
            records: self.records.clone(),
            locks: self.locks.clone(),
            fulfillment_timeout: self.fulfillment_timeout,
        }
    }
}

impl<M, V> EvidenceBuilder<M, V>
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
{
    pub fn new(orders: Arc<M>, packages: Arc<V>, records: Arc<dyn FulfillmentRecords>) -> Self {
        Self {
            orders,
            packages,
            records,
            locks: Arc::new(KeyedLocks::new()),
            fulfillment_timeout: DEFAULT_FULFILLMENT_TIMEOUT,
        }
    }

    /// Upper bound on one fulfillment lookup; an expired lookup fails the package.
    pub fn with_fulfillment_timeout(mut self, timeout: Duration) -> Self {
        self.fulfillment_timeout = timeout;
        self
    }

    /// Build (or return the already completed) package for a disputed order. A
    /// fulfillment failure yields a `Failed` package that a later call may rebuild;
    /// the order's status is never touched.
    pub async fn build(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<EvidencePackage, EvidenceError> {
        // Detached so a started package is always finalized, even if the caller goes away.
        let builder = self.clone();
        let order_id = order_id.clone();
        tokio::spawn(async move { builder.assemble(&order_id, now).await })
            .await
            .map_err(|err| EvidenceError::Aborted(err.to_string()))?
    }

    async fn assemble(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<EvidencePackage, EvidenceError> {
        let _guard = self.locks.lock(order_id).await;

        let record = self
            .orders
            .fetch(order_id)?
            .ok_or_else(|| EvidenceError::NotFound(order_id.clone()))?;
        if record.status != MonitoringStatus::ChargebackFiled {
            return Err(EvidenceError::NotDisputed {
                order_id: order_id.clone(),
                status: record.status,
            });
        }

        if let Some(existing) = self
            .packages
            .for_order(order_id)?
            .into_iter()
            .find(|package| package.status == EvidenceStatus::Completed)
        {
            return Ok(existing);
        }

        let mut package = EvidencePackage::generating(&record, now);
        self.packages.save(package.clone())?;
        let mut linked = record;
        linked.link_evidence(package.package_id.clone());
        self.orders.update(linked)?;

        match self.fetch_fulfillment(order_id).await {
            Ok(bundle) => {
                package.complete(bundle, now);
                info!(
                    order_id = %order_id,
                    package_id = %package.package_id.0,
                    "evidence package completed"
                );
            }
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "evidence generation failed");
                package.fail(err.to_string());
            }
        }
        self.packages.save(package.clone())?;
        Ok(package)
    }

    async fn fetch_fulfillment(
        &self,
        order_id: &OrderId,
    ) -> Result<FulfillmentBundle, FulfillmentError> {
        let timeout = self.fulfillment_timeout;
        match tokio::time::timeout(timeout, self.records.fetch(order_id)).await {
            Ok(result) => result,
            Err(_) => Err(FulfillmentError::Timeout(timeout.as_millis() as u64)),
        }
    }

    pub fn packages(&self, order_id: &OrderId) -> Result<Vec<EvidencePackage>, EvidenceError> {
        Ok(self.packages.for_order(order_id)?)
    }
}
