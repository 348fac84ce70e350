use chrono::NaiveDate;
use serde::Deserialize;

use crate::risk::domain::{MerchantId, OrderId};
use crate::store::RepositoryError;

use super::record::{MonitoringStatus, PostAuthOrder};

/// Query for `get_monitored_orders`; empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MonitoringFilter {
    #[serde(default)]
    pub status: Option<MonitoringStatus>,
    #[serde(default)]
    pub merchant_id: Option<MerchantId>,
}

impl MonitoringFilter {
    pub fn matches(&self, record: &PostAuthOrder) -> bool {
        self.status.map_or(true, |status| record.status == status)
            && self
                .merchant_id
                .as_ref()
                .map_or(true, |merchant| &record.merchant_id == merchant)
    }
}

/// Storage for post-auth records and the `(order, local day)` sweep ledger.
pub trait MonitoringRepository: Send + Sync {
    /// Fails with `Conflict` when a record already exists for the order.
    fn insert(&self, record: PostAuthOrder) -> Result<PostAuthOrder, RepositoryError>;
    fn update(&self, record: PostAuthOrder) -> Result<(), RepositoryError>;
    fn fetch(&self, order_id: &OrderId) -> Result<Option<PostAuthOrder>, RepositoryError>;
    fn list(&self, filter: &MonitoringFilter) -> Result<Vec<PostAuthOrder>, RepositoryError>;
    fn is_swept(&self, order_id: &OrderId, day: NaiveDate) -> Result<bool, RepositoryError>;
    /// Record the ledger key and the advanced record together. Returns `false` and
    /// writes nothing when the key is already present.
    fn apply_sweep(&self, record: PostAuthOrder, day: NaiveDate) -> Result<bool, RepositoryError>;
}
