use crate::risk::domain::OrderId;
use crate::risk::engine::RiskAssessment;
use crate::store::RepositoryError;

use super::order::PreAuthOrder;

/// Storage for gate records plus the append-only assessment log.
pub trait PreAuthRepository: Send + Sync {
    /// Append the assessment and upsert the order as a single step.
    fn record_scan(
        &self,
        assessment: RiskAssessment,
        order: PreAuthOrder,
    ) -> Result<(), RepositoryError>;
    fn save(&self, order: PreAuthOrder) -> Result<(), RepositoryError>;
    fn fetch(&self, order_id: &OrderId) -> Result<Option<PreAuthOrder>, RepositoryError>;
    fn pending_review(&self) -> Result<Vec<PreAuthOrder>, RepositoryError>;
    /// Every assessment recorded for the order, oldest first.
    fn assessments(&self, order_id: &OrderId) -> Result<Vec<RiskAssessment>, RepositoryError>;
}
