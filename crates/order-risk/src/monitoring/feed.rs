use async_trait::async_trait;

use super::record::{DisputeEvent, PostAuthOrder};

/// Source of dispute notifications polled during the daily sweep.
#[async_trait]
pub trait DisputeFeed: Send + Sync {
    async fn poll(&self, order: &PostAuthOrder) -> Result<Option<DisputeEvent>, FeedError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("dispute feed timed out after {0}ms")]
    Timeout(u64),
    #[error("dispute feed unavailable: {0}")]
    Unavailable(String),
}

/// Feed for deployments where disputes only arrive through `report_dispute`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDisputes;

#[async_trait]
impl DisputeFeed for NoDisputes {
    async fn poll(&self, _order: &PostAuthOrder) -> Result<Option<DisputeEvent>, FeedError> {
        Ok(None)
    }
}
