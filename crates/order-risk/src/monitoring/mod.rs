//! Post-auth monitoring: daily chargeback sweep over approved orders and dispute
//! evidence assembly.

pub mod evidence;
pub mod feed;
pub mod record;
pub mod repository;
pub mod router;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use evidence::{
    CustomerMessage, EvidenceBuilder, EvidenceError, EvidencePackage, EvidenceRepository,
    EvidenceStatus, FulfillmentBundle, FulfillmentError, FulfillmentRecords, LineItem, PackageId,
    ProofOfDelivery, TermsAcceptance, DEFAULT_FULFILLMENT_TIMEOUT,
};
pub use feed::{DisputeFeed, FeedError, NoDisputes};
pub use record::{
    local_day, Chargeback, DisputeEvent, MonitoringStatus, PostAuthOrder, RecordError,
    SweepOutcome, MONITORING_WINDOW_DAYS,
};
pub use repository::{MonitoringFilter, MonitoringRepository};
pub use router::monitoring_router;
pub use scheduler::{
    MonitoringError, MonitoringScheduler, SweepFailure, SweepReport, SweepSettings,
};
