//! Repository error type and the in-memory store backing every repository trait.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::monitoring::evidence::{EvidencePackage, EvidenceRepository, EvidenceStatus, PackageId};
use crate::monitoring::record::PostAuthOrder;
use crate::monitoring::repository::{MonitoringFilter, MonitoringRepository};
use crate::preauth::order::{PreAuthOrder, PreAuthStatus};
use crate::preauth::repository::PreAuthRepository;
use crate::risk::domain::OrderId;
use crate::risk::engine::RiskAssessment;

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Default)]
struct StoreState {
    pre_auth: BTreeMap<OrderId, PreAuthOrder>,
    assessments: BTreeMap<OrderId, Vec<RiskAssessment>>,
    post_auth: BTreeMap<OrderId, PostAuthOrder>,
    sweep_ledger: HashSet<(OrderId, NaiveDate)>,
    evidence: Vec<EvidencePackage>,
}

/// Process-local store; every write happens under one mutex so compound writes are atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    /// Number of `(order, day)` keys in the sweep ledger.
    pub fn sweep_ledger_len(&self) -> Result<usize, RepositoryError> {
        Ok(self.state()?.sweep_ledger.len())
    }
}

impl PreAuthRepository for InMemoryStore {
    fn record_scan(
        &self,
        assessment: RiskAssessment,
        order: PreAuthOrder,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let log = state
            .assessments
            .entry(assessment.order_id.clone())
            .or_default();
        if log
            .iter()
            .any(|existing| existing.assessment_id == assessment.assessment_id)
        {
            return Err(RepositoryError::Conflict);
        }
        log.push(assessment);
        state.pre_auth.insert(order.order_id.clone(), order);
        Ok(())
    }

    fn save(&self, order: PreAuthOrder) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        state.pre_auth.insert(order.order_id.clone(), order);
        Ok(())
    }

    fn fetch(&self, order_id: &OrderId) -> Result<Option<PreAuthOrder>, RepositoryError> {
        Ok(self.state()?.pre_auth.get(order_id).cloned())
    }

    fn pending_review(&self) -> Result<Vec<PreAuthOrder>, RepositoryError> {
        let state = self.state()?;
        let mut pending: Vec<PreAuthOrder> = state
            .pre_auth
            .values()
            .filter(|order| order.status == PreAuthStatus::PendingReview)
            .cloned()
            .collect();
        pending.sort_by_key(|order| order.created_at);
        Ok(pending)
    }

    fn assessments(&self, order_id: &OrderId) -> Result<Vec<RiskAssessment>, RepositoryError> {
        Ok(self
            .state()?
            .assessments
            .get(order_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl MonitoringRepository for InMemoryStore {
    fn insert(&self, record: PostAuthOrder) -> Result<PostAuthOrder, RepositoryError> {
        let mut state = self.state()?;
        if state.post_auth.contains_key(&record.order_id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .post_auth
            .insert(record.order_id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: PostAuthOrder) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.post_auth.get_mut(&record.order_id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, order_id: &OrderId) -> Result<Option<PostAuthOrder>, RepositoryError> {
        Ok(self.state()?.post_auth.get(order_id).cloned())
    }

    fn list(&self, filter: &MonitoringFilter) -> Result<Vec<PostAuthOrder>, RepositoryError> {
        Ok(self
            .state()?
            .post_auth
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn is_swept(&self, order_id: &OrderId, day: NaiveDate) -> Result<bool, RepositoryError> {
        Ok(self
            .state()?
            .sweep_ledger
            .contains(&(order_id.clone(), day)))
    }

    fn apply_sweep(&self, record: PostAuthOrder, day: NaiveDate) -> Result<bool, RepositoryError> {
        let mut state = self.state()?;
        if !state.post_auth.contains_key(&record.order_id) {
            return Err(RepositoryError::NotFound);
        }
        if !state.sweep_ledger.insert((record.order_id.clone(), day)) {
            return Ok(false);
        }
        state.post_auth.insert(record.order_id.clone(), record);
        Ok(true)
    }
}

impl EvidenceRepository for InMemoryStore {
    fn save(&self, package: EvidencePackage) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let position = state
            .evidence
            .iter()
            .position(|existing| existing.package_id == package.package_id);
        match position {
            Some(index) if state.evidence[index].status == EvidenceStatus::Completed => {
                Err(RepositoryError::Conflict)
            }
            Some(index) => {
                state.evidence[index] = package;
                Ok(())
            }
            None => {
                state.evidence.push(package);
                Ok(())
            }
        }
    }

    fn fetch(&self, package_id: &PackageId) -> Result<Option<EvidencePackage>, RepositoryError> {
        Ok(self
            .state()?
            .evidence
            .iter()
            .find(|package| &package.package_id == package_id)
            .cloned())
    }

    fn for_order(&self, order_id: &OrderId) -> Result<Vec<EvidencePackage>, RepositoryError> {
        Ok(self
            .state()?
            .evidence
            .iter()
            .filter(|package| &package.order_id == order_id)
            .cloned()
            .collect())
    }
}
