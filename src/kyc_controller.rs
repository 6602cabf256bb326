//! KYC review and owner self-service
//!
//! Same shape as the booking controller: authorize, check the review rule,
//! call the API, refresh the local list.
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::api::{KycApi, Page, Pagination};
use crate::error::{LifecycleError, TransitionDenial};
use crate::inflight::InFlight;
use crate::journal::{Journal, SubjectKind, note_committed};
use crate::kyc::{KycDecision, KycFilter, KycPatch, KycRecord, KycStatus, check_review};
use crate::permission::Actor;
use crate::policy::{Action, authorize};
use crate::utils::is_blank;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub record: KycRecord,
    pub message: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Admin-side review queue.
pub struct KycReviewController<A> {
    api: A,
    filter: KycFilter,
    pagination: Pagination,
    list: Mutex<Page<KycRecord>>,
    in_flight: InFlight,
    journal: Option<Journal>,
}

impl<A: KycApi> KycReviewController<A> {
    pub fn new(api: A, filter: KycFilter, pagination: Pagination) -> Self {
        Self {
            api,
            filter,
            pagination,
            list: Mutex::new(Page::default()),
            in_flight: InFlight::new(),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn records(&self) -> Vec<KycRecord> {
        lock(&self.list).data.clone()
    }

    pub fn total(&self) -> u64 {
        lock(&self.list).total
    }

    pub fn record(&self, id: &str) -> Option<KycRecord> {
        lock(&self.list).data.iter().find(|r| r.id == id).cloned()
    }

    pub fn is_processing(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }

    #[tracing::instrument(skip(self, actor), fields(filter = ?self.filter, role = %actor.role))]
    pub async fn refresh(&self, actor: &Actor) -> Result<usize, LifecycleError> {
        authorize(actor, Action::ListKyc)?;

        let page = self
            .api
            .list_kyc(self.filter, self.pagination)
            .await
            .map_err(|e| {
                warn!(error = %e, "failed to load KYC records");
                LifecycleError::from(e)
            })?;
        let count = page.data.len();
        *lock(&self.list) = page;

        debug!(count, "KYC records loaded");
        Ok(count)
    }

    #[tracing::instrument(skip(self, actor, reason), fields(role = %actor.role))]
    pub async fn verify(
        &self,
        id: &str,
        decision: KycDecision,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<ReviewOutcome, LifecycleError> {
        authorize(actor, Action::VerifyKyc)?;

        let record = self
            .record(id)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        check_review(&record, decision, reason).inspect_err(|e| debug!(%e, "review refused"))?;

        let _guard = self
            .in_flight
            .try_acquire(id)
            .ok_or_else(|| LifecycleError::IllegalTransition {
                subject: format!("kyc {id}"),
                from: record.status.to_string(),
                to: decision.status().to_string(),
                reason: TransitionDenial::InFlight,
            })?;

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let ack = self
            .api
            .verify_kyc(id, decision, reason)
            .await
            .map_err(|e| {
                warn!(error = %e, "KYC decision rejected by server");
                LifecycleError::from(e)
            })?;

        let updated = self.reconcile(record.clone(), decision, reason).await;
        let message = ack
            .message
            .filter(|m| !is_blank(m))
            .unwrap_or_else(|| match decision {
                KycDecision::Approved => "KYC approved successfully".to_string(),
                KycDecision::Rejected => "KYC rejected".to_string(),
            });

        note_committed(
            self.journal.as_ref(),
            SubjectKind::Kyc,
            id,
            actor,
            &record.status.to_string(),
            &decision.status().to_string(),
            &message,
        );
        info!(decision = ?decision, "KYC review committed");

        Ok(ReviewOutcome {
            record: updated,
            message,
        })
    }

    pub async fn approve(&self, id: &str, actor: &Actor) -> Result<ReviewOutcome, LifecycleError> {
        self.verify(id, KycDecision::Approved, None, actor).await
    }

    pub async fn reject(&self, id: &str, reason: &str, actor: &Actor) -> Result<ReviewOutcome, LifecycleError> {
        self.verify(id, KycDecision::Rejected, Some(reason), actor).await
    }

    async fn reconcile(
        &self,
        mut previous: KycRecord,
        decision: KycDecision,
        reason: Option<&str>,
    ) -> KycRecord {
        previous.status = decision.status();
        previous.rejected_reason = match decision {
            KycDecision::Rejected => reason.map(str::to_string),
            KycDecision::Approved => None,
        };

        match self.api.list_kyc(self.filter, self.pagination).await {
            Ok(page) => {
                // a pending-only queue drops reviewed records, so fall back to our copy
                let updated = page.data.iter().find(|r| r.id == previous.id).cloned();
                *lock(&self.list) = page;
                updated.unwrap_or(previous)
            }
            Err(e) => {
                warn!(error = %e, "refetch after review failed, patching local copy");
                let mut list = lock(&self.list);
                if self.filter == KycFilter::Pending {
                    let before = list.data.len();
                    list.data.retain(|r| r.id != previous.id);
                    if list.data.len() < before {
                        list.total = list.total.saturating_sub(1);
                    }
                } else if let Some(slot) = list.data.iter_mut().find(|r| r.id == previous.id) {
                    *slot = previous.clone();
                }
                previous
            }
        }
    }
}

/// Owner-side view of their own KYC record.
pub struct KycSelfService<A> {
    api: A,
    cached: Mutex<Option<KycRecord>>,
}

impl<A: KycApi> KycSelfService<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cached: Mutex::new(None),
        }
    }

    pub fn cached(&self) -> Option<KycRecord> {
        lock(&self.cached).clone()
    }

    pub async fn load(&self, actor: &Actor) -> Result<Option<KycRecord>, LifecycleError> {
        authorize(actor, Action::ManageOwnKyc)?;
        let record = self.api.get_my_kyc().await?;
        *lock(&self.cached) = record.clone();
        Ok(record)
    }

    /// Submits owner edits. Refused locally once the record is approved.
    #[tracing::instrument(skip(self, actor, patch), fields(role = %actor.role))]
    pub async fn update(&self, actor: &Actor, patch: &KycPatch) -> Result<KycRecord, LifecycleError> {
        authorize(actor, Action::ManageOwnKyc)?;

        let current = self.cached();
        if let Some(current) = &current {
            if current.status == KycStatus::Approved {
                return Err(LifecycleError::IllegalTransition {
                    subject: format!("kyc {}", current.id),
                    from: current.status.to_string(),
                    to: "edited".into(),
                    reason: TransitionDenial::Terminal,
                });
            }
            // run the same rule the record enforces on itself
            current.clone().apply_patch(patch)?;
        } else {
            patch.validate()?;
        }

        let updated = self.api.update_kyc(patch).await.map_err(|e| {
            warn!(error = %e, "KYC update rejected by server");
            LifecycleError::from(e)
        })?;
        *lock(&self.cached) = Some(updated.clone());

        info!(status = %updated.status, "KYC details updated");
        Ok(updated)
    }
}
