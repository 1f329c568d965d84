//! Lecturer review workflow.
//!
//! Each reviewable item (the lecturer, every degree, every certificate) moves
//! PENDING -> APPROVED | REJECTED, and back to PENDING on refresh. Decisions are
//! mirrored to a [`DraftStore`] under per-lecturer keys so an unfinished review
//! survives a restart. Saving commits every decision in one batched call and
//! then clears the drafts.

use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shared::{
    domain::{CertificateId, DegreeId, Lecturer, LecturerId, ReviewStatus},
    protocol::{LecturerReviewBatch, ReviewDecision},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::store::{ListKind, PortalStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewTarget {
    Lecturer,
    Degree(DegreeId),
    Certificate(CertificateId),
}

impl fmt::Display for ReviewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewTarget::Lecturer => write!(f, "lecturer"),
            ReviewTarget::Degree(id) => write!(f, "degree {id}"),
            ReviewTarget::Certificate(id) => write!(f, "certificate {id}"),
        }
    }
}

/// Draft cache keys. The id is always the lecturer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftKey {
    Lecturer(LecturerId),
    Degrees(LecturerId),
    Certificates(LecturerId),
}

impl DraftKey {
    pub fn all_for(lecturer_id: LecturerId) -> [DraftKey; 3] {
        [
            DraftKey::Lecturer(lecturer_id),
            DraftKey::Degrees(lecturer_id),
            DraftKey::Certificates(lecturer_id),
        ]
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftKey::Lecturer(id) => write!(f, "Lecturer{id}"),
            DraftKey::Degrees(id) => write!(f, "Degrees{id}"),
            DraftKey::Certificates(id) => write!(f, "Certification{id}"),
        }
    }
}

/// String-keyed JSON cache for decisions not yet committed to the backend.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn store(&self, key: &str, value_json: &str) -> Result<()>;
    async fn remove(&self, keys: &[String]) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryDraftStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value_json: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value_json.to_string());
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl DraftStore for storage::Storage {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_draft(key).await?.map(|draft| draft.value_json))
    }

    async fn store(&self, key: &str, value_json: &str) -> Result<()> {
        self.put_draft(key, value_json).await
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        self.remove_drafts(keys).await.map(|_| ())
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("a note is required to reject {0}")]
    MissingRejectionNote(ReviewTarget),
    #[error("{0} is not part of this review")]
    UnknownTarget(ReviewTarget),
    #[error("cannot save review: {} item(s) still pending", .0.len())]
    Incomplete(Vec<ReviewTarget>),
    #[error("draft cache failure: {0:#}")]
    Drafts(anyhow::Error),
    #[error("failed to submit review: {0:#}")]
    Submit(anyhow::Error),
}

/// Review state for one lecturer, reconciled against the server copy.
pub struct LecturerReview {
    lecturer: ReviewDecision<LecturerId>,
    degrees: Vec<ReviewDecision<DegreeId>>,
    certificates: Vec<ReviewDecision<CertificateId>>,
    drafts: Arc<dyn DraftStore>,
}

impl LecturerReview {
    /// Builds the review from the server record plus any stored drafts.
    ///
    /// A stored draft wins over the server status for items that still exist
    /// on the server. Drafts for items the server no longer lists are dropped,
    /// and so are drafts that fail to parse.
    pub async fn open(
        lecturer: &Lecturer,
        drafts: Arc<dyn DraftStore>,
    ) -> Result<Self, ReviewError> {
        let lecturer_id = lecturer.id;

        let stored_lecturer: Option<ReviewDecision<LecturerId>> =
            load_json(drafts.as_ref(), DraftKey::Lecturer(lecturer_id)).await?;
        let stored_degrees: Vec<ReviewDecision<DegreeId>> =
            load_json(drafts.as_ref(), DraftKey::Degrees(lecturer_id))
                .await?
                .unwrap_or_default();
        let stored_certificates: Vec<ReviewDecision<CertificateId>> =
            load_json(drafts.as_ref(), DraftKey::Certificates(lecturer_id))
                .await?
                .unwrap_or_default();

        let server_lecturer = ReviewDecision {
            id: lecturer_id,
            status: lecturer.status,
            note: lecturer.admin_note.clone().unwrap_or_default(),
        };
        let lecturer_decision = match stored_lecturer {
            Some(draft) if draft.id == lecturer_id => draft,
            _ => server_lecturer,
        };

        let degrees = reconcile(
            lecturer.degrees.iter().map(|degree| ReviewDecision {
                id: degree.id,
                status: degree.status,
                note: degree.admin_note.clone().unwrap_or_default(),
            }),
            &stored_degrees,
        );
        let certificates = reconcile(
            lecturer.certificates.iter().map(|certificate| ReviewDecision {
                id: certificate.id,
                status: certificate.status,
                note: certificate.admin_note.clone().unwrap_or_default(),
            }),
            &stored_certificates,
        );

        let review = Self {
            lecturer: lecturer_decision,
            degrees,
            certificates,
            drafts,
        };

        let dropped_degrees = stored_degrees
            .iter()
            .any(|draft| !review.degrees.iter().any(|d| d.id == draft.id));
        let dropped_certificates = stored_certificates
            .iter()
            .any(|draft| !review.certificates.iter().any(|c| c.id == draft.id));
        if dropped_degrees {
            review.persist(DraftKey::Degrees(lecturer_id)).await?;
        }
        if dropped_certificates {
            review.persist(DraftKey::Certificates(lecturer_id)).await?;
        }

        Ok(review)
    }

    pub fn lecturer_id(&self) -> LecturerId {
        self.lecturer.id
    }

    pub fn targets(&self) -> Vec<ReviewTarget> {
        std::iter::once(ReviewTarget::Lecturer)
            .chain(self.degrees.iter().map(|d| ReviewTarget::Degree(d.id)))
            .chain(self.certificates.iter().map(|c| ReviewTarget::Certificate(c.id)))
            .collect()
    }

    pub fn status_of(&self, target: ReviewTarget) -> Option<ReviewStatus> {
        self.decision(target).map(|(status, _)| status)
    }

    pub fn note_of(&self, target: ReviewTarget) -> Option<&str> {
        self.decision(target).map(|(_, note)| note)
    }

    fn decision(&self, target: ReviewTarget) -> Option<(ReviewStatus, &str)> {
        match target {
            ReviewTarget::Lecturer => Some((self.lecturer.status, self.lecturer.note.as_str())),
            ReviewTarget::Degree(id) => self
                .degrees
                .iter()
                .find(|d| d.id == id)
                .map(|d| (d.status, d.note.as_str())),
            ReviewTarget::Certificate(id) => self
                .certificates
                .iter()
                .find(|c| c.id == id)
                .map(|c| (c.status, c.note.as_str())),
        }
    }

    pub async fn approve(&mut self, target: ReviewTarget, note: &str) -> Result<(), ReviewError> {
        self.set(target, ReviewStatus::Approved, note.trim()).await
    }

    pub async fn reject(&mut self, target: ReviewTarget, note: &str) -> Result<(), ReviewError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(ReviewError::MissingRejectionNote(target));
        }
        self.set(target, ReviewStatus::Rejected, note).await
    }

    /// Puts a single item back to PENDING, overwriting its stored draft.
    pub async fn refresh(&mut self, target: ReviewTarget) -> Result<(), ReviewError> {
        self.set(target, ReviewStatus::Pending, "").await
    }

    async fn set(
        &mut self,
        target: ReviewTarget,
        status: ReviewStatus,
        note: &str,
    ) -> Result<(), ReviewError> {
        let lecturer_id = self.lecturer.id;
        let key = match target {
            ReviewTarget::Lecturer => {
                self.lecturer.status = status;
                self.lecturer.note = note.to_string();
                DraftKey::Lecturer(lecturer_id)
            }
            ReviewTarget::Degree(id) => {
                let degree = self
                    .degrees
                    .iter_mut()
                    .find(|d| d.id == id)
                    .ok_or(ReviewError::UnknownTarget(target))?;
                degree.status = status;
                degree.note = note.to_string();
                DraftKey::Degrees(lecturer_id)
            }
            ReviewTarget::Certificate(id) => {
                let certificate = self
                    .certificates
                    .iter_mut()
                    .find(|c| c.id == id)
                    .ok_or(ReviewError::UnknownTarget(target))?;
                certificate.status = status;
                certificate.note = note.to_string();
                DraftKey::Certificates(lecturer_id)
            }
        };
        self.persist(key).await
    }

    async fn persist(&self, key: DraftKey) -> Result<(), ReviewError> {
        let value = match key {
            DraftKey::Lecturer(_) => serde_json::to_string(&self.lecturer),
            DraftKey::Degrees(_) => serde_json::to_string(&self.degrees),
            DraftKey::Certificates(_) => serde_json::to_string(&self.certificates),
        }
        .map_err(|err| ReviewError::Drafts(err.into()))?;
        self.drafts
            .store(&key.to_string(), &value)
            .await
            .map_err(ReviewError::Drafts)
    }

    pub fn pending_targets(&self) -> Vec<ReviewTarget> {
        self.targets()
            .into_iter()
            .filter(|target| {
                self.status_of(*target)
                    .is_some_and(|status| !status.is_terminal())
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.pending_targets().is_empty()
    }

    pub fn to_batch(&self, notify_by_email: bool) -> Result<LecturerReviewBatch, ReviewError> {
        let pending = self.pending_targets();
        if !pending.is_empty() {
            return Err(ReviewError::Incomplete(pending));
        }
        Ok(LecturerReviewBatch {
            lecturer: self.lecturer.clone(),
            degrees: self.degrees.clone(),
            certificates: self.certificates.clone(),
            notify_by_email,
        })
    }

    /// Commits every decision, clears the drafts and refreshes the lecturer
    /// list. Nothing is sent while any item is still pending.
    pub async fn save(
        &self,
        store: &PortalStore,
        notify_by_email: bool,
    ) -> Result<(), ReviewError> {
        let lecturer_id = self.lecturer.id;
        let batch = match self.to_batch(notify_by_email) {
            Ok(batch) => batch,
            Err(err) => {
                store.notify_error(err.to_string());
                return Err(err);
            }
        };

        if let Err(err) = store.api().submit_lecturer_review(lecturer_id, &batch).await {
            warn!("review: submit failed lecturer={lecturer_id}: {err:#}");
            store.notify_error(format!("failed to save review: {err}"));
            return Err(ReviewError::Submit(err));
        }
        info!(
            "review: saved lecturer={} degrees={} certificates={} notify={}",
            lecturer_id,
            batch.degrees.len(),
            batch.certificates.len(),
            notify_by_email
        );

        let keys: Vec<String> = DraftKey::all_for(lecturer_id)
            .iter()
            .map(ToString::to_string)
            .collect();
        // Committed by now; leftover drafts are reconciled on the next open.
        if let Err(err) = self.drafts.remove(&keys).await {
            warn!("review: failed to clear drafts lecturer={lecturer_id}: {err:#}");
        }

        if let Err(err) = store.refresh(ListKind::Lecturers).await {
            warn!("review: lecturer list refresh failed after save: {err:#}");
        }
        store.notify(format!("review saved for lecturer {lecturer_id}"));
        Ok(())
    }
}

async fn load_json<T: DeserializeOwned>(
    drafts: &dyn DraftStore,
    key: DraftKey,
) -> Result<Option<T>, ReviewError> {
    let key = key.to_string();
    let Some(raw) = drafts.load(&key).await.map_err(ReviewError::Drafts)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!("review: discarding unreadable draft {key}: {err}");
            drafts
                .remove(std::slice::from_ref(&key))
                .await
                .map_err(ReviewError::Drafts)?;
            Ok(None)
        }
    }
}

fn reconcile<Id: Copy + PartialEq>(
    server: impl Iterator<Item = ReviewDecision<Id>>,
    stored: &[ReviewDecision<Id>],
) -> Vec<ReviewDecision<Id>> {
    server
        .map(|from_server| {
            stored
                .iter()
                .find(|draft| draft.id == from_server.id)
                .cloned()
                .unwrap_or(from_server)
        })
        .collect()
}

/// Confirmation dialog state for a single approve/reject decision.
#[derive(Debug, Clone)]
pub struct ReviewNoteForm {
    pub target: ReviewTarget,
    pub status: ReviewStatus,
    pub note: String,
}

impl ReviewNoteForm {
    pub fn approve(target: ReviewTarget) -> Self {
        Self {
            target,
            status: ReviewStatus::Approved,
            note: String::new(),
        }
    }

    pub fn reject(target: ReviewTarget) -> Self {
        Self {
            target,
            status: ReviewStatus::Rejected,
            note: String::new(),
        }
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    pub fn can_confirm(&self) -> bool {
        self.status != ReviewStatus::Rejected || !self.note.trim().is_empty()
    }

    pub async fn confirm(self, review: &mut LecturerReview) -> Result<(), ReviewError> {
        match self.status {
            ReviewStatus::Approved => review.approve(self.target, &self.note).await,
            ReviewStatus::Rejected => review.reject(self.target, &self.note).await,
            ReviewStatus::Pending => review.refresh(self.target).await,
        }
    }
}

#[cfg(test)]
#[path = "tests/approval_tests.rs"]
mod tests;
