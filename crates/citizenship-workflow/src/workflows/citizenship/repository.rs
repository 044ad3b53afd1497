use chrono::{DateTime, Utc};

use super::domain::{
    Actor, ApplicationCategory, ApplicationId, ApplicationRecord, ApplicationStatus,
    BiometricEvidence, DecisionRecord, DocumentEvidence, NewHistoryEntry, PaymentEvidence,
    UserId, WorkflowHistoryEntry,
};

/// Storage abstraction so the engine can be exercised in isolation.
///
/// All writes go through a [`WorkflowTransaction`]; the plain reads here serve views and
/// may observe any committed state.
pub trait ApplicationRepository: Send + Sync {
    fn begin(&self) -> Result<Box<dyn WorkflowTransaction + '_>, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Entries for one application in the order they were appended.
    fn history(&self, id: &ApplicationId) -> Result<Vec<WorkflowHistoryEntry>, RepositoryError>;
    /// Applications matching `query`, newest first, plus the unpaged match count.
    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError>;
}

/// Read-side filter over applications. Only rows visible to `viewer` match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationQuery {
    pub viewer: Actor,
    pub status: Option<ApplicationStatus>,
    pub category: Option<ApplicationCategory>,
    pub offset: usize,
    pub limit: usize,
}

impl ApplicationQuery {
    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        record.is_visible_to(&self.viewer)
            && self.status.map_or(true, |status| record.status == status)
            && self
                .category
                .map_or(true, |category| record.category == category)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationPage {
    pub records: Vec<ApplicationRecord>,
    pub total: usize,
}

/// Unit of work spanning the status read, prerequisite reads, and the paired
/// status-update/history-append writes. Dropping without `commit` discards every write.
pub trait WorkflowTransaction {
    fn find_application_by_id(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;

    fn count_verified_documents(&mut self, id: &ApplicationId) -> Result<usize, RepositoryError>;

    fn count_verified_biometrics(&mut self, applicant: &UserId) -> Result<usize, RepositoryError>;

    fn count_completed_payments(&mut self, id: &ApplicationId) -> Result<usize, RepositoryError>;

    /// Applications of `category` created during calendar `year`.
    fn count_applications(
        &mut self,
        category: ApplicationCategory,
        year: i32,
    ) -> Result<usize, RepositoryError>;

    fn insert_application(
        &mut self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError>;

    /// Conditional write: fails with [`RepositoryError::StatusMismatch`] unless the stored
    /// status still equals `update.expected_status`.
    fn update_application_status(
        &mut self,
        update: &StatusUpdate,
    ) -> Result<ApplicationRecord, RepositoryError>;

    fn append_workflow_history(
        &mut self,
        entry: NewHistoryEntry,
    ) -> Result<WorkflowHistoryEntry, RepositoryError>;

    fn record_decision(
        &mut self,
        id: &ApplicationId,
        decision: &DecisionRecord,
    ) -> Result<ApplicationRecord, RepositoryError>;

    fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Compare-and-swap status change issued by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub application_id: ApplicationId,
    pub expected_status: ApplicationStatus,
    pub status: ApplicationStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Apply to a stored record, enforcing the expected current status.
    pub fn apply_to(&self, record: &mut ApplicationRecord) -> Result<(), RepositoryError> {
        if record.status != self.expected_status {
            return Err(RepositoryError::StatusMismatch {
                expected: self.expected_status,
                current: record.status,
            });
        }
        record.enter_status(self.status, &self.actor, self.at);
        Ok(())
    }
}

/// Write side for the facts that gate transitions. Records are upserted by their own id.
pub trait EvidenceRepository: Send + Sync {
    fn record_document(
        &self,
        application_id: &ApplicationId,
        evidence: DocumentEvidence,
    ) -> Result<(), RepositoryError>;

    fn record_biometric(
        &self,
        applicant_id: &UserId,
        evidence: BiometricEvidence,
    ) -> Result<(), RepositoryError>;

    fn record_payment(
        &self,
        application_id: &ApplicationId,
        evidence: PaymentEvidence,
    ) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("status changed concurrently (expected {expected}, found {current})")]
    StatusMismatch {
        expected: ApplicationStatus,
        current: ApplicationStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
