//! Process-local store implementing the repository contracts.
//!
//! A transaction holds the store lock from `begin` until it is committed or dropped, so
//! transactions are serializable. Writes are staged on the transaction and only reach the
//! shared state on `commit`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Datelike;

use super::domain::{
    ApplicationCategory, ApplicationId, ApplicationRecord, BiometricEvidence, DecisionRecord,
    DocumentEvidence, NewHistoryEntry, PaymentEvidence, UserId, WorkflowHistoryEntry,
};
use super::repository::{
    ApplicationPage, ApplicationQuery, ApplicationRepository, EvidenceRepository,
    RepositoryError, StatusUpdate, WorkflowTransaction,
};

#[derive(Debug, Default)]
struct StoreState {
    applications: HashMap<ApplicationId, ApplicationRecord>,
    history: Vec<WorkflowHistoryEntry>,
    documents: HashMap<ApplicationId, BTreeMap<String, DocumentEvidence>>,
    biometrics: HashMap<UserId, BTreeMap<String, BiometricEvidence>>,
    payments: HashMap<ApplicationId, BTreeMap<String, PaymentEvidence>>,
    last_history_id: u64,
}

/// Shared handle; clones observe the same state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryApplicationStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("application store lock poisoned".into()))
    }
}

impl ApplicationRepository for InMemoryApplicationStore {
    fn begin(&self) -> Result<Box<dyn WorkflowTransaction + '_>, RepositoryError> {
        Ok(Box::new(MemoryTransaction {
            state: self.lock()?,
            staged_applications: HashMap::new(),
            staged_history: Vec::new(),
        }))
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.lock()?.applications.get(id).cloned())
    }

    fn history(&self, id: &ApplicationId) -> Result<Vec<WorkflowHistoryEntry>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .history
            .iter()
            .filter(|entry| &entry.application_id == id)
            .cloned()
            .collect())
    }

    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        let state = self.lock()?;
        let mut matching: Vec<&ApplicationRecord> = state
            .applications
            .values()
            .filter(|record| query.matches(record))
            .collect();
        // Ids are zero-padded sequence numbers, so they break creation-time ties.
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len();
        let records = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        Ok(ApplicationPage { records, total })
    }
}

impl EvidenceRepository for InMemoryApplicationStore {
    fn record_document(
        &self,
        application_id: &ApplicationId,
        evidence: DocumentEvidence,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if !state.applications.contains_key(application_id) {
            return Err(RepositoryError::NotFound);
        }
        state
            .documents
            .entry(application_id.clone())
            .or_default()
            .insert(evidence.document_id.clone(), evidence);
        Ok(())
    }

    fn record_biometric(
        &self,
        applicant_id: &UserId,
        evidence: BiometricEvidence,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state
            .biometrics
            .entry(applicant_id.clone())
            .or_default()
            .insert(evidence.biometric_id.clone(), evidence);
        Ok(())
    }

    fn record_payment(
        &self,
        application_id: &ApplicationId,
        evidence: PaymentEvidence,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if !state.applications.contains_key(application_id) {
            return Err(RepositoryError::NotFound);
        }
        state
            .payments
            .entry(application_id.clone())
            .or_default()
            .insert(evidence.payment_id.clone(), evidence);
        Ok(())
    }
}

struct MemoryTransaction<'a> {
    state: MutexGuard<'a, StoreState>,
    staged_applications: HashMap<ApplicationId, ApplicationRecord>,
    staged_history: Vec<WorkflowHistoryEntry>,
}

impl MemoryTransaction<'_> {
    fn current(&self, id: &ApplicationId) -> Option<&ApplicationRecord> {
        self.staged_applications
            .get(id)
            .or_else(|| self.state.applications.get(id))
    }

    fn staged_copy(
        &mut self,
        id: &ApplicationId,
    ) -> Result<&mut ApplicationRecord, RepositoryError> {
        if !self.staged_applications.contains_key(id) {
            let committed = self
                .state
                .applications
                .get(id)
                .cloned()
                .ok_or(RepositoryError::NotFound)?;
            self.staged_applications.insert(id.clone(), committed);
        }
        self.staged_applications
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)
    }
}

impl WorkflowTransaction for MemoryTransaction<'_> {
    fn find_application_by_id(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.current(id).cloned())
    }

    fn count_verified_documents(&mut self, id: &ApplicationId) -> Result<usize, RepositoryError> {
        Ok(self.state.documents.get(id).map_or(0, |documents| {
            documents
                .values()
                .filter(|document| document.verification.is_verified())
                .count()
        }))
    }

    fn count_verified_biometrics(&mut self, applicant: &UserId) -> Result<usize, RepositoryError> {
        Ok(self.state.biometrics.get(applicant).map_or(0, |captures| {
            captures.values().filter(|capture| capture.verified).count()
        }))
    }

    fn count_completed_payments(&mut self, id: &ApplicationId) -> Result<usize, RepositoryError> {
        Ok(self.state.payments.get(id).map_or(0, |payments| {
            payments
                .values()
                .filter(|payment| payment.status.is_completed())
                .count()
        }))
    }

    fn count_applications(
        &mut self,
        category: ApplicationCategory,
        year: i32,
    ) -> Result<usize, RepositoryError> {
        let committed = self
            .state
            .applications
            .values()
            .filter(|record| !self.staged_applications.contains_key(&record.id));
        Ok(committed
            .chain(self.staged_applications.values())
            .filter(|record| record.category == category && record.created_at.year() == year)
            .count())
    }

    fn insert_application(
        &mut self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        if self.current(&record.id).is_some() {
            return Err(RepositoryError::Conflict);
        }
        self.staged_applications
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_application_status(
        &mut self,
        update: &StatusUpdate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let record = self.staged_copy(&update.application_id)?;
        update.apply_to(record)?;
        Ok(record.clone())
    }

    fn append_workflow_history(
        &mut self,
        entry: NewHistoryEntry,
    ) -> Result<WorkflowHistoryEntry, RepositoryError> {
        if self.current(&entry.application_id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        let id = self.state.last_history_id + self.staged_history.len() as u64 + 1;
        let entry = entry.into_entry(id);
        self.staged_history.push(entry.clone());
        Ok(entry)
    }

    fn record_decision(
        &mut self,
        id: &ApplicationId,
        decision: &DecisionRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let record = self.staged_copy(id)?;
        record.apply_decision(decision);
        Ok(record.clone())
    }

    fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let MemoryTransaction {
            mut state,
            staged_applications,
            staged_history,
        } = *self;
        state.last_history_id += staged_history.len() as u64;
        state.applications.extend(staged_applications);
        state.history.extend(staged_history);
        Ok(())
    }
}
