use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::workflows::citizenship::audit::{AuditEntry, AuditError, AuditSink};
use crate::workflows::citizenship::domain::{
    Actor, ApplicationCategory, ApplicationForm, ApplicationId, ApplicationRecord,
    ApplicationStatus, BiometricEvidence, DecisionRecord, DocumentEvidence,
    DocumentVerification, NewHistoryEntry, PaymentEvidence, PaymentStatus, Role, UserId,
    WorkflowHistoryEntry,
};
use crate::workflows::citizenship::memory::InMemoryApplicationStore;
use crate::workflows::citizenship::repository::{
    ApplicationPage, ApplicationQuery, ApplicationRepository, EvidenceRepository,
    RepositoryError, StatusUpdate, WorkflowTransaction,
};
use crate::workflows::citizenship::rules::{Prerequisite, RuleTable};
use crate::workflows::citizenship::{
    application_router, CitizenshipApplicationService, TransitionRequest,
};

/// Canonical route through the lifecycle, oath included.
pub(super) const HAPPY_PATH: [ApplicationStatus; 14] = [
    ApplicationStatus::Draft,
    ApplicationStatus::Submitted,
    ApplicationStatus::PendingReview,
    ApplicationStatus::DocumentsVerified,
    ApplicationStatus::PendingBiometric,
    ApplicationStatus::BiometricCaptured,
    ApplicationStatus::PendingPayment,
    ApplicationStatus::PaymentCompleted,
    ApplicationStatus::UnderReview,
    ApplicationStatus::Approved,
    ApplicationStatus::PendingOath,
    ApplicationStatus::OathCompleted,
    ApplicationStatus::CertificateIssued,
    ApplicationStatus::Completed,
];

pub(super) type MemoryService =
    CitizenshipApplicationService<InMemoryApplicationStore, MemoryAudit>;

pub(super) fn applicant() -> Actor {
    Actor::new("applicant-1", Role::Pemohon)
}

pub(super) fn other_applicant() -> Actor {
    Actor::new("applicant-2", Role::Pemohon)
}

pub(super) fn registration_officer() -> Actor {
    Actor::new("officer-reg-1", Role::PegawaiPendaftaran)
}

pub(super) fn consular_officer() -> Actor {
    Actor::new("officer-konsul-1", Role::PegawaiKonsul)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

pub(super) fn it_admin() -> Actor {
    Actor::new("it-1", Role::PentadbirSistemIt)
}

pub(super) fn borang_h_form() -> ApplicationForm {
    ApplicationForm::BorangH {
        child_name: "Aisyah binti Rahman".to_string(),
        place_of_birth: "London".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(2024, 3, 14).expect("valid date"),
        father_name: "Rahman bin Ismail".to_string(),
        father_ic: "850101-14-5523".to_string(),
        mother_name: "Nurul Huda binti Zainal".to_string(),
        mother_ic: "870505-10-6642".to_string(),
    }
}

pub(super) fn borang_g_form() -> ApplicationForm {
    ApplicationForm::BorangG {
        applicant_name: "Lim Wei Jie".to_string(),
        current_nationality: "Singaporean".to_string(),
        reason_for_application: "Resident for twelve years".to_string(),
        supporting_documents: vec!["residency-letter".to_string()],
    }
}

pub(super) fn tadbir_sumpah_form() -> ApplicationForm {
    ApplicationForm::TadbirSumpah {
        applicant_name: "Lim Wei Jie".to_string(),
        approved_application_number: "SPK-BG-2026-00004".to_string(),
        preferred_oath_date: NaiveDate::from_ymd_opt(2026, 11, 2),
        location: "Kuala Lumpur".to_string(),
    }
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryApplicationStore>,
    Arc<MemoryAudit>,
) {
    let store = Arc::new(InMemoryApplicationStore::new());
    let audit = Arc::new(MemoryAudit::default());
    let service =
        CitizenshipApplicationService::new(store.clone(), audit.clone(), WorkflowConfig::default());
    (service, store, audit)
}

/// Draft owned by [`applicant`].
pub(super) fn draft(service: &MemoryService) -> ApplicationRecord {
    service
        .create(&applicant(), borang_h_form())
        .expect("draft created")
}

pub(super) fn verified_document(id: &str) -> DocumentEvidence {
    DocumentEvidence {
        document_id: id.to_string(),
        verification: DocumentVerification::Verified,
    }
}

pub(super) fn verified_biometric() -> BiometricEvidence {
    BiometricEvidence {
        biometric_id: "bio-1".to_string(),
        verified: true,
    }
}

pub(super) fn completed_payment(category: ApplicationCategory) -> PaymentEvidence {
    PaymentEvidence {
        payment_id: "pay-1".to_string(),
        amount_sen: category.fee_sen(),
        status: PaymentStatus::Completed,
    }
}

/// Record whatever evidence `prerequisite` asks for on `record`.
pub(super) fn satisfy(
    service: &MemoryService,
    record: &ApplicationRecord,
    prerequisite: Prerequisite,
) {
    let officer = admin();
    match prerequisite {
        Prerequisite::Documents => service
            .record_document(&officer, &record.id, verified_document("doc-1"))
            .expect("document recorded"),
        Prerequisite::Biometric => service
            .record_biometric(&officer, &record.applicant_id, verified_biometric())
            .expect("biometric recorded"),
        Prerequisite::Payment => service
            .record_payment(&officer, &record.id, completed_payment(record.category))
            .expect("payment recorded"),
    }
}

/// Walk `record` along [`HAPPY_PATH`] as an admin until it reaches `target`, recording
/// only the evidence each traversed edge needs.
pub(super) fn advance_to(
    service: &MemoryService,
    record: &ApplicationRecord,
    target: ApplicationStatus,
) -> ApplicationRecord {
    if target == ApplicationStatus::Rejected {
        advance_to(service, record, ApplicationStatus::UnderReview);
        return service
            .reject(&consular_officer(), &record.id, Some("Incomplete documents"))
            .expect("rejection succeeds")
            .application;
    }

    let mut current = service.get(&admin(), &record.id).expect("record readable");

    for window in HAPPY_PATH.windows(2) {
        if current.status == target {
            break;
        }
        let (from, to) = (window[0], window[1]);
        if current.status != from {
            continue;
        }
        let rule = RuleTable::canonical()
            .rule_for(from, to)
            .expect("happy path edge is declared");
        for prerequisite in rule.prerequisites() {
            satisfy(service, &current, prerequisite);
        }
        current = service
            .transition(TransitionRequest::new(record.id.clone(), to, admin()))
            .expect("happy path transition succeeds")
            .application;
    }

    assert_eq!(current.status, target, "advance_to reached target");
    current
}

pub(super) fn history_of(
    store: &InMemoryApplicationStore,
    id: &ApplicationId,
) -> Vec<WorkflowHistoryEntry> {
    store.history(id).expect("history readable")
}

#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAudit {
    pub(super) fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .expect("audit mutex poisoned")
            .push(entry);
        Ok(())
    }
}

pub(super) struct FailingAudit;

impl AuditSink for FailingAudit {
    fn record(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Err(AuditError::Transport("audit queue offline".to_string()))
    }
}

pub(super) struct UnavailableStore;

impl ApplicationRepository for UnavailableStore {
    fn begin(&self) -> Result<Box<dyn WorkflowTransaction + '_>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn history(&self, _id: &ApplicationId) -> Result<Vec<WorkflowHistoryEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl EvidenceRepository for UnavailableStore {
    fn record_document(
        &self,
        _application_id: &ApplicationId,
        _evidence: DocumentEvidence,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn record_biometric(
        &self,
        _applicant_id: &UserId,
        _evidence: BiometricEvidence,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn record_payment(
        &self,
        _application_id: &ApplicationId,
        _evidence: PaymentEvidence,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Store whose conditional status write always loses to a concurrent writer, as a store
/// with weaker isolation than [`InMemoryApplicationStore`] would report it.
pub(super) struct StaleStatusStore {
    pub(super) inner: InMemoryApplicationStore,
    pub(super) concurrent_status: ApplicationStatus,
}

impl ApplicationRepository for StaleStatusStore {
    fn begin(&self) -> Result<Box<dyn WorkflowTransaction + '_>, RepositoryError> {
        Ok(Box::new(StaleTransaction {
            inner: self.inner.begin()?,
            concurrent_status: self.concurrent_status,
        }))
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn history(&self, id: &ApplicationId) -> Result<Vec<WorkflowHistoryEntry>, RepositoryError> {
        self.inner.history(id)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        self.inner.list(query)
    }
}

struct StaleTransaction<'a> {
    inner: Box<dyn WorkflowTransaction + 'a>,
    concurrent_status: ApplicationStatus,
}

impl WorkflowTransaction for StaleTransaction<'_> {
    fn find_application_by_id(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.find_application_by_id(id)
    }

    fn count_verified_documents(&mut self, id: &ApplicationId) -> Result<usize, RepositoryError> {
        self.inner.count_verified_documents(id)
    }

    fn count_verified_biometrics(&mut self, applicant: &UserId) -> Result<usize, RepositoryError> {
        self.inner.count_verified_biometrics(applicant)
    }

    fn count_completed_payments(&mut self, id: &ApplicationId) -> Result<usize, RepositoryError> {
        self.inner.count_completed_payments(id)
    }

    fn count_applications(
        &mut self,
        category: ApplicationCategory,
        year: i32,
    ) -> Result<usize, RepositoryError> {
        self.inner.count_applications(category, year)
    }

    fn insert_application(
        &mut self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert_application(record)
    }

    fn update_application_status(
        &mut self,
        update: &StatusUpdate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::StatusMismatch {
            expected: update.expected_status,
            current: self.concurrent_status,
        })
    }

    fn append_workflow_history(
        &mut self,
        entry: NewHistoryEntry,
    ) -> Result<WorkflowHistoryEntry, RepositoryError> {
        self.inner.append_workflow_history(entry)
    }

    fn record_decision(
        &mut self,
        id: &ApplicationId,
        decision: &DecisionRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.record_decision(id, decision)
    }

    fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.inner.commit()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_error_kind(payload: &Value, kind: &str) {
    assert_eq!(
        payload.get("kind").and_then(Value::as_str),
        Some(kind),
        "unexpected payload {payload}"
    );
}

pub(super) fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status);
}

pub(super) fn application_router_with_service(service: MemoryService) -> axum::Router {
    application_router(Arc::new(service))
}
