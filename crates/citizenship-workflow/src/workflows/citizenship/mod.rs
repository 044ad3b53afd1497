//! Citizenship application workflow: rule table, validator, prerequisite checker,
//! transactional engine, decision operations, and the service/HTTP surface around them.

pub mod audit;
mod decision;
pub mod domain;
pub mod engine;
pub mod memory;
pub mod prerequisites;
pub mod reference;
pub mod repository;
pub mod router;
pub mod rules;
pub mod service;
pub mod validator;
pub mod views;

#[cfg(test)]
mod tests;

pub use audit::{AuditAction, AuditEntry, AuditError, AuditSink, TracingAuditSink};
pub use decision::{DEFAULT_APPROVAL_DECISION, DEFAULT_APPROVAL_REASON, REJECTION_DECISION};
pub use domain::{
    Actor, ApplicationCategory, ApplicationForm, ApplicationId, ApplicationRecord,
    ApplicationStatus, ApplicationSummary, BiometricEvidence, DecisionRecord,
    DocumentEvidence, DocumentVerification, PaymentEvidence, PaymentStatus, Role,
    TransitionMetadata, UserId, WorkflowHistoryEntry,
};
pub use engine::{TransitionError, TransitionOutcome, TransitionRequest, WorkflowEngine};
pub use memory::InMemoryApplicationStore;
pub use prerequisites::{PrerequisiteCheck, PrerequisiteChecker};
pub use repository::{
    ApplicationPage, ApplicationQuery, ApplicationRepository, EvidenceRepository,
    RepositoryError, StatusUpdate, WorkflowTransaction,
};
pub use router::application_router;
pub use rules::{
    is_legal_transition, valid_transitions, Prerequisite, RuleTable, TransitionRule,
    CANONICAL_RULES,
};
pub use service::{
    ApplicationServiceError, CitizenshipApplicationService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use validator::TransitionValidator;
pub use views::{
    ApplicationFilter, ApplicationListView, HistoryView, Pagination, RuleView,
    TransitionOptionsView, TransitionView,
};
