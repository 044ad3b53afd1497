use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::{info, warn};

use crate::config::WorkflowConfig;

use super::audit::{AuditAction, AuditEntry, AuditSink};
use super::domain::{
    Actor, ApplicationForm, ApplicationId, ApplicationRecord, ApplicationStatus,
    BiometricEvidence, DocumentEvidence, NewHistoryEntry, PaymentEvidence, Role,
    TransitionMetadata, UserId,
};
use super::engine::{TransitionError, TransitionOutcome, TransitionRequest, WorkflowEngine};
use super::reference::reference_number;
use super::repository::{
    ApplicationQuery, ApplicationRepository, EvidenceRepository, RepositoryError,
};
use super::views::{
    ApplicationFilter, ApplicationListView, HistoryView, Pagination, RuleView,
    TransitionOptionsView, TransitionView,
};

/// Service composing the workflow engine, read views, and the audit collaborator.
pub struct CitizenshipApplicationService<R, A> {
    engine: WorkflowEngine<R>,
    audit: Arc<A>,
    config: WorkflowConfig,
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

impl<R, A> CitizenshipApplicationService<R, A>
where
    R: ApplicationRepository + 'static,
    A: AuditSink + 'static,
{
    pub fn new(repository: Arc<R>, audit: Arc<A>, config: WorkflowConfig) -> Self {
        Self {
            engine: WorkflowEngine::new(repository),
            audit,
            config,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine<R> {
        &self.engine
    }

    /// Open a new `DRAFT` application owned by `actor`.
    pub fn create(
        &self,
        actor: &Actor,
        form: ApplicationForm,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let now = Utc::now();
        let category = form.category();
        let prefix = self.config.reference_prefix();

        let record = self.engine.in_transaction(|tx| {
            let sequence = tx.count_applications(category, now.year())? + 1;
            let reference = reference_number(prefix, category, now.year(), sequence);
            let record = tx.insert_application(ApplicationRecord::draft(
                next_application_id(),
                reference,
                actor.id.clone(),
                form,
                now,
            ))?;
            tx.append_workflow_history(NewHistoryEntry {
                application_id: record.id.clone(),
                from_status: None,
                to_status: ApplicationStatus::Draft,
                actor_id: actor.id.clone(),
                actor_role: actor.role,
                notes: "Application created".to_string(),
                metadata: TransitionMetadata::default(),
                recorded_at: now,
            })?;
            Ok(record)
        })?;

        info!(
            application_id = %record.id,
            reference = %record.reference_number,
            category = record.category.label(),
            "application created"
        );

        let mut changes = BTreeMap::new();
        changes.insert("reference_number".to_string(), record.reference_number.clone());
        changes.insert("category".to_string(), record.category.label().to_string());
        changes.insert("status".to_string(), record.status.label().to_string());
        self.audit(actor, AuditAction::Create, &record.id, changes);

        Ok(record)
    }

    pub fn get(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.visible_record(actor, application_id)
    }

    /// Applications visible to `actor`, newest first. Applicants only see their own.
    pub fn list(
        &self,
        actor: &Actor,
        filter: ApplicationFilter,
    ) -> Result<ApplicationListView, ApplicationServiceError> {
        let page = filter.page.filter(|page| *page > 0).unwrap_or(1);
        let limit = filter
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);

        let query = ApplicationQuery {
            viewer: actor.clone(),
            status: filter.status,
            category: filter.category,
            offset: (page as usize - 1).saturating_mul(limit as usize),
            limit: limit as usize,
        };
        let result = self.engine.repository().list(&query)?;

        Ok(ApplicationListView {
            applications: result.records,
            pagination: Pagination {
                page,
                limit,
                total: result.total,
                total_pages: result.total.div_ceil(limit as usize),
            },
        })
    }

    pub fn history(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<HistoryView, ApplicationServiceError> {
        let record = self.visible_record(actor, application_id)?;
        let history = self.engine.repository().history(application_id)?;
        Ok(HistoryView {
            application: record.summary(),
            history,
        })
    }

    pub fn available_transitions(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<TransitionOptionsView, ApplicationServiceError> {
        let record = self.visible_record(actor, application_id)?;
        let rules = self.engine.rules();
        Ok(TransitionOptionsView {
            application: record.summary(),
            valid_transitions: rules.valid_targets(record.status, actor.role),
            all_possible_transitions: rules
                .transitions_from(record.status)
                .map(RuleView::from)
                .collect(),
        })
    }

    pub fn transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionView, ApplicationServiceError> {
        if let Some(metadata) = &request.metadata {
            if !metadata.is_supported() {
                return Err(ApplicationServiceError::UnsupportedMetadata(metadata.version));
            }
        }
        self.ensure_actor_may_act(&request.actor, &request.application_id)?;

        let outcome = self.engine.execute_transition(request.clone())?;

        let mut changes = status_changes(&outcome);
        if let Some(notes) = &request.notes {
            changes.insert("notes".to_string(), notes.clone());
        }
        if let Some(metadata) = &request.metadata {
            for (key, value) in &metadata.attributes {
                changes.insert(format!("metadata.{key}"), value.clone());
            }
        }
        self.audit(
            &request.actor,
            AuditAction::Update,
            &request.application_id,
            changes,
        );

        Ok(self.transition_view(outcome, &request.actor))
    }

    pub fn approve(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        decision: Option<&str>,
        decision_reason: Option<&str>,
    ) -> Result<TransitionView, ApplicationServiceError> {
        self.ensure_actor_may_act(actor, application_id)?;
        let outcome = self
            .engine
            .approve(application_id, actor, decision, decision_reason)?;

        let mut changes = status_changes(&outcome);
        if let Some(decision) = &outcome.application.decision {
            changes.insert("decision".to_string(), decision.clone());
        }
        if let Some(reason) = &outcome.application.decision_reason {
            changes.insert("decision_reason".to_string(), reason.clone());
        }
        self.audit(actor, AuditAction::Approve, application_id, changes);

        Ok(self.transition_view(outcome, actor))
    }

    pub fn reject(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        decision_reason: Option<&str>,
    ) -> Result<TransitionView, ApplicationServiceError> {
        if decision_reason.map_or(true, |reason| reason.trim().is_empty()) {
            return Err(TransitionError::MissingDecisionReason.into());
        }
        self.ensure_actor_may_act(actor, application_id)?;
        let outcome = self.engine.reject(application_id, actor, decision_reason)?;

        let mut changes = status_changes(&outcome);
        if let Some(reason) = &outcome.application.decision_reason {
            changes.insert("decision_reason".to_string(), reason.clone());
        }
        self.audit(actor, AuditAction::Reject, application_id, changes);

        Ok(self.transition_view(outcome, actor))
    }

    fn visible_record(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let record = self
            .engine
            .repository()
            .fetch(application_id)?
            .ok_or_else(|| ApplicationServiceError::NotFound(application_id.clone()))?;
        if !record.is_visible_to(actor) {
            return Err(ApplicationServiceError::AccessDenied {
                actor_id: actor.id.clone(),
                application_id: application_id.clone(),
            });
        }
        Ok(record)
    }

    /// Applicants act only on their own applications; missing records are left for the
    /// engine to report.
    fn ensure_actor_may_act(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<(), ApplicationServiceError> {
        if actor.role.is_officer() {
            return Ok(());
        }
        match self.engine.repository().fetch(application_id)? {
            Some(record) if !record.is_visible_to(actor) => {
                Err(ApplicationServiceError::AccessDenied {
                    actor_id: actor.id.clone(),
                    application_id: application_id.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn transition_view(&self, outcome: TransitionOutcome, actor: &Actor) -> TransitionView {
        let valid_next_transitions = self
            .engine
            .rules()
            .valid_targets(outcome.application.status, actor.role);
        TransitionView {
            application: outcome.application,
            history_entry: outcome.history_entry,
            valid_next_transitions,
        }
    }

    fn audit(
        &self,
        actor: &Actor,
        action: AuditAction,
        application_id: &ApplicationId,
        changes: BTreeMap<String, String>,
    ) {
        let entry = AuditEntry {
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action,
            entity_id: application_id.clone(),
            changes,
        };
        if let Err(err) = self.audit.record(entry) {
            warn!(
                application_id = %application_id,
                action = action.label(),
                error = %err,
                "audit entry not recorded"
            );
        }
    }
}

impl<R, A> CitizenshipApplicationService<R, A>
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    /// Record a document verification outcome. Officers only.
    pub fn record_document(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        evidence: DocumentEvidence,
    ) -> Result<(), ApplicationServiceError> {
        self.ensure_officer(actor, application_id)?;
        self.record_evidence(application_id, |store| {
            store.record_document(application_id, evidence)
        })
    }

    /// Record a payment outcome. The owning applicant or an officer.
    pub fn record_payment(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        evidence: PaymentEvidence,
    ) -> Result<(), ApplicationServiceError> {
        self.visible_record(actor, application_id)?;
        self.record_evidence(application_id, |store| {
            store.record_payment(application_id, evidence)
        })
    }

    /// Record a biometric capture for an applicant. Officers only.
    pub fn record_biometric(
        &self,
        actor: &Actor,
        applicant_id: &UserId,
        evidence: BiometricEvidence,
    ) -> Result<(), ApplicationServiceError> {
        if !actor.role.is_officer() {
            return Err(ApplicationServiceError::OfficerRequired { role: actor.role });
        }
        self.engine
            .repository()
            .record_biometric(applicant_id, evidence)?;
        Ok(())
    }

    fn ensure_officer(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<(), ApplicationServiceError> {
        if !actor.role.is_officer() {
            return Err(ApplicationServiceError::OfficerRequired { role: actor.role });
        }
        self.visible_record(actor, application_id).map(|_| ())
    }

    fn record_evidence(
        &self,
        application_id: &ApplicationId,
        write: impl FnOnce(&R) -> Result<(), RepositoryError>,
    ) -> Result<(), ApplicationServiceError> {
        match write(self.engine.repository().as_ref()) {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound) => {
                Err(ApplicationServiceError::NotFound(application_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn status_changes(outcome: &TransitionOutcome) -> BTreeMap<String, String> {
    let mut changes = BTreeMap::new();
    if let Some(from) = outcome.history_entry.from_status {
        changes.insert("status.before".to_string(), from.label().to_string());
    }
    changes.insert(
        "status.after".to_string(),
        outcome.history_entry.to_status.label().to_string(),
    );
    changes
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("user {actor_id} may not access application {application_id}")]
    AccessDenied {
        actor_id: UserId,
        application_id: ApplicationId,
    },
    #[error("role {role} cannot record verification evidence")]
    OfficerRequired { role: Role },
    #[error("unsupported transition metadata version {0}")]
    UnsupportedMetadata(u8),
}

impl ApplicationServiceError {
    pub const fn kind(&self) -> &'static str {
        match self {
            ApplicationServiceError::Transition(err) => err.kind(),
            ApplicationServiceError::Repository(_) => "persistence_failure",
            ApplicationServiceError::NotFound(_) => "not_found",
            ApplicationServiceError::AccessDenied { .. }
            | ApplicationServiceError::OfficerRequired { .. } => "access_denied",
            ApplicationServiceError::UnsupportedMetadata(_) => "invalid_request",
        }
    }
}
