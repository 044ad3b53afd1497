use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::domain::{
    Actor, ApplicationId, ApplicationRecord, ApplicationStatus, NewHistoryEntry, Role,
    TransitionMetadata, WorkflowHistoryEntry,
};
use super::prerequisites::PrerequisiteChecker;
use super::repository::{
    ApplicationRepository, RepositoryError, StatusUpdate, WorkflowTransaction,
};
use super::rules::{Prerequisite, RuleTable};
use super::validator::TransitionValidator;

/// A single request to move an application to `to_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub application_id: ApplicationId,
    pub to_status: ApplicationStatus,
    pub actor: Actor,
    pub notes: Option<String>,
    pub metadata: Option<TransitionMetadata>,
}

impl TransitionRequest {
    pub fn new(application_id: ApplicationId, to_status: ApplicationStatus, actor: Actor) -> Self {
        Self {
            application_id,
            to_status,
            actor,
            notes: None,
            metadata: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_metadata(mut self, metadata: TransitionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Committed result of a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub application: ApplicationRecord,
    pub history_entry: WorkflowHistoryEntry,
}

/// Orchestrates transition attempts: load, validate, check prerequisites, then write the
/// status change and its history entry in one transaction.
pub struct WorkflowEngine<R> {
    repository: Arc<R>,
    validator: TransitionValidator,
    prerequisites: PrerequisiteChecker,
}

impl<R> WorkflowEngine<R>
where
    R: ApplicationRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            validator: TransitionValidator::default(),
            prerequisites: PrerequisiteChecker,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn rules(&self) -> &'static RuleTable {
        self.validator.rules()
    }

    pub fn execute_transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, TransitionError> {
        let result = self.in_transaction(|tx| self.apply_transition(tx, &request));
        trace_outcome(&request, &result);
        result
    }

    /// Run `work` inside one repository transaction, committing only if it succeeds.
    pub(crate) fn in_transaction<T>(
        &self,
        work: impl FnOnce(&mut dyn WorkflowTransaction) -> Result<T, TransitionError>,
    ) -> Result<T, TransitionError> {
        let mut tx = self.repository.begin()?;
        let value = work(tx.as_mut())?;
        tx.commit()?;
        Ok(value)
    }

    pub(crate) fn apply_transition(
        &self,
        tx: &mut dyn WorkflowTransaction,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, TransitionError> {
        let application = tx
            .find_application_by_id(&request.application_id)?
            .ok_or_else(|| TransitionError::NotFound(request.application_id.clone()))?;

        let from = application.status;
        let to = request.to_status;
        let role = request.actor.role;

        if from == to {
            return Err(TransitionError::NoOp { status: from });
        }

        if !self.validator.validate(from, to, role) {
            return Err(TransitionError::Unauthorized { from, to, role });
        }

        if let Some(rule) = self.validator.rules().rule_for(from, to) {
            let check = self.prerequisites.check_loaded(tx, &application, rule)?;
            if let Some(prerequisite) = check.failed() {
                return Err(TransitionError::PrerequisiteNotMet(prerequisite));
            }
        }

        let now = Utc::now();
        let update = StatusUpdate {
            application_id: application.id.clone(),
            expected_status: from,
            status: to,
            actor: request.actor.clone(),
            at: now,
        };
        let updated = tx
            .update_application_status(&update)
            .map_err(|err| match err {
                RepositoryError::StatusMismatch { expected, current } => {
                    TransitionError::Conflict {
                        application_id: application.id.clone(),
                        expected,
                        current,
                    }
                }
                other => TransitionError::Persistence(other),
            })?;

        let history_entry = tx.append_workflow_history(NewHistoryEntry {
            application_id: application.id.clone(),
            from_status: Some(from),
            to_status: to,
            actor_id: request.actor.id.clone(),
            actor_role: role,
            notes: request
                .notes
                .clone()
                .filter(|notes| !notes.trim().is_empty())
                .unwrap_or_else(|| format!("Transitioned from {from} to {to}")),
            metadata: request.metadata.clone().unwrap_or_default(),
            recorded_at: now,
        })?;

        Ok(TransitionOutcome {
            application: updated,
            history_entry,
        })
    }
}

pub(crate) fn trace_outcome(
    request: &TransitionRequest,
    result: &Result<TransitionOutcome, TransitionError>,
) {
    match result {
        Ok(outcome) => info!(
            application_id = %request.application_id,
            from = ?outcome.history_entry.from_status,
            to = %outcome.history_entry.to_status,
            actor_id = %request.actor.id,
            role = %request.actor.role,
            "application transitioned"
        ),
        Err(TransitionError::Persistence(err)) => error!(
            application_id = %request.application_id,
            to = %request.to_status,
            error = %err,
            "transition failed in persistence layer"
        ),
        Err(err) => warn!(
            application_id = %request.application_id,
            to = %request.to_status,
            role = %request.actor.role,
            kind = err.kind(),
            error = %err,
            "transition refused"
        ),
    }
}

/// Business errors returned by transition attempts. None of them leave partial writes.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("application is already in the target status {status}")]
    NoOp { status: ApplicationStatus },
    #[error("transition from {from} to {to} is not allowed for role {role}")]
    Unauthorized {
        from: ApplicationStatus,
        to: ApplicationStatus,
        role: Role,
    },
    #[error("prerequisite not met ({0}): {}", .0.requirement())]
    PrerequisiteNotMet(Prerequisite),
    #[error("application {application_id} moved from {expected} to {current} concurrently; re-read and retry")]
    Conflict {
        application_id: ApplicationId,
        expected: ApplicationStatus,
        current: ApplicationStatus,
    },
    #[error("a decision reason is required to reject an application")]
    MissingDecisionReason,
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

impl TransitionError {
    pub const fn kind(&self) -> &'static str {
        match self {
            TransitionError::NotFound(_) => "not_found",
            TransitionError::NoOp { .. } => "no_op",
            TransitionError::Unauthorized { .. } => "unauthorized",
            TransitionError::PrerequisiteNotMet(_) => "prerequisite_not_met",
            TransitionError::Conflict { .. } => "conflict",
            TransitionError::MissingDecisionReason => "invalid_request",
            TransitionError::Persistence(_) => "persistence_failure",
        }
    }

    /// Whether re-reading the application and trying again can succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, TransitionError::Conflict { .. })
    }
}
