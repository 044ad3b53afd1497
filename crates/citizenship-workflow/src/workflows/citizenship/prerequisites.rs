use super::domain::{ApplicationId, ApplicationRecord};
use super::engine::TransitionError;
use super::repository::{RepositoryError, WorkflowTransaction};
use super::rules::{Prerequisite, TransitionRule};

/// Outcome of checking a rule's prerequisite flags against an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrerequisiteCheck {
    unmet: Option<Prerequisite>,
}

impl PrerequisiteCheck {
    pub const fn satisfied() -> Self {
        Self { unmet: None }
    }

    pub const fn unmet(prerequisite: Prerequisite) -> Self {
        Self {
            unmet: Some(prerequisite),
        }
    }

    pub const fn is_satisfied(&self) -> bool {
        self.unmet.is_none()
    }

    /// First declared prerequisite that failed.
    pub const fn failed(&self) -> Option<Prerequisite> {
        self.unmet
    }

    pub fn reason(&self) -> Option<&'static str> {
        self.unmet.map(Prerequisite::requirement)
    }
}

/// Decides whether the records attached to an application satisfy a rule's flags.
///
/// Flags are conjunctive. Reads go through the caller's transaction so the check observes
/// the same snapshot the status write will commit against.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrerequisiteChecker;

impl PrerequisiteChecker {
    pub fn check_prerequisites(
        &self,
        tx: &mut dyn WorkflowTransaction,
        application_id: &ApplicationId,
        rule: &TransitionRule,
    ) -> Result<PrerequisiteCheck, TransitionError> {
        let application = tx
            .find_application_by_id(application_id)?
            .ok_or_else(|| TransitionError::NotFound(application_id.clone()))?;
        Ok(self.check_loaded(tx, &application, rule)?)
    }

    pub(crate) fn check_loaded(
        &self,
        tx: &mut dyn WorkflowTransaction,
        application: &ApplicationRecord,
        rule: &TransitionRule,
    ) -> Result<PrerequisiteCheck, RepositoryError> {
        for prerequisite in rule.prerequisites() {
            let matching = match prerequisite {
                Prerequisite::Documents => tx.count_verified_documents(&application.id)?,
                Prerequisite::Biometric => tx.count_verified_biometrics(&application.applicant_id)?,
                Prerequisite::Payment => tx.count_completed_payments(&application.id)?,
            };
            if matching == 0 {
                return Ok(PrerequisiteCheck::unmet(prerequisite));
            }
        }
        Ok(PrerequisiteCheck::satisfied())
    }
}
