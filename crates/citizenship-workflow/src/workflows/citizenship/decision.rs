use super::domain::{Actor, ApplicationId, ApplicationStatus, DecisionRecord};
use super::engine::{
    trace_outcome, TransitionError, TransitionOutcome, TransitionRequest, WorkflowEngine,
};
use super::repository::{ApplicationRepository, WorkflowTransaction};

pub const DEFAULT_APPROVAL_DECISION: &str = "Approved";
pub const DEFAULT_APPROVAL_REASON: &str = "Application meets all requirements";
pub const REJECTION_DECISION: &str = "Rejected";

impl<R> WorkflowEngine<R>
where
    R: ApplicationRepository,
{
    /// Move `UNDER_REVIEW -> APPROVED` and record the decision in the same transaction.
    pub fn approve(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        decision: Option<&str>,
        decision_reason: Option<&str>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let request = TransitionRequest::new(
            application_id.clone(),
            ApplicationStatus::Approved,
            actor.clone(),
        )
        .with_notes("Application approved");
        let decision = DecisionRecord {
            decision: non_blank(decision).unwrap_or(DEFAULT_APPROVAL_DECISION).to_string(),
            reason: non_blank(decision_reason)
                .unwrap_or(DEFAULT_APPROVAL_REASON)
                .to_string(),
            officer_id: actor.id.clone(),
        };

        let result = self.in_transaction(|tx| self.decide(tx, &request, &decision));
        trace_outcome(&request, &result);
        result
    }

    /// Move `UNDER_REVIEW -> REJECTED`. The reason is mandatory and checked before any read.
    pub fn reject(
        &self,
        application_id: &ApplicationId,
        actor: &Actor,
        decision_reason: Option<&str>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let reason = non_blank(decision_reason).ok_or(TransitionError::MissingDecisionReason)?;

        let request = TransitionRequest::new(
            application_id.clone(),
            ApplicationStatus::Rejected,
            actor.clone(),
        )
        .with_notes("Application rejected");
        let decision = DecisionRecord {
            decision: REJECTION_DECISION.to_string(),
            reason: reason.to_string(),
            officer_id: actor.id.clone(),
        };

        let result = self.in_transaction(|tx| self.decide(tx, &request, &decision));
        trace_outcome(&request, &result);
        result
    }

    fn decide(
        &self,
        tx: &mut dyn WorkflowTransaction,
        request: &TransitionRequest,
        decision: &DecisionRecord,
    ) -> Result<TransitionOutcome, TransitionError> {
        let mut outcome = self.apply_transition(tx, request)?;
        outcome.application = tx.record_decision(&request.application_id, decision)?;
        Ok(outcome)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
