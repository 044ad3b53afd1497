use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationCategory, ApplicationRecord, ApplicationStatus, ApplicationSummary, Role,
    WorkflowHistoryEntry,
};
use super::rules::TransitionRule;

/// Ordered transition history of one application.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub application: ApplicationSummary,
    pub history: Vec<WorkflowHistoryEntry>,
}

/// Outbound edge from the current status, as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleView {
    pub to: ApplicationStatus,
    pub allowed_roles: Vec<Role>,
    pub requires_documents: bool,
    pub requires_biometric: bool,
    pub requires_payment: bool,
}

impl From<&TransitionRule> for RuleView {
    fn from(rule: &TransitionRule) -> Self {
        Self {
            to: rule.to,
            allowed_roles: rule.allowed_roles.to_vec(),
            requires_documents: rule.requires_documents,
            requires_biometric: rule.requires_biometric,
            requires_payment: rule.requires_payment,
        }
    }
}

/// Moves available to the caller plus every edge out of the current status.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOptionsView {
    pub application: ApplicationSummary,
    pub valid_transitions: Vec<ApplicationStatus>,
    pub all_possible_transitions: Vec<RuleView>,
}

/// Response to a committed transition or decision.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionView {
    pub application: ApplicationRecord,
    pub history_entry: WorkflowHistoryEntry,
    pub valid_next_transitions: Vec<ApplicationStatus>,
}

/// Caller-supplied list filter. `page` is 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default, rename = "type")]
    pub category: Option<ApplicationCategory>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize,
}

/// One page of applications, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListView {
    pub applications: Vec<ApplicationRecord>,
    pub pagination: Pagination,
}
