use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{ApplicationId, Role, UserId};

/// Action recorded against an application in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Approve,
    Reject,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
        }
    }
}

/// Audit payload, kept separate from the workflow history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: UserId,
    pub actor_role: Role,
    pub action: AuditAction,
    pub entity_id: ApplicationId,
    pub changes: BTreeMap<String, String>,
}

/// Outbound audit hook (database table, SIEM forwarder, ...).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Audit dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit transport unavailable: {0}")]
    Transport(String),
}

/// Emits audit entries as structured `tracing` events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            target: "audit",
            action = entry.action.label(),
            entity_type = "Application",
            entity_id = %entry.entity_id,
            actor_id = %entry.actor_id,
            actor_role = %entry.actor_role,
            changes = ?entry.changes,
            "audit entry"
        );
        Ok(())
    }
}
