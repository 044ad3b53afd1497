//! Declarative transition graph for the application lifecycle.
//!
//! Every legal status change is one [`TransitionRule`]: an edge, the roles allowed to take
//! it, and the prerequisite flags that must hold before it commits. The canonical table is
//! compiled in and indexed once per process.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use super::domain::{ApplicationStatus, Role};
use super::domain::ApplicationStatus as S;

/// Condition that must hold for an application before a gated edge commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prerequisite {
    Documents,
    Biometric,
    Payment,
}

impl Prerequisite {
    pub const fn label(self) -> &'static str {
        match self {
            Prerequisite::Documents => "documents",
            Prerequisite::Biometric => "biometric",
            Prerequisite::Payment => "payment",
        }
    }

    pub const fn requirement(self) -> &'static str {
        match self {
            Prerequisite::Documents => {
                "at least one verified document is required for this transition"
            }
            Prerequisite::Biometric => "verified biometric data is required for this transition",
            Prerequisite::Payment => "payment completion is required for this transition",
        }
    }
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One legal edge of the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionRule {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub allowed_roles: &'static [Role],
    pub requires_documents: bool,
    pub requires_biometric: bool,
    pub requires_payment: bool,
}

impl TransitionRule {
    const fn edge(
        from: ApplicationStatus,
        to: ApplicationStatus,
        allowed_roles: &'static [Role],
    ) -> Self {
        Self {
            from,
            to,
            allowed_roles,
            requires_documents: false,
            requires_biometric: false,
            requires_payment: false,
        }
    }

    const fn with_documents(mut self) -> Self {
        self.requires_documents = true;
        self
    }

    const fn with_biometric(mut self) -> Self {
        self.requires_biometric = true;
        self
    }

    const fn with_payment(mut self) -> Self {
        self.requires_payment = true;
        self
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }

    /// Declared prerequisites, in check order.
    pub fn prerequisites(&self) -> Vec<Prerequisite> {
        let mut required = Vec::with_capacity(3);
        if self.requires_documents {
            required.push(Prerequisite::Documents);
        }
        if self.requires_biometric {
            required.push(Prerequisite::Biometric);
        }
        if self.requires_payment {
            required.push(Prerequisite::Payment);
        }
        required
    }
}

const APPLICANT: &[Role] = &[Role::Pemohon, Role::Admin];
const OFFICERS: &[Role] = &[Role::PegawaiPendaftaran, Role::PegawaiKonsul, Role::Admin];
const CONSULAR: &[Role] = &[Role::PegawaiKonsul, Role::Admin];
const REGISTRATION: &[Role] = &[Role::PegawaiPendaftaran, Role::Admin];
const APPLICANT_OR_OFFICERS: &[Role] = &[
    Role::Pemohon,
    Role::PegawaiPendaftaran,
    Role::PegawaiKonsul,
    Role::Admin,
];

/// The compiled-in lifecycle graph.
///
/// `DOCUMENTS_VERIFIED -> PENDING_REVIEW` and `PENDING_REVIEW -> SUBMITTED` are correction
/// loops; the first is narrower than its forward edge. `CERTIFICATE_ISSUED` is reachable
/// from both `APPROVED` and `OATH_COMPLETED` so the oath can be skipped.
pub const CANONICAL_RULES: [TransitionRule; 17] = [
    TransitionRule::edge(S::Draft, S::Submitted, APPLICANT),
    TransitionRule::edge(S::Submitted, S::PendingReview, OFFICERS),
    TransitionRule::edge(S::PendingReview, S::DocumentsVerified, OFFICERS).with_documents(),
    TransitionRule::edge(S::DocumentsVerified, S::PendingBiometric, OFFICERS),
    TransitionRule::edge(S::PendingBiometric, S::BiometricCaptured, CONSULAR).with_biometric(),
    TransitionRule::edge(S::BiometricCaptured, S::PendingPayment, CONSULAR),
    TransitionRule::edge(S::PendingPayment, S::PaymentCompleted, APPLICANT_OR_OFFICERS)
        .with_payment(),
    TransitionRule::edge(S::PaymentCompleted, S::UnderReview, CONSULAR).with_payment(),
    TransitionRule::edge(S::UnderReview, S::Approved, CONSULAR),
    TransitionRule::edge(S::UnderReview, S::Rejected, CONSULAR),
    TransitionRule::edge(S::Approved, S::PendingOath, CONSULAR),
    TransitionRule::edge(S::PendingOath, S::OathCompleted, CONSULAR),
    TransitionRule::edge(S::Approved, S::CertificateIssued, REGISTRATION),
    TransitionRule::edge(S::OathCompleted, S::CertificateIssued, REGISTRATION),
    TransitionRule::edge(S::CertificateIssued, S::Completed, REGISTRATION),
    TransitionRule::edge(S::DocumentsVerified, S::PendingReview, CONSULAR),
    TransitionRule::edge(S::PendingReview, S::Submitted, OFFICERS),
];

/// Raised when a rule set declares the same edge twice.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("duplicate transition rule {from} -> {to}")]
pub struct DuplicateRule {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// Indexed, read-only view over a rule set.
#[derive(Debug)]
pub struct RuleTable {
    rules: Vec<TransitionRule>,
    index: HashMap<(ApplicationStatus, ApplicationStatus), usize>,
}

impl RuleTable {
    /// Process-wide table built from [`CANONICAL_RULES`] on first use.
    pub fn canonical() -> &'static RuleTable {
        static TABLE: OnceLock<RuleTable> = OnceLock::new();
        TABLE.get_or_init(|| Self::indexed(CANONICAL_RULES.to_vec()))
    }

    /// Build a table, refusing ambiguous edges.
    pub fn try_new(rules: Vec<TransitionRule>) -> Result<Self, DuplicateRule> {
        let mut seen = HashSet::with_capacity(rules.len());
        for rule in &rules {
            if !seen.insert((rule.from, rule.to)) {
                return Err(DuplicateRule {
                    from: rule.from,
                    to: rule.to,
                });
            }
        }
        Ok(Self::indexed(rules))
    }

    fn indexed(rules: Vec<TransitionRule>) -> Self {
        let mut index = HashMap::with_capacity(rules.len());
        for (position, rule) in rules.iter().enumerate() {
            index.entry((rule.from, rule.to)).or_insert(position);
        }
        Self { rules, index }
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    pub fn rule_for(
        &self,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Option<&TransitionRule> {
        self.index.get(&(from, to)).map(|&position| &self.rules[position])
    }

    pub fn is_legal(&self, from: ApplicationStatus, to: ApplicationStatus, role: Role) -> bool {
        self.rule_for(from, to).is_some_and(|rule| rule.allows(role))
    }

    /// Every state `role` can move an application to in one hop from `from`.
    pub fn valid_targets(&self, from: ApplicationStatus, role: Role) -> Vec<ApplicationStatus> {
        self.transitions_from(from)
            .filter(|rule| rule.allows(role))
            .map(|rule| rule.to)
            .collect()
    }

    pub fn transitions_from(
        &self,
        from: ApplicationStatus,
    ) -> impl Iterator<Item = &TransitionRule> + '_ {
        self.rules.iter().filter(move |rule| rule.from == from)
    }
}

/// Shorthand over [`RuleTable::canonical`].
pub fn valid_transitions(state: ApplicationStatus, role: Role) -> Vec<ApplicationStatus> {
    RuleTable::canonical().valid_targets(state, role)
}

/// Shorthand over [`RuleTable::canonical`].
pub fn is_legal_transition(from: ApplicationStatus, to: ApplicationStatus, role: Role) -> bool {
    RuleTable::canonical().is_legal(from, to, role)
}
