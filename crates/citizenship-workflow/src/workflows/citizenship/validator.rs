use super::domain::{ApplicationStatus, Role};
use super::rules::RuleTable;

/// Role-aware legality check over a rule table.
///
/// Self-transitions are never declared as edges, so they are always illegal here; the
/// engine reports them as a no-op before consulting the validator.
#[derive(Debug, Clone, Copy)]
pub struct TransitionValidator {
    rules: &'static RuleTable,
}

impl TransitionValidator {
    pub fn new(rules: &'static RuleTable) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'static RuleTable {
        self.rules
    }

    pub fn validate(&self, from: ApplicationStatus, to: ApplicationStatus, role: Role) -> bool {
        self.rules.is_legal(from, to, role)
    }
}

impl Default for TransitionValidator {
    fn default() -> Self {
        Self::new(RuleTable::canonical())
    }
}
