use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for citizenship applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an authenticated user, whether applicant or officer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle states of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    PendingReview,
    DocumentsVerified,
    PendingBiometric,
    BiometricCaptured,
    PendingPayment,
    PaymentCompleted,
    UnderReview,
    Approved,
    Rejected,
    PendingOath,
    OathCompleted,
    CertificateIssued,
    Completed,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 15] = [
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
        ApplicationStatus::Rejected,
        ApplicationStatus::PendingOath,
        ApplicationStatus::OathCompleted,
        ApplicationStatus::CertificateIssued,
        ApplicationStatus::Completed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "DRAFT",
            ApplicationStatus::Submitted => "SUBMITTED",
            ApplicationStatus::PendingReview => "PENDING_REVIEW",
            ApplicationStatus::DocumentsVerified => "DOCUMENTS_VERIFIED",
            ApplicationStatus::PendingBiometric => "PENDING_BIOMETRIC",
            ApplicationStatus::BiometricCaptured => "BIOMETRIC_CAPTURED",
            ApplicationStatus::PendingPayment => "PENDING_PAYMENT",
            ApplicationStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            ApplicationStatus::UnderReview => "UNDER_REVIEW",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::PendingOath => "PENDING_OATH",
            ApplicationStatus::OathCompleted => "OATH_COMPLETED",
            ApplicationStatus::CertificateIssued => "CERTIFICATE_ISSUED",
            ApplicationStatus::Completed => "COMPLETED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Completed | ApplicationStatus::Rejected
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Roles issued by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Applicant.
    Pemohon,
    /// Registration officer.
    PegawaiPendaftaran,
    /// Consular officer.
    PegawaiKonsul,
    Admin,
    /// IT system administrator; operates the platform, not the caseload.
    PentadbirSistemIt,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Pemohon,
        Role::PegawaiPendaftaran,
        Role::PegawaiKonsul,
        Role::Admin,
        Role::PentadbirSistemIt,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Role::Pemohon => "PEMOHON",
            Role::PegawaiPendaftaran => "PEGAWAI_PENDAFTARAN",
            Role::PegawaiKonsul => "PEGAWAI_KONSUL",
            Role::Admin => "ADMIN",
            Role::PentadbirSistemIt => "PENTADBIR_SISTEM_IT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|role| role.label().eq_ignore_ascii_case(code))
    }

    /// Officers may read any application; other roles only their own.
    pub const fn is_officer(self) -> bool {
        matches!(
            self,
            Role::PegawaiPendaftaran | Role::PegawaiKonsul | Role::Admin
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated principal acting on an application. Trusted as supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            role,
        }
    }
}

/// Application categories, each with its own fee and oath profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationCategory {
    /// Citizenship by registration.
    BorangH,
    /// Citizenship by naturalisation.
    BorangG,
    /// Oath administration.
    TadbirSumpah,
}

impl ApplicationCategory {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationCategory::BorangH => "BORANG_H",
            ApplicationCategory::BorangG => "BORANG_G",
            ApplicationCategory::TadbirSumpah => "TADBIR_SUMPAH",
        }
    }

    pub const fn reference_code(self) -> &'static str {
        match self {
            ApplicationCategory::BorangH => "BH",
            ApplicationCategory::BorangG => "BG",
            ApplicationCategory::TadbirSumpah => "TS",
        }
    }

    /// Processing fee in sen.
    pub const fn fee_sen(self) -> u32 {
        match self {
            ApplicationCategory::BorangH => 30_000,
            ApplicationCategory::BorangG => 50_000,
            ApplicationCategory::TadbirSumpah => 10_000,
        }
    }

    pub const fn requires_oath_by_default(self) -> bool {
        matches!(self, ApplicationCategory::TadbirSumpah)
    }
}

/// Category-specific form payload captured at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationForm {
    BorangH {
        child_name: String,
        place_of_birth: String,
        date_of_birth: NaiveDate,
        father_name: String,
        father_ic: String,
        mother_name: String,
        mother_ic: String,
    },
    BorangG {
        applicant_name: String,
        current_nationality: String,
        reason_for_application: String,
        #[serde(default)]
        supporting_documents: Vec<String>,
    },
    TadbirSumpah {
        applicant_name: String,
        approved_application_number: String,
        preferred_oath_date: Option<NaiveDate>,
        location: String,
    },
}

impl ApplicationForm {
    pub const fn category(&self) -> ApplicationCategory {
        match self {
            ApplicationForm::BorangH { .. } => ApplicationCategory::BorangH,
            ApplicationForm::BorangG { .. } => ApplicationCategory::BorangG,
            ApplicationForm::TadbirSumpah { .. } => ApplicationCategory::TadbirSumpah,
        }
    }
}

/// Versioned key/value document attached to history entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionMetadata {
    pub version: u8,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl TransitionMetadata {
    pub const CURRENT_VERSION: u8 = 1;

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_supported(&self) -> bool {
        self.version == Self::CURRENT_VERSION
    }
}

impl Default for TransitionMetadata {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            attributes: BTreeMap::new(),
        }
    }
}

/// The application row. Status changes only through the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub reference_number: String,
    pub category: ApplicationCategory,
    pub applicant_id: UserId,
    pub status: ApplicationStatus,
    pub form: ApplicationForm,
    pub requires_oath: bool,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub review_started_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub decision: Option<String>,
    pub decision_reason: Option<String>,
    pub consular_officer_id: Option<UserId>,
    pub registration_officer_id: Option<UserId>,
}

impl ApplicationRecord {
    /// Fresh draft owned by `applicant_id`.
    pub fn draft(
        id: ApplicationId,
        reference_number: String,
        applicant_id: UserId,
        form: ApplicationForm,
        created_at: DateTime<Utc>,
    ) -> Self {
        let category = form.category();
        Self {
            id,
            reference_number,
            category,
            applicant_id,
            status: ApplicationStatus::Draft,
            form,
            requires_oath: category.requires_oath_by_default(),
            created_at,
            submitted_at: None,
            review_started_at: None,
            decided_at: None,
            completed_at: None,
            decision: None,
            decision_reason: None,
            consular_officer_id: None,
            registration_officer_id: None,
        }
    }

    /// Move into `status`, stamping the lifecycle timestamp that state owns.
    pub fn enter_status(&mut self, status: ApplicationStatus, actor: &Actor, at: DateTime<Utc>) {
        self.status = status;
        match status {
            ApplicationStatus::Submitted => self.submitted_at = Some(at),
            ApplicationStatus::PendingReview => {
                self.review_started_at = Some(at);
                if actor.role == Role::PegawaiPendaftaran {
                    self.registration_officer_id = Some(actor.id.clone());
                }
            }
            ApplicationStatus::Approved | ApplicationStatus::Rejected => {
                self.decided_at = Some(at)
            }
            ApplicationStatus::Completed => self.completed_at = Some(at),
            _ => {}
        }
    }

    pub fn apply_decision(&mut self, decision: &DecisionRecord) {
        self.decision = Some(decision.decision.clone());
        self.decision_reason = Some(decision.reason.clone());
        self.consular_officer_id = Some(decision.officer_id.clone());
    }

    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        actor.role.is_officer() || self.applicant_id == actor.id
    }

    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary {
            id: self.id.clone(),
            reference_number: self.reference_number.clone(),
            current_status: self.status,
        }
    }
}

/// Decision text written alongside an approve/reject transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: String,
    pub reason: String,
    pub officer_id: UserId,
}

/// Compact identity of an application used in read views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub reference_number: String,
    pub current_status: ApplicationStatus,
}

/// Immutable record of one executed transition. `from_status` is `None` for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub id: u64,
    pub application_id: ApplicationId,
    pub from_status: Option<ApplicationStatus>,
    pub to_status: ApplicationStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub notes: String,
    pub metadata: TransitionMetadata,
    pub recorded_at: DateTime<Utc>,
}

/// History entry awaiting an id from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub application_id: ApplicationId,
    pub from_status: Option<ApplicationStatus>,
    pub to_status: ApplicationStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub notes: String,
    pub metadata: TransitionMetadata,
    pub recorded_at: DateTime<Utc>,
}

impl NewHistoryEntry {
    pub fn into_entry(self, id: u64) -> WorkflowHistoryEntry {
        WorkflowHistoryEntry {
            id,
            application_id: self.application_id,
            from_status: self.from_status,
            to_status: self.to_status,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            notes: self.notes,
            metadata: self.metadata,
            recorded_at: self.recorded_at,
        }
    }
}

/// Verification outcome of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentVerification {
    Pending,
    OcrProcessing,
    OcrCompleted,
    RequiresManualCheck,
    Verified,
    Rejected,
}

impl DocumentVerification {
    pub const fn is_verified(self) -> bool {
        matches!(self, DocumentVerification::Verified)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvidence {
    pub document_id: String,
    pub verification: DocumentVerification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricEvidence {
    pub biometric_id: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn is_completed(self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvidence {
    pub payment_id: String,
    pub amount_sen: u32,
    pub status: PaymentStatus,
}
