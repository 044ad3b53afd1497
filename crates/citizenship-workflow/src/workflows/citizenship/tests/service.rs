use super::common::*;
use chrono::{Datelike, Utc};
use std::sync::Arc;

use crate::config::WorkflowConfig;
use crate::workflows::citizenship::audit::AuditAction;
use crate::workflows::citizenship::domain::{
    ApplicationCategory, ApplicationId, ApplicationStatus, Role, TransitionMetadata,
};
use crate::workflows::citizenship::engine::{TransitionError, TransitionRequest};
use crate::workflows::citizenship::repository::RepositoryError;
use crate::workflows::citizenship::rules::Prerequisite;
use crate::workflows::citizenship::{
    ApplicationFilter, ApplicationServiceError, CitizenshipApplicationService,
    InMemoryApplicationStore, MAX_PAGE_SIZE,
};

#[test]
fn create_opens_a_draft_with_sequential_reference_numbers() {
    let (service, store, audit) = build_service();
    let year = Utc::now().year();

    let first = service
        .create(&applicant(), borang_h_form())
        .expect("first draft");
    let second = service
        .create(&other_applicant(), borang_h_form())
        .expect("second draft");
    let naturalisation = service
        .create(&applicant(), borang_g_form())
        .expect("naturalisation draft");

    assert_eq!(first.status, ApplicationStatus::Draft);
    assert_eq!(first.applicant_id, applicant().id);
    assert_eq!(first.reference_number, format!("SPK-BH-{year}-00001"));
    assert_eq!(second.reference_number, format!("SPK-BH-{year}-00002"));
    assert_eq!(
        naturalisation.reference_number,
        format!("SPK-BG-{year}-00001")
    );
    assert_ne!(first.id, second.id);

    let history = history_of(&store, &first.id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, None);
    assert_eq!(history[0].to_status, ApplicationStatus::Draft);
    assert_eq!(history[0].notes, "Application created");

    let entries = audit.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].action, AuditAction::Create);
    assert_eq!(entries[0].entity_id, first.id);
    assert_eq!(
        entries[0].changes.get("reference_number"),
        Some(&first.reference_number)
    );
}

#[test]
fn category_follows_the_form_and_sets_oath_default() {
    let (service, _, _) = build_service();

    let oath = service
        .create(&applicant(), tadbir_sumpah_form())
        .expect("oath draft");
    assert_eq!(oath.category, ApplicationCategory::TadbirSumpah);
    assert!(oath.requires_oath);
    assert!(oath.reference_number.starts_with("SPK-TS-"));

    let registration = draft(&service);
    assert_eq!(registration.category, ApplicationCategory::BorangH);
    assert!(!registration.requires_oath);
}

#[test]
fn configured_prefix_is_used_for_reference_numbers() {
    let service = CitizenshipApplicationService::new(
        Arc::new(InMemoryApplicationStore::new()),
        Arc::new(MemoryAudit::default()),
        WorkflowConfig::new("jpn").expect("valid prefix"),
    );

    let record = draft(&service);
    assert!(record.reference_number.starts_with("JPN-BH-"), "{}", record.reference_number);
}

#[test]
fn reads_are_limited_to_owner_and_officers() {
    let (service, _, _) = build_service();
    let record = draft(&service);

    service.get(&applicant(), &record.id).expect("owner reads");
    service
        .history(&consular_officer(), &record.id)
        .expect("officer reads history");

    match service.get(&other_applicant(), &record.id) {
        Err(ApplicationServiceError::AccessDenied {
            actor_id,
            application_id,
        }) => {
            assert_eq!(actor_id, other_applicant().id);
            assert_eq!(application_id, record.id);
        }
        other => panic!("expected access denied, got {other:?}"),
    }
    assert!(matches!(
        service.available_transitions(&it_admin(), &record.id),
        Err(ApplicationServiceError::AccessDenied { .. })
    ));
    assert!(matches!(
        service.get(&admin(), &ApplicationId("app-missing".to_string())),
        Err(ApplicationServiceError::NotFound(_))
    ));
}

#[test]
fn available_transitions_separate_role_moves_from_all_edges() {
    let (service, _, _) = build_service();
    let record = advance_to(&service, &draft(&service), ApplicationStatus::PendingReview);

    let view = service
        .available_transitions(&registration_officer(), &record.id)
        .expect("officer lists transitions");

    assert_eq!(view.application.current_status, ApplicationStatus::PendingReview);
    assert_eq!(
        view.valid_transitions,
        vec![
            ApplicationStatus::DocumentsVerified,
            ApplicationStatus::Submitted
        ]
    );
    assert_eq!(view.all_possible_transitions.len(), 2);
    let forward = &view.all_possible_transitions[0];
    assert_eq!(forward.to, ApplicationStatus::DocumentsVerified);
    assert!(forward.requires_documents);
    assert!(forward.allowed_roles.contains(&Role::PegawaiKonsul));

    let owner_view = service
        .available_transitions(&applicant(), &record.id)
        .expect("owner lists transitions");
    assert!(owner_view.valid_transitions.is_empty());
    assert_eq!(owner_view.all_possible_transitions.len(), 2);
}

#[test]
fn transition_returns_next_moves_and_audits_status_change() {
    let (service, _, audit) = build_service();
    let record = draft(&service);

    let view = service
        .transition(
            TransitionRequest::new(record.id.clone(), ApplicationStatus::Submitted, applicant())
                .with_notes("Ready for review")
                .with_metadata(TransitionMetadata::default().with_attribute("channel", "web")),
        )
        .expect("owner submits");

    assert_eq!(view.application.status, ApplicationStatus::Submitted);
    assert!(view.valid_next_transitions.is_empty());

    let entry = audit.entries().pop().expect("audit recorded");
    assert_eq!(entry.action, AuditAction::Update);
    assert_eq!(entry.actor_role, Role::Pemohon);
    assert_eq!(entry.changes.get("status.before").map(String::as_str), Some("DRAFT"));
    assert_eq!(entry.changes.get("status.after").map(String::as_str), Some("SUBMITTED"));
    assert_eq!(entry.changes.get("notes").map(String::as_str), Some("Ready for review"));
    assert_eq!(entry.changes.get("metadata.channel").map(String::as_str), Some("web"));
}

#[test]
fn applicants_cannot_act_on_applications_they_do_not_own() {
    let (service, store, audit) = build_service();
    let record = draft(&service);
    let audited = audit.entries().len();

    match service.transition(TransitionRequest::new(
        record.id.clone(),
        ApplicationStatus::Submitted,
        other_applicant(),
    )) {
        Err(ApplicationServiceError::AccessDenied { .. }) => {}
        other => panic!("expected access denied, got {other:?}"),
    }

    assert_eq!(history_of(&store, &record.id).len(), 1);
    assert_eq!(audit.entries().len(), audited);
}

#[test]
fn unsupported_metadata_version_is_refused() {
    let (service, store, _) = build_service();
    let record = draft(&service);
    let metadata = TransitionMetadata {
        version: 9,
        ..TransitionMetadata::default()
    };

    let err = service
        .transition(
            TransitionRequest::new(record.id.clone(), ApplicationStatus::Submitted, applicant())
                .with_metadata(metadata),
        )
        .expect_err("future metadata refused");

    assert!(matches!(err, ApplicationServiceError::UnsupportedMetadata(9)));
    assert_eq!(err.kind(), "invalid_request");
    assert_eq!(history_of(&store, &record.id).len(), 1);
}

#[test]
fn business_errors_pass_through_with_their_kind() {
    let (service, _, _) = build_service();
    let record = advance_to(&service, &draft(&service), ApplicationStatus::PendingReview);

    let err = service
        .transition(TransitionRequest::new(
            record.id.clone(),
            ApplicationStatus::DocumentsVerified,
            registration_officer(),
        ))
        .expect_err("no documents yet");

    assert!(matches!(
        err,
        ApplicationServiceError::Transition(TransitionError::PrerequisiteNotMet(
            Prerequisite::Documents
        ))
    ));
    assert_eq!(err.kind(), "prerequisite_not_met");
}

#[test]
fn approve_and_reject_are_audited_with_decision_details() {
    let (service, _, audit) = build_service();
    let approved = advance_to(&service, &draft(&service), ApplicationStatus::UnderReview);
    let rejected = advance_to(&service, &draft(&service), ApplicationStatus::UnderReview);

    let view = service
        .approve(&consular_officer(), &approved.id, None, Some("All checks passed"))
        .expect("approval");
    assert_eq!(
        view.valid_next_transitions,
        vec![ApplicationStatus::PendingOath]
    );
    let entry = audit.entries().pop().expect("approval audited");
    assert_eq!(entry.action, AuditAction::Approve);
    assert_eq!(
        entry.changes.get("decision_reason").map(String::as_str),
        Some("All checks passed")
    );

    service
        .reject(&consular_officer(), &rejected.id, Some("Incomplete file"))
        .expect("rejection");
    let entry = audit.entries().pop().expect("rejection audited");
    assert_eq!(entry.action, AuditAction::Reject);
    assert_eq!(entry.entity_id, rejected.id);
}

#[test]
fn audit_failure_does_not_undo_a_committed_transition() {
    let store = Arc::new(InMemoryApplicationStore::new());
    let service = CitizenshipApplicationService::new(
        store.clone(),
        Arc::new(FailingAudit),
        WorkflowConfig::default(),
    );

    let record = service
        .create(&applicant(), borang_h_form())
        .expect("create succeeds without audit");
    let view = service
        .transition(TransitionRequest::new(
            record.id.clone(),
            ApplicationStatus::Submitted,
            applicant(),
        ))
        .expect("transition succeeds without audit");

    assert_eq!(view.application.status, ApplicationStatus::Submitted);
    assert_eq!(history_of(&store, &record.id).len(), 2);
}

#[test]
fn evidence_recording_enforces_roles() {
    let (service, _, _) = build_service();
    let record = draft(&service);

    assert!(matches!(
        service.record_document(&applicant(), &record.id, verified_document("passport")),
        Err(ApplicationServiceError::OfficerRequired {
            role: Role::Pemohon
        })
    ));
    assert!(matches!(
        service.record_biometric(&applicant(), &record.applicant_id, verified_biometric()),
        Err(ApplicationServiceError::OfficerRequired { .. })
    ));
    service
        .record_payment(
            &applicant(),
            &record.id,
            completed_payment(record.category),
        )
        .expect("owner records payment");
    assert!(matches!(
        service.record_payment(
            &other_applicant(),
            &record.id,
            completed_payment(record.category)
        ),
        Err(ApplicationServiceError::AccessDenied { .. })
    ));
    assert!(matches!(
        service.record_document(
            &registration_officer(),
            &ApplicationId("app-missing".to_string()),
            verified_document("passport")
        ),
        Err(ApplicationServiceError::NotFound(_))
    ));
}

#[test]
fn store_outage_surfaces_as_persistence_failure() {
    let service = CitizenshipApplicationService::new(
        Arc::new(UnavailableStore),
        Arc::new(MemoryAudit::default()),
        WorkflowConfig::default(),
    );

    let err = service
        .create(&applicant(), borang_h_form())
        .expect_err("store offline");
    assert!(matches!(
        err,
        ApplicationServiceError::Transition(TransitionError::Persistence(
            RepositoryError::Unavailable(_)
        ))
    ));
    assert_eq!(err.kind(), "persistence_failure");

    let err = service
        .get(&admin(), &ApplicationId("app-1".to_string()))
        .expect_err("store offline");
    assert!(matches!(err, ApplicationServiceError::Repository(_)));
    assert_eq!(err.kind(), "persistence_failure");
}

#[test]
fn list_scopes_applicants_to_their_own_rows_newest_first() {
    let (service, _, _) = build_service();
    let first = draft(&service);
    let second = service
        .create(&applicant(), borang_g_form())
        .expect("second draft");
    let foreign = service
        .create(&other_applicant(), borang_h_form())
        .expect("foreign draft");

    let own = service
        .list(&applicant(), ApplicationFilter::default())
        .expect("applicant lists");
    let ids: Vec<_> = own.applications.iter().map(|row| row.id.clone()).collect();
    assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);
    assert_eq!(own.pagination.total, 2);

    let theirs = service
        .list(&other_applicant(), ApplicationFilter::default())
        .expect("other applicant lists");
    let ids: Vec<_> = theirs.applications.iter().map(|row| row.id.clone()).collect();
    assert_eq!(ids, vec![foreign.id.clone()]);

    let everything = service
        .list(&registration_officer(), ApplicationFilter::default())
        .expect("officer lists");
    assert_eq!(everything.pagination.total, 3);
    assert_eq!(everything.applications[0].id, foreign.id);

    let nothing = service
        .list(&it_admin(), ApplicationFilter::default())
        .expect("it admin lists");
    assert!(nothing.applications.is_empty());
    assert_eq!(nothing.pagination.total, 0);
    assert_eq!(nothing.pagination.total_pages, 0);
}

#[test]
fn list_filters_by_status_and_category() {
    let (service, _, _) = build_service();
    let submitted = advance_to(&service, &draft(&service), ApplicationStatus::Submitted);
    let naturalisation = service
        .create(&applicant(), borang_g_form())
        .expect("naturalisation draft");

    let by_status = service
        .list(
            &consular_officer(),
            ApplicationFilter {
                status: Some(ApplicationStatus::Submitted),
                ..ApplicationFilter::default()
            },
        )
        .expect("status filter");
    assert_eq!(by_status.applications.len(), 1);
    assert_eq!(by_status.applications[0].id, submitted.id);

    let by_category = service
        .list(
            &consular_officer(),
            ApplicationFilter {
                category: Some(ApplicationCategory::BorangG),
                ..ApplicationFilter::default()
            },
        )
        .expect("category filter");
    assert_eq!(by_category.applications.len(), 1);
    assert_eq!(by_category.applications[0].id, naturalisation.id);

    let neither = service
        .list(
            &consular_officer(),
            ApplicationFilter {
                status: Some(ApplicationStatus::Submitted),
                category: Some(ApplicationCategory::BorangG),
                ..ApplicationFilter::default()
            },
        )
        .expect("combined filter");
    assert!(neither.applications.is_empty());
}

#[test]
fn list_paginates_and_clamps_the_page_size() {
    let (service, _, _) = build_service();
    let oldest = draft(&service);
    draft(&service);
    draft(&service);

    let second_page = service
        .list(
            &applicant(),
            ApplicationFilter {
                page: Some(2),
                limit: Some(2),
                ..ApplicationFilter::default()
            },
        )
        .expect("second page");
    assert_eq!(second_page.pagination.page, 2);
    assert_eq!(second_page.pagination.limit, 2);
    assert_eq!(second_page.pagination.total, 3);
    assert_eq!(second_page.pagination.total_pages, 2);
    assert_eq!(second_page.applications.len(), 1);
    assert_eq!(second_page.applications[0].id, oldest.id);

    let defaulted = service
        .list(
            &applicant(),
            ApplicationFilter {
                page: Some(0),
                limit: Some(0),
                ..ApplicationFilter::default()
            },
        )
        .expect("defaults apply");
    assert_eq!(defaulted.pagination.page, 1);
    assert_eq!(defaulted.pagination.limit, 10);
    assert_eq!(defaulted.applications.len(), 3);

    let capped = service
        .list(
            &applicant(),
            ApplicationFilter {
                limit: Some(1000),
                ..ApplicationFilter::default()
            },
        )
        .expect("cap applies");
    assert_eq!(capped.pagination.limit, MAX_PAGE_SIZE);
    assert_eq!(capped.pagination.total_pages, 1);

    let past_end = service
        .list(
            &applicant(),
            ApplicationFilter {
                page: Some(5),
                limit: Some(2),
                ..ApplicationFilter::default()
            },
        )
        .expect("past the end");
    assert!(past_end.applications.is_empty());
    assert_eq!(past_end.pagination.total, 3);
}

#[test]
fn list_surfaces_repository_outages() {
    let service = CitizenshipApplicationService::new(
        Arc::new(UnavailableStore),
        Arc::new(MemoryAudit::default()),
        WorkflowConfig::default(),
    );

    match service.list(&registration_officer(), ApplicationFilter::default()) {
        Err(ApplicationServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected repository outage, got {other:?}"),
    }
}
