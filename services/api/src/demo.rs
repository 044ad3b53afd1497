use crate::infra::{parse_category, parse_role};
use chrono::NaiveDate;
use citizenship_workflow::config::WorkflowConfig;
use citizenship_workflow::error::AppError;
use citizenship_workflow::workflows::citizenship::{
    Actor, ApplicationCategory, ApplicationForm, ApplicationId, ApplicationStatus,
    BiometricEvidence, CitizenshipApplicationService, DocumentEvidence, DocumentVerification,
    InMemoryApplicationStore, PaymentEvidence, PaymentStatus, Role, RuleTable, TracingAuditSink,
    TransitionRequest,
};
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Application category to walk (BORANG_H, BORANG_G or TADBIR_SUMPAH)
    #[arg(long, default_value = "BORANG_H", value_parser = parse_category)]
    pub(crate) category: ApplicationCategory,
    /// Issue the certificate straight after approval
    #[arg(long)]
    pub(crate) skip_oath: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RulesArgs {
    /// Only list edges this role may drive
    #[arg(long, value_parser = parse_role)]
    pub(crate) role: Option<Role>,
}

type DemoService = CitizenshipApplicationService<InMemoryApplicationStore, TracingAuditSink>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let service = CitizenshipApplicationService::new(
        Arc::new(InMemoryApplicationStore::new()),
        Arc::new(TracingAuditSink),
        WorkflowConfig::default(),
    );
    let applicant = Actor::new("pemohon-demo", Role::Pemohon);
    let registration = Actor::new("pendaftaran-demo", Role::PegawaiPendaftaran);
    let consular = Actor::new("konsul-demo", Role::PegawaiKonsul);

    let record = service.create(&applicant, sample_form(args.category))?;
    println!(
        "Created {} ({}) for {}",
        record.reference_number,
        record.category.label(),
        record.applicant_id
    );

    step(&service, &record.id, ApplicationStatus::Submitted, &applicant)?;
    step(&service, &record.id, ApplicationStatus::PendingReview, &registration)?;
    service.record_document(
        &registration,
        &record.id,
        DocumentEvidence {
            document_id: "birth-certificate".to_string(),
            verification: DocumentVerification::Verified,
        },
    )?;
    step(&service, &record.id, ApplicationStatus::DocumentsVerified, &registration)?;
    step(&service, &record.id, ApplicationStatus::PendingBiometric, &consular)?;
    service.record_biometric(
        &consular,
        &record.applicant_id,
        BiometricEvidence {
            biometric_id: "bio-demo".to_string(),
            verified: true,
        },
    )?;
    step(&service, &record.id, ApplicationStatus::BiometricCaptured, &consular)?;
    step(&service, &record.id, ApplicationStatus::PendingPayment, &consular)?;
    service.record_payment(
        &applicant,
        &record.id,
        PaymentEvidence {
            payment_id: "pay-demo".to_string(),
            amount_sen: record.category.fee_sen(),
            status: PaymentStatus::Completed,
        },
    )?;
    step(&service, &record.id, ApplicationStatus::PaymentCompleted, &applicant)?;
    step(&service, &record.id, ApplicationStatus::UnderReview, &consular)?;

    let view = service.approve(&consular, &record.id, None, Some("Demo approval"))?;
    println!(
        "  {} -> {} as {}",
        ApplicationStatus::UnderReview,
        view.application.status,
        consular.role
    );

    if !args.skip_oath {
        step(&service, &record.id, ApplicationStatus::PendingOath, &consular)?;
        step(&service, &record.id, ApplicationStatus::OathCompleted, &consular)?;
    }
    step(&service, &record.id, ApplicationStatus::CertificateIssued, &registration)?;
    step(&service, &record.id, ApplicationStatus::Completed, &registration)?;

    let history = service.history(&consular, &record.id)?;
    println!();
    println!(
        "History for {} ({} entries):",
        history.application.reference_number,
        history.history.len()
    );
    for entry in &history.history {
        let from = entry
            .from_status
            .map(|status| status.label())
            .unwrap_or("-");
        println!(
            "  #{:<3} {:<20} -> {:<20} {:<20} {}",
            entry.id,
            from,
            entry.to_status.label(),
            entry.actor_role.label(),
            entry.notes
        );
    }

    Ok(())
}

pub(crate) fn run_rules(args: RulesArgs) {
    let table = RuleTable::canonical();
    println!(
        "{:<20} {:<20} {:<5} {:<5} {:<5} roles",
        "from", "to", "docs", "bio", "pay"
    );
    for rule in table.rules() {
        if let Some(role) = args.role {
            if !rule.allows(role) {
                continue;
            }
        }
        let roles: Vec<_> = rule.allowed_roles.iter().map(|role| role.label()).collect();
        println!(
            "{:<20} {:<20} {:<5} {:<5} {:<5} {}",
            rule.from.label(),
            rule.to.label(),
            flag(rule.requires_documents),
            flag(rule.requires_biometric),
            flag(rule.requires_payment),
            roles.join(",")
        );
    }
}

fn step(
    service: &DemoService,
    application_id: &ApplicationId,
    to: ApplicationStatus,
    actor: &Actor,
) -> Result<(), AppError> {
    let view = service.transition(TransitionRequest::new(
        application_id.clone(),
        to,
        actor.clone(),
    ))?;
    let from = view
        .history_entry
        .from_status
        .map(|status| status.label())
        .unwrap_or("-");
    println!("  {from} -> {} as {}", view.application.status, actor.role);
    Ok(())
}

fn flag(required: bool) -> &'static str {
    if required {
        "yes"
    } else {
        "-"
    }
}

fn sample_form(category: ApplicationCategory) -> ApplicationForm {
    let date = |year, month, day| NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default();
    match category {
        ApplicationCategory::BorangH => ApplicationForm::BorangH {
            child_name: "Aisyah binti Rahman".to_string(),
            place_of_birth: "London".to_string(),
            date_of_birth: date(2023, 4, 12),
            father_name: "Rahman bin Yusof".to_string(),
            father_ic: "850101-14-5521".to_string(),
            mother_name: "Siti binti Ahmad".to_string(),
            mother_ic: "870303-10-6642".to_string(),
        },
        ApplicationCategory::BorangG => ApplicationForm::BorangG {
            applicant_name: "Daniel Tan".to_string(),
            current_nationality: "Singaporean".to_string(),
            reason_for_application: "Long-term residence".to_string(),
            supporting_documents: vec!["residence-permit".to_string()],
        },
        ApplicationCategory::TadbirSumpah => ApplicationForm::TadbirSumpah {
            applicant_name: "Daniel Tan".to_string(),
            approved_application_number: "SPK-BG-2024-00001".to_string(),
            preferred_oath_date: Some(date(2025, 1, 15)),
            location: "Putrajaya".to_string(),
        },
    }
}
