use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::audit::AuditSink;
use super::domain::{
    Actor, ApplicationForm, ApplicationId, ApplicationStatus, BiometricEvidence,
    DocumentEvidence, PaymentEvidence, Role, TransitionMetadata, UserId,
};
use super::engine::{TransitionError, TransitionRequest};
use super::repository::{ApplicationRepository, EvidenceRepository};
use super::service::{ApplicationServiceError, CitizenshipApplicationService};
use super::views::ApplicationFilter;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<R, A> = Arc<CitizenshipApplicationService<R, A>>;

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub to_status: ApplicationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<TransitionMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub decision_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub decision_reason: Option<String>,
}

/// Router exposing the application lifecycle over HTTP.
///
/// The caller identity comes from the `x-actor-id` / `x-actor-role` headers set by the
/// upstream gateway.
pub fn application_router<R, A>(service: SharedService<R, A>) -> Router
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            get(list_handler::<R, A>).post(create_handler::<R, A>),
        )
        .route("/api/v1/applications/:application_id", get(get_handler::<R, A>))
        .route(
            "/api/v1/applications/:application_id/history",
            get(history_handler::<R, A>),
        )
        .route(
            "/api/v1/applications/:application_id/transitions",
            get(transitions_handler::<R, A>),
        )
        .route(
            "/api/v1/applications/:application_id/transition",
            post(transition_handler::<R, A>),
        )
        .route(
            "/api/v1/applications/:application_id/approve",
            post(approve_handler::<R, A>),
        )
        .route(
            "/api/v1/applications/:application_id/reject",
            post(reject_handler::<R, A>),
        )
        .route(
            "/api/v1/applications/:application_id/documents",
            post(document_handler::<R, A>),
        )
        .route(
            "/api/v1/applications/:application_id/payments",
            post(payment_handler::<R, A>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/biometrics",
            post(biometric_handler::<R, A>),
        )
        .with_state(service)
}

pub(crate) async fn create_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    headers: HeaderMap,
    body: Result<Json<ApplicationForm>, JsonRejection>,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Json(form) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match service.create(&actor, form) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    headers: HeaderMap,
    query: Result<Query<ApplicationFilter>, QueryRejection>,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Query(filter) = match query {
        Ok(query) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match service.list(&actor, filter) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.get(&actor, &ApplicationId(application_id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn history_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.history(&actor, &ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn transitions_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.available_transitions(&actor, &ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn transition_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let request = TransitionRequest {
        application_id: ApplicationId(application_id),
        to_status: body.to_status,
        actor,
        notes: body.notes,
        metadata: body.metadata,
    };
    match service.transition(request) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let body: ApproveBody = match optional_json(&headers, &body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    match service.approve(
        &actor,
        &ApplicationId(application_id),
        body.decision.as_deref(),
        body.decision_reason.as_deref(),
    ) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let body: RejectBody = match optional_json(&headers, &body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    match service.reject(
        &actor,
        &ApplicationId(application_id),
        body.decision_reason.as_deref(),
    ) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn document_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<DocumentEvidence>, JsonRejection>,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Json(evidence) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match service.record_document(&actor, &ApplicationId(application_id), evidence) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn payment_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<PaymentEvidence>, JsonRejection>,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Json(evidence) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match service.record_payment(&actor, &ApplicationId(application_id), evidence) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn biometric_handler<R, A>(
    State(service): State<SharedService<R, A>>,
    Path(applicant_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<BiometricEvidence>, JsonRejection>,
) -> Response
where
    R: ApplicationRepository + EvidenceRepository + 'static,
    A: AuditSink + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let Json(evidence) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match service.record_biometric(&actor, &UserId(applicant_id), evidence) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let Some(actor_id) = header_value(headers, ACTOR_ID_HEADER) else {
        return Err(unauthenticated(format!("missing {ACTOR_ID_HEADER} header")));
    };
    let Some(role) = header_value(headers, ACTOR_ROLE_HEADER) else {
        return Err(unauthenticated(format!("missing {ACTOR_ROLE_HEADER} header")));
    };
    let Some(role) = Role::from_code(role) else {
        return Err(unauthenticated(format!("unknown role {role}")));
    };

    Ok(Actor::new(actor_id, role))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn unauthenticated(message: String) -> Response {
    let payload = json!({
        "error": message,
        "kind": "unauthenticated",
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

/// Decode a body that may be omitted. Only an empty body falls back to the defaults.
fn optional_json<T>(headers: &HeaderMap, body: &Bytes) -> Result<T, Response>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    if !has_json_content_type(headers) {
        return Err(bad_request(
            "Expected request with `Content-Type: application/json`".to_string(),
        ));
    }
    Json::<T>::from_bytes(body)
        .map(|Json(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = header_value(headers, header::CONTENT_TYPE.as_str()) else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn bad_request(message: String) -> Response {
    let payload = json!({
        "error": message,
        "kind": "invalid_request",
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

/// HTTP status for a service failure.
pub fn error_status(err: &ApplicationServiceError) -> StatusCode {
    match err {
        ApplicationServiceError::Transition(err) => match err {
            TransitionError::NotFound(_) => StatusCode::NOT_FOUND,
            TransitionError::NoOp { .. } | TransitionError::Conflict { .. } => {
                StatusCode::CONFLICT
            }
            TransitionError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            TransitionError::PrerequisiteNotMet(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TransitionError::MissingDecisionReason => StatusCode::BAD_REQUEST,
            TransitionError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ApplicationServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ApplicationServiceError::AccessDenied { .. }
        | ApplicationServiceError::OfficerRequired { .. } => StatusCode::FORBIDDEN,
        ApplicationServiceError::UnsupportedMetadata(_) => StatusCode::BAD_REQUEST,
        ApplicationServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: ApplicationServiceError) -> Response {
    let status = error_status(&err);
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "application request failed");
        "internal persistence failure".to_string()
    } else {
        err.to_string()
    };

    let payload = json!({
        "error": message,
        "kind": err.kind(),
    });
    (status, Json(payload)).into_response()
}
