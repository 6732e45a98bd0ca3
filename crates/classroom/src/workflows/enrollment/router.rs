use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{AdmissionOutcome, CourseId, InstructorId, StudentId};
use super::notifications::NotificationStore;
use super::repository::{CourseStore, IdentityDirectory, StoreError};
use super::service::{AdmissionError, CourseAdmissionService};

type SharedService<S, N, D> = Arc<CourseAdmissionService<S, N, D>>;

/// Body for a new enrollment attempt. Authentication is upstream; `requester_id` is trusted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrollmentAttempt {
    pub student_id: StudentId,
    pub requester_id: StudentId,
}

/// Body for actions taken on an existing enrollment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrollmentAction {
    pub requester_id: StudentId,
}

/// Router builder exposing the admission operations over HTTP.
pub fn enrollment_router<S, N, D>(service: SharedService<S, N, D>) -> Router
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/courses/:course_id/enrollments",
            post(request_handler::<S, N, D>),
        )
        .route(
            "/api/v1/courses/:course_id/enrollments/:student_id/cancel",
            post(cancel_handler::<S, N, D>),
        )
        .route(
            "/api/v1/courses/:course_id/enrollments/:student_id/approve",
            post(approve_handler::<S, N, D>),
        )
        .route(
            "/api/v1/courses/:course_id/enrollments/:student_id/deny",
            post(deny_handler::<S, N, D>),
        )
        .route(
            "/api/v1/courses/:course_id/roster",
            get(roster_handler::<S, N, D>),
        )
        .route(
            "/api/v1/instructors/:instructor_id/notifications",
            get(notifications_handler::<S, N, D>),
        )
        .with_state(service)
}

pub(crate) async fn request_handler<S, N, D>(
    State(service): State<SharedService<S, N, D>>,
    Path(course_id): Path<String>,
    axum::Json(attempt): axum::Json<EnrollmentAttempt>,
) -> Response
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    let course_id = CourseId(course_id);
    let student = attempt.student_id.clone();
    let course = course_id.clone();
    let result = run_blocking(service, move |service| {
        service.request_enrollment(&course, &attempt.student_id, &attempt.requester_id)
    })
    .await;

    match result {
        Ok(outcome) => {
            let status = match outcome {
                AdmissionOutcome::Enrolled | AdmissionOutcome::EnrolledViaOverride => {
                    StatusCode::CREATED
                }
                AdmissionOutcome::Waitlisted { .. } | AdmissionOutcome::PendingApproval => {
                    StatusCode::ACCEPTED
                }
            };
            outcome_response(status, &course_id, &student, outcome)
        }
        Err(response) => response,
    }
}

pub(crate) async fn cancel_handler<S, N, D>(
    State(service): State<SharedService<S, N, D>>,
    Path((course_id, student_id)): Path<(String, String)>,
    axum::Json(action): axum::Json<EnrollmentAction>,
) -> Response
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    let (course_id, student) = (CourseId(course_id), StudentId(student_id));
    let (course, target) = (course_id.clone(), student.clone());
    let result = run_blocking(service, move |service| {
        service.cancel_enrollment(&course, &target, &action.requester_id)
    })
    .await;

    match result {
        Ok(outcome) => outcome_response(StatusCode::OK, &course_id, &student, outcome),
        Err(response) => response,
    }
}

pub(crate) async fn approve_handler<S, N, D>(
    State(service): State<SharedService<S, N, D>>,
    Path((course_id, student_id)): Path<(String, String)>,
    axum::Json(action): axum::Json<EnrollmentAction>,
) -> Response
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    let (course_id, student) = (CourseId(course_id), StudentId(student_id));
    let (course, target) = (course_id.clone(), student.clone());
    let result = run_blocking(service, move |service| {
        service.approve_enrollment(&course, &target, &action.requester_id)
    })
    .await;

    match result {
        Ok(outcome) => outcome_response(StatusCode::OK, &course_id, &student, outcome),
        Err(response) => response,
    }
}

pub(crate) async fn deny_handler<S, N, D>(
    State(service): State<SharedService<S, N, D>>,
    Path((course_id, student_id)): Path<(String, String)>,
    axum::Json(action): axum::Json<EnrollmentAction>,
) -> Response
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    let (course_id, student) = (CourseId(course_id), StudentId(student_id));
    let (course, target) = (course_id.clone(), student.clone());
    let result = run_blocking(service, move |service| {
        service.deny_enrollment(&course, &target, &action.requester_id)
    })
    .await;

    match result {
        Ok(outcome) => outcome_response(StatusCode::OK, &course_id, &student, outcome),
        Err(response) => response,
    }
}

pub(crate) async fn roster_handler<S, N, D>(
    State(service): State<SharedService<S, N, D>>,
    Path(course_id): Path<String>,
) -> Response
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    let course_id = CourseId(course_id);
    match run_blocking(service, move |service| service.roster(&course_id)).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn notifications_handler<S, N, D>(
    State(service): State<SharedService<S, N, D>>,
    Path(instructor_id): Path<String>,
) -> Response
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    let instructor = InstructorId(instructor_id);
    let result =
        run_blocking(service, move |service| service.notifications_for(&instructor)).await;

    match result {
        Ok(notifications) => {
            let payload: Vec<_> = notifications
                .into_iter()
                .map(|notification| {
                    json!({
                        "id": notification.id,
                        "course_id": notification.course,
                        "kind": notification.kind.label(),
                        "count": notification.count,
                        "message": notification.message(),
                        "updated_at": notification.updated_at,
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

/// Service calls take course locks and hit the stores synchronously, so they run on the
/// blocking pool rather than on a runtime worker.
async fn run_blocking<S, N, D, T, F>(
    service: SharedService<S, N, D>,
    op: F,
) -> Result<T, Response>
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
    T: Send + 'static,
    F: FnOnce(&CourseAdmissionService<S, N, D>) -> Result<T, AdmissionError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(error_response(err)),
        Err(join_error) => {
            error!(error = %join_error, "admission task did not complete");
            let payload = json!({ "error": "admission task did not complete" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response())
        }
    }
}

fn outcome_response<T: Serialize>(
    status: StatusCode,
    course_id: &CourseId,
    student: &StudentId,
    outcome: T,
) -> Response {
    let payload = json!({
        "course_id": course_id,
        "student_id": student,
        "result": outcome,
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) fn status_for(err: &AdmissionError) -> StatusCode {
    match err {
        AdmissionError::CourseNotFound(_) | AdmissionError::StudentNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        AdmissionError::AlreadyEnrolled { .. }
        | AdmissionError::AlreadyRequested { .. }
        | AdmissionError::NotEnrolled { .. } => StatusCode::CONFLICT,
        AdmissionError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        AdmissionError::ConcurrentModification { .. }
        | AdmissionError::Store(StoreError::ConcurrentModification { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AdmissionError::Store(_)
        | AdmissionError::Identity(_)
        | AdmissionError::Notifications(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: AdmissionError) -> Response {
    let payload = json!({
        "error": err.to_string(),
    });
    (status_for(&err), axum::Json(payload)).into_response()
}
