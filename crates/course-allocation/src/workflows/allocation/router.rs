use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::catalog::{CatalogService, CourseUpdate, FacultyUpdate, NewCourse, NewFaculty};
use super::domain::{CourseId, FacultyId, PreferenceSetId, Season, TermId};
use super::engine::{AllocationEngine, AssignedCourse};
use super::error::AllocationError;
use super::locks::RosterLock;
use super::preferences::PreferenceLifecycleService;
use super::repository::{CatalogRepository, EscalationPublisher, PreferenceSetRepository};
use super::workload::AllocationPolicy;

pub const ROLE_HEADER: &str = "x-principal-role";
pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";

/// Caller identity asserted by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin,
    Faculty(FacultyId),
}

impl Principal {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let role = headers.get(ROLE_HEADER)?.to_str().ok()?.trim();
        if role.eq_ignore_ascii_case("admin") {
            return Some(Principal::Admin);
        }

        if role.eq_ignore_ascii_case("faculty") {
            let id = headers.get(PRINCIPAL_ID_HEADER)?.to_str().ok()?.trim();
            if id.is_empty() {
                return None;
            }
            return Some(Principal::Faculty(FacultyId::new(id)));
        }

        None
    }
}

/// The services behind the allocation routes, sharing one set of repositories.
pub struct AllocationServices<C, P, E> {
    pub catalog: CatalogService<C>,
    pub preferences: PreferenceLifecycleService<C, P>,
    pub engine: AllocationEngine<C, P, E>,
}

impl<C, P, E> AllocationServices<C, P, E>
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    pub fn new(
        catalog: Arc<C>,
        preference_sets: Arc<P>,
        escalations: Arc<E>,
        policy: AllocationPolicy,
    ) -> Self {
        let roster: RosterLock = Arc::new(Mutex::new(()));
        Self {
            catalog: CatalogService::with_roster(Arc::clone(&catalog), policy, Arc::clone(&roster)),
            preferences: PreferenceLifecycleService::new(
                Arc::clone(&catalog),
                Arc::clone(&preference_sets),
            ),
            engine: AllocationEngine::with_roster(
                catalog,
                preference_sets,
                escalations,
                policy,
                roster,
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePreferenceSetRequest {
    pub faculty_id: FacultyId,
    pub term_id: TermId,
    #[serde(default)]
    pub candidate_course_ids: Vec<CourseId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCandidatesRequest {
    pub candidate_course_ids: Vec<CourseId>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPreferencesRequest {
    pub ranked_course_ids: Vec<CourseId>,
}

#[derive(Debug, Deserialize)]
pub struct RunAllocationRequest {
    pub term_id: TermId,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssignmentRequest {
    pub course_ids: Vec<CourseId>,
}

#[derive(Debug, Deserialize)]
pub struct LlmResultRequest {
    pub faculty_id: FacultyId,
    pub course_id: CourseId,
    pub recommended: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateTermRequest {
    pub year: i32,
    pub season: Season,
}

/// Router builder exposing the preference, assignment, and catalog endpoints.
pub fn allocation_router<C, P, E>(services: Arc<AllocationServices<C, P, E>>) -> Router
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/admin/preference-sets",
            post(create_set_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/preference-sets/:set_id",
            get(view_set_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/preference-sets/:set_id/candidates",
            put(update_candidates_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/preference-sets/:set_id/open",
            post(open_set_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/preference-sets/:set_id/close",
            post(close_set_handler::<C, P, E>),
        )
        .route(
            "/api/v1/faculty/preference-sets",
            get(open_sets_handler::<C, P, E>),
        )
        .route(
            "/api/v1/faculty/preference-sets/:set_id/submit",
            post(submit_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/assignments/run",
            post(run_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/assignments/llm-result",
            post(llm_result_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/assignments/unassigned/:term_id",
            get(unassigned_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/assignments/faculty/:faculty_id/term/:term_id",
            get(faculty_term_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/assignments/:faculty_id/courses",
            put(update_assignments_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/assignments/:faculty_id/courses/:course_id",
            delete(remove_assignment_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/courses",
            get(list_courses_handler::<C, P, E>).post(create_course_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/courses/:course_id",
            get(view_course_handler::<C, P, E>).put(update_course_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/faculty",
            get(list_faculty_handler::<C, P, E>).post(create_faculty_handler::<C, P, E>),
        )
        .route(
            "/api/v1/admin/faculty/:faculty_id",
            get(view_faculty_handler::<C, P, E>).put(update_faculty_handler::<C, P, E>),
        )
        .route("/api/v1/admin/terms", post(create_term_handler::<C, P, E>))
        .with_state(services)
}

type Services<C, P, E> = State<Arc<AllocationServices<C, P, E>>>;

pub(crate) async fn create_set_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreatePreferenceSetRequest>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    let created = services
        .preferences
        .create(
            &request.faculty_id,
            &request.term_id,
            &request.candidate_course_ids,
        )
        .and_then(|set_id| services.preferences.view(&set_id));

    match created {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn view_set_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(set_id): Path<String>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.preferences.view(&PreferenceSetId(set_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_candidates_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(set_id): Path<String>,
    axum::Json(request): axum::Json<UpdateCandidatesRequest>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services
        .preferences
        .update_candidates(&PreferenceSetId(set_id), &request.candidate_course_ids)
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn open_set_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(set_id): Path<String>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.preferences.open(&PreferenceSetId(set_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn close_set_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(set_id): Path<String>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.preferences.close(&PreferenceSetId(set_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn open_sets_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    let faculty_id = match require_faculty(&headers) {
        Ok(faculty_id) => faculty_id,
        Err(rejection) => return rejection,
    };

    match services.preferences.open_sets_for(&faculty_id) {
        Ok(views) => (StatusCode::OK, axum::Json(views)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(set_id): Path<String>,
    axum::Json(request): axum::Json<SubmitPreferencesRequest>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    let faculty_id = match require_faculty(&headers) {
        Ok(faculty_id) => faculty_id,
        Err(rejection) => return rejection,
    };

    if request.ranked_course_ids.is_empty() {
        return error_response(AllocationError::InvalidInput(
            "ranked_course_ids must not be empty".to_string(),
        ));
    }

    match services.preferences.submit_preferences(
        &PreferenceSetId(set_id),
        &faculty_id,
        &request.ranked_course_ids,
    ) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn run_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<RunAllocationRequest>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.engine.run(&request.term_id) {
        Ok(results) => (StatusCode::OK, axum::Json(results)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_assignments_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(faculty_id): Path<String>,
    axum::Json(request): axum::Json<UpdateAssignmentRequest>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services
        .engine
        .update_faculty_assignments(&FacultyId(faculty_id), &request.course_ids)
    {
        Ok(courses) => {
            let body: Vec<AssignedCourse> = courses.iter().map(AssignedCourse::from).collect();
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn remove_assignment_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path((faculty_id, course_id)): Path<(String, String)>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services
        .engine
        .remove_course_assignment(&FacultyId(faculty_id), &CourseId(course_id))
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn llm_result_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<LlmResultRequest>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.engine.process_llm_result(
        &request.faculty_id,
        &request.course_id,
        request.recommended,
    ) {
        Ok(resolution) => (StatusCode::OK, axum::Json(resolution)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn unassigned_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(term_id): Path<String>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.engine.unassigned_courses(&TermId(term_id)) {
        Ok(courses) => {
            let body: Vec<AssignedCourse> = courses.iter().map(AssignedCourse::from).collect();
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn faculty_term_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path((faculty_id, term_id)): Path<(String, String)>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services
        .engine
        .faculty_assignments(&FacultyId(faculty_id), &TermId(term_id))
    {
        Ok(courses) => {
            let body: Vec<AssignedCourse> = courses.iter().map(AssignedCourse::from).collect();
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_course_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<NewCourse>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.create_course(request) {
        Ok(course) => (StatusCode::CREATED, axum::Json(course)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_faculty_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<NewFaculty>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.create_faculty(request) {
        Ok(faculty) => (StatusCode::CREATED, axum::Json(faculty)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_courses_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.courses() {
        Ok(courses) => (StatusCode::OK, axum::Json(courses)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn view_course_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.course(&CourseId(course_id)) {
        Ok(course) => (StatusCode::OK, axum::Json(course)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_course_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
    axum::Json(request): axum::Json<CourseUpdate>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.update_course(&CourseId(course_id), request) {
        Ok(course) => (StatusCode::OK, axum::Json(course)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_faculty_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.faculty() {
        Ok(faculty) => (StatusCode::OK, axum::Json(faculty)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn view_faculty_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(faculty_id): Path<String>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.faculty_member(&FacultyId(faculty_id)) {
        Ok(faculty) => (StatusCode::OK, axum::Json(faculty)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_faculty_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    Path(faculty_id): Path<String>,
    axum::Json(request): axum::Json<FacultyUpdate>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.update_faculty(&FacultyId(faculty_id), request) {
        Ok(faculty) => (StatusCode::OK, axum::Json(faculty)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_term_handler<C, P, E>(
    State(services): Services<C, P, E>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreateTermRequest>,
) -> Response
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    if let Err(rejection) = require_admin(&headers) {
        return rejection;
    }

    match services.catalog.create_term(request.year, request.season) {
        Ok(term) => (StatusCode::CREATED, axum::Json(term)).into_response(),
        Err(err) => error_response(err),
    }
}

fn require_admin(headers: &HeaderMap) -> Result<(), Response> {
    match Principal::from_headers(headers) {
        Some(Principal::Admin) => Ok(()),
        Some(Principal::Faculty(_)) => Err(rejection(
            StatusCode::FORBIDDEN,
            "administrator role required",
        )),
        None => Err(rejection(StatusCode::UNAUTHORIZED, "missing or invalid principal")),
    }
}

fn require_faculty(headers: &HeaderMap) -> Result<FacultyId, Response> {
    match Principal::from_headers(headers) {
        Some(Principal::Faculty(faculty_id)) => Ok(faculty_id),
        Some(Principal::Admin) => Err(rejection(StatusCode::FORBIDDEN, "faculty role required")),
        None => Err(rejection(StatusCode::UNAUTHORIZED, "missing or invalid principal")),
    }
}

fn rejection(status: StatusCode, message: &str) -> Response {
    let payload = json!({
        "error": message,
    });
    (status, axum::Json(payload)).into_response()
}

fn error_response(err: AllocationError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "allocation request failed");
    }

    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
