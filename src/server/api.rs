//! REST API handlers
//!
//! All data endpoints require a session token; job endpoints additionally
//! enforce ownership, with administrator accounts (level 2) seeing every
//! job. A crawl request resolves the video synchronously, answers with the
//! pending job, and runs acquisition in a spawned task.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::crawler::{video, CrawlParams};
use crate::error::ResolveError;
use crate::export;
use crate::models::{CommentFilter, CommentPage, CrawlJob, SortMode};
use crate::storage::JobListing;

use super::auth::{self, CurrentUser};
use super::AppState;

/// Largest allowed item budget per job
const MAX_BUDGET: u32 = 1000;

/// Listing page size bounds
const MIN_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 30;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error carrying an HTTP status
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<crate::error::Error> for ApiError {
    fn from(err: crate::error::Error) -> Self {
        error!(error = %err, "internal error in handler");
        Self::internal("internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            success: bool,
            error: String,
        }

        (
            self.status,
            Json(Body {
                success: false,
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(health_check))
        // Accounts
        .route("/api/user/register", post(auth::register))
        .route("/api/user/send_email_code", post(auth::send_email_code))
        .route("/api/user/login", post(auth::login))
        .route("/api/user/me", get(auth::me))
        // Acquisition
        .route("/api/crawl", post(start_crawl))
        .route("/api/crawl_records", get(list_records))
        .route(
            "/api/crawl_records/{id}",
            get(get_record).delete(delete_record),
        )
        .route("/api/crawl_records/{id}/download", get(download_record))
        // Comments
        .route("/api/comments/{id}", get(list_comments))
        .route("/api/comments/{id}/download", get(download_comments))
        .with_state(state)
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

// ============================================================================
// Acquisition Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub bv: String,

    /// Starting cursor for the main listing; empty starts from the top
    #[serde(default)]
    pub next_page_id: String,

    /// Remote sort mode (2 = latest, 3 = hot)
    #[serde(default = "default_mode")]
    pub mode: u8,

    /// Whether to descend into second-level replies
    #[serde(default = "default_true")]
    pub is_second: bool,

    /// Item budget; clamped to 1..=1000
    #[serde(default = "default_limit")]
    pub limit_num: u32,
}

fn default_mode() -> u8 {
    3
}

fn default_true() -> bool {
    true
}

fn default_limit() -> u32 {
    300
}

#[derive(Debug, Serialize)]
pub struct CrawlStarted {
    pub job_id: i64,
    pub bv: String,
    pub title: String,
    pub status: crate::models::JobStatus,
    pub message: String,
}

/// Start an acquisition run.
///
/// Resolves the BV synchronously so an unresolvable video never creates a
/// job, then answers with the pending job while acquisition proceeds in the
/// background.
async fn start_crawl(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CrawlRequest>,
) -> Result<Json<ApiResponse<CrawlStarted>>, ApiError> {
    let budget = request.limit_num.clamp(1, MAX_BUDGET);
    let sort = SortMode::from_mode(request.mode);

    let resolved = video::resolve(&state.fetcher, &request.bv)
        .await
        .map_err(|err| match err {
            ResolveError::ObjectIdNotFound(bv) => {
                ApiError::bad_request(format!("could not resolve video {bv}"))
            }
            ResolveError::Fetch(e) => {
                error!(bv = %request.bv, error = %e, "video page fetch failed");
                ApiError::internal("failed to fetch video page")
            }
        })?;

    let job_id = state.db.create_job(
        &request.bv,
        &resolved.title,
        sort,
        request.is_second,
        Some(user.id),
    )?;

    info!(job_id, bv = %request.bv, budget, "acquisition job created");

    let params = CrawlParams {
        oid: resolved.oid,
        sort,
        include_replies: request.is_second,
        budget,
        initial_cursor: request.next_page_id,
    };
    let engine = state.engine.clone();
    tokio::spawn(async move {
        // Terminal status and error text are persisted by the engine
        let _ = engine.run(job_id, &params).await;
    });

    Ok(Json(ApiResponse::success(CrawlStarted {
        job_id,
        bv: request.bv,
        title: resolved.title,
        status: crate::models::JobStatus::Pending,
        message: "acquisition started".to_string(),
    })))
}

/// List acquisition jobs: admins see all with owner names, everyone else
/// sees their own
async fn list_records(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<Vec<JobListing>>>, ApiError> {
    let listings = if user.is_admin() {
        state.db.list_all_jobs()?
    } else {
        state.db.list_jobs_for_user(user.id)?
    };
    Ok(Json(ApiResponse::success(listings)))
}

/// Load a job and enforce ownership
fn authorize_job(
    state: &AppState,
    user: &crate::storage::User,
    job_id: i64,
) -> Result<CrawlJob, ApiError> {
    let job = state
        .db
        .get_job(job_id)?
        .ok_or_else(|| ApiError::not_found(format!("no job with id {job_id}")))?;

    if !user.is_admin() && job.user_id != Some(user.id) {
        return Err(ApiError::forbidden("job belongs to another account"));
    }
    Ok(job)
}

async fn get_record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CrawlJob>>, ApiError> {
    let job = authorize_job(&state, &user, id)?;
    Ok(Json(ApiResponse::success(job)))
}

/// Delete a job and all its comments
async fn delete_record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    authorize_job(&state, &user, id)?;
    state.db.delete_job(id)?;
    info!(job_id = id, "job deleted");
    Ok(Json(ApiResponse::success(())))
}

/// Export every comment of a job as CSV
async fn download_record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let job = authorize_job(&state, &user, id)?;
    csv_response(&state, &job, &CommentFilter::default())
}

// ============================================================================
// Comment Handlers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CommentQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    pub username: Option<String>,
    pub keyword: Option<String>,
    pub gender: Option<String>,
    pub user_level: Option<u8>,
    pub is_vip: Option<String>,
    pub min_reply_count: Option<u32>,
    pub max_reply_count: Option<u32>,
    pub min_like_count: Option<i64>,
    pub max_like_count: Option<i64>,
    pub show_second_level: Option<bool>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl CommentQuery {
    fn filter(&self) -> CommentFilter {
        CommentFilter {
            username: self.username.clone(),
            keyword: self.keyword.clone(),
            gender: self.gender.clone(),
            user_level: self.user_level,
            is_vip: self.is_vip.clone(),
            min_reply_count: self.min_reply_count,
            max_reply_count: self.max_reply_count,
            min_like_count: self.min_like_count,
            max_like_count: self.max_like_count,
            show_second_level: self.show_second_level,
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }
}

/// Filtered, paginated comment listing for one job
async fn list_comments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Query(query): Query<CommentQuery>,
) -> Result<Json<ApiResponse<CommentPage>>, ApiError> {
    authorize_job(&state, &user, id)?;

    let page = query.page.max(1);
    let page_size = query.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
    let page_data = state.db.query_comments(id, &query.filter(), page, page_size)?;

    Ok(Json(ApiResponse::success(page_data)))
}

/// Export the filtered comments of a job as CSV
async fn download_comments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Query(query): Query<CommentQuery>,
) -> Result<Response, ApiError> {
    let job = authorize_job(&state, &user, id)?;
    csv_response(&state, &job, &query.filter())
}

/// Build a CSV download response for a job's filtered comments
fn csv_response(
    state: &AppState,
    job: &CrawlJob,
    filter: &CommentFilter,
) -> Result<Response, ApiError> {
    let records = state.db.list_all_comments(job.id, filter)?;
    let bytes = export::to_csv_bytes(&records)?;

    let filename = export::export_filename(&job.title, filter);
    let encoded = utf8_percent_encode(&filename, NON_ALPHANUMERIC);
    let disposition = format!("attachment; filename*=UTF-8''{encoded}");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
