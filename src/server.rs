//!
//! hostelry HTTP server
//! --------------------
//! This module defines the Axum-based HTTP API for hostelry.
//!
//! Responsibilities:
//! - Bearer-credential extraction and the verify -> resolve -> authorize
//!   spine every protected route runs before touching data.
//! - Resource handlers for students, rooms, roommates, maintenance issues
//!   and room images, each delegating reads/writes to the hosted document
//!   store or image CDN only after the gate allows.
//! - The superAdmin document-id migration sweep.
//! - One process-wide construction of the outbound clients at startup,
//!   injected into handlers through `AppState`.
//!
//! Every protected request carries `Authorization: Bearer <token>`; a
//! missing credential is rejected with 401 before the verifier is invoked.
//! Denied gate decisions map to 403, so the two failure categories stay
//! distinct on the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory::{
    Directory, HttpDirectory, IssueDoc, IssueStatus, RoomDoc, StudentDoc, StudentPatch,
};
use crate::error::{AppError, AppResult};
use crate::identity::{
    authorize, AccessRequest, Action, CredentialVerifier, DenialReason, Placement, Principal,
    ProviderVerifier, RequestContext, ResourceKind, ResourceRef, RoleResolver, ScopeBinding,
};
use crate::images::ImageStore;

/// Service configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub identity_lookup_url: String,
    pub identity_api_key: String,
    pub directory_url: String,
    pub directory_api_key: String,
    pub cdn_url: String,
    pub cdn_api_key: String,
    pub cdn_api_secret: String,
    /// Resolver cache TTL in seconds; 0 disables the cache.
    pub resolver_cache_ttl_secs: u64,
    /// Bound on every outbound call so a slow hosted service cannot stall a
    /// handler indefinitely.
    pub outbound_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            http_port: env_or("HOSTELRY_HTTP_PORT", "8080").parse().unwrap_or(8080),
            identity_lookup_url: env_or(
                "HOSTELRY_IDENTITY_LOOKUP_URL",
                "https://identitytoolkit.googleapis.com/v1/accounts:lookup",
            ),
            identity_api_key: env_or("HOSTELRY_IDENTITY_API_KEY", ""),
            directory_url: env_or("HOSTELRY_DIRECTORY_URL", "http://localhost:9090/v1"),
            directory_api_key: env_or("HOSTELRY_DIRECTORY_API_KEY", ""),
            cdn_url: env_or("HOSTELRY_CDN_URL", "https://api.cloudinary.com/v1_1/hostelry"),
            cdn_api_key: env_or("HOSTELRY_CDN_API_KEY", ""),
            cdn_api_secret: env_or("HOSTELRY_CDN_API_SECRET", ""),
            resolver_cache_ttl_secs: env_or("HOSTELRY_RESOLVER_CACHE_TTL_SECS", "0")
                .parse()
                .unwrap_or(0),
            outbound_timeout_secs: env_or("HOSTELRY_OUTBOUND_TIMEOUT_SECS", "4")
                .parse()
                .unwrap_or(4),
        }
    }
}

/// Shared server state injected into all handlers. All clients are built
/// once at startup; handlers never construct or re-check them.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn CredentialVerifier>,
    pub resolver: Arc<RoleResolver>,
    pub directory: Arc<dyn Directory>,
    pub images: Arc<ImageStore>,
}

/// Start the hostelry HTTP server with configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::from_env()).await
}

pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    // One outbound client for every hosted dependency, with the shared
    // request timeout. Timeouts surface as upstream-unavailable and deny.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.outbound_timeout_secs))
        .build()?;

    let verifier: Arc<dyn CredentialVerifier> = Arc::new(ProviderVerifier::new(
        http.clone(),
        cfg.identity_lookup_url.clone(),
        cfg.identity_api_key.clone(),
    ));
    let directory: Arc<dyn Directory> = Arc::new(HttpDirectory::new(
        http.clone(),
        cfg.directory_url.clone(),
        cfg.directory_api_key.clone(),
    ));
    let mut resolver = RoleResolver::new(directory.clone());
    if cfg.resolver_cache_ttl_secs > 0 {
        resolver = resolver.with_cache_ttl(Duration::from_secs(cfg.resolver_cache_ttl_secs));
    }
    let images = Arc::new(ImageStore::new(
        http,
        cfg.cdn_url.clone(),
        cfg.cdn_api_key.clone(),
        cfg.cdn_api_secret.clone(),
    ));

    let state = AppState { verifier, resolver: Arc::new(resolver), directory, images };
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "hostelry ok" }))
        .route("/me", get(whoami))
        .route("/students", get(list_students))
        .route("/students/{id}", get(get_student).put(update_student))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{id}", get(get_room))
        .route("/rooms/{id}/roommates", get(list_roommates))
        .route(
            "/rooms/{id}/images",
            get(list_room_images).post(create_room_image).delete(delete_room_image),
        )
        .route("/issues", get(list_issues).post(create_issue))
        .route("/issues/{id}", put(update_issue))
        .route("/admin/migrate-doc-ids", post(migrate_doc_ids))
        .with_state(state)
}

// ---- authentication spine -------------------------------------------------

/// Pull the opaque credential out of the `Authorization: Bearer` header.
/// The one deployment-wide credential mechanism; no cookie branch.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Verify the credential and resolve the caller's role and scope. Missing
/// credentials are rejected here, before the verifier is ever invoked.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<RequestContext> {
    let Some(token) = bearer_token(headers) else {
        return Err(AppError::auth("missing_credential", "authorization required"));
    };
    let identity = state.verifier.verify(token).await?;
    let (role, scope) = state.resolver.resolve(&identity).await?;
    Ok(RequestContext::new(Principal { identity, role, scope }))
}

/// Run the gate for one operation; a deny becomes a forbidden error carrying
/// the denial reason as its code.
pub fn require(ctx: &RequestContext, action: Action, resource: ResourceRef) -> AppResult<()> {
    let request = AccessRequest { action, resource };
    let decision = authorize(ctx.principal.role, &ctx.principal.scope, &request);
    if decision.is_allowed() {
        return Ok(());
    }
    let reason = decision.reason.unwrap_or(DenialReason::NotPermitted);
    warn!(
        target: "auth",
        request_id = %ctx.request_id,
        subject_id = %ctx.subject_id(),
        role = ctx.principal.role.as_str(),
        kind = ?request.resource.kind,
        resource = %request.resource.id,
        action = ?request.action,
        reason = reason.as_str(),
        "denied"
    );
    Err(AppError::forbidden(reason.as_str(), "insufficient permission"))
}

fn fail(err: AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status_label = match err.http_status() {
        401 => "unauthorized",
        403 => "forbidden",
        _ => "error",
    };
    (
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(json!({"status": status_label, "code": err.code_str(), "message": err.message()})),
    )
}

// ---- resource references --------------------------------------------------

/// The whole estate. Only an unrestricted scope can be proven to cover it.
fn global_ref() -> ResourceRef {
    ResourceRef { kind: ResourceKind::Hostel, id: "*".to_string(), placement: Placement::default() }
}

fn hostel_ref(hostel_id: &str) -> ResourceRef {
    ResourceRef {
        kind: ResourceKind::Hostel,
        id: hostel_id.to_string(),
        placement: Placement { hostel_id: Some(hostel_id.to_string()), ..Default::default() },
    }
}

fn floor_ref(hostel_id: &str, floor_id: &str) -> ResourceRef {
    ResourceRef {
        kind: ResourceKind::Floor,
        id: floor_id.to_string(),
        placement: Placement {
            hostel_id: Some(hostel_id.to_string()),
            floor_id: Some(floor_id.to_string()),
            ..Default::default()
        },
    }
}

fn student_ref(doc: &StudentDoc) -> ResourceRef {
    ResourceRef {
        kind: ResourceKind::StudentProfile,
        id: doc.id.clone(),
        placement: Placement {
            hostel_id: Some(doc.hostel_id.clone()),
            floor_id: Some(doc.floor_id.clone()),
            room_id: Some(doc.room_id.clone()),
            owner_id: Some(doc.subject_id.clone().unwrap_or_else(|| doc.id.clone())),
        },
    }
}

fn room_ref(kind: ResourceKind, doc: &RoomDoc) -> ResourceRef {
    ResourceRef {
        kind,
        id: doc.id.clone(),
        placement: Placement {
            hostel_id: Some(doc.hostel_id.clone()),
            floor_id: Some(doc.floor_id.clone()),
            room_id: Some(doc.id.clone()),
            ..Default::default()
        },
    }
}

fn issue_ref(doc: &IssueDoc) -> ResourceRef {
    ResourceRef {
        kind: ResourceKind::Issue,
        id: doc.id.clone(),
        placement: Placement {
            hostel_id: Some(doc.hostel_id.clone()),
            floor_id: Some(doc.floor_id.clone()),
            room_id: Some(doc.room_id.clone()),
            owner_id: Some(doc.reported_by.clone()),
        },
    }
}

// ---- scoped listings ------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeFilter {
    hostel_id: Option<String>,
    floor_id: Option<String>,
}

/// The container slice a listing may read, decided by the gate.
enum ListScope {
    All,
    Hostel(String),
    Floors(String, Vec<String>),
}

fn default_hostel(scope: &ScopeBinding) -> Option<String> {
    match scope {
        ScopeBinding::Unrestricted => None,
        ScopeBinding::Hostel { hostel_id } => Some(hostel_id.clone()),
        ScopeBinding::Floors { hostel_id, .. } => Some(hostel_id.clone()),
        ScopeBinding::Room { hostel_id, .. } => Some(hostel_id.clone()),
    }
}

/// Gate a container listing. Explicit filters are honored when in scope; a
/// coAdmin with no floor filter reads each floor of their binding. Every
/// path runs through `require`, so the policy table stays the single
/// decision point.
fn gate_listing(ctx: &RequestContext, filter: &ScopeFilter) -> AppResult<ListScope> {
    let hostel = filter.hostel_id.clone().or_else(|| default_hostel(&ctx.principal.scope));
    let Some(hostel) = hostel else {
        require(ctx, Action::Read, global_ref())?;
        return Ok(ListScope::All);
    };
    if let Some(floor) = &filter.floor_id {
        require(ctx, Action::Read, floor_ref(&hostel, floor))?;
        return Ok(ListScope::Floors(hostel, vec![floor.clone()]));
    }
    if let ScopeBinding::Floors { hostel_id, floor_ids } = &ctx.principal.scope {
        if *hostel_id == hostel {
            for floor in floor_ids {
                require(ctx, Action::Read, floor_ref(&hostel, floor))?;
            }
            return Ok(ListScope::Floors(hostel, floor_ids.clone()));
        }
    }
    require(ctx, Action::Read, hostel_ref(&hostel))?;
    Ok(ListScope::Hostel(hostel))
}

// ---- handlers -------------------------------------------------------------

async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let p = &ctx.principal;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "subjectId": p.identity.subject_id,
            "email": p.identity.email,
            "role": p.role,
            "scope": p.scope,
        })),
    )
}

async fn list_students(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<ScopeFilter>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        match gate_listing(&ctx, &filter)? {
            ListScope::All => Ok(state.directory.all_students().await?),
            ListScope::Hostel(h) => Ok(state.directory.students_in(&h, None).await?),
            ListScope::Floors(h, floors) => {
                let mut out = Vec::new();
                for f in &floors {
                    out.extend(state.directory.students_in(&h, Some(f)).await?);
                }
                Ok::<_, AppError>(out)
            }
        }
    }
    .await;
    match result {
        Ok(students) => (StatusCode::OK, Json(json!({"status":"ok","students": students}))),
        Err(e) => fail(e),
    }
}

async fn get_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        let doc = state
            .directory
            .student(&id)
            .await?
            .ok_or_else(|| AppError::not_found("student_not_found", "no such student"))?;
        require(&ctx, Action::Read, student_ref(&doc))?;
        Ok::<_, AppError>(doc)
    }
    .await;
    match result {
        Ok(doc) => (StatusCode::OK, Json(json!({"status":"ok","student": doc}))),
        Err(e) => fail(e),
    }
}

async fn update_student(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<StudentPatch>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        if patch.is_empty() {
            return Err(AppError::user("empty_patch", "no updatable fields supplied"));
        }
        let doc = state
            .directory
            .student(&id)
            .await?
            .ok_or_else(|| AppError::not_found("student_not_found", "no such student"))?;
        require(&ctx, Action::Update, student_ref(&doc))?;
        state.directory.update_student(&id, &patch).await?;
        info!(
            target: "http",
            request_id = %ctx.request_id,
            subject_id = %ctx.subject_id(),
            student = %id,
            "profile updated"
        );
        Ok::<_, AppError>(())
    }
    .await;
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({"status":"ok"}))),
        Err(e) => fail(e),
    }
}

async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<ScopeFilter>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        match gate_listing(&ctx, &filter)? {
            ListScope::All => {
                // No store-wide room sweep is exposed; the estate is listed
                // hostel by hostel.
                Err(AppError::user("hostel_required", "hostelId query parameter required"))
            }
            ListScope::Hostel(h) => Ok(state.directory.rooms_in(&h, None).await?),
            ListScope::Floors(h, floors) => {
                let mut out = Vec::new();
                for f in &floors {
                    out.extend(state.directory.rooms_in(&h, Some(f)).await?);
                }
                Ok::<_, AppError>(out)
            }
        }
    }
    .await;
    match result {
        Ok(rooms) => (StatusCode::OK, Json(json!({"status":"ok","rooms": rooms}))),
        Err(e) => fail(e),
    }
}

async fn load_room(state: &AppState, id: &str) -> AppResult<RoomDoc> {
    state
        .directory
        .room(id)
        .await?
        .ok_or_else(|| AppError::not_found("room_not_found", "no such room"))
}

async fn get_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        let doc = load_room(&state, &id).await?;
        require(&ctx, Action::Read, room_ref(ResourceKind::Room, &doc))?;
        Ok::<_, AppError>(doc)
    }
    .await;
    match result {
        Ok(doc) => (StatusCode::OK, Json(json!({"status":"ok","room": doc}))),
        Err(e) => fail(e),
    }
}

async fn list_roommates(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        let doc = load_room(&state, &id).await?;
        // The roster is a read of the room itself.
        require(&ctx, Action::Read, room_ref(ResourceKind::Room, &doc))?;
        Ok::<_, AppError>(state.directory.occupants(&id).await?)
    }
    .await;
    match result {
        Ok(occupants) => (StatusCode::OK, Json(json!({"status":"ok","roommates": occupants}))),
        Err(e) => fail(e),
    }
}

async fn list_room_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        let doc = load_room(&state, &id).await?;
        require(&ctx, Action::Read, room_ref(ResourceKind::RoomImage, &doc))?;
        Ok::<_, AppError>(state.images.list_room_images(&id).await?)
    }
    .await;
    match result {
        Ok(images) => (StatusCode::OK, Json(json!({"status":"ok","images": images}))),
        Err(e) => fail(e),
    }
}

async fn create_room_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        let doc = load_room(&state, &id).await?;
        require(&ctx, Action::Create, room_ref(ResourceKind::RoomImage, &doc))?;
        Ok::<_, AppError>(state.images.upload_ticket_for_room(&id))
    }
    .await;
    match result {
        Ok(ticket) => (StatusCode::OK, Json(json!({"status":"ok","upload": ticket}))),
        Err(e) => fail(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageSelector {
    public_id: String,
}

async fn delete_room_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(selector): Query<ImageSelector>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        // A public id from another room's folder must not slip through on
        // this room's authorization.
        if !selector.public_id.starts_with(&format!("rooms/{id}/")) {
            return Err(AppError::user("foreign_public_id", "image does not belong to this room"));
        }
        let doc = load_room(&state, &id).await?;
        require(&ctx, Action::Delete, room_ref(ResourceKind::RoomImage, &doc))?;
        state.images.delete_image(&selector.public_id).await?;
        Ok::<_, AppError>(())
    }
    .await;
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({"status":"ok"}))),
        Err(e) => fail(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewIssue {
    room_id: String,
    title: String,
    description: String,
}

async fn create_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewIssue>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        if body.title.trim().is_empty() {
            return Err(AppError::user("empty_title", "issue title required"));
        }
        let room = load_room(&state, &body.room_id).await?;
        let now = Utc::now();
        let doc = IssueDoc {
            id: Uuid::new_v4().to_string(),
            hostel_id: room.hostel_id.clone(),
            floor_id: room.floor_id.clone(),
            room_id: room.id.clone(),
            title: body.title.trim().to_string(),
            description: body.description,
            status: IssueStatus::Open,
            reported_by: ctx.subject_id().to_string(),
            resolution_note: None,
            created_at: now,
            updated_at: now,
        };
        require(&ctx, Action::Create, issue_ref(&doc))?;
        state.directory.create_issue(&doc).await?;
        info!(
            target: "http",
            request_id = %ctx.request_id,
            subject_id = %ctx.subject_id(),
            issue = %doc.id,
            room = %doc.room_id,
            "issue filed"
        );
        Ok::<_, AppError>(doc)
    }
    .await;
    match result {
        Ok(doc) => (StatusCode::CREATED, Json(json!({"status":"ok","issue": doc}))),
        Err(e) => fail(e),
    }
}

async fn list_issues(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<ScopeFilter>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        match gate_listing(&ctx, &filter)? {
            ListScope::All => {
                Err(AppError::user("hostel_required", "hostelId query parameter required"))
            }
            ListScope::Hostel(h) => Ok(state.directory.issues_in(&h, None).await?),
            ListScope::Floors(h, floors) => {
                let mut out = Vec::new();
                for f in &floors {
                    out.extend(state.directory.issues_in(&h, Some(f)).await?);
                }
                Ok::<_, AppError>(out)
            }
        }
    }
    .await;
    match result {
        Ok(issues) => (StatusCode::OK, Json(json!({"status":"ok","issues": issues}))),
        Err(e) => fail(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueUpdate {
    status: IssueStatus,
    #[serde(default)]
    resolution_note: Option<String>,
}

async fn update_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<IssueUpdate>,
) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        let doc = state
            .directory
            .issue(&id)
            .await?
            .ok_or_else(|| AppError::not_found("issue_not_found", "no such issue"))?;
        require(&ctx, Action::Update, issue_ref(&doc))?;
        state
            .directory
            .update_issue(&id, body.status, body.resolution_note.as_deref())
            .await?;
        Ok::<_, AppError>(())
    }
    .await;
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({"status":"ok"}))),
        Err(e) => fail(e),
    }
}

/// Rekey student documents whose stored id predates id canonicalization, so
/// every document is keyed by its provider subject id. Unrestricted scope
/// only; the estate-wide update cannot be proven inside any narrower
/// binding.
async fn migrate_doc_ids(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let ctx = match authenticate(&state, &headers).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let result = async {
        require(&ctx, Action::Update, global_ref())?;
        let students = state.directory.all_students().await?;
        let mut scanned = 0usize;
        let mut rewritten = 0usize;
        let mut unkeyed = 0usize;
        for s in &students {
            scanned += 1;
            match s.subject_id.as_deref() {
                Some(subject) if subject != s.id => {
                    state.directory.rewrite_student_id(&s.id, subject).await?;
                    rewritten += 1;
                }
                Some(_) => {}
                None => {
                    warn!(target: "migrate", student = %s.id, "document has no subject id, left as is");
                    unkeyed += 1;
                }
            }
        }
        info!(
            target: "migrate",
            request_id = %ctx.request_id,
            scanned, rewritten, unkeyed,
            "document id sweep complete"
        );
        Ok::<_, AppError>(json!({
            "scanned": scanned,
            "rewritten": rewritten,
            "alreadyCanonical": scanned - rewritten - unkeyed,
            "unkeyed": unkeyed,
        }))
    }
    .await;
    match result {
        Ok(report) => (StatusCode::OK, Json(json!({"status":"ok","report": report}))),
        Err(e) => fail(e),
    }
}
