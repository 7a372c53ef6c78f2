//! HTTP API over the document hierarchy.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use uuid::Uuid;

use cml_hub_core::{
    accounts::{self, Provisioning},
    auth::{Hs256Verifier, TokenVerifier},
    files, listing,
    model::User,
    tree, AccessContext, BlobStorage, Error, HubConfig, RecordStore, WellKnown,
};

/// Header echoing the failure reason on every error response.
pub const ERROR_HEADER: HeaderName = HeaderName::from_static("x-error-reason");

/// How a request names its caller.
#[derive(Clone)]
pub enum Identity {
    /// `Authorization: Bearer <token>` checked by the verifier.
    Token(Arc<dyn TokenVerifier>),
    /// The `X-User-Id` header, taken as-is. Only for deployments behind a
    /// proxy that sets it.
    TrustedHeader,
}

impl Identity {
    /// Token verification when `JWT_SECRET` is set, the header when
    /// `TRUST_USER_HEADER` opts in, otherwise an error.
    pub fn from_config(config: &HubConfig) -> Result<Self, Error> {
        match (&config.jwt_secret, config.trust_user_header) {
            (Some(secret), _) => Ok(Self::Token(Arc::new(Hs256Verifier::new(secret)))),
            (None, true) => Ok(Self::TrustedHeader),
            (None, false) => Err(Error::Invalid(
                "Set JWT_SECRET, or TRUST_USER_HEADER=true to identify callers by X-User-Id."
                    .to_string(),
            )),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStorage>,
    pub well_known: WellKnown,
    pub identity: Identity,
    pub provisioning: Provisioning,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    reason: String,
}

impl ApiError {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    fn forbidden(reason: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, reason)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Invalid(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Storage(_) | Error::Io(_) | Error::Serialization(_) => {
                error!("request failed: {}", err);
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal storage failure.");
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "status": self.status.as_u16(),
            "reason": self.reason,
        }));
        let mut response = (self.status, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.reason) {
            response.headers_mut().insert(ERROR_HEADER, value);
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// The authenticated caller. Unverified users are accepted; use [`Verified`]
/// where verification is required.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user: User,
    pub access: AccessContext,
}

impl AuthContext {
    async fn user_id(parts: &Parts, state: &AppState) -> ApiResult<Uuid> {
        let headers = &parts.headers;
        match &state.identity {
            Identity::Token(verifier) => {
                let token = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| ApiError::forbidden("No authorization provided."))?;
                let token = token.strip_prefix("Bearer ").unwrap_or(token);
                verifier
                    .verify(token)
                    .await
                    .and_then(|claims| claims.user_id())
                    .ok_or_else(|| ApiError::forbidden("Invalid authorization token."))
            }
            Identity::TrustedHeader => {
                let user = headers
                    .get("X-User-Id")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| ApiError::forbidden("No authorization provided."))?;
                Uuid::parse_str(user)
                    .map_err(|_| ApiError::forbidden("Invalid authorization token."))
            }
        }
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = Self::user_id(parts, state).await?;
        let user = state
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| ApiError::forbidden("Invalid authorization token."))?;
        let access =
            AccessContext::resolve(state.store.as_ref(), user.id, state.well_known.everyone)
                .await?;
        Ok(Self { user, access })
    }
}

/// An authenticated caller whose account has been verified.
#[derive(Clone, Debug)]
pub struct Verified(pub AuthContext);

impl FromRequestParts<AppState> for Verified {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        if !auth.user.verified {
            return Err(ApiError::forbidden(
                "Your account is still awaiting verification.",
            ));
        }
        Ok(Self(auth))
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct UserRequest {
    user: Option<Uuid>,
}

#[derive(Deserialize)]
struct GroupRequest {
    name: Option<String>,
}

fn required<T>(value: Option<T>, reason: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, reason))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/register", post(register))
        .route("/self", get(self_view))
        .route("/users", get(list_users))
        .route("/user", delete(remove_user))
        .route("/verify", post(verify_user))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{id}/members", post(join_group))
        .route("/groups/{id}/members/{user}", delete(leave_group))
        .route("/list", get(list))
        .route("/tree", get(tree_view))
        .route("/file/{id}", get(get_file));

    Router::new()
        .nest("/api", api)
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<accounts::SelfView>> {
    let name = required(req.name, "Missing name or email fields.")?;
    let email = required(req.email, "Missing name or email fields.")?;
    let user = accounts::provision_user(
        state.store.as_ref(),
        &state.well_known,
        &name,
        &email,
        state.provisioning,
    )
    .await?;
    Ok(Json(
        accounts::describe_self(state.store.as_ref(), &user).await?,
    ))
}

async fn self_view(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<accounts::SelfView>> {
    Ok(Json(
        accounts::describe_self(state.store.as_ref(), &auth.user).await?,
    ))
}

async fn list_users(
    State(state): State<AppState>,
    Verified(auth): Verified,
) -> ApiResult<Json<Vec<accounts::UserSummary>>> {
    Ok(Json(
        accounts::list_users(state.store.as_ref(), &auth.access).await?,
    ))
}

async fn list_groups(
    State(state): State<AppState>,
    Verified(auth): Verified,
) -> ApiResult<Json<Vec<accounts::GroupView>>> {
    Ok(Json(
        accounts::list_groups(state.store.as_ref(), &auth.access).await?,
    ))
}

async fn verify_user(
    State(state): State<AppState>,
    Verified(auth): Verified,
    Json(req): Json<UserRequest>,
) -> ApiResult<StatusCode> {
    let user = required(req.user, "Missing user key in request.")?;
    accounts::verify_user(state.store.as_ref(), &auth.access, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_user(
    State(state): State<AppState>,
    Verified(auth): Verified,
    Json(req): Json<UserRequest>,
) -> ApiResult<StatusCode> {
    let user = required(req.user, "Missing user key in request.")?;
    accounts::remove_user(state.store.as_ref(), &state.well_known, &auth.access, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_group(
    State(state): State<AppState>,
    Verified(auth): Verified,
    Json(req): Json<GroupRequest>,
) -> ApiResult<(StatusCode, Json<accounts::GroupRef>)> {
    let name = required(req.name, "Missing group name.")?;
    let group = accounts::create_group(state.store.as_ref(), &auth.access, &name).await?;
    Ok((StatusCode::CREATED, Json(group.into())))
}

async fn join_group(
    State(state): State<AppState>,
    Verified(auth): Verified,
    Path(group): Path<Uuid>,
    Json(req): Json<UserRequest>,
) -> ApiResult<StatusCode> {
    let user = required(req.user, "Missing user key in request.")?;
    accounts::join_group(state.store.as_ref(), &auth.access, user, group).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leave_group(
    State(state): State<AppState>,
    Verified(auth): Verified,
    Path((group, user)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    accounts::leave_group(state.store.as_ref(), &auth.access, user, group).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list(
    State(state): State<AppState>,
    Verified(auth): Verified,
) -> ApiResult<Json<Vec<listing::FileListing>>> {
    Ok(Json(listing::list(state.store.as_ref(), &auth.access).await?))
}

async fn tree_view(
    State(state): State<AppState>,
    Verified(auth): Verified,
) -> ApiResult<Json<tree::Forest>> {
    Ok(Json(tree::assemble(state.store.as_ref(), &auth.access).await?))
}

async fn get_file(
    State(state): State<AppState>,
    Verified(auth): Verified,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let file_id = Uuid::parse_str(&id).map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("File with ID {} does not exist.", id),
        )
    })?;
    let content = files::read_file(
        state.store.as_ref(),
        state.blobs.as_ref(),
        &auth.access,
        file_id,
    )
    .await?;
    Ok(([(header::CONTENT_TYPE, "text/cml")], content.bytes).into_response())
}
