use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, AuthUser};
use crate::dispatcher::MemberPlayback;
use crate::models::{GroupSummary, User, UserId};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn me(Extension(AuthUser(user)): Extension<AuthUser>) -> Json<User> {
    Json(user)
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    state.accounts.delete_user(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.users.list().await?))
}

async fn find_user(state: &AppState, id: UserId) -> Result<User, ApiError> {
    state.users.get(id).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("User {} not found", id),
        )
    })
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(find_user(&state, id).await?))
}

/// Listening profile of any user; 204 when none of their saved tracks has
/// audio analysis.
pub async fn user_personality(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Response, ApiError> {
    let user = find_user(&state, id).await?;

    match state.personality.personality(user.id).await? {
        Some(personality) => Ok(Json(personality).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn list_groups(State(state): State<AppState>) -> Response {
    let groups = state.registry.list_groups().await;
    if groups.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(groups).into_response()
}

#[derive(Serialize)]
pub struct CurrentGroupResponse {
    name: String,
    leader_id: UserId,
    is_leader: bool,
    members: Vec<MemberPlayback>,
}

pub async fn current_group(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<CurrentGroupResponse>, ApiError> {
    let group = state.registry.get_group(user.id).await.ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "no_group", "User is not in a group")
    })?;
    let members = state.dispatcher.snapshot(&group.name).await;

    Ok(Json(CurrentGroupResponse {
        is_leader: group.is_leader(user.id),
        name: group.name,
        leader_id: group.leader_id,
        members,
    }))
}

pub async fn join_group(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(name): Path<String>,
) -> Result<Json<GroupSummary>, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_name",
            "Group name must not be empty",
        ));
    }

    let summary = state.registry.join(user.id, name).await?;
    Ok(Json(summary))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<GroupSummary>, ApiError> {
    let summary = state.registry.leave(user.id).await?;
    Ok(Json(summary))
}

/// Mirrors the caller's playback to their group. Only the leader may call it.
pub async fn synchronize(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    let group_name = state
        .registry
        .get_group(user.id)
        .await
        .map(|group| group.name)
        .unwrap_or_default();

    state.dispatcher.synchronize(&group_name, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct LinkStartResponse {
    url: String,
}

pub async fn link_start(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Json<LinkStartResponse> {
    Json(LinkStartResponse {
        url: state.linker.authorize_url(user.id),
    })
}

#[derive(Deserialize)]
pub struct LinkCallbackParams {
    code: Option<String>,
    state: Option<String>,
    /// Set by the provider when the user declines.
    error: Option<String>,
}

#[derive(Serialize)]
pub struct LinkedResponse {
    user_id: UserId,
}

pub async fn link_callback(
    State(state): State<AppState>,
    Query(params): Query<LinkCallbackParams>,
) -> Result<(StatusCode, Json<LinkedResponse>), ApiError> {
    if let Some(error) = params.error {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "link_denied",
            format!("Authorization was not granted: {}", error),
        ));
    }
    let (Some(code), Some(link_state)) = (params.code, params.state) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Both code and state are required",
        ));
    };

    let user_id = state.linker.complete(&code, &link_state).await?;
    Ok((StatusCode::ACCEPTED, Json(LinkedResponse { user_id })))
}
