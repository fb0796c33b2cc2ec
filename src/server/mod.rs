//! HTTP surface of the sync service.
//!
//! # Endpoints
//!
//! - `GET /health`: health check (no auth)
//! - `GET /api/me`, `DELETE /api/me`: the calling user
//! - `GET /api/users`, `GET /api/users/{id}`: public user views
//! - `GET /api/users/{id}/personality`: listening profile from saved tracks
//! - `GET /api/groups`: all groups (204 when there are none)
//! - `GET /api/groups/current`: the caller's group with each member's playback
//! - `POST /api/groups/join/{name}`, `POST /api/groups/leave`
//! - `POST /api/groups/synchronize`: leader pushes playback to the group
//! - `GET /api/spotify/login`: authorize URL for linking an account
//! - `GET /api/spotify/login/callback?code&state`: provider redirect (no auth)
//!
//! Everything under `/api` except the callback requires `Authorization: Bearer <api key>`.

mod auth;
mod routes;

pub use auth::AuthUser;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::accounts::AccountService;
use crate::db::{StoreError, UserRepository};
use crate::dispatcher::{SyncDispatcher, SyncError};
use crate::link::{AccountLinker, LinkError};
use crate::personality::{PersonalityError, PersonalityReader};
use crate::registry::{GroupRegistry, RegistryError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserRepository>,
    pub registry: Arc<GroupRegistry>,
    pub dispatcher: Arc<SyncDispatcher>,
    pub linker: Arc<AccountLinker>,
    pub accounts: Arc<AccountService>,
    pub personality: Arc<PersonalityReader>,
}

/// Builds the router with all routes and the auth layer.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/api/spotify/login/callback", get(routes::link_callback));

    let protected_routes = Router::new()
        .route("/api/me", get(routes::me).delete(routes::delete_me))
        .route("/api/users", get(routes::list_users))
        .route("/api/users/{id}", get(routes::get_user))
        .route("/api/users/{id}/personality", get(routes::user_personality))
        .route("/api/groups", get(routes::list_groups))
        .route("/api/groups/current", get(routes::current_group))
        .route("/api/groups/join/{name}", post(routes::join_group))
        .route("/api/groups/leave", post(routes::leave_group))
        .route("/api/groups/synchronize", post(routes::synchronize))
        .route("/api/spotify/login", get(routes::link_start))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// A failed request, rendered as `{error, message}` JSON.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", e);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => {
                ApiError::new(StatusCode::NOT_FOUND, "not_found", format!("Not found: {}", what))
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotInGroup => {
                ApiError::new(StatusCode::FORBIDDEN, "not_in_group", e.to_string())
            }
            RegistryError::Storage(_) => ApiError::internal(e),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let (status, error) = match e {
            SyncError::NoGroup => (StatusCode::NOT_FOUND, "no_group"),
            SyncError::NotLeader => (StatusCode::FORBIDDEN, "not_leader"),
            SyncError::Unlinked => (StatusCode::NOT_FOUND, "unlinked"),
            SyncError::NoActivePlayback => (StatusCode::NOT_FOUND, "no_active_playback"),
        };
        ApiError::new(status, error, e.to_string())
    }
}

impl From<LinkError> for ApiError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::InvalidState => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_state", e.to_string())
            }
            LinkError::Exchange(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "exchange_failed", e.to_string())
            }
            LinkError::Storage(_) => ApiError::internal(e),
        }
    }
}

impl From<PersonalityError> for ApiError {
    fn from(e: PersonalityError) -> Self {
        match e {
            PersonalityError::Unlinked => {
                ApiError::new(StatusCode::NOT_FOUND, "unlinked", e.to_string())
            }
            PersonalityError::Remote(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "remote_failed", e.to_string())
            }
        }
    }
}
