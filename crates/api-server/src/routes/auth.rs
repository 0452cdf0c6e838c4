//! Registration and login

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::{issue_user_token, MembershipInfo, UserSummary};
use crate::error::{internal_error, map_identity_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
    pub memberships: Vec<MembershipInfo>,
}

fn build_response(state: &AppState, user: UserSummary, memberships: Vec<MembershipInfo>) -> ApiResult<AuthResponse> {
    let config = state.config();
    let token = issue_user_token(
        &user.id.to_string(),
        &user.email,
        &config.jwt_secret,
        config.jwt_expires_in_hours,
    )
    .map_err(internal_error)?;
    Ok(AuthResponse {
        token,
        user,
        memberships,
    })
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let (user, memberships) = state
        .identity_store()
        .register_user(&req.email, &req.password, &req.name)
        .await
        .map_err(map_identity_error)?;
    Ok((
        StatusCode::CREATED,
        Json(build_response(&state, user, memberships)?),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let (user, memberships) = state
        .identity_store()
        .login(&req.email, &req.password)
        .await
        .map_err(map_identity_error)?;
    Ok(Json(build_response(&state, user, memberships)?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}
