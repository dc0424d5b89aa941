use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::linking::AccountLinker;
use crate::auth::session;
use crate::avatars::RetryPolicy;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::users::UserView;
use crate::social::{FederatedProfile, NewUser};
use crate::state::AppState;

pub const FEDERATION_SECRET_HEADER: &str = "x-federation-secret";

// -- Request types --

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// -- Cookie helpers --

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

fn signed_in(state: &AppState, user: &User, status: StatusCode) -> AppResult<Response> {
    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, &user.id, hours)?;
    Ok((
        status,
        [(
            header::SET_COOKIE,
            session_cookie(&state.config.auth.cookie_name, &token, hours),
        )],
        Json(UserView::new(user, state)),
    )
        .into_response())
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> AppResult<Response> {
    let user = state.users().register(&new_user)?;
    signed_in(&state, &user, StatusCode::CREATED)
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = state
        .users()
        .authenticate(&request.email, &request.password)?
        .ok_or(AppError::Unauthorized)?;
    tracing::info!(user_id = %user.id, "User signed in");
    signed_in(&state, &user, StatusCode::OK)
}

pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> AppResult<Response> {
    session::delete_session(&state.db, &current.session_token)?;
    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
    )
        .into_response())
}

/// Called by the identity-provider bridge with a verified profile.
pub async fn federated(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(profile): Json<FederatedProfile>,
) -> AppResult<Response> {
    let expected = state
        .config
        .auth
        .federation_secret
        .as_deref()
        .ok_or(AppError::NotFound)?;
    let presented = headers
        .get(FEDERATION_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if presented != expected {
        return Err(AppError::Unauthorized);
    }

    let users = state.users();
    let linker = AccountLinker {
        users: &users,
        blobs: state.blobs.as_ref(),
        fetcher: state.avatar_fetcher.as_ref(),
        policy: RetryPolicy::from_config(&state.config.avatars),
    };
    let user = linker.link(&profile).await?;
    signed_in(&state, &user, StatusCode::OK)
}
