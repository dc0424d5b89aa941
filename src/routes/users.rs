use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::handlers::clear_session_cookie;
use crate::avatars;
use crate::db::models::{Post, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::social::{FriendshipStatus, ImageSlot, ProfileUpdate, ValidationErrors};
use crate::state::AppState;

// --- View structs ---

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    pub fullname: String,
    pub about: String,
    pub avatar_url: String,
    pub banner_url: Option<String>,
    pub date_joined: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendship: Option<FriendshipStatus>,
}

impl UserView {
    pub fn new(user: &User, state: &AppState) -> Self {
        let size = state.config.avatars.default_size;
        Self {
            id: user.id.clone(),
            firstname: user.firstname.clone(),
            lastname: user.lastname.clone(),
            fullname: user.fullname(),
            about: user.about.clone(),
            avatar_url: avatars::avatar_url(user, size, state.blobs.as_ref()),
            banner_url: avatars::banner_url(user, size, state.blobs.as_ref()),
            date_joined: user.date_joined(),
            friendship: None,
        }
    }

    /// Adds how `viewer` relates to this user. Viewing yourself adds nothing.
    pub fn seen_by(mut self, viewer: Option<&CurrentUser>, state: &AppState) -> AppResult<Self> {
        if let Some(viewer) = viewer {
            if viewer.id() != self.id {
                self.friendship = Some(state.friendships().friendship_status(viewer.id(), &self.id)?);
            }
        }
        Ok(self)
    }
}

#[derive(Serialize)]
pub struct UserPage {
    pub user: UserView,
    pub friend_count: usize,
    pub posts: Vec<Post>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(index))
        .route("/users/{id}", get(show))
        .route("/profile", axum::routing::put(update_profile).delete(destroy_account))
        .route("/profile/avatar", post(upload_avatar))
        .route("/profile/banner", post(upload_banner))
}

// --- Handlers ---

async fn index(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
) -> AppResult<Json<Vec<UserView>>> {
    let users = state.users().list()?;
    let views = users
        .iter()
        .map(|user| UserView::new(user, &state).seen_by(viewer.as_ref(), &state))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(views))
}

async fn show(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<UserPage>> {
    let user = state.users().find(&id)?.ok_or(AppError::NotFound)?;
    let friend_count = state.friendships().mutual_friend_ids(&user.id)?.len();
    let posts = state.posts().posts_by(&user.id)?;

    Ok(Json(UserPage {
        user: UserView::new(&user, &state).seen_by(viewer.as_ref(), &state)?,
        friend_count,
        posts,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<UserView>> {
    let user = state.users().update_profile(current.id(), &update)?;
    Ok(Json(UserView::new(&user, &state)))
}

async fn upload_avatar(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<UserView>> {
    upload_image(state, current, multipart, ImageSlot::Avatar).await
}

async fn upload_banner(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<UserView>> {
    upload_image(state, current, multipart, ImageSlot::Banner).await
}

async fn upload_image(
    state: AppState,
    current: CurrentUser,
    mut multipart: Multipart,
    slot: ImageSlot,
) -> AppResult<Json<UserView>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(slot.field()) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let user = avatars::replace_image(
            &state.users(),
            state.blobs.as_ref(),
            current.id(),
            slot,
            data,
            content_type.as_deref(),
            file_name.as_deref(),
        )
        .await?;
        return Ok(Json(UserView::new(&user, &state)));
    }

    Err(AppError::Validation(ValidationErrors::single(
        slot.field(),
        "is missing",
    )))
}

async fn destroy_account(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<Response> {
    let user = state.users().destroy(current.id())?;

    for key in [user.avatar_key, user.banner_key].into_iter().flatten() {
        if let Err(e) = state.blobs.delete(&key).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove blob of deleted user");
        }
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
    )
        .into_response())
}
