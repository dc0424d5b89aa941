use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{Comment, Like, Post};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

// --- Forms ---

#[derive(Deserialize)]
pub struct BodyForm {
    pub body: String,
}

#[derive(Serialize)]
pub struct LikeView {
    pub like: Like,
    pub like_count: i64,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{id}", delete(delete_post))
        .route("/posts/{id}/likes", post(like_post))
        .route("/posts/{id}/comments", get(list_comments).post(create_comment))
        .route("/likes/{id}", delete(unlike))
}

// --- Handlers ---

async fn create_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<BodyForm>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state.posts().create_post(current.id(), &form.body)?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn delete_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.posts().delete_post(current.id(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<(StatusCode, Json<LikeView>)> {
    let likes = state.likes();
    let like = likes.like(current.id(), &post_id)?;
    let like_count = likes.like_count(&post_id)?;
    Ok((StatusCode::CREATED, Json(LikeView { like, like_count })))
}

async fn unlike(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.likes().unlike(current.id(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_comments(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    let posts = state.posts();
    posts.get(&post_id)?;
    Ok(Json(posts.comments_for(&post_id)?))
}

async fn create_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(post_id): Path<String>,
    Json(form): Json<BodyForm>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .posts()
        .create_comment(current.id(), &post_id, &form.body)?;
    Ok((StatusCode::CREATED, Json(comment)))
}
