use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::routes::users::UserView;
use crate::social::{FeedPost, FEED_LIMIT};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FeedQuery {
    /// Id of the last post of the previous page
    pub before: Option<String>,
}

#[derive(Serialize)]
pub struct Home {
    pub user_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<Vec<FeedPost>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_pending_friend_requests: Option<bool>,
    /// Pass as `?before=` for the next page. Absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_before: Option<String>,
}

pub async fn index(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Home>> {
    let user_count = state.users().count()?;

    let Some(current) = current else {
        return Ok(Json(Home {
            user_count,
            user: None,
            feed: None,
            has_pending_friend_requests: None,
            next_before: None,
        }));
    };

    let feed = state
        .posts()
        .feed(current.id(), query.before.as_deref(), FEED_LIMIT)?;
    let next_before = if feed.len() == FEED_LIMIT {
        feed.last().map(|p| p.id.clone())
    } else {
        None
    };
    let pending = state
        .friendships()
        .has_pending_friend_requests(current.id())?;

    Ok(Json(Home {
        user_count,
        user: Some(UserView::new(&current.user, &state)),
        feed: Some(feed),
        has_pending_friend_requests: Some(pending),
        next_before,
    }))
}
