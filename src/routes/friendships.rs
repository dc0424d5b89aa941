use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Serialize;

use crate::db::models::Friendship;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::users::UserView;
use crate::social::FriendshipStatus;
use crate::state::AppState;

#[derive(Serialize)]
pub struct FriendRequestView {
    pub friendship_id: String,
    pub requester: UserView,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct FriendshipIndex {
    pub friends: Vec<UserView>,
    /// Only present on your own page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_friends: Option<Vec<UserView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_requests: Option<Vec<FriendRequestView>>,
}

#[derive(Serialize)]
pub struct FriendshipCreated {
    pub friendship: Friendship,
    pub status: FriendshipStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/friendships", get(index).post(create))
        .route("/users/{id}/friendships/{friendship_id}", delete(destroy))
}

async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<FriendshipIndex>> {
    state.users().find(&user_id)?.ok_or(AppError::NotFound)?;
    let friendships = state.friendships();

    let friends = friendships
        .mutual_friends(&user_id)?
        .iter()
        .map(|u| UserView::new(u, &state))
        .collect();

    let (pending_friends, friend_requests) = if current.id() == user_id {
        let pending = friendships
            .pending_friends(&user_id)?
            .iter()
            .map(|u| UserView::new(u, &state))
            .collect();
        let requests = friendships
            .friend_requests(&user_id)?
            .into_iter()
            .map(|r| FriendRequestView {
                friendship_id: r.friendship.id,
                requester: UserView::new(&r.requester, &state),
                created_at: r.friendship.created_at,
            })
            .collect();
        (Some(pending), Some(requests))
    } else {
        (None, None)
    };

    Ok(Json(FriendshipIndex {
        friends,
        pending_friends,
        friend_requests,
    }))
}

/// Ask `user_id` to be friends, or accept when they already asked.
async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<(StatusCode, Json<FriendshipCreated>)> {
    let friendships = state.friendships();

    let (status, friendship) = match friendships.friendship_status(current.id(), &user_id)? {
        FriendshipStatus::None => (
            StatusCode::CREATED,
            friendships.add_friend(current.id(), &user_id)?,
        ),
        FriendshipStatus::PendingIncoming => (
            StatusCode::OK,
            friendships.accept_friend_request(current.id(), &user_id)?,
        ),
        FriendshipStatus::PendingOutgoing => {
            return Err(AppError::Conflict("Friend request already sent".into()))
        }
        FriendshipStatus::Accepted => {
            return Err(AppError::Conflict("Already friends".into()))
        }
    };

    let relation = FriendshipStatus::from_edge(
        current.id(),
        &friendship.requested_by_id,
        friendship.accepted,
    );
    Ok((
        status,
        Json(FriendshipCreated {
            friendship,
            status: relation,
        }),
    ))
}

async fn destroy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((user_id, id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let friendships = state.friendships();
    let friendship = friendships.find(&id)?.ok_or(AppError::NotFound)?;
    if friendship.user_id != user_id && friendship.friend_id != user_id {
        return Err(AppError::NotFound);
    }

    friendships.destroy(current.id(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}
