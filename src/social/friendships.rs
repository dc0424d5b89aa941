// Friendship edges. Every friendship is two rows, A->B and B->A, that share
// requested_by_id and accepted. All writes keep the pair together.
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use crate::db::models::{Friendship, User};
use crate::social::domain::{FriendshipStatus, ValidationErrors};
use crate::social::error::{is_constraint_violation, SocialError, SocialResult};
use crate::social::users::{user_from_row, USER_COLUMNS, USER_COLUMN_COUNT};
use crate::state::DbPool;

const FRIENDSHIP_COLUMNS: &str = "f.id, f.user_id, f.friend_id, f.requested_by_id, f.accepted, f.created_at";

fn friendship_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Friendship> {
    Ok(Friendship {
        id: row.get(offset)?,
        user_id: row.get(offset + 1)?,
        friend_id: row.get(offset + 2)?,
        requested_by_id: row.get(offset + 3)?,
        accepted: row.get(offset + 4)?,
        created_at: row.get(offset + 5)?,
    })
}

/// An incoming request: the requester's edge pointing at the viewer.
#[derive(Debug, Clone, Serialize)]
pub struct FriendRequest {
    pub friendship: Friendship,
    pub requester: User,
}

/// Friend ids of the user's accepted edges.
pub(crate) fn accepted_friend_ids(conn: &Connection, user_id: &str) -> SocialResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT friend_id FROM friendships WHERE user_id = ?1 AND accepted = 1 ORDER BY friend_id",
    )?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn edge(conn: &Connection, owner_id: &str, friend_id: &str) -> SocialResult<Option<Friendship>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {FRIENDSHIP_COLUMNS} FROM friendships f
                 WHERE f.user_id = ?1 AND f.friend_id = ?2"
            ),
            params![owner_id, friend_id],
            |row| friendship_from_row(row, 0),
        )
        .optional()?;
    Ok(found)
}

pub struct FriendshipRepository {
    pool: DbPool,
}

impl FriendshipRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Send a friend request: writes both directed edges, pending, initiated by `user_id`.
    pub fn add_friend(&self, user_id: &str, other_id: &str) -> SocialResult<Friendship> {
        if user_id == other_id {
            return Err(ValidationErrors::single("friend_id", "can't be yourself").into());
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for id in [user_id, other_id] {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(SocialError::NotFound(format!("user {id}")));
            }
        }

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM friendships
             WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            params![user_id, other_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(SocialError::Conflict(format!(
                "friendship between {user_id} and {other_id} already exists"
            )));
        }

        let primary_id = uuid::Uuid::now_v7().to_string();
        let mirror_id = uuid::Uuid::now_v7().to_string();
        let insert = "INSERT INTO friendships (id, user_id, friend_id, requested_by_id, accepted)
                      VALUES (?1, ?2, ?3, ?4, 0)";
        for (id, owner, friend) in [
            (&primary_id, user_id, other_id),
            (&mirror_id, other_id, user_id),
        ] {
            tx.execute(insert, params![id, owner, friend, user_id])
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        SocialError::Conflict(format!(
                            "friendship between {user_id} and {other_id} already exists"
                        ))
                    } else {
                        e.into()
                    }
                })?;
        }

        let friendship = edge(&tx, user_id, other_id)?
            .ok_or_else(|| SocialError::NotFound(format!("friendship {primary_id}")))?;
        tx.commit()?;

        tracing::info!(from = %user_id, to = %other_id, "Friend request sent");
        Ok(friendship)
    }

    /// Accept the pending request `requester_id` sent to `user_id`. Flips both edges.
    pub fn accept_friend_request(
        &self,
        user_id: &str,
        requester_id: &str,
    ) -> SocialResult<Friendship> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE friendships SET accepted = 1, updated_at = datetime('now')
             WHERE ((user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))
               AND requested_by_id = ?2 AND accepted = 0",
            params![user_id, requester_id],
        )?;
        if updated != 2 {
            // Dropping the transaction rolls back a partial update
            return Err(SocialError::NotFound(format!(
                "pending friend request from {requester_id}"
            )));
        }

        let friendship = edge(&tx, user_id, requester_id)?
            .ok_or_else(|| SocialError::NotFound(format!("friendship with {requester_id}")))?;
        tx.commit()?;

        tracing::info!(user_id = %user_id, requester = %requester_id, "Friend request accepted");
        Ok(friendship)
    }

    /// Delete both edges between two users: declines, cancels or unfriends.
    pub fn remove_friendship(&self, user_id: &str, other_id: &str) -> SocialResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM friendships
             WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            params![user_id, other_id],
        )?;
        tx.commit()?;

        if removed == 0 {
            return Err(SocialError::NotFound(format!(
                "friendship between {user_id} and {other_id}"
            )));
        }
        tracing::info!(user_id = %user_id, other = %other_id, removed, "Friendship removed");
        Ok(())
    }

    /// Remove the pair containing edge `friendship_id`. The actor must be one of its two users.
    pub fn destroy(&self, actor_id: &str, friendship_id: &str) -> SocialResult<()> {
        let friendship = self
            .find(friendship_id)?
            .ok_or_else(|| SocialError::NotFound(format!("friendship {friendship_id}")))?;
        if friendship.user_id != actor_id && friendship.friend_id != actor_id {
            return Err(SocialError::Forbidden(format!(
                "friendship {friendship_id} belongs to other users"
            )));
        }
        self.remove_friendship(&friendship.user_id, &friendship.friend_id)
    }

    pub fn find(&self, friendship_id: &str) -> SocialResult<Option<Friendship>> {
        let conn = self.pool.get()?;
        let found = conn
            .query_row(
                &format!("SELECT {FRIENDSHIP_COLUMNS} FROM friendships f WHERE f.id = ?1"),
                params![friendship_id],
                |row| friendship_from_row(row, 0),
            )
            .optional()?;
        Ok(found)
    }

    /// The edge owned by `user_id` pointing at `other_id`, in any state.
    pub fn edge(&self, user_id: &str, other_id: &str) -> SocialResult<Option<Friendship>> {
        let conn = self.pool.get()?;
        edge(&conn, user_id, other_id)
    }

    /// Only accepted friendships count.
    pub fn friends_with(&self, user_id: &str, other_id: &str) -> SocialResult<bool> {
        Ok(self.friendship_status(user_id, other_id)? == FriendshipStatus::Accepted)
    }

    pub fn friendship_status(&self, user_id: &str, other_id: &str) -> SocialResult<FriendshipStatus> {
        Ok(match self.edge(user_id, other_id)? {
            Some(f) => FriendshipStatus::from_edge(user_id, &f.requested_by_id, f.accepted),
            None => FriendshipStatus::None,
        })
    }

    /// Incoming pending requests, oldest first. Mirrors of the user's own
    /// outgoing requests are excluded.
    pub fn friend_requests(&self, user_id: &str) -> SocialResult<Vec<FriendRequest>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS}, {FRIENDSHIP_COLUMNS}
             FROM friendships f
             JOIN users u ON u.id = f.user_id
             WHERE f.friend_id = ?1 AND f.accepted = 0 AND f.requested_by_id <> ?1
             ORDER BY f.created_at, f.id"
        ))?;
        let requests = stmt
            .query_map(params![user_id], |row| {
                Ok(FriendRequest {
                    requester: user_from_row(row)?,
                    friendship: friendship_from_row(row, USER_COLUMN_COUNT)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    pub fn has_pending_friend_requests(&self, user_id: &str) -> SocialResult<bool> {
        let conn = self.pool.get()?;
        let pending: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM friendships
                WHERE friend_id = ?1 AND accepted = 0 AND requested_by_id <> ?1
             )",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(pending)
    }

    /// Users with an accepted edge from `user_id`.
    pub fn mutual_friends(&self, user_id: &str) -> SocialResult<Vec<User>> {
        self.friends_where(user_id, "f.accepted = 1")
    }

    /// Users who asked `user_id` and are still waiting on an answer.
    pub fn pending_friends(&self, user_id: &str) -> SocialResult<Vec<User>> {
        self.friends_where(user_id, "f.accepted = 0 AND f.requested_by_id <> ?1")
    }

    pub fn mutual_friend_ids(&self, user_id: &str) -> SocialResult<Vec<String>> {
        let conn = self.pool.get()?;
        accepted_friend_ids(&conn, user_id)
    }

    fn friends_where(&self, user_id: &str, condition: &str) -> SocialResult<Vec<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS}
             FROM friendships f
             JOIN users u ON u.id = f.friend_id
             WHERE f.user_id = ?1 AND {condition}
             ORDER BY u.firstname, u.lastname, u.id"
        ))?;
        let users = stmt
            .query_map(params![user_id], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}
