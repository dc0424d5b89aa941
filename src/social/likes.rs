use rusqlite::{params, OptionalExtension};

use crate::db::models::Like;
use crate::social::error::{SocialError, SocialResult};
use crate::state::DbPool;

fn like_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Like> {
    Ok(Like {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub struct LikeRepository {
    pool: DbPool,
}

impl LikeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Like a post. Liking it again returns the existing like.
    pub fn like(&self, user_id: &str, post_id: &str) -> SocialResult<Like> {
        let conn = self.pool.get()?;

        let post_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
            params![post_id],
            |row| row.get(0),
        )?;
        if !post_exists {
            return Err(SocialError::NotFound(format!("post {post_id}")));
        }

        let like_id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO likes (id, user_id, post_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, post_id) DO NOTHING",
            params![like_id, user_id, post_id],
        )?;

        let like = conn.query_row(
            "SELECT id, user_id, post_id, created_at FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            like_from_row,
        )?;
        Ok(like)
    }

    /// Remove a like. Only the user who liked may unlike.
    pub fn unlike(&self, user_id: &str, like_id: &str) -> SocialResult<()> {
        let like = self
            .find(like_id)?
            .ok_or_else(|| SocialError::NotFound(format!("like {like_id}")))?;
        if like.user_id != user_id {
            return Err(SocialError::Forbidden(format!(
                "like {like_id} belongs to another user"
            )));
        }

        let conn = self.pool.get()?;
        conn.execute("DELETE FROM likes WHERE id = ?1", params![like_id])?;
        Ok(())
    }

    pub fn find(&self, like_id: &str) -> SocialResult<Option<Like>> {
        let conn = self.pool.get()?;
        let like = conn
            .query_row(
                "SELECT id, user_id, post_id, created_at FROM likes WHERE id = ?1",
                params![like_id],
                like_from_row,
            )
            .optional()?;
        Ok(like)
    }

    pub fn likes(&self, user_id: &str, post_id: &str) -> SocialResult<bool> {
        let conn = self.pool.get()?;
        let liked = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND post_id = ?2)",
            params![user_id, post_id],
            |row| row.get(0),
        )?;
        Ok(liked)
    }

    pub fn like_count(&self, post_id: &str) -> SocialResult<i64> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
