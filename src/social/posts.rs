use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::db::models::{Comment, Post};
use crate::social::domain::{clean_body, MAX_COMMENT_CHARS, MAX_POST_CHARS};
use crate::social::error::{SocialError, SocialResult};
use crate::state::DbPool;

pub const FEED_LIMIT: usize = 50;

/// A post as it appears in someone's feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPost {
    pub id: String,
    pub user_id: String,
    pub author_name: String,
    pub body: String,
    pub created_at: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked: bool,
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        body: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub struct PostRepository {
    pool: DbPool,
}

impl PostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create_post(&self, user_id: &str, body: &str) -> SocialResult<Post> {
        let body = clean_body("body", body, MAX_POST_CHARS)?;
        let post_id = uuid::Uuid::now_v7().to_string();

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, user_id, body) VALUES (?1, ?2, ?3)",
            params![post_id, user_id, body],
        )?;

        tracing::debug!(post_id = %post_id, user_id = %user_id, "Post created");
        self.get(&post_id)
    }

    pub fn find(&self, post_id: &str) -> SocialResult<Option<Post>> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                "SELECT id, user_id, body, created_at, updated_at FROM posts WHERE id = ?1",
                params![post_id],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    pub fn get(&self, post_id: &str) -> SocialResult<Post> {
        self.find(post_id)?
            .ok_or_else(|| SocialError::NotFound(format!("post {post_id}")))
    }

    /// Authors only. Likes and comments go with the post.
    pub fn delete_post(&self, user_id: &str, post_id: &str) -> SocialResult<()> {
        let post = self.get(post_id)?;
        if post.user_id != user_id {
            return Err(SocialError::Forbidden(format!(
                "post {post_id} belongs to another user"
            )));
        }

        let conn = self.pool.get()?;
        conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
        Ok(())
    }

    /// A single user's posts, newest first.
    pub fn posts_by(&self, user_id: &str) -> SocialResult<Vec<Post>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, body, created_at, updated_at FROM posts
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let posts = stmt
            .query_map(params![user_id], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    /// Posts by the viewer and by the viewer's accepted friends, newest
    /// first. Pending requests never expose posts.
    ///
    /// Returns at most `limit` posts. Pass the id of the last post of a page
    /// as `before` to get the page after it; paging until an empty or short
    /// page reaches every post.
    pub fn feed(
        &self,
        viewer_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> SocialResult<Vec<FeedPost>> {
        let conn = self.pool.get()?;

        let cursor: Option<(String, String)> = match before {
            Some(post_id) => Some(
                conn.query_row(
                    "SELECT created_at, id FROM posts WHERE id = ?1",
                    params![post_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| SocialError::NotFound(format!("post {post_id}")))?,
            ),
            None => None,
        };
        let (before_at, before_id) = cursor.unzip();

        let mut stmt = conn.prepare(
            "SELECT p.id, p.user_id, u.firstname || ' ' || u.lastname, p.body, p.created_at,
                    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
                    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                    EXISTS(SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1)
             FROM posts p
             JOIN users u ON u.id = p.user_id
             WHERE (p.user_id = ?1
                    OR p.user_id IN (SELECT friend_id FROM friendships
                                     WHERE user_id = ?1 AND accepted = 1))
               AND (?2 IS NULL OR p.created_at < ?2 OR (p.created_at = ?2 AND p.id < ?3))
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ?4",
        )?;
        let posts = stmt
            .query_map(
                params![viewer_id, before_at, before_id, limit as i64],
                |row| {
                    Ok(FeedPost {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        author_name: row.get(2)?,
                        body: row.get(3)?,
                        created_at: row.get(4)?,
                        like_count: row.get(5)?,
                        comment_count: row.get(6)?,
                        liked: row.get(7)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    pub fn create_comment(&self, user_id: &str, post_id: &str, body: &str) -> SocialResult<Comment> {
        let body = clean_body("body", body, MAX_COMMENT_CHARS)?;
        // Verify post exists
        self.get(post_id)?;

        let comment = Comment {
            id: uuid::Uuid::now_v7().to_string(),
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            body,
            created_at: String::new(),
        };

        let conn = self.pool.get()?;
        let created_at: String = conn.query_row(
            "INSERT INTO comments (id, post_id, user_id, body) VALUES (?1, ?2, ?3, ?4)
             RETURNING created_at",
            params![comment.id, comment.post_id, comment.user_id, comment.body],
            |row| row.get(0),
        )?;

        Ok(Comment {
            created_at,
            ..comment
        })
    }

    /// Comments on a post, oldest first.
    pub fn comments_for(&self, post_id: &str) -> SocialResult<Vec<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, post_id, user_id, body, created_at FROM comments
             WHERE post_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    user_id: row.get(2)?,
                    body: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }
}
