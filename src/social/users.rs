use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::models::User;
use crate::social::domain::{normalize_email, FederatedProfile, NewUser, ProfileUpdate, ValidationErrors};
use crate::social::error::{is_constraint_violation, SocialError, SocialResult};
use crate::state::DbPool;

pub(crate) const USER_COLUMNS: &str =
    "u.id, u.email, u.firstname, u.lastname, u.about, u.avatar_key, u.banner_key, u.provider, u.uid, u.created_at";

/// Number of columns in `USER_COLUMNS`, for queries that select more after them.
pub(crate) const USER_COLUMN_COUNT: usize = 10;

pub(crate) fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        firstname: row.get(2)?,
        lastname: row.get(3)?,
        about: row.get(4)?,
        avatar_key: row.get(5)?,
        banner_key: row.get(6)?,
        provider: row.get(7)?,
        uid: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub(crate) fn find_on(conn: &Connection, user_id: &str) -> SocialResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
            params![user_id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Which uploaded image a user record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Avatar,
    Banner,
}

impl ImageSlot {
    fn column(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "avatar_key",
            ImageSlot::Banner => "banner_key",
        }
    }

    /// Field name used in validation errors.
    pub fn field(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "avatar",
            ImageSlot::Banner => "banner_picture",
        }
    }
}

pub struct UserRepository {
    pool: DbPool,
    password_cost: u32,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub fn register(&self, new_user: &NewUser) -> SocialResult<User> {
        new_user.validate()?;
        let hash = bcrypt::hash(&new_user.password, self.password_cost)?;
        let conn = self.pool.get()?;
        let user = insert_user(&conn, new_user, &hash, None, None)?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Create an account for a federated identity that has no local user yet.
    pub fn create_linked(
        &self,
        profile: &FederatedProfile,
        password: &str,
        avatar_key: Option<&str>,
    ) -> SocialResult<User> {
        let new_user = NewUser {
            email: profile.email.clone(),
            password: password.to_string(),
            firstname: profile.first_name.clone(),
            lastname: profile.last_name.clone(),
        };
        new_user.validate()?;
        let hash = bcrypt::hash(password, self.password_cost)?;
        let conn = self.pool.get()?;
        let user = insert_user(
            &conn,
            &new_user,
            &hash,
            Some((profile.provider.as_str(), profile.uid.as_str())),
            avatar_key,
        )?;
        tracing::info!(user_id = %user.id, provider = %profile.provider, "Linked user created");
        Ok(user)
    }

    /// Check credentials. Unknown email and wrong password both yield `None`.
    pub fn authenticate(&self, email: &str, password: &str) -> SocialResult<Option<User>> {
        let conn = self.pool.get()?;
        let found: Option<(User, String)> = conn
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE u.email = ?1"
                ),
                params![normalize_email(email)],
                |row| Ok((user_from_row(row)?, row.get(USER_COLUMN_COUNT)?)),
            )
            .optional()?;

        Ok(found.and_then(|(user, hash)| {
            if bcrypt::verify(password, &hash).unwrap_or(false) {
                Some(user)
            } else {
                None
            }
        }))
    }

    pub fn find(&self, user_id: &str) -> SocialResult<Option<User>> {
        let conn = self.pool.get()?;
        find_on(&conn, user_id)
    }

    pub fn get(&self, user_id: &str) -> SocialResult<User> {
        self.find(user_id)?
            .ok_or_else(|| SocialError::NotFound(format!("user {user_id}")))
    }

    pub fn find_by_email(&self, email: &str) -> SocialResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1"),
                params![normalize_email(email)],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_by_provider(&self, provider: &str, uid: &str) -> SocialResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.provider = ?1 AND u.uid = ?2"),
                params![provider, uid],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Attach a federated identity to an account that has none yet.
    pub fn link_provider(&self, user_id: &str, provider: &str, uid: &str) -> SocialResult<User> {
        let conn = self.pool.get()?;
        let updated = conn
            .execute(
                "UPDATE users SET provider = ?2, uid = ?3
                 WHERE id = ?1 AND provider IS NULL AND uid IS NULL",
                params![user_id, provider, uid],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    SocialError::Conflict(format!("{provider} identity already linked"))
                } else {
                    e.into()
                }
            })?;
        if updated == 0 {
            return Err(SocialError::Conflict(format!(
                "user {user_id} is already linked to a provider"
            )));
        }
        find_on(&conn, user_id)?.ok_or_else(|| SocialError::NotFound(format!("user {user_id}")))
    }

    pub fn list(&self) -> SocialResult<Vec<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users u ORDER BY u.firstname, u.lastname, u.id"
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn count(&self) -> SocialResult<i64> {
        let conn = self.pool.get()?;
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> SocialResult<User> {
        update.validate()?;
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE users SET firstname = ?2, lastname = ?3, about = ?4 WHERE id = ?1",
            params![
                user_id,
                update.firstname.trim(),
                update.lastname.trim(),
                update.about
            ],
        )?;
        if updated == 0 {
            return Err(SocialError::NotFound(format!("user {user_id}")));
        }
        find_on(&conn, user_id)?.ok_or_else(|| SocialError::NotFound(format!("user {user_id}")))
    }

    /// Point an image slot at a new blob key. Returns the key it replaced.
    pub fn set_image(
        &self,
        user_id: &str,
        slot: ImageSlot,
        key: Option<&str>,
    ) -> SocialResult<Option<String>> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous: Option<String> = tx
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", slot.column()),
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| SocialError::NotFound(format!("user {user_id}")))?;

        tx.execute(
            &format!("UPDATE users SET {} = ?2 WHERE id = ?1", slot.column()),
            params![user_id, key],
        )?;
        tx.commit()?;

        Ok(previous)
    }

    /// Delete a user and everything hanging off it, including the friendship
    /// edges other users hold towards it. Returns the deleted record.
    pub fn destroy(&self, user_id: &str) -> SocialResult<User> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let user = find_on(&tx, user_id)?
            .ok_or_else(|| SocialError::NotFound(format!("user {user_id}")))?;

        // Both directions of every pair the user is part of
        let edges = tx.execute(
            "DELETE FROM friendships WHERE user_id = ?1 OR friend_id = ?1",
            params![user_id],
        )?;
        tx.execute(
            "DELETE FROM likes
             WHERE user_id = ?1 OR post_id IN (SELECT id FROM posts WHERE user_id = ?1)",
            params![user_id],
        )?;
        tx.execute(
            "DELETE FROM comments
             WHERE user_id = ?1 OR post_id IN (SELECT id FROM posts WHERE user_id = ?1)",
            params![user_id],
        )?;
        let posts = tx.execute("DELETE FROM posts WHERE user_id = ?1", params![user_id])?;
        tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;

        tx.commit()?;

        tracing::info!(user_id = %user_id, edges, posts, "User destroyed");
        Ok(user)
    }
}

fn insert_user(
    conn: &Connection,
    new_user: &NewUser,
    password_hash: &str,
    identity: Option<(&str, &str)>,
    avatar_key: Option<&str>,
) -> SocialResult<User> {
    let id = uuid::Uuid::now_v7().to_string();
    let (provider, uid) = identity.unzip();

    conn.execute(
        "INSERT INTO users (id, email, password_hash, firstname, lastname, avatar_key, provider, uid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            normalize_email(&new_user.email),
            password_hash,
            new_user.firstname.trim(),
            new_user.lastname.trim(),
            avatar_key,
            provider,
            uid
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            SocialError::Validation(ValidationErrors::single("email", "has already been taken"))
        } else {
            e.into()
        }
    })?;

    find_on(conn, &id)?.ok_or_else(|| SocialError::NotFound(format!("user {id}")))
}
