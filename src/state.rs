use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::avatars::DynAvatarFetcher;
use crate::config::Config;
use crate::social::{FriendshipRepository, LikeRepository, PostRepository, UserRepository};
use crate::storage::DynBlobStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub blobs: DynBlobStore,
    pub avatar_fetcher: DynAvatarFetcher,
}

impl AppState {
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.db.clone()).with_password_cost(self.config.auth.password_cost)
    }

    pub fn friendships(&self) -> FriendshipRepository {
        FriendshipRepository::new(self.db.clone())
    }

    pub fn posts(&self) -> PostRepository {
        PostRepository::new(self.db.clone())
    }

    pub fn likes(&self) -> LikeRepository {
        LikeRepository::new(self.db.clone())
    }
}
