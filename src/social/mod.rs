pub mod domain;
pub mod error;
pub mod friendships;
pub mod likes;
pub mod posts;
pub mod users;

pub use domain::{
    FederatedProfile, FieldError, FriendshipStatus, NewUser, ProfileUpdate, ValidationErrors,
};
pub use error::{SocialError, SocialResult};
pub use friendships::{FriendRequest, FriendshipRepository};
pub use likes::LikeRepository;
pub use posts::{FeedPost, PostRepository, FEED_LIMIT};
pub use users::{ImageSlot, UserRepository};
