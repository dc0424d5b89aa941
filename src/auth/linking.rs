// Sign-in through an external identity provider: match the verified profile
// to a local account, or create one and import the provider's picture.
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

use crate::avatars::fetch::{fetch_with_retry, large_image_url, AvatarFetcher, FetchError, RetryPolicy};
use crate::db::models::User;
use crate::social::{FederatedProfile, SocialError, UserRepository};
use crate::storage::{BlobStore, StorageError};

const GENERATED_PASSWORD_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum LinkingError {
    #[error("Email {0} is already linked to a different sign-in provider")]
    EmailTaken(String),

    #[error("Avatar import failed: {0}")]
    AvatarFetch(#[from] FetchError),

    #[error("Avatar storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Social(#[from] SocialError),
}

pub struct AccountLinker<'a> {
    pub users: &'a UserRepository,
    pub blobs: &'a dyn BlobStore,
    pub fetcher: &'a dyn AvatarFetcher,
    pub policy: RetryPolicy,
}

impl AccountLinker<'_> {
    pub async fn link(&self, profile: &FederatedProfile) -> Result<User, LinkingError> {
        if let Some(existing) = self.users.find_by_email(&profile.email)? {
            return match (existing.provider.as_deref(), existing.uid.as_deref()) {
                (None, None) => {
                    let user =
                        self.users
                            .link_provider(&existing.id, &profile.provider, &profile.uid)?;
                    tracing::info!(user_id = %user.id, provider = %profile.provider, "Linked existing account");
                    Ok(user)
                }
                (Some(provider), Some(uid)) if provider == profile.provider && uid == profile.uid => {
                    Ok(existing)
                }
                _ => {
                    tracing::warn!(provider = %profile.provider, "Email already linked elsewhere");
                    Err(LinkingError::EmailTaken(existing.email))
                }
            };
        }

        if let Some(user) = self.users.find_by_provider(&profile.provider, &profile.uid)? {
            return Ok(user);
        }

        // Network I/O happens before anything is written
        let avatar_key = match profile.image_url.as_deref() {
            Some(image_url) => {
                let url = large_image_url(image_url)?;
                let image = fetch_with_retry(self.fetcher, &url, &self.policy).await?;
                Some(self.blobs.put(image.data, &image.content_type).await?)
            }
            None => None,
        };

        match self
            .users
            .create_linked(profile, &generate_password(), avatar_key.as_deref())
        {
            Ok(user) => Ok(user),
            Err(e) => {
                if let Some(key) = avatar_key {
                    if let Err(cleanup) = self.blobs.delete(&key).await {
                        tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned avatar");
                    }
                }
                Err(e.into())
            }
        }
    }
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
