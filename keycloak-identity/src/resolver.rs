//! Maps a normalized identity onto a local user.

use crate::claims::NormalizedIdentity;
use crate::error::{IdentityError, StoreError};
use crate::store::{ExtraData, IdentityStore, LocalUser, NewUser, SocialLink};
use log::{debug, info, warn};
use std::sync::Arc;

/// Tokens returned by the provider's token endpoint during login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub user: LocalUser,
    pub outcome: ResolveOutcome,
}

impl Resolution {
    /// Whether the linked identity was saved, i.e. a sync event happened
    pub fn is_saved(&self) -> bool {
        self.outcome != ResolveOutcome::Unchanged
    }
}

/// Finds or creates local users keyed by `(provider, username)`.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    provider: String,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn IdentityStore>, provider: impl Into<String>) -> Self {
        Self {
            store,
            provider: provider.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Return the local user for `identity`, creating it when absent.
    ///
    /// `tokens` is only present for interactive logins; bearer requests pass
    /// `None` and leave the stored tokens alone.
    pub async fn resolve(
        &self,
        identity: &NormalizedIdentity,
        tokens: Option<&TokenSet>,
    ) -> Result<Resolution, IdentityError> {
        if identity.username.is_empty() {
            return Err(IdentityError::MissingSubject);
        }

        if let Some(existing) = self
            .store
            .find_user(&self.provider, &identity.username)
            .await?
        {
            return self.refresh(existing, identity, tokens).await;
        }

        let new_user = NewUser {
            username: identity.username.clone(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            full_name: identity.full_name.clone(),
            is_superuser: identity.is_superuser,
            is_staff: identity.is_staff,
            social: SocialLink {
                provider: self.provider.clone(),
                uid: identity.username.clone(),
                extra_data: extra_data(identity, tokens, None),
            },
        };

        match self.store.create_user(new_user).await {
            Ok(user) => {
                info!("Created local user '{}' (id {})", user.username, user.id);
                Ok(Resolution {
                    user,
                    outcome: ResolveOutcome::Created,
                })
            }
            Err(StoreError::Duplicate { .. }) => {
                // a concurrent login created the user first
                warn!(
                    "Concurrent creation of user '{}', reusing the stored record",
                    identity.username
                );
                let winner = self
                    .store
                    .find_user(&self.provider, &identity.username)
                    .await?
                    .ok_or_else(|| IdentityError::UserCreationConflict(identity.username.clone()))?;
                self.refresh(winner, identity, tokens).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh(
        &self,
        existing: LocalUser,
        identity: &NormalizedIdentity,
        tokens: Option<&TokenSet>,
    ) -> Result<Resolution, IdentityError> {
        let mut user = existing.clone();
        user.email = identity.email.clone();
        user.first_name = identity.first_name.clone();
        user.last_name = identity.last_name.clone();
        user.full_name = identity.full_name.clone();
        user.is_superuser = identity.is_superuser;
        user.is_staff = identity.is_staff;
        user.social.extra_data = extra_data(identity, tokens, Some(&existing.social.extra_data));

        if user == existing {
            debug!("Local user '{}' is up to date", user.username);
            return Ok(Resolution {
                user,
                outcome: ResolveOutcome::Unchanged,
            });
        }

        self.store.update_user(&user).await?;
        debug!("Updated local user '{}'", user.username);
        Ok(Resolution {
            user,
            outcome: ResolveOutcome::Updated,
        })
    }
}

fn extra_data(
    identity: &NormalizedIdentity,
    tokens: Option<&TokenSet>,
    previous: Option<&ExtraData>,
) -> ExtraData {
    let mut data = previous.cloned().unwrap_or_default();
    data.username = identity.username.clone();
    data.roles = identity.roles.clone();
    if let Some(tokens) = tokens {
        data.access_token = Some(tokens.access_token.clone());
        data.refresh_token = tokens.refresh_token.clone();
        data.expires = tokens.expires_in;
    }
    data
}
