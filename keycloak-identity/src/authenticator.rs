//! Authentication pipeline: verify, map, resolve, and the post-authentication
//! role synchronization hook.

use crate::backend::KeycloakBackend;
use crate::error::AuthenticationError;
use crate::resolver::{IdentityResolver, Resolution, TokenSet};
use crate::store::{IdentityStore, LocalUser};
use crate::sync::{RoleSynchronizer, SyncReport, SyncScope};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: LocalUser,
    pub roles: BTreeSet<String>,
    /// Report of the synchronization run, if this event triggered one
    pub synced: Option<SyncReport>,
}

#[derive(Clone)]
pub struct Authenticator {
    backend: Arc<KeycloakBackend>,
    resolver: IdentityResolver,
    synchronizer: RoleSynchronizer,
}

impl Authenticator {
    pub fn new(
        backend: Arc<KeycloakBackend>,
        store: Arc<dyn IdentityStore>,
        scope: SyncScope,
    ) -> Self {
        Self {
            backend,
            resolver: IdentityResolver::new(store.clone(), KeycloakBackend::NAME),
            synchronizer: RoleSynchronizer::new(store, scope),
        }
    }

    pub fn backend(&self) -> &KeycloakBackend {
        &self.backend
    }

    /// Authenticate an API request carrying `Authorization: Bearer <token>`.
    pub async fn authenticate_bearer(
        &self,
        token: &str,
    ) -> Result<AuthenticatedUser, AuthenticationError> {
        self.authenticate(token, None).await
    }

    /// Finish an interactive login with the tokens returned by the provider.
    pub async fn complete_login(
        &self,
        tokens: &TokenSet,
    ) -> Result<AuthenticatedUser, AuthenticationError> {
        self.authenticate(&tokens.access_token, Some(tokens)).await
    }

    async fn authenticate(
        &self,
        token: &str,
        tokens: Option<&TokenSet>,
    ) -> Result<AuthenticatedUser, AuthenticationError> {
        let claims = self.backend.user_data(token).inspect_err(|e| {
            warn!("Rejected token: {}", e);
        })?;
        let identity = self.backend.user_details(&claims);
        let resolution = self.resolver.resolve(&identity, tokens).await?;
        let synced = self.after_authentication(&resolution).await?;

        Ok(AuthenticatedUser {
            user: resolution.user,
            roles: identity.roles,
            synced,
        })
    }

    /// Runs for every saved identity, and for unchanged identities whose
    /// memberships drifted from their roles (e.g. after an interrupted sync).
    async fn after_authentication(
        &self,
        resolution: &Resolution,
    ) -> Result<Option<SyncReport>, AuthenticationError> {
        let user = &resolution.user;
        let roles = &user.social.extra_data.roles;
        if !resolution.is_saved() {
            if self.synchronizer.is_current(user, roles).await? {
                debug!("Identity of '{}' unchanged, skipping role sync", user.username);
                return Ok(None);
            }
            warn!(
                "Groups of '{}' do not match their roles, synchronizing again",
                user.username
            );
        }
        let report = self.synchronizer.sync(user, roles).await?;
        Ok(Some(report))
    }
}
