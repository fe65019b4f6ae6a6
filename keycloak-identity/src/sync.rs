//! Reconciles a user's role-derived group memberships with the roles of the
//! latest authentication event.

use crate::error::{IdentityError, StoreError};
use crate::store::{IdentityStore, LocalGroup, LocalUser, MembershipSource};
use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which memberships the synchronizer is allowed to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncScope {
    /// Only memberships previously added by role synchronization
    #[default]
    RoleDerived,
    /// Every membership of the user, manual assignments included
    AllGroups,
}

impl SyncScope {
    pub fn from_settings(sync_all_groups: bool) -> Self {
        if sync_all_groups {
            Self::AllGroups
        } else {
            Self::RoleDerived
        }
    }

    fn covers(&self, source: MembershipSource) -> bool {
        match self {
            Self::RoleDerived => source == MembershipSource::Role,
            Self::AllGroups => true,
        }
    }
}

/// Summary of one synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub removed: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub groups_created: usize,
}

#[derive(Clone)]
pub struct RoleSynchronizer {
    store: Arc<dyn IdentityStore>,
    scope: SyncScope,
}

impl RoleSynchronizer {
    pub fn new(store: Arc<dyn IdentityStore>, scope: SyncScope) -> Self {
        Self { store, scope }
    }

    pub fn scope(&self) -> SyncScope {
        self.scope
    }

    /// Clear the memberships in scope, then add the user to one group per
    /// role, creating groups on demand.
    pub async fn sync(
        &self,
        user: &LocalUser,
        roles: &BTreeSet<String>,
    ) -> Result<SyncReport, IdentityError> {
        let mut report = SyncReport::default();

        for membership in self.store.memberships(user.id).await? {
            if self.scope.covers(membership.source) {
                self.store
                    .remove_membership(user.id, membership.group.id)
                    .await?;
                report.removed.insert(membership.group.name);
            }
        }

        for role in roles {
            let (group, created) = self.find_or_create_group(role).await?;
            if created {
                report.groups_created += 1;
            }
            self.store
                .add_membership(user.id, group.id, MembershipSource::Role)
                .await?;
            report.added.insert(group.name);
        }

        info!(
            "Synchronized groups of '{}': {} role group(s), {} cleared",
            user.username,
            report.added.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Whether the stored memberships already reflect `roles`: every role has
    /// a group membership and no role-derived membership is stale.
    pub async fn is_current(
        &self,
        user: &LocalUser,
        roles: &BTreeSet<String>,
    ) -> Result<bool, IdentityError> {
        let memberships = self.store.memberships(user.id).await?;
        let stale = memberships
            .iter()
            .any(|m| m.source == MembershipSource::Role && !roles.contains(&m.group.name));
        let joined: BTreeSet<&str> = memberships.iter().map(|m| m.group.name.as_str()).collect();
        Ok(!stale && roles.iter().all(|role| joined.contains(role.as_str())))
    }

    /// Find the group named `name` or create it. A creation that loses a
    /// race against another login reuses the winner's group.
    pub async fn find_or_create_group(
        &self,
        name: &str,
    ) -> Result<(LocalGroup, bool), IdentityError> {
        if let Some(group) = self.store.find_group(name).await? {
            return Ok((group, false));
        }

        match self.store.create_group(name).await {
            Ok(group) => {
                debug!("Created group '{}' for role", name);
                Ok((group, true))
            }
            Err(StoreError::Duplicate { .. }) => {
                let group = self.store.find_group(name).await?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "group",
                        key: name.to_string(),
                    }
                })?;
                debug!("Group '{}' was created concurrently, reusing it", name);
                Ok((group, false))
            }
            Err(e) => Err(e.into()),
        }
    }
}
