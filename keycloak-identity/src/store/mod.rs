//! Identity store capability.
//!
//! The local user and group records are owned by the host platform. This
//! module describes the operations the authentication pipeline needs from it;
//! [`memory::InMemoryIdentityStore`] is the implementation shipped with the
//! server.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub mod memory;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider payload persisted with the social link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraData {
    pub username: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds, as reported by the token endpoint
    pub expires: Option<u64>,
    pub roles: BTreeSet<String>,
}

/// Link between a local user and its identity at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLink {
    pub provider: String,
    pub uid: String,
    pub extra_data: ExtraData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub social: SocialLink,
}

/// User record before the store assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub social: SocialLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGroup {
    pub id: GroupId,
    pub name: String,
}

/// Origin of a group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MembershipSource {
    /// Added by role synchronization
    Role,
    /// Assigned by anything else (administrators, other integrations)
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub group: LocalGroup,
    pub source: MembershipSource,
}

/// Operations the authentication pipeline performs on users and groups.
///
/// Implementations must be thread-safe and enforce two unique constraints:
/// users by `(provider, uid)` and groups by name. A violated constraint is
/// reported as [`StoreError::Duplicate`] so callers can fall back to a lookup.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find the user linked to `uid` at `provider`
    async fn find_user(&self, provider: &str, uid: &str) -> StoreResult<Option<LocalUser>>;

    /// Create a user; `Duplicate` when the social link already exists
    async fn create_user(&self, user: NewUser) -> StoreResult<LocalUser>;

    /// Replace a stored user record; `NotFound` when it does not exist
    async fn update_user(&self, user: &LocalUser) -> StoreResult<()>;

    async fn find_group(&self, name: &str) -> StoreResult<Option<LocalGroup>>;

    /// Create a group; `Duplicate` when the name is taken
    async fn create_group(&self, name: &str) -> StoreResult<LocalGroup>;

    async fn memberships(&self, user: UserId) -> StoreResult<Vec<Membership>>;

    /// Add a membership. An existing membership keeps its source unless the
    /// new source is `Manual`.
    async fn add_membership(
        &self,
        user: UserId,
        group: GroupId,
        source: MembershipSource,
    ) -> StoreResult<()>;

    async fn remove_membership(&self, user: UserId, group: GroupId) -> StoreResult<()>;

    /// Performs a health check on the backing storage
    async fn health_check(&self) -> Result<(), String>;
}
