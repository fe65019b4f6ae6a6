use super::{
    GroupId, IdentityStore, LocalGroup, LocalUser, Membership, MembershipSource, NewUser,
    StoreResult, UserId,
};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    next_user_id: u64,
    next_group_id: u64,
    users: HashMap<UserId, LocalUser>,
    /// (provider, uid) -> user
    social_index: HashMap<(String, String), UserId>,
    groups: HashMap<GroupId, LocalGroup>,
    group_names: HashMap<String, GroupId>,
    memberships: HashMap<UserId, BTreeMap<GroupId, MembershipSource>>,
}

/// Identity store kept in process memory.
///
/// Every write happens under a single lock, which is what makes the unique
/// constraints hold for concurrent logins.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    tables: RwLock<Tables>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups, for diagnostics and tests
    pub async fn group_count(&self) -> usize {
        self.tables.read().await.groups.len()
    }

    /// Number of users, for diagnostics and tests
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_user(&self, provider: &str, uid: &str) -> StoreResult<Option<LocalUser>> {
        let tables = self.tables.read().await;
        Ok(tables
            .social_index
            .get(&(provider.to_string(), uid.to_string()))
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<LocalUser> {
        let mut tables = self.tables.write().await;
        let key = (user.social.provider.clone(), user.social.uid.clone());
        if tables.social_index.contains_key(&key) {
            return Err(StoreError::Duplicate {
                entity: "user",
                key: format!("{}:{}", key.0, key.1),
            });
        }

        tables.next_user_id += 1;
        let id = UserId(tables.next_user_id);
        let created = LocalUser {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            full_name: user.full_name,
            is_superuser: user.is_superuser,
            is_staff: user.is_staff,
            social: user.social,
        };
        tables.social_index.insert(key, id);
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: &LocalUser) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "user",
                key: user.id.to_string(),
            }),
        }
    }

    async fn find_group(&self, name: &str) -> StoreResult<Option<LocalGroup>> {
        let tables = self.tables.read().await;
        Ok(tables
            .group_names
            .get(name)
            .and_then(|id| tables.groups.get(id))
            .cloned())
    }

    async fn create_group(&self, name: &str) -> StoreResult<LocalGroup> {
        let mut tables = self.tables.write().await;
        if tables.group_names.contains_key(name) {
            return Err(StoreError::Duplicate {
                entity: "group",
                key: name.to_string(),
            });
        }

        tables.next_group_id += 1;
        let group = LocalGroup {
            id: GroupId(tables.next_group_id),
            name: name.to_string(),
        };
        tables.group_names.insert(group.name.clone(), group.id);
        tables.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn memberships(&self, user: UserId) -> StoreResult<Vec<Membership>> {
        let tables = self.tables.read().await;
        let Some(groups) = tables.memberships.get(&user) else {
            return Ok(Vec::new());
        };
        Ok(groups
            .iter()
            .filter_map(|(group_id, source)| {
                tables.groups.get(group_id).map(|group| Membership {
                    group: group.clone(),
                    source: *source,
                })
            })
            .collect())
    }

    async fn add_membership(
        &self,
        user: UserId,
        group: GroupId,
        source: MembershipSource,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user) {
            return Err(StoreError::NotFound {
                entity: "user",
                key: user.to_string(),
            });
        }
        if !tables.groups.contains_key(&group) {
            return Err(StoreError::NotFound {
                entity: "group",
                key: group.to_string(),
            });
        }

        let entry = tables
            .memberships
            .entry(user)
            .or_default()
            .entry(group)
            .or_insert(source);
        if source == MembershipSource::Manual {
            *entry = MembershipSource::Manual;
        }
        Ok(())
    }

    async fn remove_membership(&self, user: UserId, group: GroupId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(groups) = tables.memberships.get_mut(&user) {
            groups.remove(&group);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ExtraData, SocialLink};

    fn new_user(uid: &str) -> NewUser {
        NewUser {
            username: uid.to_string(),
            email: format!("{uid}@example.com"),
            first_name: String::new(),
            last_name: String::new(),
            full_name: String::new(),
            is_superuser: false,
            is_staff: false,
            social: SocialLink {
                provider: "keycloak".to_string(),
                uid: uid.to_string(),
                extra_data: ExtraData::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_user_unique_by_social_link() {
        let store = InMemoryIdentityStore::new();
        let created = store.create_user(new_user("alice")).await.unwrap();

        let found = store.find_user("keycloak", "alice").await.unwrap();
        assert_eq!(found, Some(created));
        assert!(store.find_user("other", "alice").await.unwrap().is_none());

        let err = store.create_user(new_user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "user", .. }));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = InMemoryIdentityStore::new();
        let mut user = store.create_user(new_user("alice")).await.unwrap();
        user.id = UserId(999);
        assert!(matches!(
            store.update_user(&user).await,
            Err(StoreError::NotFound { entity: "user", .. })
        ));
    }

    #[tokio::test]
    async fn test_group_unique_by_name() {
        let store = InMemoryIdentityStore::new();
        let group = store.create_group("editors").await.unwrap();
        assert_eq!(store.find_group("editors").await.unwrap(), Some(group));
        assert!(matches!(
            store.create_group("editors").await,
            Err(StoreError::Duplicate { entity: "group", .. })
        ));
        assert_eq!(store.group_count().await, 1);
    }

    #[tokio::test]
    async fn test_manual_membership_wins_over_role() {
        let store = InMemoryIdentityStore::new();
        let user = store.create_user(new_user("alice")).await.unwrap();
        let group = store.create_group("ops").await.unwrap();

        store
            .add_membership(user.id, group.id, MembershipSource::Manual)
            .await
            .unwrap();
        store
            .add_membership(user.id, group.id, MembershipSource::Role)
            .await
            .unwrap();

        let memberships = store.memberships(user.id).await.unwrap();
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].source, MembershipSource::Manual);

        store.remove_membership(user.id, group.id).await.unwrap();
        assert!(store.memberships(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_membership_requires_existing_records() {
        let store = InMemoryIdentityStore::new();
        let user = store.create_user(new_user("alice")).await.unwrap();
        assert!(store
            .add_membership(user.id, GroupId(7), MembershipSource::Role)
            .await
            .is_err());
        assert!(store
            .add_membership(UserId(7), GroupId(7), MembershipSource::Role)
            .await
            .is_err());
    }
}
