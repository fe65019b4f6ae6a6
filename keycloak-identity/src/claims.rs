//! Claims decoded from Keycloak access tokens and their mapping to a
//! normalized identity.
//!
//! Keycloak asserts roles in two places:
//! - **Realm roles**: `realm_access.roles`
//! - **Client roles**: `resource_access.{client_id}.roles`
//!
//! Only one of them is read, selected by [`RoleScope`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Role that elevates a user to superuser and staff.
pub const ADMIN_ROLE: &str = "admin";

/// Claims of a verified token, kept as sent by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecodedClaims(Map<String, Value>);

impl DecodedClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String claim or an empty string when absent or not a string.
    pub fn string(&self, name: &str) -> String {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Follow a path of object keys and read the string array found there.
    pub fn string_array(&self, path: &[&str]) -> Vec<String> {
        let Some((first, rest)) = path.split_first() else {
            return Vec::new();
        };
        let mut node = self.0.get(*first);
        for key in rest {
            node = node.and_then(|v| v.get(*key));
        }
        node.and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|r| r.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Which role assertion of the token is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    /// `realm_access.roles`
    Realm,
    /// `resource_access.{client_id}.roles`
    Client(String),
}

impl RoleScope {
    /// Scope selection the way it is configured: a global-role toggle and the
    /// OAuth client id.
    pub fn from_settings(global_role: bool, client_id: &str) -> Self {
        if global_role {
            Self::Realm
        } else {
            Self::Client(client_id.to_string())
        }
    }

    fn extract(&self, claims: &DecodedClaims) -> Vec<String> {
        match self {
            Self::Realm => claims.string_array(&["realm_access", "roles"]),
            Self::Client(client_id) => {
                claims.string_array(&["resource_access", client_id.as_str(), "roles"])
            }
        }
    }
}

/// Identity attributes and roles derived from a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedIdentity {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    /// Trimmed, lower-cased role names without `admin`.
    pub roles: BTreeSet<String>,
}

/// Trim and lower-case a role name.
pub fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct ClaimsMapper {
    scope: RoleScope,
}

impl ClaimsMapper {
    pub fn new(scope: RoleScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &RoleScope {
        &self.scope
    }

    /// Derive the normalized identity. Missing claims never fail the mapping.
    pub fn map_claims(&self, claims: &DecodedClaims) -> NormalizedIdentity {
        let mut is_superuser = false;
        let mut roles = BTreeSet::new();

        for role in self.scope.extract(claims).iter().map(|r| normalize_role(r)) {
            if role == ADMIN_ROLE {
                is_superuser = true;
            } else if !role.is_empty() {
                roles.insert(role);
            }
        }

        NormalizedIdentity {
            username: claims.string("preferred_username"),
            email: claims.string("email"),
            full_name: claims.string("name"),
            first_name: claims.string("given_name"),
            last_name: claims.string("family_name"),
            is_superuser,
            is_staff: is_superuser,
            roles,
        }
    }
}
