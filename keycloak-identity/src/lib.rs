//! # keycloak-identity
//!
//! Keycloak bearer-token authentication and role-to-group synchronization.
//!
//! ## Components
//!
//! - **Verifier:** Validates RS256 access tokens against the realm public key.
//! - **Claims:** Maps verified claims to a normalized identity with roles.
//! - **Resolver:** Finds or creates the local user linked to an identity.
//! - **Sync:** Reconciles a user's role-derived group memberships.
//! - **Backend:** Keycloak endpoints, client credentials and code exchange.
//! - **Authenticator:** The pipeline tying the above together.

pub mod authenticator;
pub mod backend;
pub mod claims;
pub mod error;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod verifier;

pub use authenticator::{AuthenticatedUser, Authenticator};
pub use backend::{BackendSettings, KeycloakBackend};
pub use claims::{ClaimsMapper, DecodedClaims, NormalizedIdentity, RoleScope};
pub use error::{AuthError, AuthenticationError, BackendError, IdentityError, StoreError};
pub use resolver::{IdentityResolver, ResolveOutcome, Resolution, TokenSet};
pub use store::memory::InMemoryIdentityStore;
pub use store::IdentityStore;
pub use sync::{RoleSynchronizer, SyncReport, SyncScope};
pub use verifier::TokenVerifier;
