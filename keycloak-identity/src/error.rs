use thiserror::Error;

/// Reasons a bearer token is rejected by the verifier.
///
/// All variants are reported to callers as the same authentication failure;
/// the distinction only exists for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token signature does not verify")]
    InvalidSignature,

    #[error("token has expired")]
    ExpiredToken,

    #[error("token is malformed: {0}")]
    MalformedToken(String),

    #[error("token audience does not match")]
    AudienceMismatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique constraint violation on create.
    #[error("duplicate {entity}: '{key}' already exists")]
    Duplicate { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("identity store error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("claims carry no subject identifier")]
    MissingSubject,

    #[error("user creation conflicted and the winning record could not be read: {0}")]
    UserCreationConflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("invalid backend configuration: {0}")]
    InvalidConfiguration(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint responded with status {0}: {1}")]
    TokenEndpoint(u16, String),
}

/// Failure of the full authentication pipeline.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error(transparent)]
    Token(#[from] AuthError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}
