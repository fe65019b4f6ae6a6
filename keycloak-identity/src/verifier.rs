//! Bearer token verification against the realm public key.

use crate::claims::DecodedClaims;
use crate::error::{AuthError, BackendError};
use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_FOOTER: &str = "-----END PUBLIC KEY-----";
const PEM_LINE_WIDTH: usize = 64;

/// Default audience Keycloak puts into access tokens.
pub const DEFAULT_AUDIENCE: &str = "account";

/// Wrap a raw base64 realm key into a PEM `PUBLIC KEY` block.
///
/// Keycloak's admin console shows the realm key as a bare base64 string. A
/// value that already carries PEM armor is returned unchanged.
pub fn public_key_pem(raw_key: &str) -> Result<String, BackendError> {
    let trimmed = raw_key.trim();
    if trimmed.starts_with(PEM_HEADER) {
        return Ok(trimmed.to_string());
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(BackendError::InvalidConfiguration(
            "realm public key is empty".to_string(),
        ));
    }
    let der = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        BackendError::InvalidConfiguration(format!("realm public key is not valid base64: {e}"))
    })?;
    let body = STANDARD.encode(der);

    let mut pem = String::with_capacity(body.len() + 64);
    pem.push_str(PEM_HEADER);
    pem.push('\n');
    for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(PEM_FOOTER);
    Ok(pem)
}

/// Verifies RS256 bearer tokens issued by the realm.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("audience", &self.validation.aud)
            .field("leeway", &self.validation.leeway)
            .finish()
    }
}

impl TokenVerifier {
    /// Build a verifier from the configured realm key.
    ///
    /// # Arguments
    /// * `raw_key` - realm public key, bare base64 or PEM
    /// * `audience` - value the `aud` claim must contain
    /// * `leeway_secs` - tolerated clock skew for `exp`
    pub fn new(raw_key: &str, audience: &str, leeway_secs: u64) -> Result<Self, BackendError> {
        let pem = public_key_pem(raw_key)?;
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            BackendError::InvalidConfiguration(format!("realm public key is not an RSA key: {e}"))
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation.leeway = leeway_secs;

        Ok(Self { key, validation })
    }

    /// Validate signature, expiry and audience, returning the claims as sent.
    pub fn verify(&self, token: &str) -> Result<DecodedClaims, AuthError> {
        decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map(|data| DecodedClaims::new(data.claims))
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
                ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                    AuthError::AudienceMismatch
                }
                _ => AuthError::MalformedToken(e.to_string()),
            })
    }
}
