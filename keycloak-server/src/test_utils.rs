use crate::config::BridgeConfig;
use crate::create_app;
use crate::state::tests::{create_test_state, REALM_PUBLIC_KEY};
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::header::LOCATION;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use keycloak_identity::TokenSet;
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;
use wiremock::matchers;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

pub(crate) const REALM_PRIVATE_KEY: &str =
    include_str!("../../keycloak-identity/testdata/realm_private.pem");
pub(crate) const OTHER_PRIVATE_KEY: &str =
    include_str!("../../keycloak-identity/testdata/other_private.pem");

/// Host header sent with every fixture request
pub(crate) const TEST_HOST: &str = "bridge.example.com";

/// Path of the mocked Keycloak token endpoint
const TOKEN_PATH: &str = "/auth/realms/demo/protocol/openid-connect/token";

/// Sign `claims` with the given RSA private key
pub(crate) fn sign_token_with(private_pem: &str, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("Invalid test key");
    encode(&Header::new(Algorithm::RS256), claims, &key).expect("Failed to sign token")
}

/// Sign `claims` with the realm key the test configuration trusts
pub(crate) fn sign_token(claims: &Value) -> String {
    sign_token_with(REALM_PRIVATE_KEY, claims)
}

/// Claims of a valid access token for `username` carrying realm `roles`
pub(crate) fn token_claims(username: &str, roles: &[&str]) -> Value {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Clock before epoch")
        .as_secs();
    json!({
        "exp": now + 300,
        "iat": now,
        "aud": "account",
        "preferred_username": username,
        "email": format!("{username}@example.com"),
        "name": "Alice Liddell",
        "given_name": "Alice",
        "family_name": "Liddell",
        "realm_access": { "roles": roles },
    })
}

/// Test fixture running the full application against a mocked Keycloak.
///
/// Requests go through the complete router with `tower::ServiceExt::oneshot`
/// and carry `Host: bridge.example.com` unless a test overrides it.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let token = sign_token(&token_claims("alice", &["editor"]));
///
///     let authorization = format!("Bearer {token}");
///     let response = fixture
///         .get_with_headers("/api/context", &[("Authorization", authorization.as_str())])
///         .await;
///
///     response.assert_ok();
///     assert_eq!(response.json["username"], "alice");
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration pointing at the mock server
    pub config: BridgeConfig,
    /// Mock server standing in for Keycloak
    pub keycloak_mock: MockServer,
    /// State shared with the router
    pub state: AppState,
}

impl TestFixture {
    /// Creates a new fixture with an in-memory session store and identity store
    pub async fn new() -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let keycloak_mock = MockServer::start().await;
        let config = BridgeConfig::for_test_with_mocks(&keycloak_mock, REALM_PUBLIC_KEY);
        let state = create_test_state(&config);
        let app = create_app(state.clone());

        Self {
            app,
            config,
            keycloak_mock,
            state,
        }
    }

    /// Initializes the test logger with the given level
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Creates a request builder with the default `Host` header
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Host", TEST_HOST)
    }

    /// Sends a GET request to the specified URI
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.request(Method::GET, uri, &[]).await
    }

    /// Sends a GET request with extra headers. A `Host` entry replaces the
    /// default host.
    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request(Method::GET, uri, headers).await
    }

    /// Sends a bodiless request with the given method and headers
    pub async fn request(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request = self
            .request_builder(method, uri)
            .body(Body::empty())
            .expect("Failed to build request");

        for (name, value) in headers {
            let name = http::HeaderName::from_bytes(name.as_bytes()).expect("Invalid header name");
            let value = http::HeaderValue::from_str(value).expect("Invalid header value");
            request.headers_mut().insert(name, value);
        }

        self.send(request).await
    }

    /// Sends a request and collects the response
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !bytes.is_empty() {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };
        let body = String::from_utf8_lossy(&bytes).into_owned();

        TestResponse {
            status,
            headers,
            body,
            json,
        }
    }

    /// Mocks a successful code exchange returning `access_token`
    pub async fn mock_token_endpoint(&self, access_token: &str) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(TOKEN_PATH))
            .and(matchers::body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": "refresh-token",
                "expires_in": 300,
                "token_type": "Bearer",
            })))
            .mount(&self.keycloak_mock)
            .await;
    }

    /// Mocks a token endpoint rejecting every code with `status`
    pub async fn mock_token_endpoint_failure(&self, status: u16) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "invalid_grant",
            })))
            .mount(&self.keycloak_mock)
            .await;
    }

    /// Logs `username` in as the Keycloak callback would and returns the
    /// `Cookie` header value of the new session.
    pub async fn login_session(&self, username: &str, roles: &[&str]) -> String {
        let tokens = TokenSet {
            access_token: sign_token(&token_claims(username, roles)),
            refresh_token: Some("refresh-token".to_string()),
            expires_in: Some(300),
        };
        let authenticated = self
            .state
            .authenticator
            .complete_login(&tokens)
            .await
            .expect("Failed to complete login");
        let session_id = self
            .state
            .sessions
            .create(&authenticated.user)
            .await
            .expect("Failed to create session");
        format!("{}={}", self.config.session.cookie_name, session_id)
    }
}

/// Response from a test request with its status, headers and body
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: String,
    /// Response body as JSON (empty object when absent or not JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {} but got {} with body: {}",
            expected, self.status, self.body
        );
        self
    }

    /// Asserts that the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// The `Location` header, if any
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|value| value.to_str().ok())
    }

    /// Converts the JSON body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if the body cannot be deserialized into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).unwrap_or_else(|e| {
            panic!("Failed to deserialize response body: {e}\nBody: {}", self.body)
        })
    }
}
