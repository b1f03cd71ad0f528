//! Service-account identity tokens.
//!
//! An authenticated destination expects a Google-signed ID token whose
//! audience is the destination's `https://` origin. The token is minted by
//! signing a JWT assertion with the service-account key and exchanging it at
//! the key's token endpoint, then presented on the call as a bearer header.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tracing::{debug, info};

use crate::error::AuthError;

/// Token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth grant type for exchanging a signed JWT.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for the assertion. Also assumed for an ID token whose
/// `exp` claim cannot be read.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// A cached ID token is replaced once it is this close to expiry.
const REFRESH_MARGIN_SECS: i64 = 300;

const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// A Google service-account key file (JSON).
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.into()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Loads and checks a key file. No network activity.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let data = std::fs::read_to_string(path).map_err(|source| AuthError::CredentialFile {
            path: path.to_path_buf(),
            source,
        })?;
        let key: ServiceAccountKey =
            serde_json::from_str(&data).map_err(|source| AuthError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        if key.key_type != SERVICE_ACCOUNT_TYPE {
            return Err(AuthError::NotServiceAccount(key.key_type));
        }
        debug!(client_email = %key.client_email, path = %path.display(), "service account key loaded");
        Ok(key)
    }
}

/// Returns the token audience for a destination: its host as an `https://` origin.
///
/// The port, if any, is not part of the audience, so `grpc.routeviews.org:443`
/// and `grpc.routeviews.org` share one audience. A destination that embeds
/// the port in its expected audience will refuse these tokens.
pub fn audience_for(host: &str) -> String {
    format!("https://{host}")
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    iat: i64,
    exp: i64,
    target_audience: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Mints ID tokens for one audience from one service-account key.
///
/// The last token is cached and reused until it is within five minutes of
/// its expiry.
pub struct IdTokenSource {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    audience: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl IdTokenSource {
    /// Fails if the private key cannot be parsed. No network activity.
    pub fn new(key: ServiceAccountKey, audience: impl Into<String>) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            key,
            encoding_key,
            audience: audience.into(),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        })
    }

    /// Bounds each token endpoint request by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Result<Self, AuthError> {
        if let Some(timeout) = timeout {
            self.http = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
        }
        Ok(self)
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Signs the JWT assertion presented to the token endpoint.
    fn assertion(&self, issued_at: i64) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            sub: self.key.client_email.clone(),
            aud: self.key.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
            target_audience: self.audience.clone(),
        };
        Ok(jsonwebtoken::encode(&header, &claims, &self.encoding_key)?)
    }

    /// Returns the cached token, or fetches a new one when it is close to expiry.
    pub async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at - REFRESH_MARGIN_SECS > now {
                return Ok(entry.token.clone());
            }
            debug!(audience = %self.audience, "identity token near expiry, refreshing");
        }

        let token = self.fetch().await?;
        let expires_at = token_expiry(&token).unwrap_or(now + ASSERTION_LIFETIME_SECS);
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    /// Exchanges a fresh assertion for an ID token, bypassing the cache.
    pub async fn fetch(&self) -> Result<String, AuthError> {
        let assertion = self.assertion(Utc::now().timestamp())?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
        let token = body
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::TokenExchange("response carries no id_token".into()))?;

        info!(audience = %self.audience, "identity token obtained");
        Ok(token)
    }
}

/// Reads the `exp` claim of an ID token. The signature is not checked; the
/// destination does that.
fn token_expiry(token: &str) -> Option<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    jsonwebtoken::decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims.exp)
}

/// Attaches `authorization: Bearer <token>` to every call, when a token is set.
///
/// Clones share the header. With a token source behind it, [`BearerAuth::refresh`]
/// replaces the header before a call once the token nears expiry.
#[derive(Clone, Default)]
pub struct BearerAuth {
    header: Arc<RwLock<Option<MetadataValue<Ascii>>>>,
    source: Option<Arc<IdTokenSource>>,
}

impl BearerAuth {
    /// Leaves calls untouched.
    pub fn none() -> Self {
        Self::default()
    }

    /// A fixed token that is never refreshed.
    pub fn bearer(token: &str) -> Result<Self, AuthError> {
        let auth = Self::default();
        auth.set_token(token)?;
        Ok(auth)
    }

    /// Tokens come from `source`; call [`BearerAuth::refresh`] before use.
    pub fn from_source(source: IdTokenSource) -> Self {
        Self {
            header: Arc::default(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.source.is_some() || self.current().is_some()
    }

    /// Makes sure the header holds a token that is not about to expire.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        if let Some(source) = &self.source {
            let token = source.token().await?;
            self.set_token(&token)?;
        }
        Ok(())
    }

    fn set_token(&self, token: &str) -> Result<(), AuthError> {
        let header = MetadataValue::try_from(format!("Bearer {token}"))
            .map_err(|_| AuthError::InvalidToken)?;
        *self.header.write().unwrap_or_else(PoisonError::into_inner) = Some(header);
        Ok(())
    }

    fn current(&self) -> Option<MetadataValue<Ascii>> {
        self.header
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("authenticated", &self.is_authenticated())
            .field("refreshing", &self.source.is_some())
            .finish()
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        if let Some(header) = self.current() {
            request.metadata_mut().insert("authorization", header);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const KEY_JSON: &str = include_str!("../testdata/service_account.json");
    const PUBLIC_KEY: &str = include_str!("../testdata/test_key.pub.pem");

    fn test_key() -> ServiceAccountKey {
        serde_json::from_str(KEY_JSON).unwrap()
    }

    fn write_key_file(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("key.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn source_for(server: &mockito::ServerGuard) -> IdTokenSource {
        let mut key = test_key();
        key.token_uri = format!("{}/token", server.url());
        IdTokenSource::new(key, "https://grpc.routeviews.org").unwrap()
    }

    /// An ID token expiring at `exp`, signed with a throwaway secret.
    fn id_token_expiring_at(exp: i64) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &ExpiryClaim { exp },
            &EncodingKey::from_secret(b"token-endpoint"),
        )
        .unwrap()
    }

    #[test]
    fn loads_service_account_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_key_file(&dir, KEY_JSON);

        let key = ServiceAccountKey::from_file(&path).unwrap();
        assert_eq!(key.client_email, "uploader@rv-upload-test.iam.gserviceaccount.com");
        assert_eq!(key.private_key_id.as_deref(), Some("0123456789abcdef"));
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn debug_output_hides_private_key() {
        let rendered = format!("{:?}", test_key());
        assert!(rendered.contains("uploader@rv-upload-test"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }

    #[test]
    fn missing_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceAccountKey::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, AuthError::CredentialFile { .. }));
    }

    #[test]
    fn malformed_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_key_file(&dir, "{ not json");
        let err = ServiceAccountKey::from_file(&path).unwrap_err();
        assert!(matches!(err, AuthError::Malformed { .. }));
    }

    #[test]
    fn user_credentials_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_key_file(
            &dir,
            r#"{"type":"authorized_user","client_email":"a@b","private_key":"x"}"#,
        );
        let err = ServiceAccountKey::from_file(&path).unwrap_err();
        assert!(matches!(err, AuthError::NotServiceAccount(t) if t == "authorized_user"));
    }

    #[test]
    fn bad_private_key_fails_before_any_request() {
        let mut key = test_key();
        key.private_key = "not a pem document".into();
        let err = IdTokenSource::new(key, "https://grpc.example.org").err().unwrap();
        assert!(matches!(err, AuthError::Signing(_)));
    }

    #[test]
    fn audience_is_https_origin() {
        assert_eq!(audience_for("grpc.routeviews.org"), "https://grpc.routeviews.org");
    }

    #[test]
    fn assertion_carries_target_audience() {
        let source = IdTokenSource::new(test_key(), "https://grpc.routeviews.org").unwrap();
        let now = Utc::now().timestamp();
        let jwt = source.assertion(now).unwrap();

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("0123456789abcdef"));

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[DEFAULT_TOKEN_URI]);
        let decoded = jsonwebtoken::decode::<AssertionClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        let claims = decoded.claims;
        assert_eq!(claims.iss, "uploader@rv-upload-test.iam.gserviceaccount.com");
        assert_eq!(claims.sub, claims.iss);
        assert_eq!(claims.target_audience, "https://grpc.routeviews.org");
        assert_eq!(claims.iat, now);
        assert_eq!(claims.exp, now + ASSERTION_LIFETIME_SECS);
    }

    #[tokio::test]
    async fn fetch_exchanges_assertion_for_id_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), JWT_BEARER_GRANT.into()),
                Matcher::Regex("assertion=ey".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id_token":"eyJ.test.token"}"#)
            .create_async()
            .await;

        let token = source_for(&server).fetch().await.unwrap();
        assert_eq!(token, "eyJ.test.token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_surfaces_endpoint_refusal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = source_for(&server).fetch().await.unwrap_err();
        match err {
            AuthError::TokenExchange(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("expected TokenExchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_requires_id_token_in_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29"}"#)
            .create_async()
            .await;

        assert!(matches!(
            source_for(&server).fetch().await,
            Err(AuthError::TokenExchange(_))
        ));
    }

    #[tokio::test]
    async fn fresh_token_is_reused() {
        let token = id_token_expiring_at(Utc::now().timestamp() + 3600);
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"id_token":"{token}"}}"#))
            .expect(1)
            .create_async()
            .await;

        let source = source_for(&server);
        assert_eq!(source.token().await.unwrap(), token);
        assert_eq!(source.token().await.unwrap(), token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn token_near_expiry_is_replaced() {
        // Inside the refresh margin from the moment it is issued.
        let token = id_token_expiring_at(Utc::now().timestamp() + 60);
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"id_token":"{token}"}}"#))
            .expect(2)
            .create_async()
            .await;

        let source = source_for(&server);
        source.token().await.unwrap();
        source.token().await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn expiry_is_read_from_token() {
        assert_eq!(token_expiry(&id_token_expiring_at(1_900_000_000)), Some(1_900_000_000));
        assert_eq!(token_expiry("eyJ.test.token"), None);
    }

    #[tokio::test]
    async fn stalled_token_endpoint_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });

        let mut key = test_key();
        key.token_uri = format!("http://{addr}/token");
        let source = IdTokenSource::new(key, "https://grpc.routeviews.org")
            .unwrap()
            .with_timeout(Some(Duration::from_millis(200)))
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), source.fetch())
            .await
            .expect("token request was not bounded by its timeout");
        assert!(matches!(result, Err(AuthError::TokenExchange(_))));
        hold.abort();
    }

    #[tokio::test]
    async fn refresh_installs_header_shared_by_clones() {
        let token = id_token_expiring_at(Utc::now().timestamp() + 3600);
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"id_token":"{token}"}}"#))
            .create_async()
            .await;

        let auth = BearerAuth::from_source(source_for(&server));
        let mut interceptor = auth.clone();
        assert!(auth.is_authenticated());

        auth.refresh().await.unwrap();
        let request = interceptor.call(tonic::Request::new(())).unwrap();
        assert_eq!(
            request.metadata().get("authorization").unwrap().to_str().unwrap(),
            format!("Bearer {token}")
        );
    }

    #[test]
    fn bearer_interceptor_sets_authorization() {
        let mut auth = BearerAuth::bearer("abc.def").unwrap();
        let request = auth.call(tonic::Request::new(())).unwrap();
        assert_eq!(
            request.metadata().get("authorization").unwrap().to_str().unwrap(),
            "Bearer abc.def"
        );
    }

    #[test]
    fn empty_interceptor_leaves_request_alone() {
        let mut auth = BearerAuth::none();
        assert!(!auth.is_authenticated());
        let request = auth.call(tonic::Request::new(())).unwrap();
        assert!(request.metadata().get("authorization").is_none());
    }

    #[test]
    fn token_with_newline_is_invalid() {
        assert!(matches!(BearerAuth::bearer("bad\ntoken"), Err(AuthError::InvalidToken)));
    }
}
