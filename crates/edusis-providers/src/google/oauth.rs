//! OAuth 2.0 PKCE sign-in for Google.
//!
//! Authorization Code flow with PKCE, using a loopback redirect:
//!
//! 1. Generate a code verifier and its SHA-256 challenge
//! 2. Bind a local HTTP listener on a port in the configured range
//! 3. Open the browser on Google's consent page
//! 4. Receive the authorization code on the loopback listener
//! 5. Exchange code and verifier for an access token
//! 6. Read the account email from the OpenID userinfo endpoint
//!
//! The email is what the calendar source checks against the school domain.
//! Tokens live in memory only and are revoked on sign-out.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use super::config::OAuthConfig;
use super::interactive::{GoogleAccount, GoogleSignIn};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_http_client, map_send_error, read_json};
use crate::source::BoxFuture;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Timeout for waiting for the OAuth callback.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Interactive Google sign-in through the system browser.
pub struct PkceSignIn {
    config: OAuthConfig,
    http_client: reqwest::Client,
    access_token: Mutex<Option<String>>,
}

impl std::fmt::Debug for PkceSignIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceSignIn")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PkceSignIn {
    /// Creates the sign-in flow.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: OAuthConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;
        let http_client = build_http_client(config.timeout, "edusis-calendar")?;
        Ok(Self {
            config,
            http_client,
            access_token: Mutex::new(None),
        })
    }

    async fn authorize(&self) -> ProviderResult<GoogleAccount> {
        let pkce = PkceFlow::new();

        let (listener, port) = bind_loopback_server(self.config.loopback_port_range)?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let auth_url = pkce.build_auth_url(&self.config, &redirect_uri);

        info!("Starting Google sign-in, opening browser");
        debug!(url = %auth_url, "Authorization URL");

        if let Err(e) = open::that(&auth_url) {
            warn!(error = %e, "Failed to open browser");
            eprintln!("\nPlease open this URL in your browser:\n\n{}\n", auth_url);
        }

        let (code, received_state) = tokio::task::spawn_blocking(move || wait_for_callback(listener))
            .await
            .map_err(|e| ProviderError::internal("OAuth callback task failed").with_source(e))??;

        if received_state != pkce.state {
            return Err(ProviderError::authentication(
                "OAuth state mismatch - possible CSRF attack",
            ));
        }

        let access_token = self
            .exchange_code(&code, &pkce.verifier, &redirect_uri)
            .await?;
        let email = self.fetch_email(&access_token).await?;

        *self
            .access_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(access_token.clone());

        Ok(GoogleAccount {
            email,
            access_token,
        })
    }

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<String> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })?;

        info!("Obtained Google access token");
        Ok(token_response.access_token)
    }

    /// Reads the signed-in account's email.
    async fn fetch_email(&self, access_token: &str) -> ProviderResult<String> {
        let response = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_send_error)?;

        let info: UserInfo = read_json(response).await?;
        match info.email {
            Some(email) if info.email_verified != Some(false) => Ok(email),
            Some(email) => Err(ProviderError::authentication(format!(
                "Google account email {} is not verified",
                email
            ))),
            None => Err(ProviderError::invalid_response(
                "userinfo response has no email; is the email scope granted?",
            )),
        }
    }

    async fn revoke(&self) -> ProviderResult<()> {
        let token = self
            .access_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(token) = token else {
            return Ok(());
        };

        let response = self
            .http_client
            .post(&self.config.revoke_url)
            .form(&[("token", token.as_str())])
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(ProviderError::server(format!(
                "token revocation failed ({})",
                response.status()
            )));
        }
        info!("Revoked Google access token");
        Ok(())
    }
}

impl GoogleSignIn for PkceSignIn {
    fn sign_in(&self) -> BoxFuture<'_, ProviderResult<GoogleAccount>> {
        Box::pin(self.authorize())
    }

    fn sign_out(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(self.revoke())
    }
}

/// Tries to bind a TCP listener on an available port in the given range.
fn bind_loopback_server(port_range: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{}", port)) {
            debug!(port, "Bound loopback server");
            return Ok((listener, port));
        }
    }
    Err(ProviderError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Waits for the OAuth callback and extracts the authorization code and state.
fn wait_for_callback(listener: TcpListener) -> ProviderResult<(String, String)> {
    listener
        .set_nonblocking(false)
        .map_err(|e| ProviderError::internal(format!("failed to set blocking: {}", e)))?;

    let (tx, rx) = mpsc::channel();

    // Accept in a separate thread so the wait can time out
    let _handle = thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Some(result) = handle_callback(stream) {
                        let _ = tx.send(result);
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    });

    match rx.recv_timeout(CALLBACK_TIMEOUT) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(ProviderError::authentication("OAuth callback timeout"))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(ProviderError::internal("callback channel disconnected"))
        }
    }
}

/// Answers the browser and returns the parsed callback, if this was one.
fn handle_callback(mut stream: TcpStream) -> Option<ProviderResult<(String, String)>> {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return None;
    }

    let result = parse_callback(&request_line)?;

    let response = if result.is_ok() {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Signed in</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>"
    } else {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Sign-in failed</h1>\
        <p>You can close this window.</p></body></html>"
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    Some(result)
}

/// Parses `GET /callback?code=...&state=... HTTP/1.1`.
///
/// Returns `None` for requests that are not the callback (favicon and the like).
fn parse_callback(request_line: &str) -> Option<ProviderResult<(String, String)>> {
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "GET" {
        return None;
    }

    let path = parts[1];
    if !path.starts_with("/callback") {
        return None;
    }

    let query = path.split_once('?').map(|(_, q)| q).unwrap_or_default();

    let mut code = None;
    let mut state = None;
    let mut error = None;

    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            let value = urlencoding::decode(value).unwrap_or_default().into_owned();
            match key {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => error = Some(value),
                _ => {}
            }
        }
    }

    if let Some(error) = error {
        return Some(Err(ProviderError::authentication(format!(
            "authorization denied: {}",
            error
        ))));
    }

    Some(match code {
        Some(code) => Ok((code, state.unwrap_or_default())),
        None => Err(ProviderError::authentication(
            "missing authorization code in callback",
        )),
    })
}

/// PKCE flow state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = Self::random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: Self::random_token(16),
        }
    }

    fn random_token(len: usize) -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the Google OAuth authorization URL.
    pub fn build_auth_url(&self, config: &OAuthConfig, redirect_uri: &str) -> String {
        let scope = config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&prompt=select_account",
            config.auth_url,
            urlencoding::encode(&config.credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OpenID userinfo response.
#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    email_verified: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> OAuthConfig {
        OAuthConfig::new(OAuthCredentials::new(
            "test-client.apps.googleusercontent.com",
            "test-secret",
        ))
        .with_endpoint_base(base)
    }

    #[test]
    fn pkce_verifier_length() {
        // Base64 encoding of 32 bytes = 43 characters (no padding)
        assert_eq!(PkceFlow::new().verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_is_deterministic() {
        assert_eq!(
            PkceFlow::compute_challenge("test-verifier-string"),
            PkceFlow::compute_challenge("test-verifier-string")
        );
        // RFC 7636 appendix B
        assert_eq!(
            PkceFlow::compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn pkce_state_is_random() {
        assert_ne!(PkceFlow::new().state, PkceFlow::new().state);
    }

    #[test]
    fn auth_url_format() {
        let config = config("http://127.0.0.1:1");
        let url = PkceFlow::new().build_auth_url(&config, "http://127.0.0.1:8080/callback");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=test-client.apps.googleusercontent.com"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
        assert!(url.contains("scope=openid%20email%20"));
        assert!(url.contains("code_challenge_method=S256"));
    }

    #[test]
    fn parses_callback_request_line() {
        let (code, state) = parse_callback("GET /callback?code=4%2F0Ab&state=xyz HTTP/1.1\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(code, "4/0Ab");
        assert_eq!(state, "xyz");

        let denied = parse_callback("GET /callback?error=access_denied HTTP/1.1").unwrap();
        assert_eq!(denied.unwrap_err().code(), ProviderErrorCode::AuthenticationFailed);

        assert!(parse_callback("GET /favicon.ico HTTP/1.1").is_none());
        assert!(parse_callback("POST /callback HTTP/1.1").is_none());
        assert!(parse_callback("GET /callback HTTP/1.1").unwrap().is_err());
    }

    #[tokio::test]
    async fn exchanges_code_and_reads_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code_verifier=verifier-1"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "1234",
                "email": "teacher@school.edu",
                "email_verified": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let flow = PkceSignIn::new(config(&server.uri())).unwrap();
        let token = flow
            .exchange_code("code-1", "verifier-1", "http://127.0.0.1:8080/callback")
            .await
            .unwrap();
        assert_eq!(token, "ya29.token");
        assert_eq!(flow.fetch_email(&token).await.unwrap(), "teacher@school.edu");
    }

    #[tokio::test]
    async fn rejected_code_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let flow = PkceSignIn::new(config(&server.uri())).unwrap();
        let err = flow
            .exchange_code("bad", "verifier", "http://127.0.0.1:8080/callback")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn unverified_email_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "email": "someone@school.edu",
                "email_verified": false
            })))
            .mount(&server)
            .await;

        let flow = PkceSignIn::new(config(&server.uri())).unwrap();
        let err = flow.fetch_email("token").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn sign_out_revokes_held_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains("token=ya29.token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let flow = PkceSignIn::new(config(&server.uri())).unwrap();
        // Nothing held yet, nothing revoked
        flow.sign_out().await.unwrap();

        *flow.access_token.lock().unwrap() = Some("ya29.token".to_string());
        flow.sign_out().await.unwrap();
        assert!(flow.access_token.lock().unwrap().is_none());
    }

    #[test]
    fn invalid_credentials_are_rejected() {
        let config = OAuthConfig::new(OAuthCredentials::new("bad-id", "secret"));
        let err = PkceSignIn::new(config).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
    }
}
