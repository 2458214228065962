//! Accounts: registration with email verification, login, and token sessions
//!
//! Sessions are stateless HS256 tokens carrying the username; handlers
//! re-load the account on every request so privilege changes take effect
//! immediately. Passwords are stored as bcrypt hashes.

use crate::config::EmailConfig;
use crate::error::{Error, Result};
use crate::server::api::{ApiError, ApiResponse};
use crate::server::AppState;
use crate::storage::User;
use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{info, warn};

/// Token lifetime for fresh registrations
const REGISTER_TOKEN_DAYS: i64 = 7;

/// Token lifetime for "remember me" logins
const REMEMBER_TOKEN_DAYS: i64 = 30;

/// Token lifetime for plain logins
const LOGIN_TOKEN_DAYS: i64 = 1;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").unwrap());

// ============================================================================
// Token service
// ============================================================================

/// Claims embedded in a session token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the account
    pub sub: String,
    /// Expiry, unix seconds
    pub exp: i64,
    /// Issued-at, unix seconds
    pub iat: i64,
}

/// Issues and verifies session tokens
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Create a token for a username, valid for the given number of days
    pub fn create_token(&self, username: &str, days: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            exp: (now + Duration::days(days)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::auth(format!("failed to create token: {e}")))
    }

    /// Verify a token and return its claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| Error::auth(format!("invalid token: {e}")))
    }
}

/// Hash a password for storage
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| Error::auth(format!("failed to hash password: {e}")))
}

/// Check a password against its stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ============================================================================
// Authenticated-user extractor
// ============================================================================

/// The account behind the request's bearer token.
///
/// Extraction fails with 401 when the header is missing, the token does not
/// verify, or the account no longer exists.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("expected bearer token"))?;

        let claims = state
            .jwt
            .verify_token(token)
            .map_err(|_| ApiError::unauthorized("invalid or expired token"))?;

        let user = state
            .db
            .get_user_by_username(&claims.sub)
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::unauthorized("account no longer exists"))?;

        Ok(CurrentUser(user))
    }
}

// ============================================================================
// Verification mail
// ============================================================================

/// Sends verification codes over SMTP
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send a verification code to an address.
    ///
    /// # Errors
    ///
    /// Returns a config error when no SMTP relay is configured, and a
    /// generic error when the relay rejects the message.
    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
        if !self.config.is_configured() {
            return Err(Error::config("no SMTP relay configured"));
        }

        let body = format!(
            "<html><body>\
             <h2>邮箱验证码</h2>\
             <p>您的验证码是：<strong>{code}</strong></p>\
             <p>验证码 3 分钟内有效，请勿泄露给他人。</p>\
             </body></html>"
        );

        let message = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|_| Error::config("invalid SMTP from address"))?,
            )
            .to(to
                .parse()
                .map_err(|_| Error::auth(format!("invalid email address: {to}")))?)
            .subject("邮箱验证码")
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| Error::with_source("failed to build mail", e))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| Error::with_source("failed to create SMTP transport", e))?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                self.config.smtp_user.clone(),
                self.config.smtp_password.clone(),
            ))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| Error::with_source("failed to send verification mail", e))?;

        info!(to, "verification code sent");
        Ok(())
    }
}

/// Generate a random 6-digit verification code
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Token plus the account it belongs to
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

/// Register a new account.
///
/// Requires a valid verification code previously mailed to the address.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> std::result::Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    if !USERNAME_RE.is_match(&request.username) {
        return Err(ApiError::bad_request(
            "username must be 3-20 characters of letters, digits, or underscores",
        ));
    }
    if request.password.len() < 6 {
        return Err(ApiError::bad_request("password must be at least 6 characters"));
    }
    if state.db.username_exists(&request.username)? {
        return Err(ApiError::bad_request("username already taken"));
    }
    if state.db.email_exists(&request.email)? {
        return Err(ApiError::bad_request("email already registered"));
    }
    if !state
        .db
        .consume_verification_code(&request.email, &request.code)?
    {
        return Err(ApiError::bad_request("invalid or expired verification code"));
    }

    let password_hash = hash_password(&request.password)?;
    let id = state
        .db
        .create_user(&request.username, &request.email, &password_hash, 1)?;
    let user = state
        .db
        .get_user_by_id(id)?
        .ok_or_else(|| ApiError::internal("account vanished after insert"))?;

    let token = state.jwt.create_token(&user.username, REGISTER_TOKEN_DAYS)?;
    info!(username = %user.username, "account registered");

    Ok(Json(ApiResponse::success(SessionResponse { token, user })))
}

/// Mail a verification code to an address
pub async fn send_email_code(
    State(state): State<AppState>,
    Json(request): Json<SendCodeRequest>,
) -> std::result::Result<Json<ApiResponse<()>>, ApiError> {
    if state.db.email_exists(&request.email)? {
        return Err(ApiError::bad_request("email already registered"));
    }

    let code = generate_code();
    state.db.store_verification_code(&request.email, &code)?;

    if let Err(err) = state.mailer.send_verification_code(&request.email, &code).await {
        warn!(email = %request.email, error = %err, "failed to send verification code");
        return Err(ApiError::internal("failed to send verification code"));
    }

    Ok(Json(ApiResponse::success(())))
}

/// Log in with username or email
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> std::result::Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let user = state
        .db
        .find_user_by_login(&request.username)?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or_else(|| ApiError::unauthorized("wrong username or password"))?;

    let days = if request.remember_me {
        REMEMBER_TOKEN_DAYS
    } else {
        LOGIN_TOKEN_DAYS
    };
    let token = state.jwt.create_token(&user.username, days)?;
    info!(username = %user.username, "login");

    Ok(Json(ApiResponse::success(SessionResponse { token, user })))
}

/// The account behind the current session
pub async fn me(
    CurrentUser(user): CurrentUser,
) -> Json<ApiResponse<User>> {
    Json(ApiResponse::success(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let jwt = JwtService::new("test-secret");
        let token = jwt.create_token("alice", 1).unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let jwt = JwtService::new("test-secret");
        let other = JwtService::new("other-secret");
        let token = jwt.create_token("alice", 1).unwrap();
        assert!(other.verify_token(&token).is_err());
        assert!(jwt.verify_token("not-a-token").is_err());
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_username_pattern() {
        assert!(USERNAME_RE.is_match("alice_01"));
        assert!(!USERNAME_RE.is_match("ab"));
        assert!(!USERNAME_RE.is_match("空格 不行"));
        assert!(!USERNAME_RE.is_match(&"x".repeat(21)));
    }

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..20 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_unconfigured_mailer_errors() {
        let mailer = Mailer::new(crate::config::Config::default().email);
        let err = tokio_test::block_on(mailer.send_verification_code("a@b.com", "123456"));
        assert!(err.is_err());
    }
}
