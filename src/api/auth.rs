//! Token-based authentication.
//!
//! Sessions are stateless JWTs signed with a server-side secret;
//! passwords are stored as bcrypt hashes. Regular requests carry the
//! token in the `Authorization` header, WebSocket requests may carry it
//! in the `token` query parameter instead since browsers cannot set
//! headers on upgrade requests.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use crate::persistence::User;

use super::AppState;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("invalid or expired token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies session tokens. Cheap to clone.
#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Authenticator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Issues a token for the given user, valid for
    /// [`TOKEN_TTL_HOURS`] from now.
    pub fn issue_token(&self, user: &User) -> Result<String> {
        self.issue_token_at(user, chrono::Utc::now().timestamp())
    }

    fn issue_token_at(&self, user: &User, issued_at: i64) -> Result<String> {
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_HOURS * 3600,
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verifies signature and expiry and returns the embedded claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Middleware guarding the protected routes. On success the verified
/// [`Claims`] are stored in the request extensions for handlers to
/// read.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = token_from_request(request.headers(), request.uri());
    let claims = token.and_then(|token| state.auth.verify_token(&token).ok());

    match claims {
        Some(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        None => super::fail(StatusCode::UNAUTHORIZED, "authentication required"),
    }
}

fn token_from_request(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    bearer_token(headers)
        .or_else(|| query_token(uri))
        .map(str::to_owned)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn query_token(uri: &Uri) -> Option<&str> {
    uri.query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: 7,
            username: "admin".to_owned(),
            password_hash: String::new(),
            nickname: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let auth = Authenticator::new(b"test-secret");
        let token = auth.issue_token(&test_user()).unwrap();
        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.username, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_rejected_with_other_secret() {
        let token = Authenticator::new(b"secret-a")
            .issue_token(&test_user())
            .unwrap();
        assert!(Authenticator::new(b"secret-b").verify_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = Authenticator::new(b"test-secret");
        let two_days_ago = chrono::Utc::now().timestamp() - 2 * 24 * 3600;
        let token = auth.issue_token_at(&test_user(), two_days_ago).unwrap();
        assert!(auth.verify_token(&token).is_err());
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[test]
    fn test_query_token_extraction() {
        let uri: Uri = "/api/containers/abc/logs/stream?follow=true&token=abc.def.ghi"
            .parse()
            .unwrap();
        assert_eq!(query_token(&uri), Some("abc.def.ghi"));

        let uri: Uri = "/api/containers".parse().unwrap();
        assert_eq!(query_token(&uri), None);
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic Zm9v".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
