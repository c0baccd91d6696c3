//! Bearer-token authentication: a minimal token issuer plus the extractor and
//! middleware that check tokens on incoming requests.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/auth/signup` | Body: [`Credentials`]; 201 + user, 409 if taken |
//! | `POST` | `/api/auth/login`  | Body: [`Credentials`]; returns [`TokenResponse`] |
//! | `GET`  | `/api/users/me`    | Requires a bearer token |

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  Json,
  extract::{FromRequestParts, Request, State},
  http::{HeaderMap, StatusCode, header, request::Parts},
  middleware::Next,
  response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use rolo_core::{
  store::ContactStore,
  user::{NewUser, User},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, config::AuthConfig, error::ApiError};

// ─── Tokens ───────────────────────────────────────────────────────────────────

/// Access-token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
  /// User id, as a string per RFC 7519.
  pub sub: String,
  pub iat: i64,
  pub exp: i64,
}

/// HS256 signing and verification keys derived from the configured secret.
pub struct TokenKeys {
  encoding: EncodingKey,
  decoding: DecodingKey,
  ttl_secs: i64,
}

impl TokenKeys {
  pub fn new(config: &AuthConfig) -> Self {
    let secret = config.jwt_secret.as_bytes();
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      ttl_secs: config.token_ttl_minutes.saturating_mul(60),
    }
  }

  /// Sign a fresh access token for `user_id`.
  pub fn issue(&self, user_id: i64) -> Result<String, ApiError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
      sub: user_id.to_string(),
      iat: now,
      exp: now.saturating_add(self.ttl_secs),
    };
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
      .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
  }

  /// Check signature and expiry; return the user id.
  pub fn verify(&self, token: &str) -> Result<i64, ApiError> {
    let data = jsonwebtoken::decode::<Claims>(
      token,
      &self.decoding,
      &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| ApiError::Unauthorized(format!("invalid token: {e}")))?;

    data
      .claims
      .sub
      .parse()
      .map_err(|_| ApiError::Unauthorized("invalid token subject".to_string()))
  }
}

/// Pull the token out of an `Authorization: Bearer …` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
  let missing = || ApiError::Unauthorized("missing bearer token".to_string());

  let value = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(missing)?;

  let (scheme, token) = value.split_once(' ').ok_or_else(missing)?;
  if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
    return Err(missing());
  }
  Ok(token.trim())
}

// ─── Extractor and middleware ─────────────────────────────────────────────────

/// Present in a handler's arguments means the request carried a valid token.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
  pub user_id: i64,
}

impl<S> FromRequestParts<AppState<S>> for CurrentUser
where
  S: ContactStore + Clone + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers)?;
    let user_id = state.tokens.verify(token)?;
    Ok(CurrentUser { user_id })
  }
}

/// Route layer rejecting requests without a valid bearer token.
pub async fn require_bearer<S>(
  State(state): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Response
where
  S: ContactStore + Clone + Send + Sync + 'static,
{
  let verified = bearer_token(req.headers()).and_then(|t| state.tokens.verify(t));
  match verified {
    Ok(_) => next.run(req).await,
    Err(e) => e.into_response(),
  }
}

// ─── Passwords ────────────────────────────────────────────────────────────────

/// Produce an argon2 PHC string for `password` with a random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .map(|parsed| {
      Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
    })
    .unwrap_or(false)
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

/// Body of `POST /api/auth/signup` and `POST /api/auth/login`.
#[derive(Debug, Deserialize)]
pub struct Credentials {
  pub email:    String,
  pub password: String,
}

impl Credentials {
  fn normalized_email(&self) -> String { self.email.trim().to_lowercase() }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
  pub access_token: String,
  pub token_type:   String,
}

/// `POST /api/auth/signup` — returns 201 + the new [`User`].
pub async fn signup<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let email = body.normalized_email();
  if !email.contains('@') {
    return Err(ApiError::BadRequest("email must contain '@'".to_string()));
  }
  if body.password.is_empty() {
    return Err(ApiError::BadRequest("password must not be empty".to_string()));
  }

  let existing = state
    .store
    .find_user_by_email(&email)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if existing.is_some() {
    return Err(ApiError::Conflict(format!("account {email} already exists")));
  }

  // A concurrent signup can still win the insert; the store reports that
  // as `EmailTaken`.
  let password_hash = hash_password(&body.password)?;
  let user = state
    .store
    .create_user(NewUser { email, password_hash })
    .await
    .map_err(signup_error)?;

  tracing::info!(user_id = user.id, "account created");
  Ok((StatusCode::CREATED, Json(user)))
}

/// Map a store failure during signup, turning a taken email into 409.
fn signup_error<E>(e: E) -> ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  let taken = std::iter::successors(Some(&e as &(dyn std::error::Error + 'static)), |e| {
    e.source()
  })
  .find_map(|e| match e.downcast_ref::<rolo_core::Error>() {
    Some(rolo_core::Error::EmailTaken(email)) => Some(email.clone()),
    _ => None,
  });

  match taken {
    Some(email) => ApiError::Conflict(format!("account {email} already exists")),
    None => ApiError::Store(Box::new(e)),
  }
}

/// `POST /api/auth/login` — exchanges credentials for an access token.
pub async fn login<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<Credentials>,
) -> Result<Json<TokenResponse>, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let invalid = || ApiError::Unauthorized("invalid email or password".to_string());

  let user = state
    .store
    .find_user_by_email(&body.normalized_email())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(invalid)?;

  if !verify_password(&body.password, &user.password_hash) {
    return Err(invalid());
  }

  Ok(Json(TokenResponse {
    access_token: state.tokens.issue(user.id)?,
    token_type:   "bearer".to_string(),
  }))
}

/// `GET /api/users/me`
pub async fn me<S>(
  State(state): State<AppState<S>>,
  current: CurrentUser,
) -> Result<Json<User>, ApiError>
where
  S: ContactStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let user = state
    .store
    .get_user(current.user_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))?;
  Ok(Json(user))
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::HeaderValue;

  fn keys(secret: &str, ttl_minutes: i64) -> TokenKeys {
    TokenKeys::new(&AuthConfig {
      jwt_secret:        secret.to_string(),
      token_ttl_minutes: ttl_minutes,
      require_auth:      false,
    })
  }

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    h
  }

  #[test]
  fn issued_token_verifies() {
    let k = keys("secret", 60);
    let token = k.issue(42).unwrap();
    assert_eq!(k.verify(&token).unwrap(), 42);
  }

  #[test]
  fn token_from_other_secret_is_rejected() {
    let token = keys("one", 60).issue(1).unwrap();
    assert!(matches!(keys("two", 60).verify(&token), Err(ApiError::Unauthorized(_))));
  }

  #[test]
  fn expired_token_is_rejected() {
    let k = keys("secret", -10);
    let token = k.issue(1).unwrap();
    assert!(matches!(k.verify(&token), Err(ApiError::Unauthorized(_))));
  }

  #[test]
  fn bearer_token_parsing() {
    assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
    assert_eq!(bearer_token(&headers("bearer  abc ")).unwrap(), "abc");
    assert!(bearer_token(&headers("Basic abc")).is_err());
    assert!(bearer_token(&headers("Bearer ")).is_err());
    assert!(bearer_token(&HeaderMap::new()).is_err());
  }

  #[tokio::test]
  async fn duplicate_insert_maps_to_conflict() {
    use rolo_store_sqlite::SqliteStore;

    let store = SqliteStore::open_in_memory().await.unwrap();
    let user = || NewUser {
      email:         "dup@example.com".to_string(),
      password_hash: "x".to_string(),
    };
    store.create_user(user()).await.unwrap();
    let err = store.create_user(user()).await.unwrap_err();

    match signup_error(err) {
      ApiError::Conflict(msg) => assert!(msg.contains("dup@example.com")),
      other => panic!("expected conflict, got {other:?}"),
    }
  }

  #[test]
  fn other_store_errors_stay_internal() {
    let err = std::io::Error::other("disk on fire");
    assert!(matches!(signup_error(err), ApiError::Store(_)));
  }

  #[test]
  fn password_hash_round_trip() {
    let phc = hash_password("hunter2").unwrap();
    assert!(phc.starts_with("$argon2"));
    assert!(verify_password("hunter2", &phc));
    assert!(!verify_password("hunter3", &phc));
    assert!(!verify_password("hunter2", "not-a-phc-string"));
  }
}
