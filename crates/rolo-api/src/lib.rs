//! JSON REST API for Rolo.
//!
//! Exposes an axum [`Router`] backed by any [`rolo_core::store::ContactStore`],
//! with bearer-token auth, per-caller rate limiting on contact creation, and
//! CORS applied as layers.
//!
//! # Routes
//!
//! | Method | Path | Module |
//! |--------|------|--------|
//! | `GET`  | `/` | liveness, `{"message": "Hello World"}` |
//! | any    | `/contacts/…` | [`contacts`] |
//! | any    | `/api/auth/…`, `/api/users/me` | [`auth`] |

pub mod auth;
pub mod config;
pub mod contacts;
pub mod error;
pub mod ratelimit;

use std::sync::Arc;

use axum::{
  Json, Router,
  http::HeaderValue,
  middleware,
  routing::{get, post},
};
use rolo_core::store::ContactStore;
use serde_json::{Value, json};
use tower_http::{
  cors::{AllowHeaders, AllowMethods, CorsLayer},
  trace::TraceLayer,
};

pub use config::ServerConfig;
pub use error::ApiError;

use auth::TokenKeys;
use ratelimit::Limiter;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: ContactStore> {
  pub store:   Arc<S>,
  pub config:  Arc<ServerConfig>,
  pub tokens:  Arc<TokenKeys>,
  pub limiter: Arc<Limiter>,
}

impl<S: ContactStore> AppState<S> {
  pub fn new(store: S, config: ServerConfig, limiter: Arc<Limiter>) -> Self {
    Self {
      store: Arc::new(store),
      tokens: Arc::new(TokenKeys::new(&config.auth)),
      config: Arc::new(config),
      limiter,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
///
/// Per-route preconditions run outermost first: bearer auth (when
/// `auth.require_auth` is set), then the rate limit on `POST /contacts/`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ContactStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let create = post(contacts::create::<S>).route_layer(middleware::from_fn_with_state(
    state.clone(),
    ratelimit::enforce::<S>,
  ));

  let mut contact_routes = Router::new()
    .route("/contacts/", create.get(contacts::list::<S>))
    .route("/contacts/search/", get(contacts::search::<S>))
    .route("/contacts/birthday/", get(contacts::upcoming_birthdays::<S>))
    .route(
      "/contacts/{id}",
      get(contacts::get_one::<S>)
        .put(contacts::update::<S>)
        .delete(contacts::delete::<S>),
    );

  if state.config.auth.require_auth {
    contact_routes = contact_routes.route_layer(middleware::from_fn_with_state(
      state.clone(),
      auth::require_bearer::<S>,
    ));
  }

  let auth_routes = Router::new()
    .route("/api/auth/signup", post(auth::signup::<S>))
    .route("/api/auth/login", post(auth::login::<S>))
    .route("/api/users/me", get(auth::me::<S>));

  let app = Router::new()
    .route("/", get(root))
    .merge(contact_routes)
    .merge(auth_routes)
    .with_state(state.clone());

  let prefix = state.config.normalized_prefix();
  let app = if prefix.is_empty() {
    app
  } else {
    Router::new().nest(&prefix, app)
  };

  app
    .layer(cors_layer(&state.config.cors_origins))
    .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<Value> { Json(json!({ "message": "Hello World" })) }

/// `*` mirrors any origin and allows credentials; a development posture.
/// Otherwise only the listed origins are allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
  if origins.iter().any(|o| o == "*") {
    return CorsLayer::very_permissive();
  }

  let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
  CorsLayer::new()
    .allow_origin(origins)
    .allow_methods(AllowMethods::mirror_request())
    .allow_headers(AllowHeaders::mirror_request())
    .allow_credentials(true)
}

// ─── Integration tests ────────────────────────────────────────────────────────
