//! Handlers for `/contacts` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/contacts/` | Body: [`NewContact`]; returns 201; rate limited |
//! | `GET`    | `/contacts/` | `?skip` (default 0), `?limit` (default 100) |
//! | `GET`    | `/contacts/{id}` | 404 if not found |
//! | `PUT`    | `/contacts/{id}` | Body: [`ContactPatch`] |
//! | `DELETE` | `/contacts/{id}` | Returns the deleted contact |
//! | `GET`    | `/contacts/search/` | `?query` required |
//! | `GET`    | `/contacts/birthday/` | `?days` (default 7) |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use rolo_core::{
  birthday::BirthdayWindow,
  contact::{Contact, ContactPatch, NewContact},
  store::{ContactStore, Page},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, config::UpdateMode, error::ApiError};

fn not_found(id: i64) -> ApiError { ApiError::NotFound(format!("contact {id} not found")) }

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /contacts/` — returns 201 + the stored [`Contact`].
///
/// `skip` and `limit` are accepted for compatibility with older clients and
/// have no effect.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Query(_page): Query<ListParams>,
  Json(body): Json<NewContact>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let contact = state
    .store
    .create_contact(body)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok((StatusCode::CREATED, Json(contact)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub skip:  u32,
  #[serde(default = "default_limit")]
  pub limit: u32,
}

fn default_limit() -> u32 { Page::default().limit }

/// Body of `GET /contacts/`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContactList {
  pub contacts: Vec<Contact>,
}

/// `GET /contacts/[?skip=<n>][&limit=<n>]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<ContactList>, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let contacts = state
    .store
    .list_contacts(Page { skip: params.skip, limit: params.limit })
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(ContactList { contacts }))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /contacts/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Contact>, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let contact = state
    .store
    .get_contact(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| not_found(id))?;
  Ok(Json(contact))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PUT /contacts/{id}` — body is a [`ContactPatch`]; absent keys are kept.
pub async fn update<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Json(patch): Json<ContactPatch>,
) -> Result<Json<Contact>, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let patch = match state.config.update_mode {
    UpdateMode::Explicit => patch,
    UpdateMode::Truthy => patch.retain_truthy(),
  };

  let contact = state
    .store
    .update_contact(id, patch)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| not_found(id))?;
  Ok(Json(contact))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /contacts/{id}` — returns the contact as it was before removal.
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Contact>, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let contact = state
    .store
    .delete_contact(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| not_found(id))?;
  Ok(Json(contact))
}

// ─── Search ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  pub query: String,
}

/// `GET /contacts/search/?query=<text>`
pub async fn search<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Contact>>, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let contacts = state
    .store
    .search_contacts(&params.query)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(contacts))
}

// ─── Birthdays ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BirthdayParams {
  #[serde(default = "default_days")]
  pub days: u32,
}

fn default_days() -> u32 { 7 }

/// `GET /contacts/birthday/[?days=<n>]` — anniversaries from today (UTC)
/// through `days` days ahead, inclusive.
pub async fn upcoming_birthdays<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<BirthdayParams>,
) -> Result<Json<Vec<Contact>>, ApiError>
where
  S: ContactStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let window = BirthdayWindow::new(Utc::now().date_naive(), params.days);
  let contacts = state
    .store
    .upcoming_birthdays(window)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(contacts))
}
