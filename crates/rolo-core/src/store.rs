//! The `ContactStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `rolo-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  birthday::BirthdayWindow,
  contact::{Contact, ContactPatch, NewContact},
  user::{NewUser, User},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Offset pagination for [`ContactStore::list_contacts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
  pub skip:  u32,
  pub limit: u32,
}

impl Default for Page {
  fn default() -> Self { Self { skip: 0, limit: 100 } }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Rolo store backend.
///
/// Every method is atomic: a backend runs each call in at most one
/// transaction. Lookups by identifier return `None` rather than an error when
/// the row does not exist.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ContactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Contacts ──────────────────────────────────────────────────────────

  /// Persist a new contact and return it with its assigned identifier.
  fn create_contact(
    &self,
    input: NewContact,
  ) -> impl Future<Output = Result<Contact, Self::Error>> + Send + '_;

  /// One page of contacts in identifier order.
  fn list_contacts(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  fn get_contact(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Apply `patch` and return the updated contact.
  fn update_contact(
    &self,
    id: i64,
    patch: ContactPatch,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Remove a contact permanently, returning the row as it was.
  fn delete_contact(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Contacts whose first name, last name, or email contains `query`,
  /// ignoring case (Unicode-aware). An empty query matches everything.
  fn search_contacts<'a>(
    &'a self,
    query: &'a str,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + 'a;

  /// Contacts whose birthday anniversary falls inside `window`.
  fn upcoming_birthdays(
    &self,
    window: BirthdayWindow,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Register an account. Fails if the email is already taken.
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn find_user_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;
}
