//! [`SqliteStore`] — the SQLite implementation of [`ContactStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, functions::FunctionFlags};
use tracing::debug;

use rolo_core::{
  birthday::{BirthdayWindow, MonthDayRange},
  contact::{Contact, ContactPatch, NewContact},
  store::{ContactStore, Page},
  user::{NewUser, User},
};

use crate::{
  Error, Result,
  encode::{
    CONTACT_COLUMNS, USER_COLUMNS, contact_from_row, encode_month_day, like_pattern,
    user_from_row,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rolo store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT` over the contacts table and collect every row.
  async fn query_contacts(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<Contact>> {
    let contacts = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), contact_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(contacts)
  }
}

fn select_contact(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<Option<Contact>> {
  conn
    .query_row(
      &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
      rusqlite::params![id],
      contact_from_row,
    )
    .optional()
}

/// `unicode_lower(text)`: full Unicode lowercasing, which SQLite's built-in
/// `lower` and `LIKE` only do for ASCII.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    "unicode_lower",
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
  )
}

fn is_unique_violation(e: &tokio_rusqlite::Error) -> bool {
  matches!(
    e,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _))
      if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  type Error = Error;

  // ── Contacts ──────────────────────────────────────────────────────────────

  async fn create_contact(&self, input: NewContact) -> Result<Contact> {
    let row = input.clone();

    let id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO contacts (
             first_name, last_name, email, phone, birthday, additional_data
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            row.first_name,
            row.last_name,
            row.email,
            row.phone,
            row.birthday,
            row.additional_data,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    debug!(id, "contact created");
    Ok(input.into_contact(id))
  }

  async fn list_contacts(&self, page: Page) -> Result<Vec<Contact>> {
    let contacts = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY id LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![page.limit, page.skip], contact_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(contacts)
  }

  async fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
    let contact = self
      .conn
      .call(move |conn| Ok(select_contact(conn, id)?))
      .await?;
    Ok(contact)
  }

  async fn update_contact(
    &self,
    id: i64,
    patch: ContactPatch,
  ) -> Result<Option<Contact>> {
    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(mut contact) = select_contact(&tx, id)? else {
          return Ok(None);
        };
        patch.apply(&mut contact);

        tx.execute(
          "UPDATE contacts SET
             first_name = ?2, last_name = ?3, email = ?4,
             phone = ?5, birthday = ?6, additional_data = ?7
           WHERE id = ?1",
          rusqlite::params![
            contact.id,
            contact.first_name,
            contact.last_name,
            contact.email,
            contact.phone,
            contact.birthday,
            contact.additional_data,
          ],
        )?;
        tx.commit()?;
        Ok(Some(contact))
      })
      .await?;
    Ok(updated)
  }

  async fn delete_contact(&self, id: i64) -> Result<Option<Contact>> {
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let Some(contact) = select_contact(&tx, id)? else {
          return Ok(None);
        };
        tx.execute("DELETE FROM contacts WHERE id = ?1", rusqlite::params![id])?;
        tx.commit()?;
        Ok(Some(contact))
      })
      .await?;

    if deleted.is_some() {
      debug!(id, "contact deleted");
    }
    Ok(deleted)
  }

  async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>> {
    // Both sides are lowercased so that case folding covers non-ASCII text.
    let sql = format!(
      r"SELECT {CONTACT_COLUMNS} FROM contacts
        WHERE unicode_lower(first_name) LIKE ?1 ESCAPE '\'
           OR unicode_lower(last_name)  LIKE ?1 ESCAPE '\'
           OR unicode_lower(email)      LIKE ?1 ESCAPE '\'
        ORDER BY id"
    );
    self.query_contacts(sql, vec![like_pattern(&query.to_lowercase())]).await
  }

  async fn upcoming_birthdays(&self, window: BirthdayWindow) -> Result<Vec<Contact>> {
    let md = "strftime('%m-%d', birthday)";
    let (where_clause, params) = match window.range() {
      MonthDayRange::All => (String::new(), vec![]),
      MonthDayRange::Within { from, to } => (
        format!("WHERE {md} BETWEEN ?1 AND ?2"),
        vec![encode_month_day(from), encode_month_day(to)],
      ),
      MonthDayRange::Wrapping { from, to } => (
        format!("WHERE {md} >= ?1 OR {md} <= ?2"),
        vec![encode_month_day(from), encode_month_day(to)],
      ),
    };

    let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts {where_clause} ORDER BY id");
    self.query_contacts(sql, params).await
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<User> {
    let created_at = Utc::now();
    let email      = input.email.clone();
    let hash       = input.password_hash.clone();

    let id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (email, password_hash, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![email, hash, created_at],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await
      .map_err(|e| {
        if is_unique_violation(&e) {
          Error::Core(rolo_core::Error::EmailTaken(input.email.clone()))
        } else {
          Error::Database(e)
        }
      })?;

    debug!(id, "user created");
    Ok(User {
      id,
      email: input.email,
      password_hash: input.password_hash,
      created_at,
    })
  }

  async fn get_user(&self, id: i64) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
              rusqlite::params![id],
              user_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(user)
  }

  async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
    let email = email.to_owned();
    let user = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
              rusqlite::params![email],
              user_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(user)
  }
}
