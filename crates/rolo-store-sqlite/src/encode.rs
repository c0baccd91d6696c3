//! Row mapping between SQLite columns and domain types.
//!
//! Dates are stored as `YYYY-MM-DD` text and timestamps as RFC 3339 text,
//! both through rusqlite's `chrono` support.

use rolo_core::{birthday::MonthDay, contact::Contact, user::User};

// ─── Contacts ────────────────────────────────────────────────────────────────

/// Column list matching [`contact_from_row`].
pub const CONTACT_COLUMNS: &str =
  "id, first_name, last_name, email, phone, birthday, additional_data";

pub fn contact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
  Ok(Contact {
    id:              row.get(0)?,
    first_name:      row.get(1)?,
    last_name:       row.get(2)?,
    email:           row.get(3)?,
    phone:           row.get(4)?,
    birthday:        row.get(5)?,
    additional_data: row.get(6)?,
  })
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str = "id, email, password_hash, created_at";

pub fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
  Ok(User {
    id:            row.get(0)?,
    email:         row.get(1)?,
    password_hash: row.get(2)?,
    created_at:    row.get(3)?,
  })
}

// ─── Query helpers ───────────────────────────────────────────────────────────

/// Build a `LIKE … ESCAPE '\'` pattern matching `text` anywhere, with `%`,
/// `_` and `\` in `text` taken literally.
pub fn like_pattern(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 2);
  out.push('%');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

/// Format a month/day pair the way `strftime('%m-%d', …)` does.
pub fn encode_month_day((month, day): MonthDay) -> String { format!("{month:02}-{day:02}") }
