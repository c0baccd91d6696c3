//! SQL schema for the Rolo SQLite store.
//!
//! Executed once at connection startup. There is no migration history; the
//! statements are idempotent thanks to `CREATE TABLE IF NOT EXISTS`.

pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- AUTOINCREMENT keeps ids of deleted contacts from being handed out again.
CREATE TABLE IF NOT EXISTS contacts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name      TEXT NOT NULL,
    last_name       TEXT NOT NULL,
    email           TEXT NOT NULL,
    phone           TEXT,
    birthday        TEXT NOT NULL,   -- YYYY-MM-DD
    additional_data TEXT
);

CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL      -- RFC 3339 UTC
);

CREATE INDEX IF NOT EXISTS contacts_email_idx ON contacts(email);

PRAGMA user_version = 1;
";
