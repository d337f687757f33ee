//! SQLite token backend
//!
//! Stores one row per application key in the `ecobee_tokens` table.  This is
//! the default backend; the URI location is a file path
//! (`sqlite://.ecobee.db`, `sqlite:///var/lib/cobee/tokens.db`) or
//! `:memory:` for a private in-memory database.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{check_owner, persistence, Backend, BackendUri};
use crate::auth::token::Token;
use crate::error::{CobeeError, Result};

const IN_MEMORY: &str = ":memory:";

/// Token storage backed by a single SQLite table.
pub struct SqliteBackend {
    app_key: String,
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

/// Registry constructor for `sqlite://` URIs.
pub fn factory(uri: &BackendUri, app_key: &str) -> Result<Box<dyn Backend>> {
    if uri.location.is_empty() {
        return Err(CobeeError::InvalidBackendUri(format!(
            "{} (missing database path)",
            uri.raw
        ))
        .into());
    }

    let backend = if uri.location == IN_MEMORY {
        SqliteBackend::in_memory(app_key)?
    } else {
        SqliteBackend::new_with_path(&uri.location, app_key)?
    };
    Ok(Box::new(backend))
}

impl SqliteBackend {
    /// Opens (creating if needed) the database file at `db_path`.
    ///
    /// Missing parent directories are created so opening the file succeeds.
    ///
    /// # Examples
    ///
    /// ```
    /// use cobee::backends::SqliteBackend;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let backend = SqliteBackend::new_with_path(dir.path().join("tokens.db"), "app").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P, app_key: &str) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(persistence("Failed to create parent directory for database"))?;
            }
        }

        let conn = Connection::open(&db_path).map_err(persistence("Failed to open database"))?;

        Ok(Self {
            app_key: app_key.to_string(),
            db_path: Some(db_path),
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn in_memory(app_key: &str) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(persistence("Failed to open database"))?;

        Ok(Self {
            app_key: app_key.to_string(),
            db_path: None,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CobeeError::BackendPersistence("database lock poisoned".to_string()).into())
    }
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        app_key: row.get("app_key")?,
        pin: row.get("pin")?,
        initial_code: row.get("initial_code")?,
        access_token: row.get("access_token")?,
        token_type: row.get("token_type")?,
        refresh_token: row.get("refresh_token")?,
        scope: row.get("scope")?,
        issued: row.get("issued")?,
        expires_at: row.get("expires_at")?,
    })
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ecobee_tokens (
                app_key TEXT PRIMARY KEY,
                pin TEXT NOT NULL,
                initial_code TEXT NOT NULL,
                access_token TEXT NOT NULL,
                token_type TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                scope TEXT NOT NULL,
                issued INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(persistence("Failed to create tables"))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Token>> {
        let conn = self.conn()?;
        let token = conn
            .query_row(
                "SELECT app_key, pin, initial_code, access_token, token_type,
                        refresh_token, scope, issued, expires_at
                FROM ecobee_tokens WHERE app_key = ?",
                params![self.app_key],
                token_from_row,
            )
            .optional()
            .map_err(persistence("Failed to query token"))?;
        Ok(token)
    }

    async fn save(&self, token: &Token) -> Result<()> {
        check_owner(&self.app_key, token)?;
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(persistence("Failed to start transaction"))?;

        tx.execute(
            "INSERT INTO ecobee_tokens (
                app_key, pin, initial_code, access_token, token_type,
                refresh_token, scope, issued, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(app_key) DO UPDATE SET
                pin = excluded.pin,
                initial_code = excluded.initial_code,
                access_token = excluded.access_token,
                token_type = excluded.token_type,
                refresh_token = excluded.refresh_token,
                scope = excluded.scope,
                issued = excluded.issued,
                expires_at = excluded.expires_at",
            params![
                token.app_key,
                token.pin,
                token.initial_code,
                token.access_token,
                token.token_type,
                token.refresh_token,
                token.scope,
                token.issued,
                token.expires_at,
            ],
        )
        .map_err(persistence("Failed to write token"))?;

        tx.commit()
            .map_err(persistence("Failed to commit transaction"))?;

        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM ecobee_tokens WHERE app_key = ?",
            params![self.app_key],
        )
        .map_err(persistence("Failed to delete token"))?;
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.db_path {
            Some(path) => format!("sqlite ({})", path.display()),
            None => "sqlite (in-memory)".to_string(),
        }
    }
}
