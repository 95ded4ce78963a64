//! Durable 1:1 mapping from employee to OAuth credential set.
//!
//! Upsert semantics: a new authorization overwrites the prior row in place,
//! timestamps included — there is never more than one live token per
//! employee. Token values are encrypted at rest (see [`super::encryption`]).
//!
//! Cross-component invariant: a token write always brings the owning
//! employee's status in sync (`save` → `authorized`, `delete` → `revoked`).

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::employees::ignore_no_rows;
use super::{encryption, parse_ts, Database};
use crate::error::{Error, Result};

/// A credential bundle as returned by the provider's token endpoints.
///
/// Unknown provider fields are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub open_id: String,
    #[serde(default)]
    pub scope: String,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
    /// Refresh token lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: i64,
}

/// A persisted credential row, decrypted.
#[derive(Debug, Clone, Serialize)]
pub struct StoredToken {
    pub employee_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub open_id: String,
    pub scope: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredToken {
    /// The expiry rule: the token is invalid once
    /// `created_at + expires_in` seconds have passed, regardless of any
    /// stored flag. Callers that check expiry must use this and react.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + Duration::seconds(self.expires_in)
    }

    /// Same rule for the refresh token's own lifetime.
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + Duration::seconds(self.refresh_expires_in)
    }
}

/// Encrypted token storage with upsert semantics.
#[derive(Clone)]
pub struct TokenStore {
    db: Database,
    encryption_key: Vec<u8>,
}

impl TokenStore {
    /// `encryption_key` is the base64-encoded 32-byte master key.
    pub fn new(db: Database, encryption_key: &str) -> anyhow::Result<Self> {
        let key = encryption::validate_key(encryption_key)?;
        Ok(Self {
            db,
            encryption_key: key,
        })
    }

    /// Insert-or-replace the employee's credential set.
    ///
    /// On replace every field is overwritten, `created_at` included, so the
    /// derived expiry restarts from this save. Side effect: the employee
    /// moves to `authorized`.
    pub fn save(&self, employee_id: &str, token: &TokenData) -> Result<()> {
        if token.access_token.is_empty() {
            return Err(Error::validation("access_token must not be empty"));
        }

        let (access_ct, access_nonce) = encryption::encrypt(&token.access_token, &self.encryption_key)
            .map_err(|e| Error::Internal(format!("failed to encrypt access token: {}", e)))?;
        let (refresh_ct, refresh_nonce) =
            encryption::encrypt(&token.refresh_token, &self.encryption_key)
                .map_err(|e| Error::Internal(format!("failed to encrypt refresh token: {}", e)))?;

        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock();

        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM employees WHERE id = ?1",
                params![employee_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(ignore_no_rows)?;
        if exists.is_none() {
            return Err(Error::not_found(format!(
                "employee {} not found",
                employee_id
            )));
        }

        conn.execute(
            r#"
            INSERT INTO auth_tokens (
                employee_id, access_token, access_token_nonce,
                refresh_token, refresh_token_nonce,
                open_id, scope, expires_in, refresh_expires_in,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(employee_id) DO UPDATE SET
                access_token = excluded.access_token,
                access_token_nonce = excluded.access_token_nonce,
                refresh_token = excluded.refresh_token,
                refresh_token_nonce = excluded.refresh_token_nonce,
                open_id = excluded.open_id,
                scope = excluded.scope,
                expires_in = excluded.expires_in,
                refresh_expires_in = excluded.refresh_expires_in,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
            params![
                employee_id,
                access_ct,
                access_nonce,
                refresh_ct,
                refresh_nonce,
                token.open_id,
                token.scope,
                token.expires_in,
                token.refresh_expires_in,
                now,
            ],
        )?;

        conn.execute(
            "UPDATE employees SET auth_status = 'authorized', updated_at = ?1 WHERE id = ?2",
            params![now, employee_id],
        )?;

        Ok(())
    }

    /// Pure read. Expiry is NOT enforced here — apply
    /// [`StoredToken::is_expired`] at the call site.
    pub fn get(&self, employee_id: &str) -> Result<Option<StoredToken>> {
        let conn = self.db.lock();
        let row = conn
            .query_row(
                r#"
                SELECT access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       open_id, scope, expires_in, refresh_expires_in,
                       created_at, updated_at
                FROM auth_tokens
                WHERE employee_id = ?1
                "#,
                params![employee_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                    ))
                },
            )
            .map(Some)
            .or_else(ignore_no_rows)?;

        let Some((access_ct, access_nonce, refresh_ct, refresh_nonce, open_id, scope, expires_in, refresh_expires_in, created, updated)) = row else {
            return Ok(None);
        };

        let access_token = encryption::decrypt(&access_ct, &access_nonce, &self.encryption_key)
            .map_err(|e| Error::Internal(format!("failed to decrypt access token: {}", e)))?;
        let refresh_token = encryption::decrypt(&refresh_ct, &refresh_nonce, &self.encryption_key)
            .map_err(|e| Error::Internal(format!("failed to decrypt refresh token: {}", e)))?;

        Ok(Some(StoredToken {
            employee_id: employee_id.to_string(),
            access_token,
            refresh_token,
            open_id,
            scope,
            expires_in,
            refresh_expires_in,
            created_at: parse_ts(&created)?,
            updated_at: parse_ts(&updated)?,
        }))
    }

    /// Removes the credential row. Side effect: the employee moves to
    /// `revoked` whether or not a row existed. Returns whether a row was
    /// deleted.
    pub fn delete(&self, employee_id: &str) -> Result<bool> {
        let conn = self.db.lock();
        let deleted = conn.execute(
            "DELETE FROM auth_tokens WHERE employee_id = ?1",
            params![employee_id],
        )?;
        conn.execute(
            "UPDATE employees SET auth_status = 'revoked', updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), employee_id],
        )?;
        Ok(deleted > 0)
    }
}
