//! User accounts.

use super::{Database, from_ms, now_ms};
use crate::error::ApiError;
use crate::types::User;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

fn parse_user_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        created_at: from_ms(row.get("created_at")?),
        updated_at: from_ms(row.get("updated_at")?),
    })
}

fn get_user_internal(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, email, created_at, updated_at FROM users WHERE id = ?1",
            params![user_id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

impl Database {
    /// Create a user. The caller hashes the password beforehand.
    ///
    /// Fails with an `AlreadyExists` error when the email is taken.
    pub fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User> {
        let now = now_ms();

        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )?;
            if exists {
                return Err(ApiError::already_exists("Email already registered").into());
            }

            conn.execute(
                "INSERT INTO users (name, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![name, email, password_hash, now],
            )?;
            let id = conn.last_insert_rowid();

            get_user_internal(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
        })
    }

    /// Get a user by id.
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.with_conn(|conn| get_user_internal(conn, user_id))
    }

    /// Look up a user by email together with their stored password hash.
    pub fn get_user_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT id, name, email, password, created_at, updated_at
                     FROM users WHERE email = ?1",
                    params![email],
                    |row| {
                        let user = parse_user_row(row)?;
                        let hash: String = row.get("password")?;
                        Ok((user, hash))
                    },
                )
                .optional()?;
            Ok(found)
        })
    }
}
