//! Read seam over categories and registration windows.
//!
//! The administration surface owns CRUD for these tables; the engine only
//! reads them. The insert helpers exist for seeding and tests.

use super::{parse_flag, RepoResult};
use crate::model::reference::{Category, CategoryId, RegistrationWindow};
use rusqlite::{params, Connection, OptionalExtension};

pub trait ReferenceRepository {
    fn get_category(&self, id: CategoryId) -> RepoResult<Option<Category>>;
    fn insert_category(&self, name: &str, is_active: bool) -> RepoResult<Category>;
    /// Latest-opening active window, if any.
    fn active_window(&self) -> RepoResult<Option<RegistrationWindow>>;
    fn insert_window(
        &self,
        opens_at: i64,
        closes_at: i64,
        note: Option<&str>,
    ) -> RepoResult<RegistrationWindow>;
}

pub struct SqliteReferenceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReferenceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReferenceRepository for SqliteReferenceRepository<'_> {
    fn get_category(&self, id: CategoryId) -> RepoResult<Option<Category>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, is_active FROM active_categories WHERE id = ?1;",
                [id],
                |row| {
                    Ok((
                        row.get::<_, CategoryId>("id")?,
                        row.get::<_, String>("name")?,
                        row.get::<_, i64>("is_active")?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, name, is_active)) => Ok(Some(Category {
                id,
                name,
                is_active: parse_flag(is_active, "categories.is_active")?,
            })),
            None => Ok(None),
        }
    }

    fn insert_category(&self, name: &str, is_active: bool) -> RepoResult<Category> {
        self.conn.execute(
            "INSERT INTO categories (name, is_active) VALUES (?1, ?2);",
            params![name.trim(), super::bool_to_int(is_active)],
        )?;
        Ok(Category {
            id: self.conn.last_insert_rowid(),
            name: name.trim().to_string(),
            is_active,
        })
    }

    fn active_window(&self) -> RepoResult<Option<RegistrationWindow>> {
        let window = self
            .conn
            .query_row(
                "SELECT id, opens_at, closes_at, note
                 FROM active_registration_windows
                 ORDER BY opens_at DESC, id DESC
                 LIMIT 1;",
                [],
                |row| {
                    Ok(RegistrationWindow {
                        id: row.get("id")?,
                        opens_at: row.get("opens_at")?,
                        closes_at: row.get("closes_at")?,
                        note: row.get("note")?,
                    })
                },
            )
            .optional()?;
        Ok(window)
    }

    fn insert_window(
        &self,
        opens_at: i64,
        closes_at: i64,
        note: Option<&str>,
    ) -> RepoResult<RegistrationWindow> {
        self.conn.execute(
            "INSERT INTO registration_windows (opens_at, closes_at, note) VALUES (?1, ?2, ?3);",
            params![opens_at, closes_at, note],
        )?;
        Ok(RegistrationWindow {
            id: self.conn.last_insert_rowid(),
            opens_at,
            closes_at,
            note: note.map(str::to_string),
        })
    }
}
