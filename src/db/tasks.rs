//! Task CRUD and paginated listing, always scoped to the owning user.

use super::{Database, from_ms, now_ms};
use crate::types::{Task, TaskPatch, TaskStatus, TasksPage, search_key, total_pages};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};

const TASK_COLUMNS: &str = "id, title, status, user_id, created_at, updated_at";

/// Query parameters for a task listing.
#[derive(Debug, Clone)]
pub struct TaskQuery {
    pub user_id: i64,
    pub page: u32,
    pub limit: u32,
    pub status: Option<TaskStatus>,
    pub search: Option<String>,
}

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let status = status.parse::<TaskStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        status,
        user_id: row.get("user_id")?,
        created_at: from_ms(row.get("created_at")?),
        updated_at: from_ms(row.get("updated_at")?),
    })
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(conn: &Connection, user_id: i64, task_id: i64) -> Result<Option<Task>> {
    let sql = format!(
        "SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2",
        TASK_COLUMNS
    );
    let task = conn
        .query_row(&sql, params![task_id, user_id], parse_task_row)
        .optional()?;
    Ok(task)
}

impl Database {
    /// Query one page of a user's tasks, most recent first.
    pub fn query_tasks(&self, query: &TaskQuery) -> Result<TasksPage> {
        self.with_conn(|conn| {
            let mut where_clause = String::from(" WHERE user_id = ?1");
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query.user_id)];
            let mut param_idx = 2;

            // Status filter
            if let Some(status) = query.status {
                where_clause.push_str(&format!(" AND status = ?{}", param_idx));
                params_vec.push(Box::new(status.as_str()));
                param_idx += 1;
            }

            // Case-insensitive substring search; both sides folded by search_key
            if let Some(search) = query.search.as_deref().map(str::trim) {
                if !search.is_empty() {
                    where_clause.push_str(&format!(
                        " AND instr(title_lower, ?{}) > 0",
                        param_idx
                    ));
                    params_vec.push(Box::new(search_key(search)));
                }
            }

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let count_sql = format!("SELECT COUNT(*) FROM tasks{}", where_clause);
            let total: i64 = conn.query_row(&count_sql, params_refs.as_slice(), |row| row.get(0))?;

            let page = query.page.max(1);
            let offset = (page as i64 - 1) * query.limit as i64;
            let sql = format!(
                "SELECT {} FROM tasks{} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
                TASK_COLUMNS, where_clause, query.limit, offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map(params_refs.as_slice(), parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(TasksPage {
                tasks,
                total,
                page,
                total_pages: total_pages(total, query.limit),
            })
        })
    }

    /// Create a pending task for a user.
    pub fn create_task(&self, user_id: i64, title: &str) -> Result<Task> {
        let now = now_ms();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (title, title_lower, status, user_id, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4, ?4)",
                params![title, search_key(title), user_id, now],
            )?;
            let id = conn.last_insert_rowid();
            get_task_internal(conn, user_id, id)?
                .ok_or_else(|| anyhow!("task {} vanished after insert", id))
        })
    }

    /// Get a task if it exists and belongs to the user.
    pub fn get_task(&self, user_id: i64, task_id: i64) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, user_id, task_id))
    }

    /// Apply a partial update. Returns `None` when the task is missing or not owned.
    pub fn update_task(&self, user_id: i64, task_id: i64, patch: &TaskPatch) -> Result<Option<Task>> {
        let now = now_ms();

        self.with_conn(|conn| {
            let mut updates = vec!["updated_at = ?1".to_string()];
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];
            let mut param_idx = 2;

            if let Some(ref title) = patch.title {
                updates.push(format!("title = ?{}, title_lower = ?{}", param_idx, param_idx + 1));
                params_vec.push(Box::new(title.clone()));
                params_vec.push(Box::new(search_key(title)));
                param_idx += 2;
            }
            if let Some(status) = patch.status {
                updates.push(format!("status = ?{}", param_idx));
                params_vec.push(Box::new(status.as_str()));
                param_idx += 1;
            }

            let sql = format!(
                "UPDATE tasks SET {} WHERE id = ?{} AND user_id = ?{}",
                updates.join(", "),
                param_idx,
                param_idx + 1
            );
            params_vec.push(Box::new(task_id));
            params_vec.push(Box::new(user_id));

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();
            let rows_affected = conn.execute(&sql, params_refs.as_slice())?;

            if rows_affected == 0 {
                return Ok(None);
            }
            get_task_internal(conn, user_id, task_id)
        })
    }

    /// Delete a task. Returns false when the task is missing or not owned.
    pub fn delete_task(&self, user_id: i64, task_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let rows_affected = conn.execute(
                "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id, user_id],
            )?;
            Ok(rows_affected > 0)
        })
    }

    /// Flip a task between pending and done.
    pub fn toggle_task(&self, user_id: i64, task_id: i64) -> Result<Option<Task>> {
        let now = now_ms();

        self.with_conn(|conn| {
            let rows_affected = conn.execute(
                "UPDATE tasks
                 SET status = CASE status WHEN 'pending' THEN 'done' ELSE 'pending' END,
                     updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3",
                params![now, task_id, user_id],
            )?;
            if rows_affected == 0 {
                return Ok(None);
            }
            get_task_internal(conn, user_id, task_id)
        })
    }
}
