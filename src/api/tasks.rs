//! Task routes. Every handler is scoped to the authenticated user.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::auth::AuthUser;
use super::server::AppState;
use crate::db::tasks::TaskQuery;
use crate::error::{ApiError, ApiResult};
use crate::types::{DEFAULT_LIMIT, MAX_LIMIT, Task, TaskPatch, TaskStatus, TasksPage, validate_title};

/// Raw query string for `GET /tasks`. Parsed by hand to report friendly errors.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    page: Option<String>,
    limit: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

impl ListParams {
    fn into_query(self, user_id: i64) -> ApiResult<TaskQuery> {
        let page = parse_bounded("page", self.page.as_deref(), 1, 1, u32::MAX)?;
        let limit = parse_bounded("limit", self.limit.as_deref(), DEFAULT_LIMIT, 1, MAX_LIMIT)?;
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(
                s.parse::<TaskStatus>()
                    .map_err(|e| ApiError::invalid_value("status", e))?,
            ),
        };
        let search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(TaskQuery {
            user_id,
            page,
            limit,
            status,
            search,
        })
    }
}

fn parse_bounded(field: &str, raw: Option<&str>, default: u32, min: u32, max: u32) -> ApiResult<u32> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    let value: u32 = raw
        .parse()
        .map_err(|_| ApiError::invalid_value(field, format!("{} must be a positive integer", field)))?;
    if value < min || value > max {
        return Err(ApiError::invalid_value(
            field,
            format!("{} must be between {} and {}", field, min, max),
        ));
    }
    Ok(value)
}

fn parse_task_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::invalid_value("id", "Invalid task ID"))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_value("body", rejection.body_text()))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskBody {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

/// `GET /tasks?page&limit&status&search`
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<TasksPage>> {
    let query = params.into_query(auth.user_id)?;
    let page = state.db().query_tasks(&query)?;
    debug!(
        user_id = auth.user_id,
        page = page.page,
        total = page.total,
        "Listed tasks"
    );
    Ok(Json(page))
}

/// `POST /tasks`
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<CreateTaskBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let title = validate_title(&body.title).map_err(|e| ApiError::invalid_value("title", e))?;
    let task = state.db().create_task(auth.user_id, &title)?;
    debug!(user_id = auth.user_id, task_id = task.id, "Created task");
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let id = parse_task_id(&id)?;
    let task = state
        .db()
        .get_task(auth.user_id, id)?
        .ok_or_else(ApiError::task_not_found)?;
    Ok(Json(task))
}

/// `PATCH /tasks/{id}`
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let id = parse_task_id(&id)?;
    let mut patch = json_body(payload)?;
    if patch.is_empty() {
        return Err(ApiError::no_fields());
    }
    if let Some(ref title) = patch.title {
        patch.title =
            Some(validate_title(title).map_err(|e| ApiError::invalid_value("title", e))?);
    }

    let task = state
        .db()
        .update_task(auth.user_id, id, &patch)?
        .ok_or_else(ApiError::task_not_found)?;
    Ok(Json(task))
}

/// `DELETE /tasks/{id}`
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_task_id(&id)?;
    if !state.db().delete_task(auth.user_id, id)? {
        return Err(ApiError::task_not_found());
    }
    Ok(Json(MessageResponse {
        message: "Task deleted successfully",
    }))
}

/// `POST /tasks/{id}/toggle`
pub async fn toggle_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let id = parse_task_id(&id)?;
    let task = state
        .db()
        .toggle_task(auth.user_id, id)?
        .ok_or_else(ApiError::task_not_found)?;
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_apply_defaults() {
        let query = ListParams::default().into_query(3).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert!(query.status.is_none());
        assert!(query.search.is_none());
    }

    #[test]
    fn list_params_reject_out_of_range_limit() {
        let params = ListParams {
            limit: Some("101".into()),
            ..Default::default()
        };
        assert!(params.into_query(1).is_err());

        let params = ListParams {
            page: Some("0".into()),
            ..Default::default()
        };
        assert!(params.into_query(1).is_err());
    }

    #[test]
    fn blank_status_and_search_are_absent() {
        let params = ListParams {
            status: Some("".into()),
            search: Some("   ".into()),
            ..Default::default()
        };
        let query = params.into_query(1).unwrap();
        assert!(query.status.is_none());
        assert!(query.search.is_none());
    }

    #[test]
    fn task_id_must_be_positive_integer() {
        assert_eq!(parse_task_id("12").unwrap(), 12);
        assert!(parse_task_id("-1").is_err());
        assert!(parse_task_id("abc").is_err());
    }
}
