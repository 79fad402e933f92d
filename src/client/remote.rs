//! Remote task and auth services, and the HTTP client that implements them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum_extra::extract::cookie::Cookie;
use chrono::Utc;
use reqwest::header::{COOKIE, HeaderMap, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::error::{SyncError, SyncResult};
use super::filter::TaskFilter;
use crate::types::{Task, TaskPatch, TasksPage, User};

const REFRESH_PATH: &str = "/auth/refresh";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Task operations offered by the server.
#[async_trait]
pub trait RemoteTaskService: Send + Sync {
    async fn list_tasks(&self, filter: &TaskFilter) -> SyncResult<TasksPage>;
    async fn create_task(&self, title: &str) -> SyncResult<Task>;
    async fn update_task(&self, id: i64, patch: &TaskPatch) -> SyncResult<Task>;
    async fn delete_task(&self, id: i64) -> SyncResult<()>;
    async fn toggle_task(&self, id: i64) -> SyncResult<Task>;
}

/// Session operations offered by the server.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn register(&self, name: &str, email: &str, password: &str) -> SyncResult<User>;
    async fn login(&self, email: &str, password: &str) -> SyncResult<User>;
    async fn logout(&self) -> SyncResult<()>;
    async fn refresh(&self) -> SyncResult<()>;
    async fn me(&self) -> SyncResult<User>;
}

/// Cookies the server has set, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookies {
    cookies: BTreeMap<String, String>,
}

impl SessionCookies {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    /// `Cookie` request header value, or `None` when no cookie is held.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Apply every `Set-Cookie` header of a response.
    pub fn absorb(&mut self, headers: &HeaderMap) {
        for header in headers.get_all(SET_COOKIE) {
            if let Ok(raw) = header.to_str() {
                self.apply_set_cookie(raw);
            }
        }
    }

    /// Apply one `Set-Cookie` value. An empty value, a non-positive `Max-Age`,
    /// or an `Expires` in the past deletes the cookie.
    pub fn apply_set_cookie(&mut self, raw: &str) {
        let cookie = match Cookie::parse(raw) {
            Ok(cookie) => cookie,
            Err(e) => {
                debug!("Ignoring malformed Set-Cookie header: {}", e);
                return;
            }
        };
        let value = cookie.value_trimmed();

        let expired = cookie
            .max_age()
            .is_some_and(|age| age.is_zero() || age.is_negative())
            || cookie
                .expires_datetime()
                .is_some_and(|at| at.unix_timestamp() <= Utc::now().timestamp());

        if value.is_empty() || expired {
            self.cookies.remove(cookie.name());
        } else {
            self.cookies
                .insert(cookie.name().to_string(), value.to_string());
        }
    }

    /// Read saved cookies. A missing file is an empty session.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }
}

/// One request, kept whole so it can be replayed after a token refresh.
#[derive(Debug, Clone)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

/// HTTP client for the task API.
///
/// Holds the session cookies itself and replays any request that fails with
/// 401 once, after a successful `POST /auth/refresh`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    cookies: Arc<Mutex<SessionCookies>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookies: Arc::new(Mutex::new(SessionCookies::default())),
        })
    }

    pub fn with_cookies(self, cookies: SessionCookies) -> Self {
        *self.lock_cookies() = cookies;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Copy of the cookies currently held.
    pub fn cookies(&self) -> SessionCookies {
        self.lock_cookies().clone()
    }

    fn lock_cookies(&self) -> MutexGuard<'_, SessionCookies> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send_once(&self, request: &ApiRequest) -> SyncResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        let cookie = self.lock_cookies().header_value();
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        self.lock_cookies().absorb(response.headers());
        debug!(method = %request.method, path = %request.path, status = %response.status(), "API response");
        Ok(response)
    }

    /// Send a request, refreshing the session and retrying once on 401.
    async fn send(&self, request: &ApiRequest) -> SyncResult<reqwest::Response> {
        let response = self.send_once(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED || request.path == REFRESH_PATH {
            return Ok(response);
        }

        debug!(path = %request.path, "Access token rejected, refreshing session");
        match self.send_once(&ApiRequest::post(REFRESH_PATH)).await {
            Ok(refreshed) if refreshed.status().is_success() => self.send_once(request).await,
            Ok(refreshed) => {
                debug!(status = %refreshed.status(), "Session refresh rejected");
                Ok(response)
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                Ok(response)
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> SyncResult<T> {
        let response = check_status(self.send(request).await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Network(format!("invalid response body: {}", e)))
    }

    async fn send_empty(&self, request: &ApiRequest) -> SyncResult<()> {
        check_status(self.send(request).await?).await.map(|_| ())
    }
}

/// Pass 2xx responses through; turn anything else into a remote error.
async fn check_status(response: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
        .and_then(|body| body.error);
    Err(SyncError::remote(status.as_u16(), message))
}

fn list_query(filter: &TaskFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("page", filter.page.to_string()),
        ("limit", filter.limit.to_string()),
    ];
    if let Some(status) = filter.status {
        query.push(("status", status.as_str().to_string()));
    }
    if let Some(search) = filter.search_term() {
        query.push(("search", search.to_string()));
    }
    query
}

#[async_trait]
impl RemoteTaskService for ApiClient {
    async fn list_tasks(&self, filter: &TaskFilter) -> SyncResult<TasksPage> {
        let mut request = ApiRequest::get("/tasks");
        request.query = list_query(filter);
        self.send_json(&request).await
    }

    async fn create_task(&self, title: &str) -> SyncResult<Task> {
        self.send_json(&ApiRequest::post("/tasks").json(json!({ "title": title })))
            .await
    }

    async fn update_task(&self, id: i64, patch: &TaskPatch) -> SyncResult<Task> {
        let body = serde_json::to_value(patch).map_err(|e| SyncError::Validation(e.to_string()))?;
        self.send_json(&ApiRequest::new(Method::PATCH, format!("/tasks/{}", id)).json(body))
            .await
    }

    async fn delete_task(&self, id: i64) -> SyncResult<()> {
        self.send_empty(&ApiRequest::new(Method::DELETE, format!("/tasks/{}", id)))
            .await
    }

    async fn toggle_task(&self, id: i64) -> SyncResult<Task> {
        self.send_json(&ApiRequest::post(format!("/tasks/{}/toggle", id)))
            .await
    }
}

#[async_trait]
impl AuthService for ApiClient {
    async fn register(&self, name: &str, email: &str, password: &str) -> SyncResult<User> {
        let request = ApiRequest::post("/auth/register").json(json!({
            "name": name,
            "email": email,
            "password": password,
        }));
        let envelope: UserEnvelope = self.send_json(&request).await?;
        Ok(envelope.user)
    }

    async fn login(&self, email: &str, password: &str) -> SyncResult<User> {
        let request = ApiRequest::post("/auth/login").json(json!({
            "email": email,
            "password": password,
        }));
        let envelope: UserEnvelope = self.send_json(&request).await?;
        Ok(envelope.user)
    }

    async fn logout(&self) -> SyncResult<()> {
        let result = self.send_empty(&ApiRequest::post("/auth/logout")).await;
        // Local session ends even when the server could not be reached.
        *self.lock_cookies() = SessionCookies::default();
        result
    }

    async fn refresh(&self) -> SyncResult<()> {
        self.send_empty(&ApiRequest::post(REFRESH_PATH)).await
    }

    async fn me(&self) -> SyncResult<User> {
        self.send_json(&ApiRequest::get("/auth/me")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    const TASK_JSON: &str = r#"{"id":7,"title":"Buy milk","status":"pending","userId":1,"createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}"#;

    #[test]
    fn set_cookie_parsing() {
        let mut cookies = SessionCookies::default();
        cookies.apply_set_cookie("access_token=abc; Path=/; HttpOnly; SameSite=Lax");
        cookies.apply_set_cookie("refresh_token=def; Path=/");
        assert_eq!(cookies.get("access_token"), Some("abc"));
        assert_eq!(
            cookies.header_value().as_deref(),
            Some("access_token=abc; refresh_token=def")
        );

        cookies.apply_set_cookie("access_token=; Path=/; Max-Age=0");
        cookies.apply_set_cookie("refresh_token=gone; Max-Age=0");
        assert!(cookies.is_empty());
        assert!(cookies.header_value().is_none());
    }

    #[test]
    fn set_cookie_expiry_and_quoting() {
        let mut cookies = SessionCookies::default();
        cookies.apply_set_cookie(r#"access_token="abc"; Path=/; Max-Age=900"#);
        cookies.apply_set_cookie("refresh_token=def; Expires=Wed, 21 Oct 2065 07:28:00 GMT");
        assert_eq!(cookies.get("access_token"), Some("abc"));
        assert_eq!(cookies.get("refresh_token"), Some("def"));

        cookies.apply_set_cookie("refresh_token=def; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(cookies.get("refresh_token"), None);

        // Malformed headers leave the session alone.
        cookies.apply_set_cookie("no-equals-sign");
        cookies.apply_set_cookie("=orphan; Path=/");
        assert_eq!(
            cookies.header_value().as_deref(),
            Some("access_token=abc")
        );
    }

    #[test]
    fn session_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        assert!(SessionCookies::load(&path).unwrap().is_empty());

        let mut cookies = SessionCookies::default();
        cookies.insert("access_token", "abc");
        cookies.save(&path).unwrap();
        assert_eq!(SessionCookies::load(&path).unwrap(), cookies);
    }

    #[tokio::test]
    async fn list_sends_filter_and_cookies() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/tasks")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("limit".into(), "20".into()),
                Matcher::UrlEncoded("status".into(), "done".into()),
                Matcher::UrlEncoded("search".into(), "milk".into()),
            ]))
            .match_header("cookie", "access_token=abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"tasks":[{}],"total":21,"page":2,"totalPages":2}}"#,
                TASK_JSON
            ))
            .create_async()
            .await;

        let mut cookies = SessionCookies::default();
        cookies.insert("access_token", "abc");
        let client = ApiClient::new(server.url()).unwrap().with_cookies(cookies);
        let filter = TaskFilter {
            page: 2,
            limit: 20,
            status: Some(crate::types::TaskStatus::Done),
            search: Some(" milk ".into()),
        };

        let page = client.list_tasks(&filter).await.unwrap();
        assert_eq!(page.total, 21);
        assert_eq!(page.tasks[0].id, 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_message_comes_from_body() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/tasks/9")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Task not found","status":404}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let err = client.delete_task(9).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::RemoteService {
                status: 404,
                message: "Task not found".into()
            }
        );
    }

    #[tokio::test]
    async fn error_without_body_uses_fallback() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tasks")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let err = client.create_task("x").await.unwrap_err();
        assert_eq!(
            err,
            SyncError::RemoteService {
                status: 500,
                message: "Request failed with status 500".into()
            }
        );
    }

    #[tokio::test]
    async fn unauthorized_refreshes_and_retries_once() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("POST", "/tasks/7/toggle")
            .match_header("cookie", "access_token=old")
            .with_status(401)
            .with_body(r#"{"error":"Invalid or expired access token","status":401}"#)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("set-cookie", "access_token=new; Path=/; HttpOnly")
            .with_body(r#"{"message":"Token refreshed successfully"}"#)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("POST", "/tasks/7/toggle")
            .match_header("cookie", "access_token=new")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TASK_JSON)
            .expect(1)
            .create_async()
            .await;

        let mut cookies = SessionCookies::default();
        cookies.insert("access_token", "old");
        let client = ApiClient::new(server.url()).unwrap().with_cookies(cookies);

        let task = client.toggle_task(7).await.unwrap();
        assert_eq!(task.id, 7);
        assert_eq!(client.cookies().get("access_token"), Some("new"));
        stale.assert_async().await;
        refresh.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn retry_happens_at_most_once() {
        let mut server = Server::new_async().await;
        let tasks = server
            .mock("GET", "/tasks")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":"Unauthorized","status":401}"#)
            .expect(2)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let err = client.list_tasks(&TaskFilter::default()).await.unwrap_err();
        assert!(err.is_unauthorized());
        tasks.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_first_401() {
        let mut server = Server::new_async().await;
        let me = server
            .mock("GET", "/auth/me")
            .with_status(401)
            .with_body(r#"{"error":"Unauthorized","status":401}"#)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .with_body(r#"{"error":"Refresh token not found","status":401}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let err = client.me().await.unwrap_err();
        assert_eq!(
            err,
            SyncError::RemoteService {
                status: 401,
                message: "Unauthorized".into()
            }
        );
        me.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn logout_forgets_cookies() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/logout")
            .with_status(200)
            .with_body(r#"{"message":"Logged out successfully"}"#)
            .create_async()
            .await;

        let mut cookies = SessionCookies::default();
        cookies.insert("access_token", "abc");
        let client = ApiClient::new(server.url()).unwrap().with_cookies(cookies);
        client.logout().await.unwrap();
        assert!(client.cookies().is_empty());
    }
}
