//! HTTP server wiring: shared state, router, and lifecycle.

use axum::http::{HeaderValue, Method, header};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{auth, tasks};
use crate::auth::TokenKeys;
use crate::config::Config;
use crate::db::Database;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    keys: Arc<TokenKeys>,
    secure_cookies: bool,
}

impl AppState {
    pub fn new(db: Arc<Database>, keys: Arc<TokenKeys>, secure_cookies: bool) -> Self {
        Self {
            db,
            keys,
            secure_cookies,
        }
    }

    /// Build state from configuration and an opened database.
    pub fn from_config(config: &Config, db: Arc<Database>) -> Self {
        Self::new(
            db,
            Arc::new(TokenKeys::from_config(&config.auth)),
            config.auth.secure_cookies,
        )
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(serde::Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Hello World!",
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!("Invalid CORS origin {:?}; cross-origin requests disabled", origin);
            layer
        }
    }
}

/// Build the router with all routes.
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me))
        // Tasks
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/{id}/toggle", post(tasks::toggle_task))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle for a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for clients, e.g. `http://127.0.0.1:8080`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }

    /// Wait until the server stops on its own.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

/// Bind and start serving in a background task.
pub async fn start_server(
    state: AppState,
    bind_addr: &str,
    cors_origin: &str,
) -> anyhow::Result<ServerHandle> {
    let app = build_router(state, cors_origin);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            })
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        join,
    })
}
