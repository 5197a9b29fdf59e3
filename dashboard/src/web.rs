//! Web Server
//!
//! Assembles the HTTP application:
//! - `/api/*` - package API (see [`crate::api`])
//! - `/health` - liveness probe
//! - everything else - dashboard pages, dispatched through the route table

use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::database::Database;
use crate::routes::{default_table, RouteTable};
use crate::views::RenderContext;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub routes: Arc<RouteTable>,
    pub base_url: Arc<str>,
}

impl AppState {
    pub fn new(db: Database, routes: RouteTable, config: &Config) -> Self {
        Self {
            db,
            routes: Arc::new(routes),
            base_url: Arc::from(config.base_url.as_str()),
        }
    }
}

/// Path relative to the mount point, `None` when outside of it.
fn strip_base<'a>(path: &'a str, base_url: &str) -> Option<&'a str> {
    let prefix = base_url.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    match path.strip_prefix(prefix) {
        Some("") => Some("/"),
        Some(rest) if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

/// Render the view the route table selects for the request path.
async fn page(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let entry = match strip_base(uri.path(), &state.base_url) {
        Some(path) => state.routes.resolve(path),
        None => state.routes.fallback(),
    };

    let view = match entry.load().await {
        Ok(view) => view,
        Err(e) => {
            error!("{}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let ctx = RenderContext::new(&*state.base_url, uri.path());
    match view.render(&ctx) {
        Ok(html) => {
            let status = if entry.is_catch_all() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };
            (status, Html(html)).into_response()
        }
        Err(err) => {
            error!(view = view.name(), "Template error: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Template error: {}", err),
            )
                .into_response()
        }
    }
}

/// Build the full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", crate::api::routes())
        .route("/health", get(|| async { "OK" }))
        .fallback(page)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the database, bind and serve until Ctrl-C.
pub async fn serve(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        database = config.database_url.as_str(),
        bind_address = config.bind_address.as_str(),
        base_url = config.base_url.as_str(),
        "Starting status dashboard"
    );

    let db = Database::new(&config.database_url).await?;
    let state = AppState::new(db, default_table()?, config);
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(signal())
        .await?;

    Ok(())
}

async fn signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, terminating...");
}
