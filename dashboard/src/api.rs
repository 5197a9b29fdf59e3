//! Package API Handlers
//!
//! JSON endpoints the dashboard pages read from:
//! - `GET /packages/status` - List all packages
//! - `GET /packages/table` - Results table with highlight classes applied
//! - `GET /packages/{name}` - Get a single package
//! - `POST /packages` - Create a package
//! - `PUT /packages/{name}` - Update versions, repo or build status
//! - `POST /packages/{name}/status` - Set the build status
//! - `DELETE /packages/{name}` - Delete a package
//! - `GET /lastupdate` - Time of the last repository import

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use crate::database::DatabaseError;
use crate::dom::Table;
use crate::highlight::highlight_table;
use crate::models::{
    results_table, BuildStatusRequest, LastUpdate, NewPackage, Package, PackageUpdate,
};
use crate::web::AppState;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Map a database failure onto an HTTP response, logging server-side faults.
fn database_error(err: DatabaseError) -> Response {
    match err {
        DatabaseError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "no package found."),
        DatabaseError::Conflict(msg) => error_response(StatusCode::CONFLICT, msg),
        err => {
            error!("Database failure: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn list_packages(State(state): State<AppState>) -> Response {
    match state.db.list_packages().await {
        Ok(rows) => {
            let packages: Vec<Package> = rows.into_iter().map(Package::from).collect();
            Json(packages).into_response()
        }
        Err(e) => database_error(e),
    }
}

async fn packages_table(State(state): State<AppState>) -> Response {
    let packages: Vec<Package> = match state.db.list_packages().await {
        Ok(rows) => rows.into_iter().map(Package::from).collect(),
        Err(e) => return database_error(e),
    };

    let mut table: Table = results_table(&packages);
    highlight_table(&mut table);
    Json(table).into_response()
}

async fn get_package(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.db.get_package(&name).await {
        Ok(row) => Json(Package::from(row)).into_response(),
        Err(e) => database_error(e),
    }
}

async fn create_package(
    State(state): State<AppState>,
    Json(req): Json<NewPackage>,
) -> Response {
    if req.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "package name cannot be empty");
    }

    match state.db.create_package(&req).await {
        Ok(()) => {
            info!(package = req.name.as_str(), "Package created");
            (StatusCode::CREATED, Json(json!({ "name": req.name }))).into_response()
        }
        Err(e) => database_error(e),
    }
}

async fn update_package(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<PackageUpdate>,
) -> Response {
    match state.db.update_package(&name, &req).await {
        Ok(()) => {
            info!(package = name.as_str(), "Package updated");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => database_error(e),
    }
}

async fn set_build_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BuildStatusRequest>,
) -> Response {
    match state.db.set_build_status(&name, &req.build_status).await {
        Ok(()) => {
            info!(
                package = name.as_str(),
                build_status = req.build_status.as_str(),
                "Build status updated"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => database_error(e),
    }
}

async fn delete_package(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.db.delete_package(&name).await {
        Ok(()) => {
            info!(package = name.as_str(), "Package deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => database_error(e),
    }
}

async fn last_update(State(state): State<AppState>) -> Response {
    match state.db.last_update().await {
        Ok(last_update) => Json(LastUpdate { last_update }).into_response(),
        Err(e) => database_error(e),
    }
}

/// Build the package API routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/packages", post(create_package))
        .route("/packages/status", get(list_packages))
        .route("/packages/table", get(packages_table))
        .route(
            "/packages/{name}",
            get(get_package).put(update_package).delete(delete_package),
        )
        .route("/packages/{name}/status", post(set_build_status))
        .route("/lastupdate", get(last_update))
}
