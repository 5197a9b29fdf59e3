mod api;
mod config;
mod database;
pub mod dom;
pub mod highlight;
mod models;
pub mod routes;
pub mod sync;
pub mod views;
mod web;

pub use config::Config;
pub use database::{Database, DatabaseError, ImportBatch, ImportOutcome, VersionColumn};
pub use models::{results_table, NewPackage, Package, PackageUpdate, RepoPackage};
pub use routes::{default_table, RouteTable};
pub use web::{app, serve, AppState};
