//! Database Infrastructure Layer
//!
//! Handles database connection, schema initialization, and provides
//! data transfer objects (DTOs) for mapping between database rows and domain models.
//!
//! This layer is responsible ONLY for database concerns - no business logic.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use crate::models::{NewPackage, PackageUpdate, RepoPackage};

// Four bound parameters per row keeps a batch under sqlite's 999 variable limit
const UPSERT_BATCH: usize = 200;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum DatabaseError {
    Connection(sqlx::Error),
    Query(sqlx::Error),
    NotFound(String),
    Conflict(String),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::Connection(err) => write!(f, "Database connection error: {}", err),
            DatabaseError::Query(err) => write!(f, "Database query error: {}", err),
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::Conflict(msg) => write!(f, "Already exists: {}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Connection(err) | DatabaseError::Query(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err)
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

// ============================================================================
// Version Columns
// ============================================================================

/// One (architecture, repository stage) version column of `packages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionColumn {
    X86,
    X86Testing,
    X86Staging,
    Loong,
    LoongTesting,
    LoongStaging,
}

impl VersionColumn {
    pub const ALL: [VersionColumn; 6] = [
        VersionColumn::X86,
        VersionColumn::X86Testing,
        VersionColumn::X86Staging,
        VersionColumn::Loong,
        VersionColumn::LoongTesting,
        VersionColumn::LoongStaging,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionColumn::X86 => "x86_version",
            VersionColumn::X86Testing => "x86_testing_version",
            VersionColumn::X86Staging => "x86_staging_version",
            VersionColumn::Loong => "loong_version",
            VersionColumn::LoongTesting => "loong_testing_version",
            VersionColumn::LoongStaging => "loong_staging_version",
        }
    }
}

impl std::fmt::Display for VersionColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Versions read from one repository database, bound for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBatch {
    pub column: VersionColumn,
    pub repo: String,
    pub packages: Vec<RepoPackage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Versions cleared per batch, in batch order
    pub cleared: Vec<u64>,
    pub pruned: u64,
}

// DTO for reading packages
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PackageRow {
    pub(crate) name: String,
    pub(crate) base: Option<String>,
    pub(crate) repo: Option<String>,
    pub(crate) x86_version: Option<String>,
    pub(crate) x86_testing_version: Option<String>,
    pub(crate) x86_staging_version: Option<String>,
    pub(crate) loong_version: Option<String>,
    pub(crate) loong_testing_version: Option<String>,
    pub(crate) loong_staging_version: Option<String>,
    pub(crate) build_status: Option<String>,
}

const PACKAGE_COLUMNS: &str = "name, base, repo, x86_version, x86_testing_version, \
    x86_staging_version, loong_version, loong_testing_version, loong_staging_version, \
    build_status";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let database_config = SqliteConnectOptions::from_str(database_url)
            .map_err(DatabaseError::Connection)?
            .create_if_missing(true);

        // An in-memory database lives as long as its connection, so keep exactly one
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(database_config);

        let db = Self { pool };
        db.initialize_tables().await?;

        info!("Database initialized at {}", database_url);
        Ok(db)
    }

    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS packages (
                name TEXT PRIMARY KEY,
                base TEXT,
                repo TEXT,
                x86_version TEXT,
                x86_testing_version TEXT,
                x86_staging_version TEXT,
                loong_version TEXT,
                loong_testing_version TEXT,
                loong_staging_version TEXT,
                build_status TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS last_update (
                last_update TEXT PRIMARY KEY
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_packages_repo_name ON packages(repo, name)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_packages(&self) -> Result<Vec<PackageRow>> {
        let rows = sqlx::query_as::<_, PackageRow>(&format!(
            "SELECT {} FROM packages ORDER BY repo, name",
            PACKAGE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_package(&self, name: &str) -> Result<PackageRow> {
        sqlx::query_as::<_, PackageRow>(&format!(
            "SELECT {} FROM packages WHERE name = ?",
            PACKAGE_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("package '{}'", name)))
    }

    pub async fn create_package(&self, package: &NewPackage) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO packages (name, base, repo, x86_version, loong_version, build_status)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&package.name)
        .bind(package.base.as_deref().unwrap_or(&package.name))
        .bind(&package.repo)
        .bind(&package.x86_version)
        .bind(&package.loong_version)
        .bind(&package.build_status)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Err(
                DatabaseError::Conflict(format!("package '{}'", package.name)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Overwrite the fields present in `update`, leave the rest untouched.
    pub async fn update_package(&self, name: &str, update: &PackageUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE packages SET
                repo = COALESCE(?, repo),
                x86_version = COALESCE(?, x86_version),
                loong_version = COALESCE(?, loong_version),
                build_status = COALESCE(?, build_status)
             WHERE name = ?",
        )
        .bind(&update.repo)
        .bind(&update.x86_version)
        .bind(&update.loong_version)
        .bind(&update.build_status)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("package '{}'", name)));
        }
        Ok(())
    }

    pub async fn set_build_status(&self, name: &str, build_status: &str) -> Result<()> {
        let result = sqlx::query("UPDATE packages SET build_status = ? WHERE name = ?")
            .bind(build_status)
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("package '{}'", name)));
        }
        Ok(())
    }

    pub async fn delete_package(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM packages WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("package '{}'", name)));
        }
        Ok(())
    }

    /// Time of the last import, as stored.
    pub async fn last_update(&self) -> Result<Option<String>> {
        let last_update = sqlx::query_scalar("SELECT last_update FROM last_update LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(last_update)
    }

    /// Time of the last import. A value that cannot be parsed counts as never imported.
    pub async fn last_update_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.last_update().await? else {
            return Ok(None);
        };
        let parsed = parse_last_update(&raw);
        if parsed.is_none() {
            warn!(value = raw.as_str(), "Unreadable last update time");
        }
        Ok(parsed)
    }

    /// Apply every batch, prune packages left without versions and record `at`
    /// as the last update. Either all of it lands or none of it does.
    pub async fn apply_import(
        &self,
        batches: &[ImportBatch],
        at: DateTime<Utc>,
    ) -> Result<ImportOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut cleared = Vec::with_capacity(batches.len());

        for batch in batches {
            cleared.push(clear_missing(&mut *tx, batch.column, &batch.repo, &batch.packages).await?);
            upsert_versions(&mut *tx, batch.column, &batch.repo, &batch.packages).await?;
        }
        let pruned = prune_empty(&mut *tx).await?;
        write_last_update(&mut *tx, at).await?;

        tx.commit().await?;
        Ok(ImportOutcome { cleared, pruned })
    }
}

/// Stored as RFC 3339. Rows written as `%Y-%m-%d %H:%M:%S%.f UTC` are read too.
fn parse_last_update(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f UTC")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Null out `column` for packages of `repo` that are missing from `packages`.
async fn clear_missing(
    conn: &mut SqliteConnection,
    column: VersionColumn,
    repo: &str,
    packages: &[RepoPackage],
) -> Result<u64> {
    let known: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT name FROM packages WHERE repo = ? AND {} IS NOT NULL",
        column
    ))
    .bind(repo)
    .fetch_all(&mut *conn)
    .await?;

    let present: HashSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    let missing: Vec<&str> = known
        .iter()
        .map(String::as_str)
        .filter(|name| !present.contains(name))
        .collect();

    let mut cleared = 0;
    for chunk in missing.chunks(UPSERT_BATCH) {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE packages SET {} = NULL WHERE name IN (", column));
        let mut names = query.separated(", ");
        for name in chunk {
            names.push_bind(*name);
        }
        query.push(")");
        cleared += query.build().execute(&mut *conn).await?.rows_affected();
    }

    debug!(column = column.as_str(), repo, cleared, "Cleared missing package versions");
    Ok(cleared)
}

/// Insert new packages, or set `column` on the ones already known.
async fn upsert_versions(
    conn: &mut SqliteConnection,
    column: VersionColumn,
    repo: &str,
    packages: &[RepoPackage],
) -> Result<u64> {
    let mut affected = 0;

    for chunk in packages.chunks(UPSERT_BATCH) {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("INSERT INTO packages (name, base, repo, {}) ", column));
        query.push_values(chunk, |mut row, package| {
            row.push_bind(package.name.as_str())
                .push_bind(package.base.as_str())
                .push_bind(repo)
                .push_bind(package.version.as_str());
        });
        query.push(format!(
            " ON CONFLICT(name) DO UPDATE SET {0} = excluded.{0}",
            column
        ));

        affected += query.build().execute(&mut *conn).await?.rows_affected();
    }

    debug!(column = column.as_str(), repo, affected, "Upserted package versions");
    Ok(affected)
}

/// Delete packages that no longer have a version in any repository.
async fn prune_empty(conn: &mut SqliteConnection) -> Result<u64> {
    let condition = VersionColumn::ALL
        .iter()
        .map(|c| format!("{} IS NULL", c))
        .collect::<Vec<_>>()
        .join(" AND ");

    let result = sqlx::query(&format!("DELETE FROM packages WHERE {}", condition))
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn write_last_update(conn: &mut SqliteConnection, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("DELETE FROM last_update").execute(&mut *conn).await?;
    sqlx::query("INSERT INTO last_update (last_update) VALUES (?)")
        .bind(at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
    Ok(())
}
