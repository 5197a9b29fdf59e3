//! Route Table
//!
//! Static mapping from URL paths to dashboard views:
//! - `/` - home (loaded eagerly)
//! - `/status` - package status listing
//! - `/stat` - aggregate statistics
//! - `/task` - task view
//! - `/log` - log view
//! - anything else - not found
//!
//! Every view except home is loaded lazily on first navigation and cached.
//! A failed load is reported to the caller and retried on the next visit.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::views::{HomeView, LogView, NotFoundView, StatView, StatusView, TaskView, View};

/// Pattern of the catch-all route, matches every path.
pub const CATCH_ALL: &str = "/:pathMatch(.*)*";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type ViewFuture = BoxFuture<'static, Result<Arc<dyn View>, BoxError>>;
type ViewLoader = Arc<dyn Fn() -> ViewFuture + Send + Sync>;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTableError {
    InvalidPath(String),
    DuplicatePath(String),
    DuplicateName(String),
    MissingCatchAll,
    CatchAllNotLast(String),
}

impl fmt::Display for RouteTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTableError::InvalidPath(path) => write!(f, "Invalid route path: {}", path),
            RouteTableError::DuplicatePath(path) => write!(f, "Duplicate route path: {}", path),
            RouteTableError::DuplicateName(name) => write!(f, "Duplicate route name: {}", name),
            RouteTableError::MissingCatchAll => write!(f, "Route table has no catch-all route"),
            RouteTableError::CatchAllNotLast(name) => {
                write!(f, "Catch-all route '{}' must be the last entry", name)
            }
        }
    }
}

impl std::error::Error for RouteTableError {}

/// A lazily registered view could not be loaded.
#[derive(Debug)]
pub struct ViewLoadError {
    pub route: String,
    pub source: BoxError,
}

impl fmt::Display for ViewLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to load view for route '{}': {}", self.route, self.source)
    }
}

impl std::error::Error for ViewLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

// ============================================================================
// Route Entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePath {
    Literal(String),
    CatchAll,
}

impl RoutePath {
    pub fn parse(path: &str) -> Result<Self, RouteTableError> {
        if path == CATCH_ALL {
            return Ok(RoutePath::CatchAll);
        }
        // Only literal segments are supported besides the catch-all matcher
        if !path.starts_with('/') || path.contains(':') || path.contains('*') {
            return Err(RouteTableError::InvalidPath(path.to_string()));
        }
        Ok(RoutePath::Literal(normalize_path(path).to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            RoutePath::Literal(path) => path,
            RoutePath::CatchAll => CATCH_ALL,
        }
    }
}

enum ViewSource {
    Eager(Arc<dyn View>),
    Lazy {
        loader: ViewLoader,
        slot: OnceCell<Arc<dyn View>>,
    },
}

pub struct RouteEntry {
    path: RoutePath,
    name: String,
    source: ViewSource,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("lazy", &self.is_lazy())
            .finish()
    }
}

impl RouteEntry {
    /// Entry whose view exists as soon as the table is built.
    pub fn eager(path: &str, name: &str, view: Arc<dyn View>) -> Result<Self, RouteTableError> {
        Ok(Self {
            path: RoutePath::parse(path)?,
            name: name.to_string(),
            source: ViewSource::Eager(view),
        })
    }

    /// Entry whose view is produced by `loader` on first navigation.
    pub fn lazy<F, Fut>(path: &str, name: &str, loader: F) -> Result<Self, RouteTableError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn View>, BoxError>> + Send + 'static,
    {
        let loader: ViewLoader = Arc::new(move || -> ViewFuture { Box::pin(loader()) });
        Ok(Self {
            path: RoutePath::parse(path)?,
            name: name.to_string(),
            source: ViewSource::Lazy {
                loader,
                slot: OnceCell::new(),
            },
        })
    }

    pub fn path(&self) -> &RoutePath {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.source, ViewSource::Lazy { .. })
    }

    pub fn is_catch_all(&self) -> bool {
        self.path == RoutePath::CatchAll
    }

    /// Whether the view is available without running a loader.
    pub fn is_loaded(&self) -> bool {
        match &self.source {
            ViewSource::Eager(_) => true,
            ViewSource::Lazy { slot, .. } => slot.initialized(),
        }
    }

    /// Return the view, running the loader if it has not succeeded yet.
    pub async fn load(&self) -> Result<Arc<dyn View>, ViewLoadError> {
        match &self.source {
            ViewSource::Eager(view) => Ok(Arc::clone(view)),
            ViewSource::Lazy { loader, slot } => {
                let view = slot
                    .get_or_try_init(|| async {
                        let view = loader().await?;
                        info!(route = self.name.as_str(), view = view.name(), "Loaded view");
                        Ok::<_, BoxError>(view)
                    })
                    .await
                    .map_err(|source| {
                        warn!(route = self.name.as_str(), error = %source, "View failed to load");
                        ViewLoadError {
                            route: self.name.clone(),
                            source,
                        }
                    })?;
                Ok(Arc::clone(view))
            }
        }
    }
}

// ============================================================================
// Route Table
// ============================================================================

#[derive(Debug)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Result<Self, RouteTableError> {
        validate(&entries)?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn by_name(&self, name: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// The catch-all entry.
    pub fn fallback(&self) -> &RouteEntry {
        // Construction guarantees the catch-all is the last entry
        &self.entries[self.entries.len() - 1]
    }

    /// Select the entry for `path`: the literal match if any, else the catch-all.
    pub fn resolve(&self, path: &str) -> &RouteEntry {
        let path = normalize_path(strip_query(path));
        self.entries
            .iter()
            .find(|e| matches!(&e.path, RoutePath::Literal(p) if p == path))
            .unwrap_or_else(|| self.fallback())
    }

    /// Resolve `path` and load its view.
    pub async fn navigate(&self, path: &str) -> Result<Arc<dyn View>, ViewLoadError> {
        self.resolve(path).load().await
    }
}

/// Paths and names are unique, the catch-all exists and comes last.
fn validate(entries: &[RouteEntry]) -> Result<(), RouteTableError> {
    let mut paths = HashSet::new();
    let mut names = HashSet::new();

    for (i, entry) in entries.iter().enumerate() {
        if !paths.insert(entry.path.as_str()) {
            return Err(RouteTableError::DuplicatePath(entry.path.as_str().to_string()));
        }
        if !names.insert(entry.name.as_str()) {
            return Err(RouteTableError::DuplicateName(entry.name.clone()));
        }
        if entry.is_catch_all() && i + 1 != entries.len() {
            return Err(RouteTableError::CatchAllNotLast(entry.name.clone()));
        }
    }

    match entries.last() {
        Some(last) if last.is_catch_all() => Ok(()),
        _ => Err(RouteTableError::MissingCatchAll),
    }
}

/// Drop the query string and fragment.
fn strip_query(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Empty paths become `/`, a single trailing slash is ignored.
fn normalize_path(path: &str) -> &str {
    if path.is_empty() {
        return "/";
    }
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

fn lazy_view<V>(view: V) -> impl Fn() -> futures::future::Ready<Result<Arc<dyn View>, BoxError>>
where
    V: View + Copy + 'static,
{
    move || futures::future::ready(Ok(Arc::new(view) as Arc<dyn View>))
}

/// The dashboard's route table.
pub fn default_table() -> Result<RouteTable, RouteTableError> {
    RouteTable::new(vec![
        RouteEntry::eager("/", "home", Arc::new(HomeView))?,
        RouteEntry::lazy("/status", "status", lazy_view(StatusView))?,
        RouteEntry::lazy("/stat", "stat", lazy_view(StatView))?,
        RouteEntry::lazy("/task", "task", lazy_view(TaskView))?,
        RouteEntry::lazy("/log", "log", lazy_view(LogView))?,
        RouteEntry::lazy(CATCH_ALL, "NotFound", lazy_view(NotFoundView))?,
    ])
}
