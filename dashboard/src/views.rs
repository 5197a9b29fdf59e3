//! Dashboard Views
//!
//! Every route of the dashboard resolves to a [`View`]. Views render static
//! page shells only; package data is requested by the page itself from the
//! JSON API once mounted.

use std::fmt;

use askama::Template;

/// Per-request values a view may need while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub base_url: String,
    pub path: String,
}

impl RenderContext {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new("/", "/")
    }
}

#[derive(Debug)]
pub enum ViewError {
    Template(askama::Error),
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::Template(err) => write!(f, "Template error: {}", err),
        }
    }
}

impl std::error::Error for ViewError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewError::Template(err) => Some(err),
        }
    }
}

impl From<askama::Error> for ViewError {
    fn from(err: askama::Error) -> Self {
        ViewError::Template(err)
    }
}

/// Something the router can mount for a path.
pub trait View: Send + Sync {
    fn name(&self) -> &'static str;
    fn title(&self) -> &'static str;
    fn render(&self, ctx: &RenderContext) -> Result<String, ViewError>;
}

impl fmt::Debug for dyn View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").field("name", &self.name()).finish()
    }
}

// ============================================================================
// Templates
// ============================================================================

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate<'a> {
    title: &'a str,
    base_url: &'a str,
}

#[derive(Template)]
#[template(path = "status.html")]
struct StatusTemplate<'a> {
    title: &'a str,
    base_url: &'a str,
    table_id: &'a str,
}

#[derive(Template)]
#[template(path = "stat.html")]
struct StatTemplate<'a> {
    title: &'a str,
    base_url: &'a str,
}

#[derive(Template)]
#[template(path = "task.html")]
struct TaskTemplate<'a> {
    title: &'a str,
    base_url: &'a str,
}

#[derive(Template)]
#[template(path = "log.html")]
struct LogTemplate<'a> {
    title: &'a str,
    base_url: &'a str,
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate<'a> {
    title: &'a str,
    base_url: &'a str,
    path: &'a str,
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct HomeView;

impl View for HomeView {
    fn name(&self) -> &'static str {
        "home"
    }

    fn title(&self) -> &'static str {
        "LoongArch Arch Linux Status"
    }

    fn render(&self, ctx: &RenderContext) -> Result<String, ViewError> {
        Ok(HomeTemplate {
            title: self.title(),
            base_url: &ctx.base_url,
        }
        .render()?)
    }
}

/// Package listing; hosts the results table the highlighter annotates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusView;

impl View for StatusView {
    fn name(&self) -> &'static str {
        "status"
    }

    fn title(&self) -> &'static str {
        "Package Status"
    }

    fn render(&self, ctx: &RenderContext) -> Result<String, ViewError> {
        Ok(StatusTemplate {
            title: self.title(),
            base_url: &ctx.base_url,
            table_id: crate::highlight::TABLE_ID,
        }
        .render()?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatView;

impl View for StatView {
    fn name(&self) -> &'static str {
        "stat"
    }

    fn title(&self) -> &'static str {
        "Statistics"
    }

    fn render(&self, ctx: &RenderContext) -> Result<String, ViewError> {
        Ok(StatTemplate {
            title: self.title(),
            base_url: &ctx.base_url,
        }
        .render()?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskView;

impl View for TaskView {
    fn name(&self) -> &'static str {
        "task"
    }

    fn title(&self) -> &'static str {
        "Tasks"
    }

    fn render(&self, ctx: &RenderContext) -> Result<String, ViewError> {
        Ok(TaskTemplate {
            title: self.title(),
            base_url: &ctx.base_url,
        }
        .render()?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogView;

impl View for LogView {
    fn name(&self) -> &'static str {
        "log"
    }

    fn title(&self) -> &'static str {
        "Build Logs"
    }

    fn render(&self, ctx: &RenderContext) -> Result<String, ViewError> {
        Ok(LogTemplate {
            title: self.title(),
            base_url: &ctx.base_url,
        }
        .render()?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundView;

impl View for NotFoundView {
    fn name(&self) -> &'static str {
        "NotFound"
    }

    fn title(&self) -> &'static str {
        "Page Not Found"
    }

    fn render(&self, ctx: &RenderContext) -> Result<String, ViewError> {
        Ok(NotFoundTemplate {
            title: self.title(),
            base_url: &ctx.base_url,
            path: &ctx.path,
        }
        .render()?)
    }
}
