use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dashboard::dom::{Document, Row, Table};
use dashboard::highlight::{highlight_document, HighlightError, TABLE_ID};
use dashboard::routes::{default_table, RouteTableError, ViewLoadError};
use dashboard::sync::{sync_mirrors, ImportReport, MirrorRoots, SyncError};
use dashboard::views::{RenderContext, ViewError};
use dashboard::{Config, Database, DatabaseError};
use serde::Deserialize;
use tracing::info;

use crate::logging;

#[derive(Debug)]
pub enum CliError {
    Io(std::io::Error),
    InvalidInput(String),
    Routes(RouteTableError),
    ViewLoad(ViewLoadError),
    View(ViewError),
    Highlight(HighlightError),
    Database(DatabaseError),
    Sync(SyncError),
    Server(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CliError::Routes(err) => write!(f, "{}", err),
            CliError::ViewLoad(err) => write!(f, "{}", err),
            CliError::View(err) => write!(f, "{}", err),
            CliError::Highlight(err) => write!(f, "{}", err),
            CliError::Database(err) => write!(f, "{}", err),
            CliError::Sync(err) => write!(f, "{}", err),
            CliError::Server(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<RouteTableError> for CliError {
    fn from(err: RouteTableError) -> Self {
        CliError::Routes(err)
    }
}

impl From<ViewLoadError> for CliError {
    fn from(err: ViewLoadError) -> Self {
        CliError::ViewLoad(err)
    }
}

impl From<ViewError> for CliError {
    fn from(err: ViewError) -> Self {
        CliError::View(err)
    }
}

impl From<HighlightError> for CliError {
    fn from(err: HighlightError) -> Self {
        CliError::Highlight(err)
    }
}

impl From<DatabaseError> for CliError {
    fn from(err: DatabaseError) -> Self {
        CliError::Database(err)
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        CliError::Sync(err)
    }
}

#[derive(Debug, Parser)]
#[command(name = "loong-status", version)]
#[command(about = "LoongArch package status dashboard")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub async fn handle() -> Result<(), CliError> {
        let cli = Cli::parse();
        let config = Config::init().clone();
        let _guard = logging::init(config.log_dir.as_deref());

        match cli.command {
            Commands::Serve(cmd) => cmd.execute(config).await,
            Commands::Route(cmd) => cmd.execute(&config).await,
            Commands::Highlight(cmd) => cmd.execute(),
            Commands::Import(cmd) => cmd.execute(config).await,
            Commands::Sync(cmd) => cmd.execute(config).await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the dashboard web server
    Serve(Serve),
    /// Show which view the dashboard mounts for a path
    Route(Route),
    /// Apply result highlights to a table read as JSON
    Highlight(Highlight),
    /// Record package versions from a repository database
    Import(Import),
    /// Import every changed repository database from local mirrors
    Sync(SyncMirrors),
}

#[derive(Debug, Parser)]
struct Serve {
    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// SQLite database url
    #[arg(short, long)]
    database_url: Option<String>,

    /// Prefix the dashboard is mounted under
    #[arg(long)]
    base_url: Option<String>,
}

impl Serve {
    /// Layer the command line flags over `config`.
    fn apply(self, mut config: Config) -> Config {
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(url) = self.database_url {
            config.database_url = url;
        }
        if let Some(base_url) = self.base_url {
            config = config.with_base_url(&base_url);
        }
        config
    }

    async fn execute(self, config: Config) -> Result<(), CliError> {
        let config = self.apply(config);
        dashboard::serve(&config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))
    }
}

#[derive(Debug, Parser)]
struct Route {
    /// Paths to resolve, query strings are ignored
    #[arg(required = true)]
    paths: Vec<String>,

    /// Print the rendered page instead of the route name
    #[arg(short, long)]
    render: bool,
}

impl Route {
    async fn execute(&self, config: &Config) -> Result<(), CliError> {
        let table = default_table()?;

        for path in &self.paths {
            let entry = table.resolve(path);
            if self.render {
                let view = table.navigate(path).await?;
                let ctx = RenderContext::new(config.base_url.as_str(), path.as_str());
                println!("{}", view.render(&ctx)?);
            } else {
                let kind = if entry.is_lazy() { "lazy" } else { "eager" };
                println!("{}\t{}\t{}\t{}", path, entry.path().as_str(), entry.name(), kind);
            }
        }
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Summary,
}

#[derive(Debug, Parser)]
struct Highlight {
    /// JSON file holding a document, a table or a list of rows (`-` for stdin)
    input: PathBuf,

    /// Id of the table to annotate
    #[arg(short, long, default_value = TABLE_ID)]
    table_id: String,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

/// Accepted shapes of the highlight input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HighlightInput {
    Document(Document),
    Table(Table),
    Rows(Vec<Vec<String>>),
}

impl HighlightInput {
    fn into_document(self, table_id: &str) -> Document {
        match self {
            HighlightInput::Document(doc) => doc,
            HighlightInput::Table(table) => Document::new().with_table(table),
            HighlightInput::Rows(rows) => {
                let mut table = Table::new(table_id);
                for cells in rows {
                    table.push_row(Row::from_texts(cells));
                }
                Document::new().with_table(table)
            }
        }
    }
}

impl Highlight {
    fn read_input(&self) -> Result<String, CliError> {
        if self.input.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        } else {
            Ok(std::fs::read_to_string(&self.input)?)
        }
    }

    fn execute(&self) -> Result<(), CliError> {
        let output = run_highlight(&self.read_input()?, &self.table_id, self.format)?;
        println!("{}", output);
        Ok(())
    }
}

/// Highlight the table in `input` and format the result.
fn run_highlight(input: &str, table_id: &str, format: OutputFormat) -> Result<String, CliError> {
    let parsed: HighlightInput =
        serde_json::from_str(input).map_err(|e| CliError::InvalidInput(e.to_string()))?;
    let mut doc = parsed.into_document(table_id);
    let summary = highlight_document(&mut doc, table_id)?;

    info!(
        table = table_id,
        matched = summary.matched,
        failed = summary.failed,
        "Highlighted results table"
    );

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&doc),
        OutputFormat::Summary => serde_json::to_string_pretty(&summary),
    };
    rendered.map_err(|e| CliError::InvalidInput(e.to_string()))
}

#[derive(Debug, Parser)]
struct Import {
    /// Architecture of the repository: x86_64 or loong64
    #[arg(short, long)]
    arch: String,

    /// Repository name, e.g. core, extra-testing, core-staging
    #[arg(short, long)]
    repo: String,

    /// SQLite database url
    #[arg(short, long)]
    database_url: Option<String>,

    /// `<repo>.db` archive or the directory it was extracted to
    source: PathBuf,
}

impl Import {
    async fn execute(self, config: Config) -> Result<(), CliError> {
        let database_url = self.database_url.unwrap_or(config.database_url);
        let db = Database::new(&database_url).await?;
        let report = dashboard::sync::import(&db, &self.arch, &self.repo, &self.source).await?;

        print_report(&report);
        Ok(())
    }
}

#[derive(Debug, Parser)]
struct SyncMirrors {
    /// x86_64 mirror root holding `<repo>.db` files
    #[arg(long)]
    x86: Option<PathBuf>,

    /// loong64 mirror root holding `<repo>/os/loong64/<repo>.db` files
    #[arg(long)]
    loong: Option<PathBuf>,

    /// SQLite database url
    #[arg(short, long)]
    database_url: Option<String>,
}

impl SyncMirrors {
    /// Flags win over the configured mirror roots.
    fn roots(&self, config: &Config) -> Result<MirrorRoots, CliError> {
        let roots = MirrorRoots {
            x86_64: self.x86.clone().or_else(|| config.x86_mirror.as_ref().map(PathBuf::from)),
            loong64: self
                .loong
                .clone()
                .or_else(|| config.loong_mirror.as_ref().map(PathBuf::from)),
        };
        if roots.x86_64.is_none() && roots.loong64.is_none() {
            return Err(CliError::InvalidInput(
                "no mirror root given, use --x86/--loong or X86_MIRROR/LOONG_MIRROR".to_string(),
            ));
        }
        Ok(roots)
    }

    async fn execute(self, config: Config) -> Result<(), CliError> {
        let roots = self.roots(&config)?;
        let database_url = self.database_url.unwrap_or(config.database_url);
        let db = Database::new(&database_url).await?;
        let report = sync_mirrors(&db, &roots).await?;

        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &ImportReport) {
    for repo in &report.imported {
        println!(
            "{}: {} packages into {}/{} ({} cleared)",
            repo.source.display(),
            repo.packages,
            repo.repo,
            repo.column,
            repo.cleared
        );
    }
    for path in &report.skipped {
        println!("{}: unchanged", path.display());
    }
    println!("{} packages pruned", report.pruned);
}
