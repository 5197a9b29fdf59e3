//! Repository database import
//!
//! Reads pacman repository databases (`<repo>.db` archives, or directories
//! they were extracted to) and records each package's version under the
//! matching architecture/stage column. Only local sources are handled: a
//! single database, or a sweep over local mirror roots that skips databases
//! unchanged since the last import.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::database::{Database, DatabaseError, ImportBatch, VersionColumn};
use crate::models::RepoPackage;

#[derive(Debug)]
pub enum SyncError {
    UnknownArch(String),
    UnknownRepo(String),
    Extract(String),
    InvalidDesc(PathBuf),
    Io(std::io::Error),
    Database(DatabaseError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::UnknownArch(arch) => write!(f, "Unsupported architecture: {}", arch),
            SyncError::UnknownRepo(repo) => write!(f, "Unknown repository: {}", repo),
            SyncError::Extract(msg) => write!(f, "Failed to extract database: {}", msg),
            SyncError::InvalidDesc(path) => write!(f, "No %NAME% in {}", path.display()),
            SyncError::Io(err) => write!(f, "IO error: {}", err),
            SyncError::Database(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io(err) => Some(err),
            SyncError::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err)
    }
}

impl From<DatabaseError> for SyncError {
    fn from(err: DatabaseError) -> Self {
        SyncError::Database(err)
    }
}

/// Column holding `repo`'s versions for `arch`.
pub fn version_column(arch: &str, repo: &str) -> Result<VersionColumn, SyncError> {
    let loong = match arch {
        "x86_64" => false,
        "loong64" => true,
        other => return Err(SyncError::UnknownArch(other.to_string())),
    };

    let column = match (repo, loong) {
        ("core" | "extra", false) => VersionColumn::X86,
        ("core-testing" | "extra-testing", false) => VersionColumn::X86Testing,
        ("core-staging" | "extra-staging", false) => VersionColumn::X86Staging,
        ("core" | "extra", true) => VersionColumn::Loong,
        ("core-testing" | "extra-testing", true) => VersionColumn::LoongTesting,
        ("core-staging" | "extra-staging", true) => VersionColumn::LoongStaging,
        (other, _) => return Err(SyncError::UnknownRepo(other.to_string())),
    };
    Ok(column)
}

/// Stage repositories are folded into the repository they feed.
pub fn real_repo(repo: &str) -> &str {
    repo.strip_suffix("-testing")
        .or_else(|| repo.strip_suffix("-staging"))
        .unwrap_or(repo)
}

/// Parse the `%NAME%`, `%BASE%` and `%VERSION%` sections of a `desc` file.
pub fn parse_desc(text: &str) -> Option<RepoPackage> {
    let mut package = RepoPackage::default();
    let mut section = "";

    for line in text.lines() {
        let line = line.trim_end();
        if line.len() > 1 && line.starts_with('%') && line.ends_with('%') {
            section = line;
            continue;
        }
        if line.is_empty() {
            continue;
        }
        match section {
            "%NAME%" => package.name = line.to_string(),
            "%BASE%" => package.base = line.to_string(),
            "%VERSION%" => package.version = line.to_string(),
            _ => {}
        }
    }

    if package.name.is_empty() {
        return None;
    }
    if package.base.is_empty() {
        package.base = package.name.clone();
    }
    Some(package)
}

/// Read every `<entry>/desc` below an extracted database directory.
pub async fn read_db_dir(dir: &Path) -> Result<Vec<RepoPackage>, SyncError> {
    let mut packages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let desc = entry.path().join("desc");
        let text = match tokio::fs::read_to_string(&desc).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %entry.path().display(), "Database entry without desc file");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        packages.push(parse_desc(&text).ok_or(SyncError::InvalidDesc(desc))?);
    }

    packages.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(packages)
}

/// Unpack a `.db` archive with `tar` into a fresh temporary directory.
pub async fn extract_db(file: &Path) -> Result<tempfile::TempDir, SyncError> {
    let dir = tempfile::tempdir()?;
    let output = Command::new("tar")
        .arg("xf")
        .arg(file)
        .arg("-C")
        .arg(dir.path())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SyncError::Extract(format!(
            "{}: {}",
            file.display(),
            stderr.trim()
        )));
    }
    Ok(dir)
}

/// Read packages from either an extracted directory or a `.db` archive.
pub async fn read_source(source: &Path) -> Result<Vec<RepoPackage>, SyncError> {
    if tokio::fs::metadata(source).await?.is_dir() {
        return read_db_dir(source).await;
    }
    let extracted = extract_db(source).await?;
    read_db_dir(extracted.path()).await
}

/// Repositories a mirror carries, in sweep order.
pub const REPOS: [&str; 6] = [
    "core",
    "extra",
    "core-testing",
    "extra-testing",
    "core-staging",
    "extra-staging",
];

/// Local mirror roots, one per architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorRoots {
    pub x86_64: Option<PathBuf>,
    pub loong64: Option<PathBuf>,
}

impl MirrorRoots {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &Path)> + '_ {
        [("x86_64", self.x86_64.as_deref()), ("loong64", self.loong64.as_deref())]
            .into_iter()
            .filter_map(|(arch, root)| root.map(|root| (arch, root)))
    }
}

/// Where a mirror of `arch` keeps `repo`'s database.
///
/// x86_64 mirrors are flat (`<root>/<repo>.db`), loong64 mirrors follow the
/// pacman layout (`<root>/<repo>/os/loong64/<repo>.db`).
pub fn mirror_db_path(root: &Path, arch: &str, repo: &str) -> Result<PathBuf, SyncError> {
    let file = format!("{}.db", repo);
    match arch {
        "x86_64" => Ok(root.join(file)),
        "loong64" => Ok(root.join(repo).join("os").join(arch).join(file)),
        other => Err(SyncError::UnknownArch(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoReport {
    pub source: PathBuf,
    pub column: &'static str,
    pub repo: String,
    pub packages: usize,
    pub cleared: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: Vec<RepoReport>,
    /// Databases left alone because they did not change since the last import
    pub skipped: Vec<PathBuf>,
    pub pruned: u64,
}

async fn read_batch(arch: &str, repo: &str, source: &Path) -> Result<ImportBatch, SyncError> {
    let column = version_column(arch, repo)?;
    let packages = read_source(source).await?;
    Ok(ImportBatch {
        column,
        repo: real_repo(repo).to_string(),
        packages,
    })
}

/// Write the batches in one transaction and describe what happened.
async fn commit(
    db: &Database,
    pending: Vec<(PathBuf, ImportBatch)>,
    skipped: Vec<PathBuf>,
) -> Result<ImportReport, SyncError> {
    let (sources, batches): (Vec<PathBuf>, Vec<ImportBatch>) = pending.into_iter().unzip();
    let outcome = db.apply_import(&batches, Utc::now()).await?;

    let imported: Vec<RepoReport> = sources
        .into_iter()
        .zip(&batches)
        .zip(outcome.cleared)
        .map(|((source, batch), cleared)| {
            info!(
                source = %source.display(),
                column = batch.column.as_str(),
                repo = batch.repo.as_str(),
                packages = batch.packages.len(),
                cleared,
                "Imported repository database"
            );
            RepoReport {
                source,
                column: batch.column.as_str(),
                repo: batch.repo.clone(),
                packages: batch.packages.len(),
                cleared,
            }
        })
        .collect();

    info!(
        imported = imported.len(),
        skipped = skipped.len(),
        pruned = outcome.pruned,
        "Import finished"
    );

    Ok(ImportReport {
        imported,
        skipped,
        pruned: outcome.pruned,
    })
}

/// Record `source`'s packages as `arch`/`repo` versions.
pub async fn import(
    db: &Database,
    arch: &str,
    repo: &str,
    source: &Path,
) -> Result<ImportReport, SyncError> {
    let batch = read_batch(arch, repo, source).await?;
    commit(db, vec![(source.to_path_buf(), batch)], Vec::new()).await
}

/// Import every repository database under `roots` that changed since the last
/// import. Missing databases are ignored. Pruning and the update stamp happen
/// once for the whole sweep.
pub async fn sync_mirrors(db: &Database, roots: &MirrorRoots) -> Result<ImportReport, SyncError> {
    let last_update = db.last_update_at().await?;
    let mut pending = Vec::new();
    let mut skipped = Vec::new();

    for (arch, root) in roots.iter() {
        for repo in REPOS {
            let path = mirror_db_path(root, arch, repo)?;
            let modified = match tokio::fs::metadata(&path).await {
                Ok(meta) => DateTime::<Utc>::from(meta.modified()?),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "No repository database");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if last_update.is_some_and(|last| modified <= last) {
                debug!(path = %path.display(), "Repository database unchanged");
                skipped.push(path);
                continue;
            }

            let batch = read_batch(arch, repo, &path).await?;
            pending.push((path, batch));
        }
    }

    commit(db, pending, skipped).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    const BASH_DESC: &str = "%FILENAME%\nbash-5.2.026-2-loong64.pkg.tar.zst\n\n\
        %NAME%\nbash\n\n%BASE%\nbash\n\n%VERSION%\n5.2.026-2\n\n\
        %DEPENDS%\nreadline\nglibc\n";

    const ZLIB_DESC: &str = "%NAME%\nzlib\n\n%VERSION%\n1:1.3.1-1\n";

    fn write_entry(dir: &Path, entry: &str, desc: &str) {
        let entry = dir.join(entry);
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("desc"), desc).unwrap();
    }

    /// Pack the entries below `dir` into a gzipped `.db` archive, like repo-add does.
    fn pack_db(dir: &Path, archive: &Path) {
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        let status = std::process::Command::new("tar")
            .arg("czf")
            .arg(archive)
            .arg("-C")
            .arg(dir)
            .arg(".")
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_parse_desc() {
        let pkg = parse_desc(BASH_DESC).unwrap();
        assert_eq!(
            pkg,
            RepoPackage {
                name: "bash".to_string(),
                base: "bash".to_string(),
                version: "5.2.026-2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_desc_defaults_base_to_name() {
        let pkg = parse_desc("%NAME%\nlibfoo\n\n%VERSION%\n1.0-1\n").unwrap();
        assert_eq!(pkg.base, "libfoo");
    }

    #[test]
    fn test_parse_desc_without_name() {
        assert_eq!(parse_desc("%VERSION%\n1.0-1\n"), None);
    }

    #[test]
    fn test_version_column_mapping() {
        assert_eq!(version_column("x86_64", "core").unwrap(), VersionColumn::X86);
        assert_eq!(
            version_column("loong64", "extra-testing").unwrap(),
            VersionColumn::LoongTesting
        );
        assert_eq!(
            version_column("x86_64", "core-staging").unwrap(),
            VersionColumn::X86Staging
        );
        assert!(matches!(
            version_column("aarch64", "core"),
            Err(SyncError::UnknownArch(_))
        ));
        assert!(matches!(
            version_column("loong64", "multilib"),
            Err(SyncError::UnknownRepo(_))
        ));
    }

    #[test]
    fn test_real_repo() {
        assert_eq!(real_repo("core-testing"), "core");
        assert_eq!(real_repo("extra-staging"), "extra");
        assert_eq!(real_repo("extra"), "extra");
    }

    #[tokio::test]
    async fn test_read_db_dir_skips_loose_files() {
        let dir = tempfile::tempdir().unwrap();
        write_entry(dir.path(), "bash-5.2.026-2", BASH_DESC);
        write_entry(dir.path(), "zlib-1:1.3.1-1", ZLIB_DESC);
        std::fs::write(dir.path().join("README"), "not a package").unwrap();

        let packages = read_db_dir(dir.path()).await.unwrap();
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["bash", "zlib"]);
    }

    #[tokio::test]
    async fn test_import_directory() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        write_entry(dir.path(), "bash-5.2.026-2", BASH_DESC);

        let report = import(&db, "loong64", "core-testing", dir.path())
            .await
            .unwrap();

        assert_eq!(report.imported.len(), 1);
        let repo = &report.imported[0];
        assert_eq!(repo.column, "loong_testing_version");
        assert_eq!(repo.repo, "core");
        assert_eq!(repo.packages, 1);
        assert_eq!(repo.source, dir.path());

        let bash = db.get_package("bash").await.unwrap();
        assert_eq!(bash.loong_testing_version.as_deref(), Some("5.2.026-2"));
        assert_eq!(bash.repo.as_deref(), Some("core"));
        assert!(db.last_update().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_source_extracts_archive() {
        let entries = tempfile::tempdir().unwrap();
        write_entry(entries.path(), "bash-5.2.026-2", BASH_DESC);
        write_entry(entries.path(), "zlib-1:1.3.1-1", ZLIB_DESC);

        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("core.db");
        pack_db(entries.path(), &archive);

        let extracted = extract_db(&archive).await.unwrap();
        assert!(extracted.path().join("bash-5.2.026-2").join("desc").is_file());

        let packages = read_source(&archive).await.unwrap();
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["bash", "zlib"]);
        assert_eq!(packages[1].version, "1:1.3.1-1");
    }

    #[tokio::test]
    async fn test_extract_rejects_non_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("core.db");
        std::fs::write(&bogus, "not a tarball").unwrap();

        let err = read_source(&bogus).await.unwrap_err();
        assert!(matches!(err, SyncError::Extract(_)));
    }

    #[test]
    fn test_mirror_db_path_layout() {
        let root = Path::new("/srv/mirror");
        assert_eq!(
            mirror_db_path(root, "x86_64", "core").unwrap(),
            Path::new("/srv/mirror/core.db")
        );
        assert_eq!(
            mirror_db_path(root, "loong64", "extra-testing").unwrap(),
            Path::new("/srv/mirror/extra-testing/os/loong64/extra-testing.db")
        );
        assert!(matches!(
            mirror_db_path(root, "riscv64", "core"),
            Err(SyncError::UnknownArch(_))
        ));
    }

    /// x86_64 mirror with core and core-testing, loong64 mirror with core only.
    fn build_mirrors() -> (tempfile::TempDir, MirrorRoots) {
        let dir = tempfile::tempdir().unwrap();
        let x86 = dir.path().join("x86");
        let loong = dir.path().join("loong");

        let entries = tempfile::tempdir().unwrap();
        write_entry(entries.path(), "bash", "%NAME%\nbash\n\n%VERSION%\n5.2.026-2\n");
        pack_db(entries.path(), &mirror_db_path(&x86, "x86_64", "core").unwrap());

        let entries = tempfile::tempdir().unwrap();
        write_entry(entries.path(), "bash", "%NAME%\nbash\n\n%VERSION%\n5.2.032-1\n");
        pack_db(entries.path(), &mirror_db_path(&x86, "x86_64", "core-testing").unwrap());

        let entries = tempfile::tempdir().unwrap();
        write_entry(entries.path(), "bash", "%NAME%\nbash\n\n%VERSION%\n5.2.026-1\n");
        write_entry(entries.path(), "zlib", ZLIB_DESC);
        pack_db(entries.path(), &mirror_db_path(&loong, "loong64", "core").unwrap());

        let roots = MirrorRoots {
            x86_64: Some(x86),
            loong64: Some(loong),
        };
        (dir, roots)
    }

    #[tokio::test]
    async fn test_sync_mirrors_sweeps_every_repository() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let (_dir, roots) = build_mirrors();

        let report = sync_mirrors(&db, &roots).await.unwrap();

        let columns: Vec<&str> = report.imported.iter().map(|r| r.column).collect();
        assert_eq!(
            columns,
            vec!["x86_version", "x86_testing_version", "loong_version"]
        );
        assert!(report.skipped.is_empty());
        assert_eq!(report.pruned, 0);

        let bash = db.get_package("bash").await.unwrap();
        assert_eq!(bash.x86_version.as_deref(), Some("5.2.026-2"));
        assert_eq!(bash.x86_testing_version.as_deref(), Some("5.2.032-1"));
        assert_eq!(bash.loong_version.as_deref(), Some("5.2.026-1"));
        assert_eq!(bash.repo.as_deref(), Some("core"));

        let zlib = db.get_package("zlib").await.unwrap();
        assert_eq!(zlib.loong_version.as_deref(), Some("1:1.3.1-1"));
        assert_eq!(zlib.x86_version, None);
        assert!(db.last_update_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sync_mirrors_skips_unchanged_databases() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let (_dir, roots) = build_mirrors();

        sync_mirrors(&db, &roots).await.unwrap();
        let again = sync_mirrors(&db, &roots).await.unwrap();
        assert!(again.imported.is_empty());
        assert_eq!(again.skipped.len(), 3);

        // A newer loong database is picked up, the rest stays skipped
        let loong_core = mirror_db_path(roots.loong64.as_deref().unwrap(), "loong64", "core").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&loong_core)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();

        let report = sync_mirrors(&db, &roots).await.unwrap();
        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.imported[0].source, loong_core);
        assert_eq!(report.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_mirrors_with_one_root() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let (_dir, roots) = build_mirrors();
        let roots = MirrorRoots {
            x86_64: None,
            ..roots
        };

        let report = sync_mirrors(&db, &roots).await.unwrap();
        assert_eq!(report.imported.len(), 1);
        assert_eq!(db.get_package("bash").await.unwrap().x86_version, None);
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_repo_before_reading() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let err = import(&db, "loong64", "multilib", Path::new("/nonexistent"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownRepo(_)));
    }
}
