//! Domain Models
//!
//! Packages as exposed by the API, plus the request bodies that create and
//! modify them. These are independent of the database layer.

use serde::{Deserialize, Serialize};

use crate::database::PackageRow;
use crate::dom::{Row, Table};
use crate::highlight::TABLE_ID;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub base: Option<String>,
    pub repo: Option<String>,
    pub x86_version: Option<String>,
    pub x86_testing_version: Option<String>,
    pub x86_staging_version: Option<String>,
    pub loong_version: Option<String>,
    pub loong_testing_version: Option<String>,
    pub loong_staging_version: Option<String>,
    pub build_status: Option<String>,
}

impl From<PackageRow> for Package {
    fn from(row: PackageRow) -> Self {
        Self {
            name: row.name,
            base: row.base,
            repo: row.repo,
            x86_version: row.x86_version,
            x86_testing_version: row.x86_testing_version,
            x86_staging_version: row.x86_staging_version,
            loong_version: row.loong_version,
            loong_testing_version: row.loong_testing_version,
            loong_staging_version: row.loong_staging_version,
            build_status: row.build_status,
        }
    }
}

impl Package {
    /// Cells in results table order: name, loong, x86, repo, status.
    pub fn table_row(&self) -> Row {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Row::from_texts([
            self.name.clone(),
            text(&self.loong_version),
            text(&self.x86_version),
            text(&self.repo),
            text(&self.build_status),
        ])
    }
}

/// Build the (unhighlighted) results table for a package listing.
pub fn results_table(packages: &[Package]) -> Table {
    let mut table = Table::new(TABLE_ID);
    table.push_row(Row::from_texts(["Name", "Loong", "x86", "Repo"]));
    for package in packages {
        table.push_row(package.table_row());
    }
    table
}

/// One package from an architecture's repository database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoPackage {
    pub name: String,
    pub base: String,
    pub version: String,
}

// DTOs for creating and modifying entities
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub base: Option<String>,
    pub repo: Option<String>,
    pub x86_version: Option<String>,
    pub loong_version: Option<String>,
    pub build_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageUpdate {
    pub repo: Option<String>,
    pub x86_version: Option<String>,
    pub loong_version: Option<String>,
    pub build_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuildStatusRequest {
    pub build_status: String,
}

#[derive(Debug, Serialize)]
pub struct LastUpdate {
    pub last_update: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str, loong: Option<&str>, x86: Option<&str>) -> Package {
        Package {
            name: name.to_string(),
            base: None,
            repo: Some("core".to_string()),
            x86_version: x86.map(str::to_string),
            x86_testing_version: None,
            x86_staging_version: None,
            loong_version: loong.map(str::to_string),
            loong_testing_version: None,
            loong_staging_version: None,
            build_status: None,
        }
    }

    #[test]
    fn test_table_row_layout() {
        let mut pkg = package("bash", Some("5.2-1"), Some("5.2-2"));
        pkg.build_status = Some("failed".to_string());

        let row = pkg.table_row();
        assert_eq!(row.texts(), vec!["bash", "5.2-1", "5.2-2", "core", "failed"]);
    }

    #[test]
    fn test_missing_versions_render_empty() {
        let row = package("zlib", None, Some("1.3-1")).table_row();
        assert_eq!(row.texts(), vec!["zlib", "", "1.3-1", "core", ""]);
    }

    #[test]
    fn test_results_table_has_short_header() {
        let table = results_table(&[package("bash", None, None)]);
        assert_eq!(table.id, TABLE_ID);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells.len(), 4);
    }
}
