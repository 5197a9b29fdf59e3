//! Result Highlighter
//!
//! Annotates the package results table with highlight classes on the status
//! cell. Rows are laid out as `[name, loong, x86, repo, status]`:
//!
//! - status text containing `failed` → `highlight-red`
//! - otherwise, loong text equal to x86 text → `highlight-green`
//!
//! Failure always wins over a version match. Comparison is exact, no case or
//! whitespace normalization. Rows with four or fewer cells (headers) are left
//! alone.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::dom::{Document, Row, Table};

pub const TABLE_ID: &str = "pkgTable";
pub const MATCH_CLASS: &str = "highlight-green";
pub const FAILURE_CLASS: &str = "highlight-red";
pub const FAILURE_MARKER: &str = "failed";

const LOONG_CELL: usize = 1;
const X86_CELL: usize = 2;
const STATUS_CELL: usize = 4;
const MIN_CELLS: usize = STATUS_CELL + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Match,
    Failure,
}

impl Highlight {
    pub fn class(&self) -> &'static str {
        match self {
            Highlight::Match => MATCH_CLASS,
            Highlight::Failure => FAILURE_CLASS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightError {
    TableNotFound(String),
}

impl fmt::Display for HighlightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HighlightError::TableNotFound(id) => write!(f, "Table not found: #{}", id),
        }
    }
}

impl std::error::Error for HighlightError {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HighlightSummary {
    pub matched: usize,
    pub failed: usize,
    pub plain: usize,
    pub skipped: usize,
}

/// Decide which highlight, if any, a row's status cell should carry.
pub fn classify<S: AsRef<str>>(cells: &[S]) -> Option<Highlight> {
    if cells.len() < MIN_CELLS {
        return None;
    }

    let loong = cells[LOONG_CELL].as_ref();
    let x86 = cells[X86_CELL].as_ref();
    let status = cells[STATUS_CELL].as_ref();

    if status.contains(FAILURE_MARKER) {
        Some(Highlight::Failure)
    } else if loong == x86 {
        Some(Highlight::Match)
    } else {
        None
    }
}

/// Reapply highlights to a single row. Returns `None` for skipped rows.
fn highlight_row(row: &mut Row) -> Option<Option<Highlight>> {
    if row.cells.len() < MIN_CELLS {
        return None;
    }

    let highlight = classify(row.texts().as_slice());
    let status = &mut row.cells[STATUS_CELL].classes;
    status.remove(MATCH_CLASS);
    status.remove(FAILURE_CLASS);
    if let Some(h) = highlight {
        status.add(h.class());
    }

    Some(highlight)
}

/// Clear stale highlight classes and apply fresh ones to every row.
pub fn highlight_table(table: &mut Table) -> HighlightSummary {
    let mut summary = HighlightSummary::default();

    for row in table.rows.iter_mut() {
        match highlight_row(row) {
            None => summary.skipped += 1,
            Some(Some(Highlight::Match)) => summary.matched += 1,
            Some(Some(Highlight::Failure)) => summary.failed += 1,
            Some(None) => summary.plain += 1,
        }
    }

    debug!(
        table = table.id.as_str(),
        matched = summary.matched,
        failed = summary.failed,
        skipped = summary.skipped,
        "Highlighted table"
    );

    summary
}

/// Highlight the table identified by `table_id` inside `doc`.
pub fn highlight_document(
    doc: &mut Document,
    table_id: &str,
) -> Result<HighlightSummary, HighlightError> {
    let table = doc
        .get_table_by_id_mut(table_id)
        .ok_or_else(|| HighlightError::TableNotFound(table_id.to_string()))?;
    Ok(highlight_table(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Row;

    fn table_of(rows: &[&[&str]]) -> Table {
        let mut table = Table::new(TABLE_ID);
        for cells in rows {
            table.push_row(Row::from_texts(cells.iter().copied()));
        }
        table
    }

    fn status_classes(table: &Table, row: usize) -> Vec<&str> {
        table.rows[row].cells[STATUS_CELL].classes.iter().collect()
    }

    #[test]
    fn test_classify_match() {
        assert_eq!(classify(&["x", "5", "5", "x", "ok"]), Some(Highlight::Match));
    }

    #[test]
    fn test_classify_failure_wins_over_match() {
        assert_eq!(classify(&["x", "5", "5", "x", "failed"]), Some(Highlight::Failure));
    }

    #[test]
    fn test_classify_failure_substring() {
        assert_eq!(
            classify(&["x", "5", "6", "x", "build failed: missing dep"]),
            Some(Highlight::Failure)
        );
    }

    #[test]
    fn test_classify_no_highlight() {
        assert_eq!(classify(&["x", "5", "6", "x", "ok"]), None);
    }

    #[test]
    fn test_classify_is_case_and_whitespace_sensitive() {
        assert_eq!(classify(&["x", "1.0-1", "1.0-1 ", "x", "ok"]), None);
        assert_eq!(classify(&["x", "5", "5", "x", "FAILED"]), Some(Highlight::Match));
    }

    #[test]
    fn test_classify_short_rows() {
        assert_eq!(classify(&["Name", "Loong", "x86", "Arch"]), None);
        assert_eq!(classify::<&str>(&[]), None);
    }

    #[test]
    fn test_highlight_table_applies_classes() {
        let mut table = table_of(&[
            &["Name", "Loong", "x86", "Arch"],
            &["x", "5", "5", "x", "ok"],
            &["x", "5", "5", "x", "failed"],
            &["x", "5", "6", "x", "ok"],
        ]);

        let summary = highlight_table(&mut table);

        assert_eq!(
            summary,
            HighlightSummary {
                matched: 1,
                failed: 1,
                plain: 1,
                skipped: 1
            }
        );
        assert!(table.rows[0].cells.iter().all(|c| c.classes.is_empty()));
        assert_eq!(status_classes(&table, 1), vec![MATCH_CLASS]);
        assert_eq!(status_classes(&table, 2), vec![FAILURE_CLASS]);
        assert!(status_classes(&table, 3).is_empty());
    }

    #[test]
    fn test_only_status_cell_is_touched() {
        let mut table = table_of(&[&["x", "5", "5", "x", "ok", "extra"]]);
        highlight_table(&mut table);

        for (i, cell) in table.rows[0].cells.iter().enumerate() {
            if i != STATUS_CELL {
                assert!(cell.classes.is_empty(), "cell {} was modified", i);
            }
        }
    }

    #[test]
    fn test_highlight_is_idempotent() {
        let mut table = table_of(&[&["x", "5", "5", "x", "ok"], &["x", "5", "5", "x", "failed"]]);

        highlight_table(&mut table);
        let first = table.clone();
        highlight_table(&mut table);

        assert_eq!(table, first);
    }

    #[test]
    fn test_stale_class_is_cleared_after_content_change() {
        let mut table = table_of(&[&["x", "5", "5", "x", "ok"]]);
        highlight_table(&mut table);
        assert_eq!(status_classes(&table, 0), vec![MATCH_CLASS]);

        table.rows[0].cells[STATUS_CELL].text = "failed".to_string();
        highlight_table(&mut table);
        assert_eq!(status_classes(&table, 0), vec![FAILURE_CLASS]);

        table.rows[0].cells[X86_CELL].text = "6".to_string();
        table.rows[0].cells[STATUS_CELL].text = "ok".to_string();
        highlight_table(&mut table);
        assert!(status_classes(&table, 0).is_empty());
    }

    #[test]
    fn test_unrelated_classes_are_preserved() {
        let mut table = table_of(&[&["x", "5", "5", "x", "ok"]]);
        table.rows[0].cells[STATUS_CELL].classes.add("status");

        highlight_table(&mut table);

        assert_eq!(status_classes(&table, 0), vec!["status", MATCH_CLASS]);
    }

    #[test]
    fn test_highlight_document_missing_table() {
        let mut doc = Document::new().with_table(Table::new("other"));
        let err = highlight_document(&mut doc, TABLE_ID).unwrap_err();
        assert_eq!(err, HighlightError::TableNotFound(TABLE_ID.to_string()));
        assert_eq!(err.to_string(), "Table not found: #pkgTable");
    }

    #[test]
    fn test_highlight_document_targets_table_by_id() {
        let mut doc = Document::new()
            .with_table(table_of(&[&["x", "5", "5", "x", "ok"]]))
            .with_table(Table {
                id: "other".to_string(),
                rows: vec![Row::from_texts(["x", "5", "5", "x", "ok"])],
            });

        let summary = highlight_document(&mut doc, TABLE_ID).unwrap();

        assert_eq!(summary.matched, 1);
        let other = doc.get_table_by_id("other").unwrap();
        assert!(other.rows[0].cells[STATUS_CELL].classes.is_empty());
    }
}
