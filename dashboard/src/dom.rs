//! Minimal document model for rendered result tables.
//!
//! Only what the highlighter needs: tables addressed by id, rows of cells,
//! and a class list per cell. Cell text is never mutated by the highlighter.

use serde::{Deserialize, Serialize};

/// Ordered set of CSS class names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassList(Vec<String>);

impl ClassList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `class` unless it is already present.
    pub fn add(&mut self, class: &str) {
        if !self.contains(class) {
            self.0.push(class.to_string());
        }
    }

    /// Removes `class` if present, returning whether it was.
    pub fn remove(&mut self, class: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c != class);
        before != self.0.len()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.0.iter().any(|c| c == class)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub text: String,
    #[serde(default)]
    pub classes: ClassList,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            classes: ClassList::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: texts.into_iter().map(Cell::new).collect(),
        }
    }

    pub fn texts(&self) -> Vec<&str> {
        self.cells.iter().map(Cell::text).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }
}

/// A page holding any number of tables, looked up by element id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub tables: Vec<Table>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn get_table_by_id(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn get_table_by_id_mut(&mut self, id: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_list_add_is_idempotent() {
        let mut classes = ClassList::new();
        classes.add("highlight-green");
        classes.add("highlight-green");
        assert_eq!(classes.len(), 1);
        assert!(classes.contains("highlight-green"));
    }

    #[test]
    fn test_class_list_remove() {
        let mut classes = ClassList::new();
        classes.add("status");
        classes.add("highlight-red");
        assert!(classes.remove("highlight-red"));
        assert!(!classes.remove("highlight-red"));
        assert_eq!(classes.iter().collect::<Vec<_>>(), vec!["status"]);
    }

    #[test]
    fn test_document_lookup_by_id() {
        let mut doc = Document::new()
            .with_table(Table::new("other"))
            .with_table(Table::new("pkgTable"));

        assert!(doc.get_table_by_id("pkgTable").is_some());
        assert!(doc.get_table_by_id("missing").is_none());

        doc.get_table_by_id_mut("pkgTable")
            .unwrap()
            .push_row(Row::from_texts(["a", "b"]));
        assert_eq!(doc.get_table_by_id("pkgTable").unwrap().rows.len(), 1);
    }

    #[test]
    fn test_cell_deserializes_without_classes() {
        let cell: Cell = serde_json::from_str(r#"{"text":"ok"}"#).unwrap();
        assert_eq!(cell.text(), "ok");
        assert!(cell.classes.is_empty());
    }
}
