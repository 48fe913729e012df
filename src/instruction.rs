use serde::Serialize;

/// A table collected from consecutive pipe-delimited lines.
///
/// The first row is the header. Rows keep whatever cell count the source
/// line produced; renderers size the table from the header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableBlock {
    pub rows: Vec<Vec<String>>,
}

impl TableBlock {
    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn body(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// Column count, taken from the header row.
    pub fn column_count(&self) -> usize {
        self.header().len()
    }
}

/// Formatting instructions produced from markdown lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    Heading { level: u8, text: String },
    Rule,
    Blank,
    ListItem { text: String },
    Table(TableBlock),
    Paragraph { text: String },
}
