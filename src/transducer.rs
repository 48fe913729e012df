use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::instruction::{Instruction, TableBlock};

// Applied in order. Bold has to go before italic, otherwise `**x**` would be
// read as two empty italic spans.
static INLINE_MARKUP: Lazy<[(Regex, &str); 3]> = Lazy::new(|| {
    [
        (Regex::new(r"\*\*(.*?)\*\*").unwrap(), "${1}"),
        (Regex::new(r"\*(.*?)\*").unwrap(), "${1}"),
        (Regex::new(r"`(.*?)`").unwrap(), "${1}"),
    ]
});

static RE_TABLE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[|\s\-:]+$").unwrap());

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*]\s+").unwrap());

/// Parse a markdown document into formatting instructions.
///
/// The text is split on `\n`, so a trailing newline yields a final `Blank`.
pub fn transduce(markdown: &str) -> Vec<Instruction> {
    transduce_lines(markdown.split('\n'))
}

/// Parse an already split sequence of lines.
pub fn transduce_lines<I, S>(lines: I) -> Vec<Instruction>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut transducer = Transducer::default();
    for line in lines {
        transducer.push_line(line.as_ref());
    }
    transducer.finish()
}

/// Single-pass line classifier.
///
/// The only state carried between lines is the table being collected and
/// the blank lines seen since its last row.
#[derive(Debug, Default)]
pub struct Transducer {
    out: Vec<Instruction>,
    table: Vec<Vec<String>>,
    // Blank lines seen while a table is open. Dropped if another row follows,
    // emitted ahead of whatever comes next otherwise.
    held_blanks: usize,
    lines: usize,
}

impl Transducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        self.lines += 1;
        let stripped = line.trim();

        if stripped.is_empty() {
            if self.table.is_empty() {
                self.out.push(Instruction::Blank);
            } else {
                self.held_blanks += 1;
            }
            return;
        }

        if stripped == "---" {
            self.flush_table();
            self.out.push(Instruction::Rule);
            return;
        }

        // Headings do not end a table; rows after them join the pending one.
        if let Some((level, text)) = heading(stripped) {
            self.release_blanks();
            self.out.push(Instruction::Heading {
                level,
                text: text.to_string(),
            });
            return;
        }

        if stripped.contains('|') {
            if RE_TABLE_SEPARATOR.is_match(stripped) {
                return;
            }
            let cells = table_cells(stripped);
            if !cells.is_empty() {
                self.held_blanks = 0;
                self.table.push(cells);
            }
            return;
        }

        self.flush_table();

        if is_list_item(stripped) {
            let text = strip_markup(&RE_BULLET.replace(stripped, ""));
            if !text.is_empty() {
                self.out.push(Instruction::ListItem { text });
            }
            return;
        }

        let text = strip_markup(stripped);
        if !text.is_empty() {
            self.out.push(Instruction::Paragraph { text });
        }
    }

    /// Flush any open table and return the instructions.
    pub fn finish(mut self) -> Vec<Instruction> {
        self.flush_table();
        debug!(
            lines = self.lines,
            instructions = self.out.len(),
            "classified markdown lines"
        );
        self.out
    }

    fn flush_table(&mut self) {
        self.release_blanks();
        if !self.table.is_empty() {
            let rows = std::mem::take(&mut self.table);
            self.out.push(Instruction::Table(TableBlock { rows }));
        }
    }

    fn release_blanks(&mut self) {
        for _ in 0..std::mem::take(&mut self.held_blanks) {
            self.out.push(Instruction::Blank);
        }
    }
}

fn heading(line: &str) -> Option<(u8, &str)> {
    [("# ", 1), ("## ", 2), ("### ", 3)]
        .into_iter()
        .find_map(|(prefix, level)| line.strip_prefix(prefix).map(|rest| (level, rest.trim())))
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("-   ") || line.starts_with("- ") || line.starts_with("* ")
}

/// Split a table row on `|`, trimming cells and dropping empty ones.
///
/// Interior empty cells are dropped as well, so `| a |  | b |` yields two
/// cells.
pub fn table_cells(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

/// True for the `|---|:--:|` line between a table header and its body.
pub fn is_table_separator(line: &str) -> bool {
    RE_TABLE_SEPARATOR.is_match(line.trim())
}

/// Remove bold, italic and code-span markers, keeping the enclosed text.
pub fn strip_markup(text: &str) -> String {
    INLINE_MARKUP
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}
