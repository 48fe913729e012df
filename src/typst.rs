use std::fmt::Write;

use tracing::warn;

use crate::config::Config;
use crate::instruction::{Instruction, TableBlock};

/// Convert formatting instructions to Typst markup
pub fn instructions_to_typst(instructions: &[Instruction], config: &Config) -> String {
    let mut out = String::new();
    emit_preamble(config, &mut out);

    let mut i = 0;
    while i < instructions.len() {
        match &instructions[i] {
            Instruction::Heading { .. } if config.layout.keep_heading_with_next => {
                // Keep heading with following content using a block that prevents breaks
                let end = kept_with_heading(instructions, i, config);
                out.push_str("#block(breakable: false)[\n");
                emit_run(&instructions[i..end], config, &mut out);
                out.push_str("]\n\n");
                i = end;
            }
            _ => {
                let end = if matches!(instructions[i], Instruction::ListItem { .. }) {
                    list_run_end(instructions, i)
                } else {
                    i + 1
                };
                emit_run(&instructions[i..end], config, &mut out);
                i = end;
            }
        }
    }

    out
}

fn emit_preamble(config: &Config, out: &mut String) {
    let page = &config.page;
    let body = &config.body;

    let _ = writeln!(
        out,
        "#set page(width: {}mm, height: {}mm, margin: {}mm)",
        page.width_mm, page.height_mm, page.margin_mm
    );
    match &config.font.family {
        Some(family) => {
            let _ = writeln!(
                out,
                "#set text(font: \"{}\", size: {}pt, fill: {})",
                family.replace('\\', "\\\\").replace('"', "\\\""),
                body.size_pt,
                body.color
            );
        }
        None => {
            let _ = writeln!(out, "#set text(size: {}pt, fill: {})", body.size_pt, body.color);
        }
    }
    // Set up paragraph settings to prevent widows/orphans
    out.push_str("#set par(linebreaks: \"optimized\")\n");
    let _ = writeln!(out, "#set list(indent: {}mm)", body.list_indent_mm);

    for level in 1..=3u8 {
        let style = config.headings.for_level(level);
        let _ = writeln!(
            out,
            "#show heading.where(level: {level}): set text(size: {}pt, fill: {})",
            style.size_pt, style.color
        );
        let _ = writeln!(
            out,
            "#show heading.where(level: {level}): set block(below: {}mm)",
            style.space_after_mm
        );
    }
    out.push('\n');
}

/// End (exclusive) of the group kept on one page with the heading at `start`:
/// any blanks, then a whole list or a single other instruction.
///
/// A table too long to stay unbroken is left out of the group, since the
/// group itself cannot break across pages.
fn kept_with_heading(instructions: &[Instruction], start: usize, config: &Config) -> usize {
    let mut next = start + 1;
    while matches!(instructions.get(next), Some(Instruction::Blank)) {
        next += 1;
    }
    match instructions.get(next) {
        None => next,
        Some(Instruction::ListItem { .. }) => list_run_end(instructions, next),
        Some(Instruction::Table(table)) if !stays_unbroken(table, config) => next,
        Some(_) => next + 1,
    }
}

fn stays_unbroken(table: &TableBlock, config: &Config) -> bool {
    table.rows.len() <= config.layout.unbreakable_table_rows
}

fn list_run_end(instructions: &[Instruction], start: usize) -> usize {
    let mut end = start;
    while matches!(instructions.get(end), Some(Instruction::ListItem { .. })) {
        end += 1;
    }
    end
}

fn emit_run(run: &[Instruction], config: &Config, out: &mut String) {
    for (i, instruction) in run.iter().enumerate() {
        emit_instruction(instruction, config, out);
        if matches!(instruction, Instruction::ListItem { .. })
            && !matches!(run.get(i + 1), Some(Instruction::ListItem { .. }))
        {
            // End the list
            out.push('\n');
        }
    }
}

fn emit_instruction(instruction: &Instruction, config: &Config, out: &mut String) {
    match instruction {
        Instruction::Heading { level, text } => {
            for _ in 0..*level {
                out.push('=');
            }
            out.push(' ');
            escape_text(text, out);
            out.push_str("\n\n");
        }
        Instruction::Paragraph { text } => {
            escape_text(text, out);
            out.push_str("\n\n");
        }
        Instruction::ListItem { text } => {
            out.push_str("- ");
            escape_text(text, out);
            out.push('\n');
        }
        Instruction::Blank => {
            let _ = writeln!(out, "#v({}mm)\n", config.spacing.blank_mm);
        }
        Instruction::Rule => {
            let space = config.rule.space_mm;
            let _ = writeln!(
                out,
                "#v({space}mm)\n#line(length: 100%, stroke: 0.5pt + {})\n#v({space}mm)\n",
                config.rule.color
            );
        }
        Instruction::Table(table) => {
            if stays_unbroken(table, config) {
                // Keep tables together when possible
                out.push_str("#block(breakable: false)[\n");
            } else {
                out.push_str("#block[\n");
            }
            table_to_typst(table, config, out);
            out.push_str("]\n");
            let _ = writeln!(out, "#v({}mm)\n", config.table.space_after_mm);
        }
    }
}

/// Width of each column when the usable page width is shared equally.
pub fn column_width_mm(config: &Config, columns: usize) -> f64 {
    config.page.usable_width_mm() / columns.max(1) as f64
}

/// Cut cell text to the configured maximum number of characters.
pub fn truncate_cell(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn table_to_typst(table: &TableBlock, config: &Config, out: &mut String) {
    let col_count = table.column_count();
    if col_count == 0 {
        return;
    }

    let width = column_width_mm(config, col_count);
    let columns = vec![format!("{width:.2}mm"); col_count].join(", ");
    let max_chars = config.table.max_cell_chars;

    let _ = writeln!(
        out,
        "#set text(size: {}pt, fill: {})",
        config.table.size_pt, config.table.color
    );
    out.push_str("#table(\n");
    // A one-element Typst array needs the trailing comma
    let _ = writeln!(out, "  columns: ({columns},),");
    out.push_str("  stroke: 0.5pt,\n");
    let _ = writeln!(
        out,
        "  fill: (x, y) => if y == 0 {{ {} }},",
        config.table.header_fill
    );

    // Header cells (bold)
    out.push_str("  table.header(");
    for (i, cell) in table.header().iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str("[*");
        escape_text(truncate_cell(cell, max_chars), out);
        out.push_str("*]");
    }
    out.push_str("),\n");

    // Data rows
    for (n, row) in table.body().iter().enumerate() {
        if row.len() != col_count {
            warn!(
                row = n + 2,
                cells = row.len(),
                columns = col_count,
                "table row width differs from header"
            );
        }
        out.push(' ');
        for i in 0..col_count {
            out.push_str(" [");
            if let Some(cell) = row.get(i) {
                escape_text(truncate_cell(cell, max_chars), out);
            }
            out.push_str("],");
        }
        out.push('\n');
    }

    out.push_str(")\n");
}

/// Escape text so Typst reads it literally.
///
/// Markers that only matter at the start of a line (headings, lists,
/// enumerations) are escaped in first position only.
fn escape_text(text: &str, out: &mut String) {
    for (i, ch) in text.chars().enumerate() {
        match ch {
            '#' | '*' | '_' | '@' | '$' | '\\' | '`' | '<' | '>' | '[' | ']' | '/' | '~' => {
                out.push('\\');
                out.push(ch);
            }
            '=' | '-' | '+' if i == 0 => {
                out.push('\\');
                out.push(ch);
            }
            c if i == 0 && c.is_ascii_digit() => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}
