//! Convert markdown statistics reports to PDF.
//!
//! The markdown is read line by line into [`Instruction`]s, rendered to
//! Typst markup with the presentation settings of a [`Config`], and compiled
//! to PDF (or SVG pages) in-process. The [`stats`] module carries the
//! chi-square test used by the reports.

mod config;
mod error;
mod instruction;
pub mod stats;
mod substitute;
mod transducer;
mod typst;

pub use config::{
    BodyConfig, Config, FontConfig, HeadingStyle, HeadingsConfig, LayoutConfig, PageConfig, Rgb,
    RuleConfig, SpacingConfig, Substitution, TableConfig,
};
pub use error::{Error, Result};
pub use instruction::{Instruction, TableBlock};
pub use transducer::{Transducer, is_table_separator, strip_markup, table_cells, transduce_lines};

use tracing::{debug, info};
use typst_as_lib::TypstEngine;
use typst_as_lib::typst_kit_options::TypstKitFontOptions;
use typst_pdf::PdfOptions;

/// Parse markdown text into formatting instructions.
pub fn parse(markdown: &str) -> Vec<Instruction> {
    transducer::transduce(markdown)
}

/// Apply the configured character substitutions, then parse.
pub fn parse_with_config(markdown: &str, config: &Config) -> Vec<Instruction> {
    let markdown = substitute::apply(&config.substitutions, markdown);
    parse(&markdown)
}

/// Convert markdown to Typst markup using default config.
pub fn markdown_to_typst(markdown: &str) -> String {
    markdown_to_typst_with_config(markdown, &Config::compiled_default())
}

/// Convert markdown to Typst markup with custom config.
pub fn markdown_to_typst_with_config(markdown: &str, config: &Config) -> String {
    let instructions = parse_with_config(markdown, config);
    typst::instructions_to_typst(&instructions, config)
}

/// Convert markdown to PDF bytes using default config.
pub fn markdown_to_pdf(markdown: &str) -> Result<Vec<u8>> {
    markdown_to_pdf_with_config(markdown, &Config::compiled_default())
}

/// Compile markdown to a Typst document.
fn compile_document(
    markdown: &str,
    config: &Config,
) -> Result<typst_library::layout::PagedDocument> {
    let typst_content = markdown_to_typst_with_config(markdown, config);
    debug!(bytes = typst_content.len(), "generated Typst markup");

    let font_options = TypstKitFontOptions::new()
        .include_embedded_fonts(true)
        .include_system_fonts(false);

    let engine = TypstEngine::builder()
        .main_file(typst_content)
        .search_fonts_with(font_options)
        .build();

    let doc: typst_library::layout::PagedDocument = engine
        .compile()
        .output
        .map_err(|e| Error::Compile(format!("{:?}", e)))?;

    info!(pages = doc.pages.len(), "compiled document");
    Ok(doc)
}

/// Convert markdown to PDF bytes with custom config.
pub fn markdown_to_pdf_with_config(markdown: &str, config: &Config) -> Result<Vec<u8>> {
    let doc = compile_document(markdown, config)?;

    typst_pdf::pdf(&doc, &PdfOptions::default()).map_err(|e| Error::Pdf(format!("{:?}", e)))
}

/// A report rendered to SVG, one string per page.
#[derive(Debug)]
pub struct SvgDocument {
    pub pages: Vec<String>,
    /// Size of the first page, or of the configured page when nothing was laid out.
    pub width_pt: f64,
    pub height_pt: f64,
}

/// Convert markdown to SVG pages using default config.
pub fn markdown_to_svg(markdown: &str) -> Result<SvgDocument> {
    markdown_to_svg_with_config(markdown, &Config::compiled_default())
}

/// Convert markdown to SVG pages with custom config.
pub fn markdown_to_svg_with_config(markdown: &str, config: &Config) -> Result<SvgDocument> {
    let doc = compile_document(markdown, config)?;

    let (width_pt, height_pt) = doc
        .pages
        .first()
        .map(|page| {
            let size = page.frame.size();
            (size.x.to_pt(), size.y.to_pt())
        })
        .unwrap_or_else(|| (mm_to_pt(config.page.width_mm), mm_to_pt(config.page.height_mm)));

    Ok(SvgDocument {
        pages: doc.pages.iter().map(typst_svg::svg).collect(),
        width_pt,
        height_pt,
    })
}

fn mm_to_pt(mm: f64) -> f64 {
    mm * 72.0 / 25.4
}
