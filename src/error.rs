//! Error types for statreport.
//!
//! Parsing markdown into formatting instructions cannot fail, so every
//! variant here belongs to the edges of the pipeline: file access,
//! configuration, Typst compilation and the statistics helpers.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for statreport operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An output file could not be written.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A config file was read but is not valid.
    #[error("invalid config '{}': {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Typst rejected the generated markup.
    #[error("Typst compilation failed: {0}")]
    Compile(String),

    /// The compiled document could not be exported.
    #[error("PDF generation failed: {0}")]
    Pdf(String),

    /// A contingency table cannot be tested as given.
    #[error("invalid contingency table: {0}")]
    InvalidTable(String),

    /// An observation file is malformed.
    #[error("line {line}: {reason}")]
    Data { line: usize, reason: String },
}
