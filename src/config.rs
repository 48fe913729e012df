use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

static DEFAULT_CONFIG: &str = include_str!("default_config.toml");

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub page: PageConfig,
    pub font: FontConfig,
    pub body: BodyConfig,
    pub headings: HeadingsConfig,
    pub table: TableConfig,
    pub rule: RuleConfig,
    pub spacing: SpacingConfig,
    pub layout: LayoutConfig,
    pub substitutions: Vec<Substitution>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            font: FontConfig::default(),
            body: BodyConfig::default(),
            headings: HeadingsConfig::default(),
            table: TableConfig::default(),
            rule: RuleConfig::default(),
            spacing: SpacingConfig::default(),
            layout: LayoutConfig::default(),
            substitutions: default_substitutions(),
        }
    }
}

/// An RGB colour, written as `[r, g, b]` in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_mm: f64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_mm: 15.0,
        }
    }
}

impl PageConfig {
    /// Width between the left and right margins.
    pub fn usable_width_mm(&self) -> f64 {
        (self.width_mm - 2.0 * self.margin_mm).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct FontConfig {
    pub family: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    pub size_pt: f64,
    pub color: Rgb,
    pub list_indent_mm: f64,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            size_pt: 10.0,
            color: Rgb(51, 51, 51),
            list_indent_mm: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeadingStyle {
    pub size_pt: f64,
    pub color: Rgb,
    #[serde(default = "default_heading_space")]
    pub space_after_mm: f64,
}

fn default_heading_space() -> f64 {
    2.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeadingsConfig {
    pub h1: HeadingStyle,
    pub h2: HeadingStyle,
    pub h3: HeadingStyle,
}

impl Default for HeadingsConfig {
    fn default() -> Self {
        Self {
            h1: HeadingStyle {
                size_pt: 16.0,
                color: Rgb(44, 62, 80),
                space_after_mm: default_heading_space(),
            },
            h2: HeadingStyle {
                size_pt: 13.0,
                color: Rgb(52, 73, 94),
                space_after_mm: default_heading_space(),
            },
            h3: HeadingStyle {
                size_pt: 11.0,
                color: Rgb(100, 100, 100),
                space_after_mm: default_heading_space(),
            },
        }
    }
}

impl HeadingsConfig {
    /// Style for a heading level. Levels past 3 use the level 3 style.
    pub fn for_level(&self, level: u8) -> &HeadingStyle {
        match level {
            1 => &self.h1,
            2 => &self.h2,
            _ => &self.h3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub size_pt: f64,
    pub color: Rgb,
    pub header_fill: Rgb,
    /// Cell text is cut to this many characters before layout.
    pub max_cell_chars: usize,
    pub space_after_mm: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            size_pt: 8.0,
            color: Rgb(0, 0, 0),
            header_fill: Rgb(240, 240, 240),
            max_cell_chars: 35,
            space_after_mm: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub color: Rgb,
    pub space_mm: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            color: Rgb(200, 200, 200),
            space_mm: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpacingConfig {
    pub blank_mm: f64,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self { blank_mm: 3.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Keep a heading on the same page as the content that follows it.
    pub keep_heading_with_next: bool,
    /// Tables with at most this many rows are never split across pages.
    pub unbreakable_table_rows: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            keep_heading_with_next: true,
            unbreakable_table_rows: 15,
        }
    }
}

/// A literal text replacement applied to the document before it is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

impl Substitution {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Config {
    /// The configuration bundled with the binary (`src/default_config.toml`).
    pub fn compiled_default() -> Self {
        // build.rs rejects a default config that is not valid TOML
        toml::from_str(DEFAULT_CONFIG).unwrap_or_default()
    }

    /// Parse a config from TOML text. Missing keys keep their defaults.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|source| Error::Config {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Load config from a TOML file, or return the compiled default if the
    /// file does not exist. A file that exists but does not parse is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content, path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::compiled_default()),
            Err(source) => Err(Error::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn default_substitutions() -> Vec<Substitution> {
    vec![
        Substitution::new("χ²", "(Chi-Square)"),
        Substitution::new("χ", "Chi"),
        Substitution::new("μ", "mu"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn compiled_default_matches_default_impls() {
        assert_eq!(Config::compiled_default(), Config::default());
    }

    #[test]
    fn usable_width_is_page_minus_margins() {
        assert_eq!(PageConfig::default().usable_width_mm(), 180.0);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = Config::from_toml(
            "[table]\nmax_cell_chars = 20\n\n[headings.h1]\nsize_pt = 20.0\ncolor = [0, 0, 0]\n",
            Path::new("inline.toml"),
        )
        .unwrap();

        assert_eq!(config.table.max_cell_chars, 20);
        assert_eq!(config.table.header_fill, Rgb(240, 240, 240));
        assert_eq!(config.headings.h1.size_pt, 20.0);
        assert_eq!(config.headings.h1.space_after_mm, 2.0);
        assert_eq!(config.headings.h2, HeadingsConfig::default().h2);
        assert_eq!(config.substitutions, default_substitutions());
    }

    #[test]
    fn empty_substitution_list_disables_replacements() {
        let config = Config::from_toml("substitutions = []\n", Path::new("inline.toml")).unwrap();
        assert!(config.substitutions.is_empty());
    }

    #[test]
    fn heading_style_by_level() {
        let headings = HeadingsConfig::default();
        assert_eq!(headings.for_level(1).size_pt, 16.0);
        assert_eq!(headings.for_level(2).size_pt, 13.0);
        assert_eq!(headings.for_level(3).size_pt, 11.0);
    }

    #[test]
    fn rgb_renders_as_typst_call() {
        assert_eq!(Rgb(44, 62, 80).to_string(), "rgb(44, 62, 80)");
    }

    #[test]
    fn load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::compiled_default());
    }

    #[test]
    fn load_reports_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[page]\nwidth_mm = \"wide\"").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got: {err}");
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
