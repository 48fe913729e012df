use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use statreport::stats::{ContingencyTable, Observations, chi2_contingency};
use statreport::{Config, Error};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent.
const LOCAL_CONFIG: &str = "statreport.toml";

#[derive(Parser)]
#[command(name = "statreport", version)]
#[command(about = "Render markdown statistics reports to PDF and run contingency tests")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a markdown report to PDF, SVG or Typst markup
    Convert {
        /// Input Markdown file
        input: PathBuf,

        /// Output file (defaults to input name with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// TOML file with presentation settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = Format::Pdf)]
        format: Format,
    },

    /// Print the formatting instructions of a markdown file as JSON
    Inspect {
        /// Input Markdown file
        input: PathBuf,

        /// TOML file with presentation settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Chi-square test of independence on two columns of a CSV file
    ChiSquare {
        /// CSV file with a header row
        input: PathBuf,

        /// Column used for table rows (defaults to the first column)
        #[arg(long)]
        rows: Option<String>,

        /// Column used for table columns (defaults to the second column)
        #[arg(long)]
        cols: Option<String>,

        /// Significance level
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,

        /// Skip Yates' continuity correction on 2x2 tables
        #[arg(long)]
        no_correction: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pdf,
    Svg,
    Typst,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Svg => "svg",
            Format::Typst => "typ",
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "statreport=debug",
        _ => "statreport=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Convert {
            input,
            output,
            config,
            format,
        } => convert(&input, output, config.as_deref(), format),
        Command::Inspect { input, config } => inspect(&input, config.as_deref()),
        Command::ChiSquare {
            input,
            rows,
            cols,
            alpha,
            no_correction,
        } => chi_square(&input, rows.as_deref(), cols.as_deref(), alpha, !no_correction),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(Path::new(LOCAL_CONFIG))?,
    };
    Ok(config)
}

fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
        .context("could not load input")
}

fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    fs::write(path, contents).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn convert(
    input: &Path,
    output: Option<PathBuf>,
    config: Option<&Path>,
    format: Format,
) -> Result<()> {
    let config = load_config(config)?;
    let markdown = read_input(input)?;

    // Determine output path
    let output = output.unwrap_or_else(|| input.with_extension(format.extension()));

    match format {
        Format::Pdf => {
            let pdf_bytes = statreport::markdown_to_pdf_with_config(&markdown, &config)
                .with_context(|| format!("converting {}", input.display()))?;
            write_output(&output, pdf_bytes)?;
            println!("Created {}", output.display());
        }
        Format::Typst => {
            let typst = statreport::markdown_to_typst_with_config(&markdown, &config);
            write_output(&output, typst)?;
            println!("Created {}", output.display());
        }
        Format::Svg => {
            let doc = statreport::markdown_to_svg_with_config(&markdown, &config)
                .with_context(|| format!("converting {}", input.display()))?;
            info!(
                pages = doc.pages.len(),
                width_pt = doc.width_pt,
                height_pt = doc.height_pt,
                "rendered SVG"
            );
            let paths = svg_page_paths(&output, doc.pages.len());
            for (path, page) in paths.iter().zip(&doc.pages) {
                write_output(path, page)?;
                println!("Created {}", path.display());
            }
        }
    }

    Ok(())
}

/// One path per page: the output path itself for a single page, otherwise
/// `name-1.svg`, `name-2.svg`, ...
fn svg_page_paths(output: &Path, pages: usize) -> Vec<PathBuf> {
    if pages <= 1 {
        return vec![output.to_path_buf()];
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "svg".to_string());
    (1..=pages)
        .map(|n| output.with_file_name(format!("{stem}-{n}.{ext}")))
        .collect()
}

fn inspect(input: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let markdown = read_input(input)?;
    let instructions = statreport::parse_with_config(&markdown, &config);
    let json =
        serde_json::to_string_pretty(&instructions).context("failed to serialise instructions")?;
    println!("{json}");
    Ok(())
}

fn chi_square(
    input: &Path,
    rows: Option<&str>,
    cols: Option<&str>,
    alpha: f64,
    correction: bool,
) -> Result<()> {
    let csv = read_input(input)?;
    let observations = Observations::from_csv(&csv, rows, cols)
        .with_context(|| format!("reading {}", input.display()))?;
    let table = ContingencyTable::from_observations(&observations);
    let result = chi2_contingency(&table, correction)?;

    println!("--- Contingency Table ---");
    print!("{table}");
    println!();
    println!("Chi-Square Statistic: {:.4}", result.statistic);
    println!("P-value: {:.4}", result.p_value);
    println!("Degrees of freedom: {}", result.dof);
    println!();
    let variables = format!("{} and {}", observations.row_variable, observations.col_variable);
    if result.is_significant(alpha) {
        println!("Result: Reject the null hypothesis.");
        println!("There is a significant association between {variables} (alpha = {alpha}).");
    } else {
        println!("Result: Fail to reject the null hypothesis.");
        println!("There is no significant association between {variables} (alpha = {alpha}).");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_svg_page_keeps_output_path() {
        assert_eq!(
            svg_page_paths(Path::new("out/report.svg"), 1),
            vec![PathBuf::from("out/report.svg")]
        );
    }

    #[test]
    fn multiple_svg_pages_are_numbered() {
        assert_eq!(
            svg_page_paths(Path::new("out/report.svg"), 2),
            vec![
                PathBuf::from("out/report-1.svg"),
                PathBuf::from("out/report-2.svg")
            ]
        );
    }

    #[test]
    fn cli_parses_convert() {
        let cli = Cli::try_parse_from(["statreport", "convert", "stat.md", "-f", "typst"]).unwrap();
        match cli.command {
            Command::Convert { input, format, .. } => {
                assert_eq!(input, PathBuf::from("stat.md"));
                assert!(format == Format::Typst);
            }
            _ => panic!("expected convert"),
        }
    }
}
