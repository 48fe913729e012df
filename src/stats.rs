//! Contingency tables and Pearson's chi-square test of independence.
//!
//! Observations are `(row, column)` label pairs, typically two categorical
//! columns of a small CSV file. Labels are sorted on both axes, so the same
//! data always produces the same table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};

/// Two categorical variables read from a comma-separated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observations {
    pub row_variable: String,
    pub col_variable: String,
    pub pairs: Vec<(String, String)>,
}

impl Observations {
    /// Read observations from CSV text with a header line.
    ///
    /// `row_column` and `col_column` select columns by header name; they
    /// default to the first and second column. Blank lines are skipped.
    /// Fields may be wrapped in double quotes to hold commas.
    pub fn from_csv(
        text: &str,
        row_column: Option<&str>,
        col_column: Option<&str>,
    ) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let (header_line, header) = lines.next().ok_or_else(|| Error::Data {
            line: 1,
            reason: "missing header row".into(),
        })?;
        let headers = split_fields(header, header_line)?;

        let row_idx = column_index(&headers, row_column, 0, header_line)?;
        let col_idx = column_index(&headers, col_column, 1, header_line)?;
        if row_idx == col_idx {
            return Err(Error::Data {
                line: header_line,
                reason: format!("'{}' selected as both variables", headers[row_idx]),
            });
        }

        let mut pairs = Vec::new();
        for (line_no, line) in lines {
            let fields = split_fields(line, line_no)?;
            if fields.len() != headers.len() {
                return Err(Error::Data {
                    line: line_no,
                    reason: format!("expected {} fields, found {}", headers.len(), fields.len()),
                });
            }
            pairs.push((fields[row_idx].clone(), fields[col_idx].clone()));
        }

        debug!(observations = pairs.len(), "read observations");
        Ok(Self {
            row_variable: headers[row_idx].clone(),
            col_variable: headers[col_idx].clone(),
            pairs,
        })
    }
}

// One record. A field opening with `"` runs to the closing quote and may hold
// commas; `""` inside it is a literal quote. Fields are trimmed.
fn split_fields(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(ch),
        }
    }
    if quoted {
        return Err(Error::Data {
            line: line_no,
            reason: "unterminated quoted field".into(),
        });
    }
    fields.push(field.trim().to_string());
    Ok(fields)
}

fn column_index(
    headers: &[String],
    name: Option<&str>,
    default: usize,
    line: usize,
) -> Result<usize> {
    match name {
        Some(name) => headers
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| Error::Data {
                line,
                reason: format!("no column named '{name}'"),
            }),
        None if default < headers.len() => Ok(default),
        None => Err(Error::Data {
            line,
            reason: format!("expected at least 2 columns, found {}", headers.len()),
        }),
    }
}

/// Observed counts of two categorical variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContingencyTable {
    row_variable: String,
    col_variable: String,
    row_labels: Vec<String>,
    col_labels: Vec<String>,
    counts: Vec<Vec<u64>>,
}

impl ContingencyTable {
    /// Build a table from explicit counts, one inner vector per row label.
    pub fn new(
        row_labels: Vec<String>,
        col_labels: Vec<String>,
        counts: Vec<Vec<u64>>,
    ) -> Result<Self> {
        if counts.len() != row_labels.len() {
            return Err(Error::InvalidTable(format!(
                "{} row labels for {} rows of counts",
                row_labels.len(),
                counts.len()
            )));
        }
        if let Some(row) = counts.iter().find(|row| row.len() != col_labels.len()) {
            return Err(Error::InvalidTable(format!(
                "row has {} counts, expected {}",
                row.len(),
                col_labels.len()
            )));
        }
        Ok(Self {
            row_variable: String::new(),
            col_variable: String::new(),
            row_labels,
            col_labels,
            counts,
        })
    }

    /// Cross-tabulate `(row, column)` label pairs.
    pub fn from_pairs<I, R, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (R, C)>,
        R: Into<String>,
        C: Into<String>,
    {
        let mut cells: BTreeMap<(String, String), u64> = BTreeMap::new();
        let mut rows = BTreeSet::new();
        let mut cols = BTreeSet::new();
        for (row, col) in pairs {
            let (row, col) = (row.into(), col.into());
            rows.insert(row.clone());
            cols.insert(col.clone());
            *cells.entry((row, col)).or_default() += 1;
        }

        let row_labels: Vec<String> = rows.into_iter().collect();
        let col_labels: Vec<String> = cols.into_iter().collect();
        let counts = row_labels
            .iter()
            .map(|r| {
                col_labels
                    .iter()
                    .map(|c| cells.get(&(r.clone(), c.clone())).copied().unwrap_or(0))
                    .collect()
            })
            .collect();

        Self {
            row_variable: String::new(),
            col_variable: String::new(),
            row_labels,
            col_labels,
            counts,
        }
    }

    pub fn from_observations(observations: &Observations) -> Self {
        Self::from_pairs(observations.pairs.iter().cloned()).with_variables(
            observations.row_variable.clone(),
            observations.col_variable.clone(),
        )
    }

    /// Name the two variables; used as axis titles when displayed.
    pub fn with_variables(
        mut self,
        row_variable: impl Into<String>,
        col_variable: impl Into<String>,
    ) -> Self {
        self.row_variable = row_variable.into();
        self.col_variable = col_variable.into();
        self
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[String] {
        &self.col_labels
    }

    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn count(&self, row: &str, col: &str) -> u64 {
        let r = self.row_labels.iter().position(|l| l == row);
        let c = self.col_labels.iter().position(|l| l == col);
        match (r, c) {
            (Some(r), Some(c)) => self.counts[r][c],
            _ => 0,
        }
    }

    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn col_totals(&self) -> Vec<u64> {
        (0..self.col_labels.len())
            .map(|c| self.counts.iter().map(|row| row[c]).sum())
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Degrees of freedom, `(rows - 1) * (cols - 1)`.
    pub fn dof(&self) -> usize {
        self.row_labels.len().saturating_sub(1) * self.col_labels.len().saturating_sub(1)
    }

    /// Expected counts under independence: `row_total * col_total / total`.
    pub fn expected(&self) -> Vec<Vec<f64>> {
        let total = self.total() as f64;
        let col_totals = self.col_totals();
        self.row_totals()
            .into_iter()
            .map(|row_total| {
                col_totals
                    .iter()
                    .map(|&col_total| {
                        if total == 0.0 {
                            0.0
                        } else {
                            row_total as f64 * col_total as f64 / total
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

impl fmt::Display for ContingencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label_width = self
            .row_labels
            .iter()
            .map(|l| l.chars().count())
            .chain([self.row_variable.chars().count()])
            .max()
            .unwrap_or(0);
        let widths: Vec<usize> = self
            .col_labels
            .iter()
            .enumerate()
            .map(|(c, label)| {
                self.counts
                    .iter()
                    .map(|row| row[c].to_string().len())
                    .chain([label.chars().count()])
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        if !self.col_variable.is_empty() {
            writeln!(f, "{:<label_width$}  {}", "", self.col_variable)?;
        }
        write!(f, "{:<label_width$}", self.row_variable)?;
        for (label, &width) in self.col_labels.iter().zip(&widths) {
            write!(f, "  {label:>width$}")?;
        }
        writeln!(f)?;
        for (label, row) in self.row_labels.iter().zip(&self.counts) {
            write!(f, "{label:<label_width$}")?;
            for (count, &width) in row.iter().zip(&widths) {
                write!(f, "  {count:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Outcome of a chi-square test of independence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChiSquareTest {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
    pub expected: Vec<Vec<f64>>,
}

impl ChiSquareTest {
    /// Whether the null hypothesis of independence is rejected at `alpha`.
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Pearson's chi-square test of independence.
///
/// With `correction` set, Yates' continuity correction is applied when the
/// table has one degree of freedom: each observed count is moved half a unit
/// towards its expected value (never past it).
pub fn chi2_contingency(table: &ContingencyTable, correction: bool) -> Result<ChiSquareTest> {
    if table.total() == 0 {
        return Err(Error::InvalidTable("table has no observations".into()));
    }
    let expected = table.expected();
    if expected.iter().flatten().any(|&e| e == 0.0) {
        return Err(Error::InvalidTable(
            "an expected frequency is zero (a row or column has no observations)".into(),
        ));
    }

    let dof = table.dof();
    if dof == 0 {
        return Ok(ChiSquareTest {
            statistic: 0.0,
            p_value: 1.0,
            dof,
            expected,
        });
    }

    let yates = correction && dof == 1;
    let mut statistic = 0.0;
    for (observed_row, expected_row) in table.counts().iter().zip(&expected) {
        for (&observed, &e) in observed_row.iter().zip(expected_row) {
            let mut o = observed as f64;
            if yates {
                let diff = e - o;
                o += diff.signum() * diff.abs().min(0.5);
            }
            statistic += (o - e).powi(2) / e;
        }
    }

    let p_value = chi2_survival(statistic, dof as f64);
    debug!(statistic, p_value, dof, yates, "chi-square test");
    Ok(ChiSquareTest {
        statistic,
        p_value,
        dof,
        expected,
    })
}

/// Upper tail probability of the chi-square distribution with `k` degrees
/// of freedom.
pub fn chi2_survival(x: f64, k: f64) -> f64 {
    regularized_gamma_q(k / 2.0, x / 2.0)
}

const MAX_ITERATIONS: usize = 500;
const EPSILON: f64 = f64::EPSILON;
const TINY: f64 = f64::MIN_POSITIVE / f64::EPSILON;

/// Upper regularized incomplete gamma function Q(a, x).
fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        (1.0 - lower_gamma_series(a, x)).clamp(0.0, 1.0)
    } else {
        upper_gamma_fraction(a, x).clamp(0.0, 1.0)
    }
}

// P(a, x) by its power series; converges quickly for x < a + 1.
fn lower_gamma_series(a: f64, x: f64) -> f64 {
    let mut denom = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..MAX_ITERATIONS {
        denom += 1.0;
        term *= x / denom;
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            break;
        }
    }
    sum * (a * x.ln() - x - ln_gamma(a)).exp()
}

// Q(a, x) by its continued fraction (modified Lentz); for x >= a + 1.
fn upper_gamma_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..MAX_ITERATIONS {
        let n = i as f64;
        let an = -n * (n - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    (a * x.ln() - x - ln_gamma(a)).exp() * h
}

/// Natural log of the gamma function (Lanczos approximation, g = 7).
#[allow(clippy::excessive_precision)]
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINING_CSV: &str = "\
department,training_completed
Sales,Yes
Engineering,Yes
Engineering,No
Sales,No
HR,Yes
Engineering,Yes
Sales,Yes
HR,No
";

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    fn training_table() -> ContingencyTable {
        let observations = Observations::from_csv(TRAINING_CSV, None, None).unwrap();
        ContingencyTable::from_observations(&observations)
    }

    #[test]
    fn reads_csv_columns() {
        let observations = Observations::from_csv(TRAINING_CSV, None, None).unwrap();
        assert_eq!(observations.row_variable, "department");
        assert_eq!(observations.col_variable, "training_completed");
        assert_eq!(observations.pairs.len(), 8);
        assert_eq!(observations.pairs[0], ("Sales".into(), "Yes".into()));
    }

    #[test]
    fn selects_columns_by_name() {
        let csv = "id,outcome,group\n1,\"Yes\",A\n2,No,B\n";
        let observations = Observations::from_csv(csv, Some("group"), Some("outcome")).unwrap();
        assert_eq!(
            observations.pairs,
            vec![("A".into(), "Yes".into()), ("B".into(), "No".into())]
        );
    }

    #[test]
    fn quoted_fields_may_hold_commas() {
        let csv = "department,training_completed\n\"HR, Ops\",Yes\n\"Sales \"\"East\"\"\",No\n";
        let observations = Observations::from_csv(csv, None, None).unwrap();
        assert_eq!(
            observations.pairs,
            vec![
                ("HR, Ops".into(), "Yes".into()),
                ("Sales \"East\"".into(), "No".into())
            ]
        );
    }

    #[test]
    fn unterminated_quote_is_reported() {
        let err = Observations::from_csv("a,b\n\"HR, Ops,Yes\n", None, None).unwrap_err();
        assert!(matches!(err, Error::Data { line: 2, .. }), "got: {err}");
        assert!(err.to_string().contains("unterminated quoted field"));
    }

    #[test]
    fn csv_errors_carry_line_numbers() {
        let err = Observations::from_csv("a,b\nx,y\nz\n", None, None).unwrap_err();
        assert!(matches!(err, Error::Data { line: 3, .. }), "got: {err}");

        let err = Observations::from_csv("a,b\n", Some("c"), None).unwrap_err();
        assert!(err.to_string().contains("no column named 'c'"));

        let err = Observations::from_csv("only\nx\n", None, None).unwrap_err();
        assert!(matches!(err, Error::Data { line: 1, .. }));

        let err = Observations::from_csv("", None, None).unwrap_err();
        assert!(err.to_string().contains("missing header"));
    }

    #[test]
    fn crosstab_is_sorted() {
        let table = training_table();
        assert_eq!(table.row_labels(), ["Engineering", "HR", "Sales"]);
        assert_eq!(table.col_labels(), ["No", "Yes"]);
        assert_eq!(table.counts(), [vec![1, 2], vec![1, 1], vec![1, 2]]);
        assert_eq!(table.count("HR", "No"), 1);
        assert_eq!(table.count("Marketing", "No"), 0);
        assert_eq!(table.row_totals(), [3, 2, 3]);
        assert_eq!(table.col_totals(), [3, 5]);
        assert_eq!(table.total(), 8);
        assert_eq!(table.dof(), 2);
    }

    #[test]
    fn expected_frequencies() {
        let expected = training_table().expected();
        assert!(close(expected[0][0], 1.125, 1e-12));
        assert!(close(expected[1][1], 1.25, 1e-12));
    }

    #[test]
    fn training_dataset_is_not_significant() {
        let result = chi2_contingency(&training_table(), true).unwrap();
        assert_eq!(result.dof, 2);
        assert!(close(result.statistic, 0.177_777_777_8, 1e-9), "{}", result.statistic);
        // With two degrees of freedom the survival function is exp(-x / 2)
        assert!(close(result.p_value, (-result.statistic / 2.0).exp(), 1e-12));
        assert!(close(result.p_value, 0.9149, 1e-4));
        assert!(!result.is_significant(0.05));
    }

    #[test]
    fn yates_correction_on_two_by_two() {
        let table = ContingencyTable::new(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into()],
            vec![vec![10, 20], vec![30, 40]],
        )
        .unwrap();

        let plain = chi2_contingency(&table, false).unwrap();
        let corrected = chi2_contingency(&table, true).unwrap();
        assert_eq!(plain.dof, 1);
        assert!(close(plain.statistic, 0.793_650_793_7, 1e-9), "{}", plain.statistic);
        assert!(close(corrected.statistic, 0.446_428_571_4, 1e-9), "{}", corrected.statistic);
        assert!(corrected.p_value > plain.p_value);
    }

    #[test]
    fn survival_function_known_values() {
        assert!(close(chi2_survival(3.841_458_820_694_124, 1.0), 0.05, 1e-9));
        assert!(close(chi2_survival(5.991_464_547_107_979, 2.0), 0.05, 1e-9));
        assert!(close(chi2_survival(18.307_038_053_275_146, 10.0), 0.05, 1e-9));
        assert_eq!(chi2_survival(0.0, 3.0), 1.0);
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-12));
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-12));
        assert!(close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-12));
    }

    #[test]
    fn single_column_has_no_degrees_of_freedom() {
        let table = ContingencyTable::from_pairs([("a", "yes"), ("b", "yes")]);
        let result = chi2_contingency(&table, true).unwrap();
        assert_eq!(result.dof, 0);
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn degenerate_tables_are_rejected() {
        let empty = ContingencyTable::from_pairs(Vec::<(String, String)>::new());
        assert!(matches!(chi2_contingency(&empty, true), Err(Error::InvalidTable(_))));

        let zero_row = ContingencyTable::new(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into()],
            vec![vec![3, 4], vec![0, 0]],
        )
        .unwrap();
        assert!(matches!(chi2_contingency(&zero_row, true), Err(Error::InvalidTable(_))));

        let short = ContingencyTable::new(vec!["a".into()], vec!["x".into()], vec![vec![1, 2]]);
        assert!(short.is_err());
    }

    #[test]
    fn display_as_crosstab() {
        let rendered = training_table().to_string();
        let expected = [
            format!("{:13}training_completed", ""),
            "department   No  Yes".to_string(),
            "Engineering   1    2".to_string(),
            format!("{:<11}   1    1", "HR"),
            format!("{:<11}   1    2", "Sales"),
        ]
        .join("\n")
            + "\n";
        assert_eq!(rendered, expected);
    }
}
