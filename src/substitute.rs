use tracing::debug;

use crate::config::Substitution;

/// Apply literal replacements in list order.
///
/// Order matters when one pattern contains another: `χ²` has to be replaced
/// before `χ`.
pub fn apply(substitutions: &[Substitution], text: &str) -> String {
    let mut out = text.to_string();
    for sub in substitutions {
        if sub.from.is_empty() || !out.contains(&sub.from) {
            continue;
        }
        debug!(from = %sub.from, to = %sub.to, "substituting");
        out = out.replace(&sub.from, &sub.to);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn default_substitutions() {
        let config = Config::default();
        assert_eq!(
            apply(&config.substitutions, "χ² = 3.2, χ = 1.8, μ = 0"),
            "(Chi-Square) = 3.2, Chi = 1.8, mu = 0"
        );
    }

    #[test]
    fn order_is_respected() {
        let reversed = [
            Substitution::new("χ", "Chi"),
            Substitution::new("χ²", "(Chi-Square)"),
        ];
        assert_eq!(apply(&reversed, "χ²"), "Chi²");
    }

    #[test]
    fn empty_pattern_is_ignored() {
        assert_eq!(apply(&[Substitution::new("", "x")], "abc"), "abc");
    }

    #[test]
    fn no_substitutions() {
        assert_eq!(apply(&[], "χ²"), "χ²");
    }
}
