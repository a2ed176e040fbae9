//! Status glyphs for fetch and proxy listing output.

use console::{style, StyledObject};

/// Output written (green ✓).
pub fn success() -> StyledObject<&'static str> {
    style("✓").green()
}

/// Run or resolution starting (cyan →).
pub fn info() -> StyledObject<&'static str> {
    style("→").cyan()
}

/// Nothing to show, e.g. an empty proxy source (yellow !).
pub fn warn() -> StyledObject<&'static str> {
    style("!").yellow()
}

/// Exhausted, cancelled or failed to persist (red ✗).
pub fn error() -> StyledObject<&'static str> {
    style("✗").red()
}

/// Detail line under a headline, such as an attempt record.
pub fn dim_arrow() -> StyledObject<&'static str> {
    style("→").dim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_glyphs_are_distinct() {
        console::set_colors_enabled(false);
        assert_eq!(success().to_string(), "✓");
        assert_eq!(error().to_string(), "✗");
        assert_eq!(warn().to_string(), "!");
        assert_eq!(info().to_string(), dim_arrow().to_string());
    }
}
