//! Title normalization and year tolerance used by fuzzy matching.
//!
//! # Algorithm
//!
//! 1. Lower-case.
//! 2. Decompose to NFD so accented letters become base letter + mark.
//! 3. Drop combining marks, then everything that is not alphanumeric.
//!
//! ```rust
//! use watchlist_sync_core::normalize::normalize_title;
//!
//! assert_eq!(normalize_title("Amélie!"), normalize_title("amelie"));
//! assert_eq!(normalize_title("Spider-Man: No Way Home"), "spidermannowayhome");
//! ```

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Case, diacritic and punctuation insensitive form of a title.
///
/// Idempotent: `normalize_title(&normalize_title(s)) == normalize_title(s)`.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    lowered
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Compare two titles after normalization.
///
/// Titles that normalize to nothing (punctuation only, empty) never match.
pub fn titles_match(a: &str, b: &str) -> bool {
    let a = normalize_title(a);
    !a.is_empty() && a == normalize_title(b)
}

/// `true` when the years are at most one apart or either is unknown.
pub fn years_compatible(wanted: Option<i32>, candidate: Option<i32>) -> bool {
    match (wanted, candidate) {
        (Some(w), Some(c)) => w.abs_diff(c) <= 1,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diacritics_case_and_punctuation_ignored() {
        assert_eq!(normalize_title("Amélie!"), normalize_title("amelie"));
        assert_eq!(normalize_title("Amélie!"), "amelie");
        assert_eq!(normalize_title("  L'Été   Dernier "), "letedernier");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for s in ["Amélie!", "Spider-Man: No Way Home", "Crouching Tiger (臥虎藏龍)", ""] {
            let once = normalize_title(s);
            assert_eq!(normalize_title(&once), once);
        }
    }

    #[test]
    fn test_non_latin_titles_survive() {
        assert_eq!(normalize_title("千と千尋の神隠し"), "千と千尋の神隠し");
    }

    #[test]
    fn test_empty_normalized_titles_never_match() {
        assert!(!titles_match("!!!", "???"));
        assert!(!titles_match("", ""));
        assert!(titles_match("Dune", "DUNE."));
    }

    #[test]
    fn test_year_tolerance() {
        assert!(years_compatible(Some(2012), Some(2011)));
        assert!(years_compatible(Some(2012), Some(2013)));
        assert!(years_compatible(Some(2012), Some(2012)));
        assert!(!years_compatible(Some(2012), Some(2010)));
        assert!(!years_compatible(Some(2012), Some(2014)));
    }

    #[test]
    fn test_extreme_years_do_not_overflow() {
        assert!(!years_compatible(Some(2021), Some(i32::MIN)));
        assert!(!years_compatible(Some(i32::MIN), Some(i32::MAX)));
        assert!(years_compatible(Some(i32::MAX), Some(i32::MAX - 1)));
    }

    #[test]
    fn test_unknown_years_are_compatible() {
        assert!(years_compatible(None, Some(1999)));
        assert!(years_compatible(Some(1999), None));
        assert!(years_compatible(None, None));
    }
}
