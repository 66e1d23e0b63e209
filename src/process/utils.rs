/// Trim whitespace and strip one pair of outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// A cell counts as missing when it is null or blank after cleaning.
pub fn is_missing(raw: Option<&str>) -> bool {
    raw.map_or(true, |s| clean_str(s).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_str_strips_quotes_and_space() {
        assert_eq!(clean_str("  \"Norte\" "), "Norte");
        assert_eq!(clean_str("42"), "42");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn blank_and_null_are_missing() {
        assert!(is_missing(None));
        assert!(is_missing(Some("")));
        assert!(is_missing(Some("   ")));
        assert!(is_missing(Some("\"\"")));
        assert!(!is_missing(Some("0")));
    }
}
