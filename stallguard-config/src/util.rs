//! Small string helpers shared by the sources and settings.

/// Split a semicolon-delimited address list.
///
/// Segments are trimmed and empty ones discarded, so `"a@x.com;;b@x.com "`
/// yields two addresses. No address validation happens here.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(';')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// `None` for values that are empty once trimmed.
pub fn non_blank(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_segments_are_discarded() {
        assert_eq!(
            split_recipients("a@x.com;;b@x.com"),
            vec!["a@x.com", "b@x.com"]
        );
    }

    #[test]
    fn segments_are_trimmed() {
        assert_eq!(
            split_recipients(" a@x.com ; ;\tb@x.com;"),
            vec!["a@x.com", "b@x.com"]
        );
    }

    #[test]
    fn blank_input_has_no_recipients() {
        assert!(split_recipients("").is_empty());
        assert!(split_recipients(" ; ;").is_empty());
    }

    #[test]
    fn malformed_entries_are_kept_for_the_notifier() {
        assert_eq!(
            split_recipients("nope;ops@example.com"),
            vec!["nope", "ops@example.com"]
        );
    }

    #[test]
    fn non_blank_filters_whitespace() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("x".into())), Some("x".into()));
    }
}
