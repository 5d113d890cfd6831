//! Query DSL parser.
//!
//! Filter tokens can be typed straight into a question:
//!
//! ```text
//! reply to the demand letter path:15_Letters_and_Emails ext:.pdf from:2025-01-01 limit:3
//! ```

use docket_core::{parse_date_bound, Filter};
use tracing::warn;

/// Question text with the filter tokens lifted out.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Remaining query text
    pub text: String,
    /// Extracted filter
    pub filter: Filter,
    /// Result limit
    pub limit: usize,
}

impl ParsedQuery {
    /// Overlay explicitly supplied constraints on the parsed ones.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Filter) -> Self {
        if overrides.path_contains.is_some() {
            self.filter.path_contains = overrides.path_contains;
        }
        if overrides.file_extension.is_some() {
            self.filter.file_extension = overrides.file_extension;
        }
        if overrides.date_from.is_some() {
            self.filter.date_from = overrides.date_from;
        }
        if overrides.date_to.is_some() {
            self.filter.date_to = overrides.date_to;
        }
        self
    }
}

/// Query parser for the DSL.
pub struct QueryParser {
    default_limit: usize,
}

impl QueryParser {
    #[must_use]
    pub fn new(default_limit: usize) -> Self {
        Self { default_limit }
    }

    /// Parse a query string.
    ///
    /// Recognized tokens:
    /// - `path:<substring>`
    /// - `ext:<.pdf>` or `extension:<pdf>` (a missing leading dot is added)
    /// - `from:<date>` / `after:<date>`
    /// - `to:<date>` / `before:<date>`
    /// - `limit:<n>`
    ///
    /// Unknown keys, empty values and unparseable values stay in the text.
    #[must_use]
    pub fn parse(&self, query: &str) -> ParsedQuery {
        let mut text_parts = Vec::new();
        let mut filter = Filter::default();
        let mut limit = self.default_limit;

        for part in query.split_whitespace() {
            let Some((key, value)) = part.split_once(':') else {
                text_parts.push(part);
                continue;
            };
            if value.is_empty() {
                text_parts.push(part);
                continue;
            }

            match key.to_lowercase().as_str() {
                "path" => filter.path_contains = Some(value.to_string()),
                "ext" | "extension" => {
                    let ext = if value.starts_with('.') {
                        value.to_string()
                    } else {
                        format!(".{value}")
                    };
                    filter.file_extension = Some(ext);
                }
                "from" | "after" => match parse_date_bound(value) {
                    Ok(date) => filter.date_from = Some(date),
                    Err(e) => {
                        warn!("Ignoring {}: {}", part, e);
                        text_parts.push(part);
                    }
                },
                "to" | "before" => match parse_date_bound(value) {
                    Ok(date) => filter.date_to = Some(date),
                    Err(e) => {
                        warn!("Ignoring {}: {}", part, e);
                        text_parts.push(part);
                    }
                },
                "limit" => match value.parse::<usize>() {
                    Ok(n) if n > 0 => limit = n,
                    _ => text_parts.push(part),
                },
                _ => text_parts.push(part),
            }
        }

        ParsedQuery {
            text: text_parts.join(" "),
            filter,
            limit,
        }
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_question() {
        let parsed = QueryParser::default().parse("who signed the settlement?");
        assert_eq!(parsed.text, "who signed the settlement?");
        assert!(parsed.filter.is_empty());
        assert_eq!(parsed.limit, 5);
    }

    #[test]
    fn test_parse_all_tokens() {
        let parsed = QueryParser::new(10)
            .parse("demand letter path:15_Letters ext:pdf from:2025-01-01 to:2025-12-31 limit:3");

        assert_eq!(parsed.text, "demand letter");
        assert_eq!(parsed.filter.path_contains.as_deref(), Some("15_Letters"));
        assert_eq!(parsed.filter.file_extension.as_deref(), Some(".pdf"));
        assert_eq!(
            parsed.filter.date_from.unwrap().to_string(),
            "2025-01-01 00:00:00"
        );
        assert_eq!(
            parsed.filter.date_to.unwrap().to_string(),
            "2025-12-31 00:00:00"
        );
        assert_eq!(parsed.limit, 3);
    }

    #[test]
    fn test_invalid_values_stay_in_text() {
        let parsed = QueryParser::default().parse("hearing from:yesterday limit:none path:");
        assert_eq!(parsed.text, "hearing from:yesterday limit:none path:");
        assert!(parsed.filter.is_empty());
        assert_eq!(parsed.limit, 5);
    }

    #[test]
    fn test_unknown_keys_and_drive_letters_stay_in_text() {
        let parsed = QueryParser::default().parse("see C:/cases/file.pdf note:urgent");
        assert_eq!(parsed.text, "see C:/cases/file.pdf note:urgent");
        assert!(parsed.filter.is_empty());
    }

    #[test]
    fn test_with_overrides() {
        let parsed = QueryParser::default().parse("q path:a ext:.txt");
        let merged = parsed.with_overrides(Filter {
            path_contains: Some("b".into()),
            ..Filter::default()
        });
        assert_eq!(merged.filter.path_contains.as_deref(), Some("b"));
        assert_eq!(merged.filter.file_extension.as_deref(), Some(".txt"));
    }
}
