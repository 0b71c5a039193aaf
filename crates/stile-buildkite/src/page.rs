//! Pagination for list endpoints.
//!
//! Buildkite paginates with `page`/`per_page` query parameters and reports
//! neighbouring pages in an RFC 8288 `Link` header:
//!
//! ```text
//! <https://api.buildkite.com/v2/...?page=2&per_page=30>; rel="next", <...?page=5&per_page=30>; rel="last"
//! ```

use std::sync::OnceLock;

use regex_lite::Regex;
use url::Url;

/// Sentinel page number meaning "no further pages".
pub const LAST_PAGE: u32 = 0;

/// Query options for one list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Page to request; `None` lets the provider return its first page
    pub page: Option<u32>,
    /// Records per page
    pub per_page: u32,
}

impl ListOptions {
    /// Options for the first request of a listing.
    pub fn first(per_page: u32) -> Self {
        Self {
            page: None,
            per_page,
        }
    }

    /// Advance to `page`, keeping the page size.
    pub fn with_page(self, page: u32) -> Self {
        Self {
            page: Some(page),
            ..self
        }
    }

    /// Query string pairs for this request.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs.push(("per_page", self.per_page.to_string()));
        pairs
    }
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<([^>]*)>((?:\s*;\s*[^;,]+)*)"#).expect("link pattern is valid")
    })
}

fn rel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"rel\s*=\s*"?([^";,]+)"?"#).expect("rel pattern is valid")
    })
}

/// Extract the `rel="next"` page number from a `Link` header value.
///
/// Returns [`LAST_PAGE`] when there is no `next` relation or its URL has no
/// usable `page` parameter.
pub fn next_page_from_link(header: &str) -> u32 {
    for link in link_pattern().captures_iter(header) {
        let target = &link[1];
        let params = link.get(2).map(|m| m.as_str()).unwrap_or("");

        let is_next = rel_pattern().captures_iter(params).any(|rel| {
            rel[1].split_whitespace().any(|r| r.eq_ignore_ascii_case("next"))
        });
        if !is_next {
            continue;
        }

        return page_param(target).unwrap_or(LAST_PAGE);
    }
    LAST_PAGE
}

fn page_param(target: &str) -> Option<u32> {
    let url = Url::parse(target).ok()?;
    let (_, page) = url.query_pairs().find(|(key, _)| key == "page")?;
    page.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_omits_page() {
        let opts = ListOptions::first(30);
        assert_eq!(opts.query_pairs(), vec![("per_page", "30".to_string())]);

        let opts = opts.with_page(2);
        assert_eq!(
            opts.query_pairs(),
            vec![("page", "2".to_string()), ("per_page", "30".to_string())]
        );
    }

    #[test]
    fn test_next_page_from_link() {
        let header = r#"<https://api.buildkite.com/v2/organizations/o/pipelines/p/builds/42/artifacts?page=2&per_page=30>; rel="next", <https://api.buildkite.com/v2/organizations/o/pipelines/p/builds/42/artifacts?page=5&per_page=30>; rel="last""#;
        assert_eq!(next_page_from_link(header), 2);
    }

    #[test]
    fn test_next_relation_in_any_position() {
        let header = r#"<https://x/a?page=1>; rel="first", <https://x/a?page=3>; rel="prev", <https://x/a?per_page=10&page=5>; rel="next""#;
        assert_eq!(next_page_from_link(header), 5);
    }

    #[test]
    fn test_last_page_has_no_next() {
        let header = r#"<https://x/a?page=1>; rel="first", <https://x/a?page=4>; rel="prev""#;
        assert_eq!(next_page_from_link(header), LAST_PAGE);
        assert_eq!(next_page_from_link(""), LAST_PAGE);
    }

    #[test]
    fn test_next_without_page_param() {
        let header = r#"<https://x/a?per_page=10>; rel="next""#;
        assert_eq!(next_page_from_link(header), LAST_PAGE);
    }

    #[test]
    fn test_unquoted_rel() {
        let header = "<https://x/a?page=7>; rel=next";
        assert_eq!(next_page_from_link(header), 7);
    }
}
