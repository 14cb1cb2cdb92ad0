//! URL extraction and cleanup for free text.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Punctuation stripped from the end of a matched URL.
pub const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')', '!', '?'];

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").expect("static URL pattern"))
}

/// Find every `http://` / `https://` URL in `text`, in first-occurrence order,
/// with trailing punctuation removed. Duplicates are kept.
pub fn find_and_clean_urls(text: &str) -> Vec<String> {
    url_pattern()
        .find_iter(text)
        .map(|m| clean_url(m.as_str()).to_string())
        .collect()
}

/// Strip trailing punctuation from a single URL.
pub fn clean_url(url: &str) -> &str {
    url.trim_end_matches(TRAILING_PUNCTUATION)
}

/// Remove every URL substring from `text` and trim the remainder.
pub fn strip_urls(text: &str) -> String {
    url_pattern().replace_all(text, "").trim().to_string()
}

/// De-duplicate while keeping the first occurrence of each URL in place.
pub fn dedup_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Host of `url`, lowercased, if it parses.
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// True when `url`'s host is `domain` or a subdomain of it.
pub fn is_on_domain(url: &str, domain: &str) -> bool {
    let domain = domain.to_ascii_lowercase();
    match host_of(url) {
        Some(host) => host == domain || host.ends_with(&format!(".{}", domain)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_and_cleans_urls() {
        let text = "Check out https://example.com. Also, see http://test.com/page, and one more (https://another.com/).";
        assert_eq!(
            find_and_clean_urls(text),
            vec![
                "https://example.com",
                "http://test.com/page",
                "https://another.com/"
            ]
        );
    }

    #[test]
    fn keeps_duplicates_in_order() {
        let text = "a https://x.io b https://y.io c https://x.io";
        assert_eq!(
            find_and_clean_urls(text),
            vec!["https://x.io", "https://y.io", "https://x.io"]
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let samples = [
            "see https://example.com/a?b=c!?).",
            "(http://test.com/page),",
            "https://x.y/z:;",
            "no links here",
        ];
        for sample in samples {
            for url in find_and_clean_urls(sample) {
                assert_eq!(find_and_clean_urls(&url), vec![url.clone()]);
            }
        }
    }

    #[test]
    fn text_without_urls_yields_nothing() {
        assert!(find_and_clean_urls("ftp://nope and www.example.com").is_empty());
    }

    #[test]
    fn strip_urls_leaves_question() {
        assert_eq!(
            strip_urls("What is on https://example.com/page? please"),
            "What is on  please"
        );
        assert_eq!(strip_urls("  https://example.com  "), "");
    }

    #[test]
    fn dedup_preserves_first_occurrence() {
        let urls = vec![
            "https://b.io".to_string(),
            "https://a.io".to_string(),
            "https://b.io".to_string(),
        ];
        assert_eq!(dedup_urls(urls), vec!["https://b.io", "https://a.io"]);
    }

    #[test]
    fn domain_matching() {
        assert!(is_on_domain("https://is.gd/abc", "is.gd"));
        assert!(is_on_domain("https://www.is.gd/abc", "is.gd"));
        assert!(!is_on_domain("https://this.gdx/abc", "is.gd"));
        assert!(!is_on_domain("not a url", "is.gd"));
    }
}
