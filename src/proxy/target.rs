//! Target resolution
//!
//! Validates the client supplied target URL, strips characters that could be
//! used for header or markup injection and derives the origin that every
//! relative reference in the upstream response is resolved against.

use url::Url;

use crate::error::{Result, WaypointError};

/// Characters never allowed to reach a constructed response
const UNSAFE_CHARS: &[char] = &['<', '>', '"', '\'', '`'];

/// Strip injection-prone characters; idempotent
pub fn sanitize(input: &str) -> String {
    input.chars().filter(|c| !UNSAFE_CHARS.contains(c)).collect()
}

/// A validated proxy target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// The sanitized, parsed target URL
    pub url: Url,
    /// `scheme://host[:port]` of the target
    pub origin: String,
    /// Country/egress hint carried through every derived link
    pub country: Option<String>,
}

impl TargetDescriptor {
    /// Validate and normalize a raw target URL
    pub fn resolve(raw_url: Option<&str>, country: Option<&str>) -> Result<Self> {
        let raw = raw_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WaypointError::MissingTargetUrl)?;

        let sanitized = sanitize(raw);
        let url = Url::parse(&sanitized)?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(WaypointError::InvalidTargetUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(WaypointError::InvalidTargetUrl("missing host".into()));
        }

        let origin = url.origin().ascii_serialization();

        Ok(Self {
            url,
            origin,
            country: normalize_hint(country),
        })
    }

    /// Host of the target, used for logging
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// Sanitize and lower-case an egress hint, dropping empty values
pub fn normalize_hint(country: Option<&str>) -> Option<String> {
    country
        .map(sanitize)
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize(r#"<script>"x"'y'`z`</script>"#), "scriptxyz/script");
        assert_eq!(sanitize("https://ex.com/a?b=1"), "https://ex.com/a?b=1");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in [
            "plain",
            "<<>>",
            r#"a"b'c`d<e>f"#,
            "https://ex.com/<img src='x'>",
            "ünïcödé <ok>",
        ] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {}", input);
        }
    }

    #[test]
    fn test_resolve_derives_origin() {
        let target = TargetDescriptor::resolve(Some("https://ex.com/a/b?c=d"), None).unwrap();
        assert_eq!(target.origin, "https://ex.com");
        assert_eq!(target.host(), "ex.com");
        assert!(target.country.is_none());

        let target = TargetDescriptor::resolve(Some("http://ex.com:8080/x"), Some(" US ")).unwrap();
        assert_eq!(target.origin, "http://ex.com:8080");
        assert_eq!(target.country.as_deref(), Some("us"));
    }

    #[test]
    fn test_resolve_sanitizes_before_parsing() {
        let target =
            TargetDescriptor::resolve(Some("https://ex.com/<b>\"page\""), Some("<de>")).unwrap();
        assert_eq!(target.url.as_str(), "https://ex.com/bpage");
        assert_eq!(target.country.as_deref(), Some("de"));
    }

    #[test]
    fn test_resolve_rejects_missing_and_invalid() {
        assert!(matches!(
            TargetDescriptor::resolve(None, None),
            Err(WaypointError::MissingTargetUrl)
        ));
        assert!(matches!(
            TargetDescriptor::resolve(Some("   "), None),
            Err(WaypointError::MissingTargetUrl)
        ));
        assert!(matches!(
            TargetDescriptor::resolve(Some("not a url"), None),
            Err(WaypointError::InvalidTargetUrl(_))
        ));
        assert!(matches!(
            TargetDescriptor::resolve(Some("/relative/path"), None),
            Err(WaypointError::InvalidTargetUrl(_))
        ));
        assert!(matches!(
            TargetDescriptor::resolve(Some("ftp://ex.com/file"), None),
            Err(WaypointError::InvalidTargetUrl(_))
        ));
    }

    #[test]
    fn test_empty_hint_is_dropped() {
        assert_eq!(normalize_hint(Some("")), None);
        assert_eq!(normalize_hint(Some("'`")), None);
        assert_eq!(normalize_hint(None), None);
    }
}
