//! Subscription URL parsing

use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use sx_core::SubscriptionError;

/// Path of the panel's subscription endpoint
pub const SUBSCRIBE_PATH: &str = "/api/v1/client/subscribe";

/// Path of the panel's account endpoint
pub const USER_INFO_PATH: &str = "/api/v1/user/info";

/// Where a subscription is fetched from
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSource {
    /// Panel base URL without trailing slash, e.g. `https://panel.example.com`
    pub base_url: String,
    /// Account token
    pub token: String,
}

impl SubscriptionSource {
    /// Build a source from a subscription URL and an optional explicit token.
    ///
    /// Understands `https://host/api/v1/client/subscribe?token=T` and
    /// `https://host/sub/T`. Any other URL is taken as the panel base and then
    /// needs a token, either explicit or as a `token` query parameter. An
    /// explicit token always wins. A missing scheme defaults to `https://`.
    pub fn parse(raw: &str, explicit_token: Option<&str>) -> Result<Self, SubscriptionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SubscriptionError::InvalidUrl("empty URL".to_string()));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let mut url = Url::parse(&with_scheme)
            .map_err(|e| SubscriptionError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SubscriptionError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let query_token = url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned());
        let path = url.path().trim_end_matches('/').to_string();

        let (base_path, embedded) = if let Some(idx) = path.find(SUBSCRIBE_PATH) {
            (path[..idx].to_string(), query_token)
        } else if let Some(idx) = path.find("/sub/") {
            let token = path[idx + "/sub/".len()..].trim_matches('/').to_string();
            (path[..idx].to_string(), Some(token))
        } else {
            (path, query_token)
        };

        let token = explicit_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or(embedded.filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                SubscriptionError::InvalidUrl(format!("no token found in '{}'", redact(trimmed)))
            })?;

        url.set_path(&base_path);
        url.set_query(None);
        url.set_fragment(None);
        let base_url = url.as_str().trim_end_matches('/').to_string();

        Ok(Self { base_url, token })
    }

    /// Full URL of a panel endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl fmt::Debug for SubscriptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSource")
            .field("base_url", &self.base_url)
            .field("token", &redact(&self.token))
            .finish()
    }
}

impl fmt::Display for SubscriptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Keep only a short prefix of anything that may carry a token.
fn redact(s: &str) -> String {
    let visible: String = s.chars().take(4).collect();
    if visible.len() < s.len() {
        format!("{}***", visible)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_url() {
        let source = SubscriptionSource::parse(
            "https://panel.example.com/api/v1/client/subscribe?token=abc123&flag=sing",
            None,
        )
        .unwrap();
        assert_eq!(source.base_url, "https://panel.example.com");
        assert_eq!(source.token, "abc123");
    }

    #[test]
    fn test_parse_short_url() {
        let source = SubscriptionSource::parse("https://panel.example.com/sub/tok42/", None).unwrap();
        assert_eq!(source.base_url, "https://panel.example.com");
        assert_eq!(source.token, "tok42");
    }

    #[test]
    fn test_parse_keeps_path_prefix_and_port() {
        let source = SubscriptionSource::parse(
            "http://10.0.0.2:8443/panel/api/v1/client/subscribe?token=t",
            None,
        )
        .unwrap();
        assert_eq!(source.base_url, "http://10.0.0.2:8443/panel");
    }

    #[test]
    fn test_bare_host_with_explicit_token() {
        let source = SubscriptionSource::parse("panel.example.com/", Some("xyz")).unwrap();
        assert_eq!(source.base_url, "https://panel.example.com");
        assert_eq!(source.token, "xyz");
    }

    #[test]
    fn test_explicit_token_overrides_embedded() {
        let source =
            SubscriptionSource::parse("https://p.example.com/sub/old", Some("new")).unwrap();
        assert_eq!(source.token, "new");
    }

    #[test]
    fn test_missing_token_is_invalid() {
        let err = SubscriptionSource::parse("https://panel.example.com", None).unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidUrl(_)));

        let err = SubscriptionSource::parse(
            "https://panel.example.com/api/v1/client/subscribe",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidUrl(_)));
    }

    #[test]
    fn test_rejects_other_schemes() {
        let err = SubscriptionSource::parse("ftp://panel.example.com/sub/t", None).unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidUrl(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let source = SubscriptionSource::parse("https://p.example.com/sub/supersecret", None).unwrap();
        let debug = format!("{:?}", source);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("supe***"));
    }
}
