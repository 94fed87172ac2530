//! Remote image host allowlist.
//!
//! The front-end only renders images from hosts listed here, so the same list is published on
//! `GET /api/config` and consulted when the storage resolver hands out a URL.
//!
//! Hostname patterns follow the usual remote-pattern conventions:
//!
//! - `cdn.example.com` matches exactly that host
//! - `*.example.com` matches a single subdomain label (`a.example.com`, not `a.b.example.com`)
//! - `**.example.com` matches any depth of subdomains
//!
//! Pathname patterns may end in `/*` (one more segment) or `/**` (any suffix).

use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RemotePattern {
    /// `http` or `https`; any scheme when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathname: Option<String>,
}

impl RemotePattern {
    pub fn matches(&self, url: &Url) -> bool {
        if let Some(protocol) = &self.protocol
            && !protocol.eq_ignore_ascii_case(url.scheme())
        {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        if !hostname_matches(&self.hostname, host) {
            return false;
        }

        if let Some(port) = self.port
            && url.port_or_known_default() != Some(port)
        {
            return false;
        }

        match &self.pathname {
            Some(pattern) => pathname_matches(pattern, url.path()),
            None => true,
        }
    }
}

fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    if let Some(suffix) = pattern.strip_prefix("**.") {
        return host
            .strip_suffix(suffix)
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|sub| !sub.is_empty());
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host
            .strip_suffix(suffix)
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|label| !label.is_empty() && !label.contains('.'));
    }
    pattern == host
}

fn pathname_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path == prefix || path.starts_with(&format!("{prefix}/"));
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path
            .strip_prefix(&format!("{prefix}/"))
            .is_some_and(|segment| !segment.is_empty() && !segment.contains('/'));
    }
    pattern == path
}

/// The configured set of patterns.
#[derive(Debug, Clone, Default)]
pub struct ImageAllowlist {
    patterns: Vec<RemotePattern>,
}

impl ImageAllowlist {
    pub fn new(patterns: Vec<RemotePattern>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[RemotePattern] {
        &self.patterns
    }

    /// Whether `url` parses and is covered by at least one pattern.
    pub fn is_allowed(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(url) => self.patterns.iter().any(|p| p.matches(&url)),
            Err(_) => false,
        }
    }
}
