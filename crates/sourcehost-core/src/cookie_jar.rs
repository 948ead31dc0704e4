//! The per-instance, hostname-scoped cookie jar (spec.md §3.3).
//!
//! Best-effort: no expiry, no path handling, just enough to keep a search
//! plugin's session cookie alive across a handful of requests. `Set-Cookie`
//! headers are parsed for the first `name=value` token and stored keyed by
//! `hostname:name`.

use std::collections::HashMap;
use std::sync::Mutex;

use url::Url;

#[derive(Default)]
pub struct CookieJar {
    inner: Mutex<HashMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first `name=value` pair in a single `Set-Cookie` header
    /// value for `url`'s host.
    pub fn store(&self, url: &str, set_cookie_value: &str) {
        let Some(host) = host_of(url) else { return };
        let Some((name, value)) = set_cookie_value.split(';').next().and_then(parse_pair) else {
            return;
        };
        let key = format!("{host}:{name}");
        self.inner.lock().unwrap().insert(key, value);
    }

    /// Every stored `name=value` pair whose key's host is `url`'s host or a
    /// parent domain of it, joined as a `Cookie` header value.
    pub fn header_for(&self, url: &str) -> Option<String> {
        let host = host_of(url)?;
        let inner = self.inner.lock().unwrap();
        let mut pairs: Vec<String> = inner
            .iter()
            .filter_map(|(key, value)| {
                let (entry_host, name) = key.split_once(':')?;
                if host == entry_host || host.ends_with(&format!(".{entry_host}")) {
                    Some(format!("{name}={value}"))
                } else {
                    None
                }
            })
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        Some(pairs.join("; "))
    }

    /// Merge stored cookies ahead of any explicit `Cookie` header the
    /// request already carries (spec.md §4.5 step 2: "stored cookies prepend
    /// any explicit Cookie header").
    pub fn merge_into(&self, url: &str, existing: Option<&str>) -> Option<String> {
        let stored = self.header_for(url);
        match (stored, existing) {
            (Some(stored), Some(existing)) if !existing.is_empty() => Some(format!("{stored}; {existing}")),
            (Some(stored), _) => Some(stored),
            (None, Some(existing)) if !existing.is_empty() => Some(existing.to_string()),
            (None, _) => None,
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|s| s.to_string())
}

fn parse_pair(token: &str) -> Option<(String, String)> {
    let (name, value) = token.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_flows_to_subdomains_not_other_hosts() {
        let jar = CookieJar::new();
        jar.store("https://x.y/path", "a=1; Path=/; HttpOnly");

        assert_eq!(jar.header_for("https://x.y/other"), Some("a=1".to_string()));
        assert_eq!(jar.header_for("https://sub.x.y/other"), Some("a=1".to_string()));
        assert_eq!(jar.header_for("https://z/"), None);
    }

    #[test]
    fn merge_prepends_stored_cookies() {
        let jar = CookieJar::new();
        jar.store("https://x.y/", "a=1");
        let merged = jar.merge_into("https://x.y/", Some("b=2"));
        assert_eq!(merged, Some("a=1; b=2".to_string()));
    }

    #[test]
    fn merge_with_nothing_stored_keeps_existing() {
        let jar = CookieJar::new();
        assert_eq!(jar.merge_into("https://x.y/", Some("b=2")), Some("b=2".to_string()));
        assert_eq!(jar.merge_into("https://x.y/", None), None);
    }
}
