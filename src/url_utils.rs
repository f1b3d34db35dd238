//! URL canonicalization and scope helpers (SPEC_FULL §2's tenth component).
//!
//! No teacher equivalent exists — `foiacquire` stores whatever URL string a
//! scraper handed it and never re-canonicalizes. Rules here come directly
//! from spec.md §3's URL invariant and §4.F's domain-extraction note.

use url::Url;

/// Canonicalize a URL per spec.md §3: lowercase scheme and host, strip the
/// default port for the scheme, drop the fragment, collapse duplicate
/// slashes in the path, and normalize percent-encoding via the `url` crate's
/// own parser (which already does this on parse).
pub fn canonicalize(raw: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(raw)?;

    url.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        let _ = url.set_host(Some(&lowered));
    }

    let is_default_port = match (url.scheme(), url.port()) {
        ("http", Some(80)) => true,
        ("https", Some(443)) => true,
        _ => false,
    };
    if is_default_port {
        let _ = url.set_port(None);
    }

    let collapsed = collapse_slashes(url.path());
    url.set_path(&collapsed);

    Ok(url.into())
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Extract the registrable domain used for politeness-scheduling buckets:
/// lowercase host, `www.` prefix stripped, port dropped.
pub fn extract_domain(raw: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(raw)?;
    let host = url.host_str().unwrap_or_default().to_lowercase();
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Scope boundary a crawl's frontier is checked against (spec.md §4.G).
pub enum ScopeFilter {
    /// Only the seed page itself; no multi-page crawl.
    Page,
    /// Any URL whose path starts with the seed's path.
    PathPrefix,
    /// Any URL on the same host as the seed.
    Host,
    /// Caller-supplied predicate; the crate ships no concrete instance
    /// (spec.md §9 Open Question 2: kept opaque).
    Custom(Box<dyn Fn(&Url, &Url) -> bool + Send + Sync>),
}

impl ScopeFilter {
    /// True if `candidate` falls within scope relative to the crawl's `seed`.
    pub fn in_scope(&self, seed: &Url, candidate: &Url) -> bool {
        match self {
            ScopeFilter::Page => candidate == seed,
            ScopeFilter::PathPrefix => {
                seed.host_str() == candidate.host_str() && candidate.path().starts_with(seed.path())
            }
            ScopeFilter::Host => seed.host_str() == candidate.host_str(),
            ScopeFilter::Custom(f) => f(seed, candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_default_port_and_fragment() {
        let result = canonicalize("HTTPS://Example.org:443/a/b#section").unwrap();
        assert_eq!(result, "https://example.org/a/b");
    }

    #[test]
    fn canonicalize_keeps_nondefault_port() {
        let result = canonicalize("http://example.org:8080/a").unwrap();
        assert_eq!(result, "http://example.org:8080/a");
    }

    #[test]
    fn canonicalize_collapses_duplicate_slashes() {
        let result = canonicalize("https://example.org//a///b").unwrap();
        assert_eq!(result, "https://example.org/a/b");
    }

    #[test]
    fn extract_domain_strips_www_and_port() {
        assert_eq!(
            extract_domain("https://WWW.Example.org:8443/x").unwrap(),
            "example.org"
        );
    }

    #[test]
    fn scope_filter_path_prefix() {
        let seed = Url::parse("https://example.org/docs/").unwrap();
        let in_scope = Url::parse("https://example.org/docs/page1").unwrap();
        let out_of_scope = Url::parse("https://example.org/other").unwrap();
        let filter = ScopeFilter::PathPrefix;
        assert!(filter.in_scope(&seed, &in_scope));
        assert!(!filter.in_scope(&seed, &out_of_scope));
    }

    #[test]
    fn scope_filter_host() {
        let seed = Url::parse("https://example.org/docs/").unwrap();
        let same_host = Url::parse("https://example.org/other").unwrap();
        let other_host = Url::parse("https://other.org/docs/").unwrap();
        let filter = ScopeFilter::Host;
        assert!(filter.in_scope(&seed, &same_host));
        assert!(!filter.in_scope(&seed, &other_host));
    }

    #[test]
    fn scope_filter_custom_is_opaque() {
        let seed = Url::parse("https://example.org/").unwrap();
        let candidate = Url::parse("https://example.org/x").unwrap();
        let filter = ScopeFilter::Custom(Box::new(|_, c| c.path().len() > 1));
        assert!(filter.in_scope(&seed, &candidate));
    }
}
