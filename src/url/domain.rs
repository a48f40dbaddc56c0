use std::collections::BTreeSet;
use url::Url;

/// Extracts the domain from a URL
///
/// Returns the lowercase host, or None for URLs without one.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use listing_relay::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true if `url` is on one of the given hosts
///
/// A leading `www.` is ignored on both sides so that `www.example.com` and
/// `example.com` count as the same site.
pub fn same_site(url: &Url, hosts: &BTreeSet<String>) -> bool {
    match extract_domain(url) {
        Some(domain) => {
            let bare = domain.strip_prefix("www.").unwrap_or(&domain);
            hosts
                .iter()
                .any(|h| h.strip_prefix("www.").unwrap_or(h) == bare)
        }
        None => false,
    }
}
