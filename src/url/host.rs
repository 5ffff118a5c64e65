use url::Url;

/// Returns the lowercase host of a URL, or None if it has no host
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the lowercase host plus any explicit non-default port
///
/// `https://Example.com/` gives `example.com`, `http://example.com:8080/`
/// gives `example.com:8080`. Distinct ports on one host are distinct
/// servers as far as politeness is concerned.
pub fn authority_key(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Checks if a host matches a pattern
///
/// `"example.com"` matches only itself. `"*.example.com"` matches the bare
/// host and any subdomain. Comparison is case-insensitive.
pub fn matches_host_pattern(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(base) => {
            host == base
                || (host.len() > base.len() + 1
                    && host.ends_with(base)
                    && host.as_bytes()[host.len() - base.len() - 1] == b'.')
        }
        None => host == pattern,
    }
}
