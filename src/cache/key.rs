//! Deterministic cache key construction.

use axum::http::Method;
use url::form_urlencoded;

/// A cache key: `cache:{service}:{METHOD}:{path}[:{query}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key. Paths are normalized and query parameters sorted, so
    /// equivalent requests share one entry, and the service name keeps
    /// services sharing a path apart.
    pub fn new(service: &str, method: &Method, path: &str, query: Option<&str>) -> Self {
        let mut key = format!(
            "cache:{}:{}:{}",
            service,
            method.as_str().to_ascii_uppercase(),
            normalize_path(path)
        );

        if let Some(query) = query.map(sorted_query).filter(|q| !q.is_empty()) {
            key.push(':');
            key.push_str(&query);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse duplicate and trailing slashes.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Decode, sort by (name, value), and re-encode query parameters.
fn sorted_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    pairs.sort();
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = CacheKey::new("catalog", &Method::GET, "/items/42", Some("b=2&a=1"));
        assert_eq!(key.as_str(), "cache:catalog:GET:/items/42:a=1&b=2");

        let bare = CacheKey::new("catalog", &Method::GET, "/items/42", None);
        assert_eq!(bare.as_str(), "cache:catalog:GET:/items/42");
    }

    #[test]
    fn test_query_order_is_irrelevant() {
        let a = CacheKey::new("s", &Method::GET, "/p", Some("x=1&y=2&x=0"));
        let b = CacheKey::new("s", &Method::GET, "/p", Some("x=0&y=2&x=1"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_path_normalization() {
        let a = CacheKey::new("s", &Method::GET, "/items//42/", None);
        let b = CacheKey::new("s", &Method::GET, "/items/42", None);
        assert_eq!(a, b);
        assert_eq!(CacheKey::new("s", &Method::GET, "", Some("")).as_str(), "cache:s:GET:/");
    }

    #[test]
    fn test_services_do_not_collide() {
        let a = CacheKey::new("catalog", &Method::GET, "/items/1", None);
        let b = CacheKey::new("pricing", &Method::GET, "/items/1", None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_encoding_is_stable() {
        let a = CacheKey::new("s", &Method::GET, "/search", Some("q=hello+world"));
        let b = CacheKey::new("s", &Method::GET, "/search", Some("q=hello%20world"));
        assert_eq!(a, b);
    }
}
