use url::Url;

use crate::error::{Error, Result};

/// Resolve a request target against an optional base URL and attach query items.
///
/// - An absolute `path` (one with a scheme) is used as is.
/// - A relative `path` is appended to the base URL's path.
/// - An empty `path` yields the base URL with a trailing `/`.
/// - A non-empty `query` replaces any query already present; `None`
///   values become bare keys.
///
/// # Examples
///
/// ```
/// use netbridge::core::make_url;
/// use url::Url;
///
/// let base = Url::parse("https://api.github.com").unwrap();
/// let query = vec![("q".to_string(), Some("tokio".to_string()))];
/// let url = make_url(Some(&base), "/search/repositories", &query).unwrap();
/// assert_eq!(url.as_str(), "https://api.github.com/search/repositories?q=tokio");
/// ```
pub fn make_url(base: Option<&Url>, path: &str, query: &[(String, Option<String>)]) -> Result<Url> {
    let mut url = resolve(base, path)?;
    if !query.is_empty() {
        url.set_query(None);
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            match value {
                Some(value) => pairs.append_pair(name, value),
                None => pairs.append_key_only(name),
            };
        }
    }
    Ok(url)
}

fn resolve(base: Option<&Url>, path: &str) -> Result<Url> {
    if path.is_empty() {
        return base
            .map(|base| append_path(base, "/"))
            .ok_or_else(|| Error::InvalidUrl("empty URL without a base URL".to_string()));
    }
    match Url::parse(path) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .map(|base| append_path(base, path))
            .ok_or_else(|| Error::InvalidUrl(format!("relative URL {path} without a base URL"))),
        Err(e) => Err(Error::InvalidUrl(format!("{path}: {e}"))),
    }
}

fn append_path(base: &Url, component: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        component.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://api.example.com/v2").unwrap()
    }

    fn q(pairs: &[(&str, Option<&str>)]) -> Vec<(String, Option<String>)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_relative_path_appends_to_base() {
        let url = make_url(Some(&base()), "/users/octocat", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/users/octocat");

        let url = make_url(Some(&base()), "users", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/users");
    }

    #[test]
    fn test_base_with_trailing_slash() {
        let base = Url::parse("https://api.example.com/v2/").unwrap();
        let url = make_url(Some(&base), "/users", &[]).unwrap();
        assert_eq!(url.path(), "/v2/users");
    }

    #[test]
    fn test_empty_path_yields_base_with_slash() {
        let url = make_url(Some(&base()), "", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/");
    }

    #[test]
    fn test_absolute_url_ignores_base() {
        let url = make_url(Some(&base()), "https://cdn.example.org/file.bin", &[]).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.org/file.bin");
    }

    #[test]
    fn test_query_replaces_existing() {
        let url = make_url(
            None,
            "https://example.com/search?old=1",
            &q(&[("q", Some("a b")), ("verbose", None)]),
        )
        .unwrap();
        assert_eq!(url.query(), Some("q=a+b&verbose"));
    }

    #[test]
    fn test_empty_query_keeps_existing() {
        let url = make_url(None, "https://example.com/search?keep=1", &[]).unwrap();
        assert_eq!(url.query(), Some("keep=1"));
    }

    #[test]
    fn test_relative_without_base_is_invalid() {
        assert!(matches!(make_url(None, "/users", &[]), Err(Error::InvalidUrl(_))));
        assert!(matches!(make_url(None, "", &[]), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_malformed_absolute_url_is_invalid() {
        assert!(matches!(
            make_url(Some(&base()), "http://[::1", &[]),
            Err(Error::InvalidUrl(_))
        ));
    }
}
