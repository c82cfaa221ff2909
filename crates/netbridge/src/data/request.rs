use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Trace,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list with case-insensitive name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set `name` to `value`, replacing every existing entry with that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Request body before it is encoded for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
}

impl Body {
    /// Serialize `value` into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value).map(Body::Json).map_err(Error::Encode)
    }

    pub(crate) fn encode(&self) -> Result<Bytes> {
        match self {
            Body::Bytes(bytes) => Ok(bytes.clone()),
            Body::Text(text) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Body::Json(value) => serde_json::to_vec(value).map(Bytes::from).map_err(Error::Encode),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

/// A typed request description.
///
/// `T` names the value the caller expects back; it does not influence how
/// the request is sent. The URL may be absolute or relative to the
/// client's base URL.
///
/// # Examples
///
/// ```
/// use netbridge::{Method, Request};
///
/// #[derive(serde::Deserialize)]
/// struct SearchResults {
///     total_count: u64,
/// }
///
/// let request = Request::<SearchResults>::get("/search/repositories")
///     .query("q", "tokio")
///     .header("X-Trace", "1");
/// assert_eq!(request.get_method(), Method::Get);
/// assert_eq!(request.url(), "/search/repositories");
/// ```
pub struct Request<T> {
    method:    Method,
    url:       String,
    query:     Vec<(String, Option<String>)>,
    body:      Option<Body>,
    headers:   Headers,
    _response: PhantomData<fn() -> T>,
}

impl<T> Request<T> {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
            headers: Headers::new(),
            _response: PhantomData,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append a `name=value` query pair.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), Some(value.into())));
        self
    }

    /// Append a bare `name` query item without a value.
    #[must_use]
    pub fn query_key(mut self, name: impl Into<String>) -> Self {
        self.query.push((name.into(), None));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, value: &B) -> Result<Self> {
        self.body = Some(Body::json(value)?);
        Ok(self)
    }

    /// Same request, different expected response type.
    pub fn with_response<U>(self) -> Request<U> {
        Request {
            method:    self.method,
            url:       self.url,
            query:     self.query,
            body:      self.body,
            headers:   self.headers,
            _response: PhantomData,
        }
    }

    pub fn get_method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query_items(&self) -> &[(String, Option<String>)] {
        &self.query
    }

    pub fn get_body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            method:    self.method,
            url:       self.url.clone(),
            query:     self.query.clone(),
            body:      self.body.clone(),
            headers:   self.headers.clone(),
            _response: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .finish()
    }
}

/// A fully resolved protocol-level request, as handed to the transport.
///
/// Fields are public so a [`ClientDelegate`](crate::ClientDelegate) can
/// rewrite the request right before it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method:  Method,
    pub url:     Url,
    pub headers: Headers,
    pub body:    Option<Bytes>,
}

impl TransportRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));

        headers.insert("CONTENT-TYPE", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Content-Type"), Some("application/json"));

        headers.remove("content-TYPE");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_from_iter_keeps_last() {
        let headers: Headers = [("Accept", "a"), ("accept", "b"), ("X-Id", "1")].into_iter().collect();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("ACCEPT"), Some("b"));
    }

    #[test]
    fn test_body_encoding() {
        assert_eq!(Body::from("hi").encode().unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(
            Body::from(vec![1u8, 2, 3]).encode().unwrap(),
            Bytes::from_static(&[1, 2, 3])
        );

        #[derive(Serialize)]
        struct Payload {
            name: &'static str,
        }
        let body = Body::json(&Payload { name: "netbridge" }).unwrap();
        assert_eq!(body.encode().unwrap(), Bytes::from_static(br#"{"name":"netbridge"}"#));
    }

    #[test]
    fn test_with_response_keeps_parameters() {
        let request = Request::<String>::post("/items")
            .query("page", "2")
            .query_key("verbose")
            .header("X-Id", "7")
            .body("payload");
        let retyped: Request<Vec<u8>> = request.clone().with_response();

        assert_eq!(retyped.get_method(), Method::Post);
        assert_eq!(retyped.url(), "/items");
        assert_eq!(retyped.query_items(), request.query_items());
        assert_eq!(retyped.headers().get("x-id"), Some("7"));
        assert_eq!(retyped.get_body(), Some(&Body::Text("payload".into())));
    }

    #[test]
    fn test_method_strings() {
        assert_eq!(Method::default(), Method::Get);
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert_eq!(Method::Options.as_str(), "OPTIONS");
    }
}
