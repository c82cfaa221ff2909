use crate::data::{Headers, Method};

/// Returns `true` for the status codes the default validation accepts (2xx).
///
/// # Examples
///
/// ```
/// use netbridge::core::is_acceptable_status;
///
/// assert!(is_acceptable_status(200));
/// assert!(is_acceptable_status(204));
/// assert!(!is_acceptable_status(304));
/// assert!(!is_acceptable_status(500));
/// ```
pub fn is_acceptable_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Returns `true` if the HTTP status code indicates a redirect.
///
/// # Recognized Redirect Codes
///
/// - 301: Moved Permanently
/// - 302: Found
/// - 303: See Other
/// - 307: Temporary Redirect
/// - 308: Permanent Redirect
///
/// # Examples
///
/// ```
/// use netbridge::core::is_redirect;
///
/// assert!(is_redirect(301));
/// assert!(is_redirect(302));
/// assert!(!is_redirect(200));
/// assert!(!is_redirect(404));
/// ```
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Method and body handling for the request that follows a redirect.
///
/// 303 always switches to `GET`; 301 and 302 switch `POST` to `GET`;
/// 307 and 308 keep method and body. Returns the method and whether the
/// body is carried over.
pub fn redirect_method(status: u16, method: Method) -> (Method, bool) {
    match status {
        303 if method != Method::Head => (Method::Get, false),
        301 | 302 if method == Method::Post => (Method::Get, false),
        _ => (method, true),
    }
}

/// Fill in headers the request did not set itself.
///
/// `additional` headers sit underneath the request's own; `Accept`
/// defaults to JSON, and so does `Content-Type` when there is a body.
pub fn apply_default_headers(headers: &mut Headers, additional: &Headers, has_body: bool) {
    for (name, value) in additional.iter() {
        if !headers.contains(name) {
            headers.insert(name, value);
        }
    }
    if has_body && !headers.contains("Content-Type") {
        headers.insert("Content-Type", "application/json");
    }
    if !headers.contains("Accept") {
        headers.insert("Accept", "application/json");
    }
}
