//! Response header helpers shared by the browser-facing endpoints.

use axum::response::Response;
use chrono::{DateTime, Utc};
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, EXPIRES, PRAGMA,
    SET_COOKIE,
};
use http::HeaderValue;
use log::warn;
use std::time::Duration;

/// How clients and proxies may cache a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Responses tied to a session: never stored anywhere
    NoStore,
    /// Shared documents, cacheable for the given lifetime
    Public(Duration),
}

impl CachePolicy {
    fn cache_control(&self) -> String {
        match self {
            Self::NoStore => "no-cache, no-store, must-revalidate".to_string(),
            Self::Public(max_age) => format!("public, max-age={}", max_age.as_secs()),
        }
    }

    /// Set `Cache-Control` and `Expires` (plus `Pragma` for `NoStore`)
    pub fn apply(&self, response: &mut Response) {
        self.apply_at(response, Utc::now());
    }

    fn apply_at(&self, response: &mut Response, now: DateTime<Utc>) {
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.cache_control()) {
            headers.insert(CACHE_CONTROL, value);
        }

        match self {
            Self::NoStore => {
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(EXPIRES, HeaderValue::from_static("0"));
            }
            Self::Public(max_age) => {
                let expires = chrono::Duration::from_std(*max_age)
                    .ok()
                    .and_then(|delta| now.checked_add_signed(delta));
                match expires.map(http_date) {
                    Some(value) => {
                        if let Ok(value) = HeaderValue::from_str(&value) {
                            headers.insert(EXPIRES, value);
                        }
                    }
                    None => warn!("Cache lifetime {:?} is out of range", max_age),
                }
            }
        }
    }
}

/// HTTP dates are always GMT
fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Append a `Set-Cookie` header
pub fn set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => warn!("Dropping invalid Set-Cookie value: {}", e),
    }
}

/// Let `origin` read a credentialed response
pub fn allow_credentialed_origin(response: &mut Response, origin: &str) {
    let Ok(value) = HeaderValue::from_str(origin) else {
        warn!("Origin {:?} is not a valid header value", origin);
        return;
    };
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use chrono::TimeZone;

    #[test]
    fn test_public_policy() {
        let mut response = Response::new(Body::empty());
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        CachePolicy::Public(Duration::from_secs(604800)).apply_at(&mut response, now);

        let headers = response.headers();
        assert_eq!(headers[CACHE_CONTROL], "public, max-age=604800");
        assert_eq!(headers[EXPIRES], "Fri, 08 Mar 2024 12:00:00 GMT");
        assert!(headers.get(PRAGMA).is_none());
    }

    #[test]
    fn test_no_store_policy() {
        let mut response = Response::new(Body::empty());
        CachePolicy::NoStore.apply(&mut response);

        let headers = response.headers();
        assert_eq!(headers[CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");
    }

    #[test]
    fn test_credentialed_origin() {
        let mut response = Response::new(Body::empty());
        allow_credentialed_origin(&mut response, "https://portal.example.com");
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://portal.example.com"
        );
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let mut response = Response::new(Body::empty());
        allow_credentialed_origin(&mut response, "bad\norigin");
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn test_set_cookie_appends() {
        let mut response = Response::new(Body::empty());
        set_cookie(&mut response, "a=1");
        set_cookie(&mut response, "b=2");
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    }
}
