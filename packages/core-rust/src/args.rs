//! Transport-specific call arguments.
//!
//! A call carries its arguments as `Arc<dyn CallArgs>`. Code that needs a
//! transport-level feature asks for a capability (e.g. [`CallArgs::cookies`])
//! instead of downcasting to a concrete transport type.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// Read access to request cookies.
pub trait CookieJar {
    /// Returns the value of the cookie called `name`, if the request has one.
    fn cookie(&self, name: &str) -> Option<&str>;
}

/// Arguments of an outbound call, shaped by the transport that will carry it.
pub trait CallArgs: fmt::Debug + Send + Sync {
    /// Short transport label used in logs (e.g. `"rest"`).
    fn transport(&self) -> &'static str;

    /// Cookie capability. Only transport-native HTTP requests provide one.
    fn cookies(&self) -> Option<&dyn CookieJar> {
        None
    }
}

// ---------------------------------------------------------------------------
// HttpRequestArgs
// ---------------------------------------------------------------------------

/// Transport-native HTTP request.
///
/// Header names are stored lower-cased.
#[derive(Debug, Clone, Default)]
pub struct HttpRequestArgs {
    pub method: String,
    pub path: String,
    headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpRequestArgs {
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends a cookie to the `Cookie` header.
    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{name}={value}");
        self.headers
            .entry("cookie".to_string())
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&pair);
            })
            .or_insert(pair);
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl CookieJar for HttpRequestArgs {
    fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie")?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

impl CallArgs for HttpRequestArgs {
    fn transport(&self) -> &'static str {
        "rest"
    }

    fn cookies(&self) -> Option<&dyn CookieJar> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// RpcArgs
// ---------------------------------------------------------------------------

/// Opaque payload for RPC-style transports. Exposes no cookies.
#[derive(Debug, Clone, Default)]
pub struct RpcArgs {
    pub payload: Bytes,
}

impl RpcArgs {
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

impl CallArgs for RpcArgs {
    fn transport(&self) -> &'static str {
        "rpc"
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn cookie_parsed_from_header() {
        let req = HttpRequestArgs::new("GET", "/orders")
            .with_header("Cookie", "theme=dark; lb-session-id=abc; lang=en");
        assert_eq!(req.cookie("lb-session-id"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn with_cookie_appends_to_existing_header() {
        let req = HttpRequestArgs::new("GET", "/")
            .with_cookie("a", "1")
            .with_cookie("b", "2");
        assert_eq!(req.header("COOKIE"), Some("a=1; b=2"));
        assert_eq!(req.cookie("b"), Some("2"));
    }

    #[test]
    fn cookie_value_may_contain_equals() {
        let req = HttpRequestArgs::new("GET", "/").with_header("cookie", "token=x=y");
        assert_eq!(req.cookie("token"), Some("x=y"));
    }

    #[test]
    fn only_http_args_expose_cookies() {
        let http: &dyn CallArgs = &HttpRequestArgs::new("GET", "/");
        let rpc: &dyn CallArgs = &RpcArgs::new("payload");
        assert!(http.cookies().is_some());
        assert!(rpc.cookies().is_none());
        assert_eq!(http.transport(), "rest");
        assert_eq!(rpc.transport(), "rpc");
    }

    proptest! {
        #[test]
        fn every_appended_cookie_is_readable(
            cookies in proptest::collection::btree_map(
                "[a-z][a-z0-9_-]{0,8}",
                "[A-Za-z0-9=._-]{0,12}",
                0..6,
            )
        ) {
            let req = cookies
                .iter()
                .fold(HttpRequestArgs::new("GET", "/"), |req, (k, v)| req.with_cookie(k, v));
            for (name, value) in &cookies {
                prop_assert_eq!(req.cookie(name), Some(value.as_str()));
            }
        }
    }
}
