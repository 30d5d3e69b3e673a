use bytes::Bytes;

use crate::error::InvocationError;

/// Result of a call as seen by the caller.
///
/// Failures are carried in `error` rather than returned as `Err`, so every
/// logical call produces exactly one `Response`. `Response::default()` is the
/// empty response delivered when no attempt ever produced one.
#[derive(Debug, Default)]
pub struct Response {
    /// Transport status code, when the transport has one.
    pub status: Option<u16>,
    /// Response payload.
    pub body: Bytes,
    /// Set when the call failed.
    pub error: Option<InvocationError>,
}

impl Response {
    /// Successful response carrying `body`.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: None,
            body: body.into(),
            error: None,
        }
    }

    /// Failed response carrying `error`.
    #[must_use]
    pub fn from_error(error: impl Into<InvocationError>) -> Self {
        Self {
            status: None,
            body: Bytes::new(),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn error(&self) -> Option<&InvocationError> {
        self.error.as_ref()
    }
}

impl From<InvocationError> for Response {
    fn from(error: InvocationError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SelectionError;

    #[test]
    fn default_is_empty_success() {
        let resp = Response::default();
        assert!(resp.is_ok());
        assert!(resp.body.is_empty());
        assert!(resp.status.is_none());
    }

    #[test]
    fn from_selection_error() {
        let resp = Response::from_error(SelectionError::NoInstance {
            service: "orders".to_string(),
        });
        assert!(!resp.is_ok());
        assert!(resp.error().is_some_and(InvocationError::is_selection));
    }

    #[test]
    fn ok_with_status() {
        let resp = Response::ok("hello").with_status(200);
        assert_eq!(resp.status, Some(200));
        assert_eq!(&resp.body[..], b"hello");
    }
}
