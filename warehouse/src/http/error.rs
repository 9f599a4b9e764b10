use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An error returned from the warehouse service.
    #[error(transparent)]
    Response(#[from] ErrorResponse),

    /// An error from the HTTP client.
    #[error(transparent)]
    HttpClient(#[from] reqwest::Error),

    /// An error from the HTTP middleware stack.
    #[error(transparent)]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// A response body that could not be decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An error from a token source.
    #[error("token source failed: {0}")]
    TokenSource(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// An HTTP status value, without the textual description.
    ///
    /// Example values include: `400` (Bad Request), `401` (Unauthorized), and `404` (Not Found).
    pub code: u16,

    /// Description of the error. Same as `errors.message`.
    pub message: String,

    /// The canonical status name, e.g. `NOT_FOUND` or `ALREADY_EXISTS`.
    #[serde(default)]
    pub status: Option<String>,

    /// Per-cause details. `reason` is the machine readable part, e.g. `duplicate`, `notFound`, `resourceInUse`.
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorItem {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: u16, reason: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            message: message.clone(),
            status: None,
            errors: vec![ErrorItem {
                domain: "global".to_string(),
                reason: reason.to_string(),
                message,
                location: None,
            }],
        }
    }

    /// The first machine readable reason, if the service sent one.
    pub fn reason(&self) -> Option<&str> {
        self.errors.first().map(|e| e.reason.as_str()).filter(|r| !r.is_empty())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl std::error::Error for ErrorResponse {}

#[derive(serde::Deserialize)]
pub(crate) struct ErrorWrapper {
    pub(crate) error: ErrorResponse,
}

#[cfg(test)]
mod test {
    use crate::http::error::ErrorWrapper;

    #[test]
    fn parse_error_body() {
        let body = r#"{"error":{"code":409,"message":"Already Exists: Dataset p:d","errors":[{"message":"Already Exists: Dataset p:d","domain":"global","reason":"duplicate"}],"status":"ALREADY_EXISTS"}}"#;
        let wrapper: ErrorWrapper = serde_json::from_str(body).unwrap();
        assert_eq!(wrapper.error.code, 409);
        assert_eq!(wrapper.error.reason(), Some("duplicate"));
        assert_eq!(wrapper.error.status.as_deref(), Some("ALREADY_EXISTS"));
        assert_eq!(wrapper.error.to_string(), "Already Exists: Dataset p:d");
    }
}
