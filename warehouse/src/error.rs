use std::time::Duration;

use crate::http::error::{Error as ServiceError, ErrorResponse};
use crate::http::job::ErrorProto;

/// Errors returned by the dataset, table and data operations.
///
/// Remote failures are classified from the HTTP status and the machine readable reason the
/// service attaches to its error body. The untouched body stays available as `source`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<ErrorResponse>,
    },

    #[error("already exists: {message}")]
    AlreadyExists {
        message: String,
        #[source]
        source: Option<ErrorResponse>,
    },

    /// Concurrent modification, precondition failure or a resource still in use.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        #[source]
        source: Option<ErrorResponse>,
    },

    #[error("location mismatch for {resource}: expected {expected} but was {actual}")]
    LocationMismatch {
        resource: String,
        expected: String,
        actual: String,
    },

    #[error("permission denied: {message}")]
    PermissionDenied {
        message: String,
        #[source]
        source: Option<ErrorResponse>,
    },

    /// The caller's deadline passed before the job reached DONE. The job keeps running remotely.
    #[error("job {job_id} did not finish within {elapsed:?}")]
    Timeout { job_id: String, elapsed: Duration },

    #[error("job {job_id} failed: {error}")]
    JobFailed {
        job_id: String,
        error: ErrorProto,
        errors: Vec<ErrorProto>,
    },

    /// Rejected locally or by the service as an invalid request.
    #[error("invalid request: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<ErrorResponse>,
    },

    /// Transport, authentication or any remote failure without a more specific kind.
    #[error(transparent)]
    Service(ServiceError),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ServiceError> for Error {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Response(response) => classify(response),
            other => Self::Service(other),
        }
    }
}

fn classify(response: ErrorResponse) -> Error {
    let message = response.message.clone();
    let reason = response.reason().unwrap_or_default().to_string();
    let source = Some(response.clone());
    match (response.code, reason.as_str()) {
        (404, _) | (_, "notFound") => Error::NotFound { message, source },
        (409, "duplicate") => Error::AlreadyExists { message, source },
        (409, _) if message.starts_with("Already Exists") => Error::AlreadyExists { message, source },
        (409, _) | (412, _) | (_, "resourceInUse") => Error::Conflict { message, source },
        (403, "quotaExceeded") | (403, "rateLimitExceeded") => Error::Service(ServiceError::Response(response)),
        (401, _) | (403, _) => Error::PermissionDenied { message, source },
        (400, "invalid") | (400, "invalidQuery") | (400, "required") | (400, "badRequest") => {
            Error::Validation { message, source }
        }
        _ => Error::Service(ServiceError::Response(response)),
    }
}

#[cfg(test)]
mod test {
    use crate::error::Error;
    use crate::http::error::{Error as ServiceError, ErrorResponse};

    fn classify(code: u16, reason: &str, message: &str) -> Error {
        ServiceError::Response(ErrorResponse::new(code, reason, message)).into()
    }

    #[test]
    fn classify_by_status_and_reason() {
        assert!(matches!(classify(404, "notFound", "Not found: Dataset p:d"), Error::NotFound { .. }));
        assert!(matches!(classify(409, "duplicate", "Already Exists: Dataset p:d"), Error::AlreadyExists { .. }));
        assert!(matches!(classify(409, "", "Already Exists: Table p:d.t"), Error::AlreadyExists { .. }));
        assert!(matches!(classify(409, "conflict", "concurrent"), Error::Conflict { .. }));
        assert!(matches!(classify(412, "conditionNotMet", "Precondition check failed."), Error::Conflict { .. }));
        assert!(matches!(classify(400, "resourceInUse", "Dataset p:d is still in use"), Error::Conflict { .. }));
        assert!(matches!(classify(403, "accessDenied", "Access Denied"), Error::PermissionDenied { .. }));
        assert!(matches!(classify(401, "authError", "Invalid Credentials"), Error::PermissionDenied { .. }));
        assert!(matches!(classify(400, "invalid", "Invalid field"), Error::Validation { .. }));
        assert!(matches!(classify(403, "quotaExceeded", "Quota exceeded"), Error::Service(_)));
        assert!(matches!(classify(500, "backendError", "boom"), Error::Service(_)));
    }

    #[test]
    fn source_keeps_service_body() {
        let err = classify(404, "notFound", "Not found: Table p:d.t");
        match err {
            Error::NotFound { source: Some(source), .. } => assert_eq!(source.code, 404),
            other => panic!("unexpected {other:?}"),
        }
    }
}
