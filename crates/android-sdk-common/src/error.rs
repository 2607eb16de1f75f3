//! Error types for the Android SDK operator
//!
//! Errors carry the names of the objects involved so a failed reconcile can
//! be traced back to a specific environment or ConfigMap from the logs.

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// An optimistic status update lost against a concurrent writer
    #[error("conflict updating {name}: resource was modified concurrently")]
    Conflict {
        /// Name of the object whose update was rejected
        name: String,
    },

    /// A recognized or referenced ConfigMap lacks a required data key
    #[error("{object} is missing required field \"{field}\"")]
    MissingField {
        /// Name of the object missing the field
        object: String,
        /// The missing data key
        field: String,
    },

    /// The ConfigMap referenced by an environment does not exist
    #[error("config map {namespace}/{name} not found")]
    ConfigNotFound {
        /// Name of the referenced ConfigMap
        name: String,
        /// Namespace it was looked up in
        namespace: String,
    },

    /// Validation error for a custom resource
    #[error("validation error for {environment}: {message}")]
    Validation {
        /// Name of the environment with invalid configuration
        environment: String,
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Create a validation error for a specific environment
    pub fn validation_for(environment: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            environment: environment.into(),
            message: msg.into(),
        }
    }

    /// Create a missing-field error
    pub fn missing_field(object: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            object: object.into(),
            field: field.into(),
        }
    }

    /// Create a config-not-found error
    pub fn config_not_found(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::ConfigNotFound {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a conflict error for the named object
    pub fn conflict(name: impl Into<String>) -> Self {
        Self::Conflict { name: name.into() }
    }

    /// Check if this error is retryable
    ///
    /// Missing config and validation errors need a user fix; the ConfigMap
    /// and environment watches re-trigger reconciliation once it lands.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
            ),
            Error::Conflict { .. } => true,
            Error::MissingField { .. } => false,
            Error::ConfigNotFound { .. } => false,
            Error::Validation { .. } => false,
        }
    }
}

/// True if the API server answered 404 Not Found
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// True if a create was rejected because the object already exists
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

/// True if an update was rejected because of a stale resourceVersion
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "Conflict")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        })
    }

    /// Story: a ConfigMap without the packages key tells the user exactly
    /// which object and key to fix, and waits for the fix instead of retrying.
    #[test]
    fn story_missing_field_names_object_and_key() {
        let err = Error::missing_field("android-sdk-config", "packages");
        assert!(err.to_string().contains("android-sdk-config"));
        assert!(err.to_string().contains("\"packages\""));
        assert!(!err.is_retryable());
    }

    #[test]
    fn story_missing_config_is_not_retryable() {
        let err = Error::config_not_found("sdk-packages", "android");
        assert_eq!(err.to_string(), "config map android/sdk-packages not found");
        assert!(!err.is_retryable());
    }

    /// Story: losing an optimistic update is routine and retried on the
    /// next delivery.
    #[test]
    fn story_conflict_is_retryable() {
        let err = Error::conflict("android-sdk");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("android-sdk"));
    }

    #[test]
    fn kube_errors_retry_unless_client_error() {
        let server: Error = api_error(500, "InternalError").into();
        assert!(server.is_retryable());

        let forbidden: Error = api_error(403, "Forbidden").into();
        assert!(!forbidden.is_retryable());

        let throttled: Error = api_error(429, "TooManyRequests").into();
        assert!(throttled.is_retryable());
    }

    #[test]
    fn validation_errors_carry_environment() {
        let err = Error::validation_for("android-sdk", "must be namespaced");
        assert!(err.to_string().contains("android-sdk"));
        assert!(!err.is_retryable());

        match err {
            Error::Validation { environment, .. } => assert_eq!(environment, "android-sdk"),
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn classifies_api_status_codes() {
        assert!(is_not_found(&api_error(404, "NotFound")));
        assert!(!is_not_found(&api_error(409, "AlreadyExists")));

        assert!(is_already_exists(&api_error(409, "AlreadyExists")));
        assert!(!is_already_exists(&api_error(409, "Conflict")));

        assert!(is_conflict(&api_error(409, "Conflict")));
        assert!(!is_conflict(&api_error(404, "NotFound")));
    }
}
