//! The RESTCONF error envelope of RFC 8040 §7.1:
//! `{"ietf-restconf:errors": {"error": [{...}]}}`.

use serde::Serialize;

/// RESTCONF error-tag values used by this server. RFC 8040 defines more; only
/// the tags the pipeline can actually emit are named here.
pub mod tag {
    pub const INVALID_VALUE: &str = "invalid-value";
    pub const OPERATION_FAILED: &str = "operation-failed";
    pub const OPERATION_NOT_SUPPORTED: &str = "operation-not-supported";
    pub const DATA_EXISTS: &str = "data-exists";
    pub const BAD_ELEMENT: &str = "bad-element";
    pub const RESOURCE_DENIED: &str = "resource-denied";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestconfError {
    #[serde(rename = "error-type")]
    pub error_type: ErrorType,
    #[serde(rename = "error-tag")]
    pub error_tag: String,
    #[serde(rename = "error-path", skip_serializing_if = "Option::is_none")]
    pub error_path: Option<String>,
    #[serde(rename = "error-message", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "error-app-tag", skip_serializing_if = "Option::is_none")]
    pub error_app_tag: Option<String>,
}

impl RestconfError {
    pub fn new(error_type: ErrorType, error_tag: &str) -> RestconfError {
        RestconfError {
            error_type,
            error_tag: error_tag.to_string(),
            error_path: None,
            error_message: None,
            error_app_tag: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> RestconfError {
        self.error_path = Some(path.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> RestconfError {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_app_tag(mut self, app_tag: impl Into<String>) -> RestconfError {
        self.error_app_tag = Some(app_tag.into());
        self
    }

    /// The error sent when a referenced subscription does not exist.
    pub fn no_such_subscription() -> RestconfError {
        RestconfError::new(ErrorType::Application, tag::INVALID_VALUE)
            .with_message(
                "Referenced subscription doesn't exist. This may be as a result of a \
                 nonexistent subscription ID, an ID that belongs to another subscriber, \
                 or an ID for a configured subscription.",
            )
            .with_app_tag("ietf-subscribed-notifications:no-such-subscription")
    }

    /// The error sent when a subscription asks for a non-JSON encoding.
    pub fn encoding_unsupported() -> RestconfError {
        RestconfError::new(ErrorType::Application, tag::INVALID_VALUE)
            .with_message("Unable to encode notification messages in the desired format.")
            .with_app_tag("ietf-subscribed-notifications:encoding-unsupported")
    }
}

/// The full response body wrapper.
#[derive(Debug, Clone, Serialize)]
pub struct Errors {
    #[serde(rename = "ietf-restconf:errors")]
    pub errors: ErrorList,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorList {
    pub error: Vec<RestconfError>,
}

impl Errors {
    pub fn of(error: RestconfError) -> Errors {
        Errors {
            errors: ErrorList {
                error: vec![error],
            },
        }
    }
}

impl From<RestconfError> for Errors {
    fn from(error: RestconfError) -> Errors {
        Errors::of(error)
    }
}
