//! The seam to the external request-validation service, consulted before
//! every operation is dispatched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the validation service sees about a request.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationRequest {
    /// The matched route's path template.
    pub path: String,
    pub method: String,
    /// Header names lower-cased, first value each.
    pub headers: BTreeMap<String, String>,
    /// Percent-decoded path parameters.
    pub path_params: BTreeMap<String, String>,
    /// First value of each query parameter.
    pub query_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

#[async_trait::async_trait]
pub trait Validator: Send + Sync {
    /// Returns the service's verdict, or an error when the service itself is
    /// unreachable or misbehaving.
    async fn validate(&self, request: &ValidationRequest) -> anyhow::Result<Verdict>;
}

/// The production validator: a JSON POST to the validation service on
/// localhost.
pub struct HttpValidator {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpValidator {
    pub fn new(port: u16) -> HttpValidator {
        let endpoint = format!("http://127.0.0.1:{port}/validate")
            .parse()
            .expect("validator endpoint is a valid url");
        HttpValidator {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl Validator for HttpValidator {
    async fn validate(&self, request: &ValidationRequest) -> anyhow::Result<Verdict> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
