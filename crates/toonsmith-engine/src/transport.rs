use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use toonsmith_contracts::credentials::Credential;

use crate::error::TransportError;

const ERROR_BODY_MAX_CHARS: usize = 512;

pub trait GenerativeTransport: Send + Sync {
    fn post_json(
        &self,
        endpoint: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<Value, TransportError>;
}

/// reqwest-backed transport. The key travels as the `key` query parameter.
pub struct HttpTransport {
    http: HttpClient,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            http: HttpClient::new(),
            timeout,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl GenerativeTransport for HttpTransport {
    fn post_json(
        &self,
        endpoint: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<Value, TransportError> {
        let provider = provider_label(endpoint);
        debug!(
            "POST {endpoint} ({} credential {})",
            credential.source(),
            credential.masked()
        );
        let mut request = self
            .http
            .post(endpoint)
            .query(&[("key", credential.expose())])
            .json(payload);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().map_err(|err| TransportError::Network {
            provider: provider.to_string(),
            message: err.without_url().to_string(),
        })?;
        response_json_or_error(provider, response)
    }
}

fn provider_label(endpoint: &str) -> &'static str {
    if endpoint.ends_with(":predict") {
        "Imagen"
    } else {
        "Gemini"
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, TransportError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| TransportError::Network {
        provider: provider.to_string(),
        message: format!("response body read failed: {}", err.without_url()),
    })?;
    if !status.is_success() {
        return Err(TransportError::Status {
            provider: provider.to_string(),
            status: code,
            body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
        });
    }
    serde_json::from_str(&body).map_err(|err| TransportError::InvalidJson {
        provider: provider.to_string(),
        message: err.to_string(),
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
