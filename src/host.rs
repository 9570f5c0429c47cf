//! Seams to the host runtime: transport, attachment registration, parameters, credential checks.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::{
    config::{Credentials, NodeParameters},
    error::{NanoBananaError, Result},
    models::{BinaryData, WorkItem},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response: status and body are always available, whatever the status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters, lower-cased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            NanoBananaError::SerializationError(format!(
                "response body is not JSON (HTTP {}): {}",
                self.status, e
            ))
        })
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs the request. Only transport failures are errors; any HTTP status is returned as-is.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn prepare(&self, bytes: Vec<u8>, file_name: &str, mime_type: &str) -> Result<BinaryData>;
}

/// Keeps attachment bytes inline, base64-encoded in the output item.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineAttachments;

#[async_trait]
impl AttachmentStore for InlineAttachments {
    async fn prepare(&self, bytes: Vec<u8>, file_name: &str, mime_type: &str) -> Result<BinaryData> {
        Ok(BinaryData::from_bytes(&bytes, file_name, mime_type))
    }
}

pub trait ParameterSource: Send + Sync {
    fn parameters(&self, item_index: usize, item: &WorkItem) -> Result<NodeParameters>;
}

impl ParameterSource for NodeParameters {
    fn parameters(&self, _item_index: usize, _item: &WorkItem) -> Result<NodeParameters> {
        Ok(self.clone())
    }
}

impl<F> ParameterSource for F
where
    F: Fn(usize, &WorkItem) -> Result<NodeParameters> + Send + Sync,
{
    fn parameters(&self, item_index: usize, item: &WorkItem) -> Result<NodeParameters> {
        self(item_index, item)
    }
}

pub trait CredentialCheck: Send + Sync {
    fn check(&self, credentials: &Credentials) -> Result<()>;
}

/// Requires the credential's auth code to equal a configured value.
#[derive(Debug, Clone)]
pub struct ExpectedAuthCode(pub String);

impl CredentialCheck for ExpectedAuthCode {
    fn check(&self, credentials: &Credentials) -> Result<()> {
        match credentials.auth_code.as_deref() {
            Some(code) if code == self.0 => Ok(()),
            Some(_) => Err(NanoBananaError::InvalidAuth(
                "the auth code does not match".into(),
            )),
            None => Err(NanoBananaError::InvalidAuth(
                "an auth code is required".into(),
            )),
        }
    }
}
