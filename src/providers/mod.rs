pub mod compat;
pub mod native;

use serde_json::Value;

use crate::{
    config::{ConnectionType, Credentials},
    error::{NanoBananaError, Result},
    host::{HttpRequest, HttpResponse},
    models::{ExtractedImage, GenerationRequest, UpstreamReply, UpstreamResponse},
};

/// The two upstream protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Native,
    Compat,
}

impl From<ConnectionType> for Protocol {
    fn from(connection_type: ConnectionType) -> Self {
        match connection_type {
            ConnectionType::Official => Protocol::Native,
            ConnectionType::OpenAi => Protocol::Compat,
        }
    }
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Native => "native",
            Protocol::Compat => "openai-compatible",
        }
    }

    pub fn build(&self, credentials: &Credentials, request: &GenerationRequest) -> Result<HttpRequest> {
        let base_url = credentials.effective_base_url();
        let http_request = match self {
            Protocol::Native => HttpRequest::post_json(
                native::endpoint(&base_url, request.model),
                serde_json::to_value(native::build_request(request))?,
            )
            .with_header("x-goog-api-key", credentials.api_key.as_str()),
            Protocol::Compat => HttpRequest::post_json(
                compat::endpoint(&base_url),
                serde_json::to_value(compat::build_request(request))?,
            )
            .with_header("Authorization", format!("Bearer {}", credentials.api_key)),
        };
        Ok(http_request)
    }

    /// Turns a raw HTTP response into a typed reply. Any status >= 400 is a protocol error.
    pub fn decode(&self, response: &HttpResponse) -> Result<UpstreamReply> {
        if response.status >= 400 {
            return Err(upstream_error(response));
        }
        let raw = response.json()?;
        match self {
            Protocol::Native => UpstreamReply::native(raw),
            Protocol::Compat => UpstreamReply::compat(raw),
        }
    }
}

/// Images found in a reply plus any text that came along with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedImages {
    pub images: Vec<ExtractedImage>,
    pub text: String,
}

impl ParsedImages {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

pub fn parse(reply: &UpstreamReply) -> ParsedImages {
    match &reply.response {
        UpstreamResponse::Native(response) => native::parse_response(response),
        UpstreamResponse::Compat(response) => compat::parse_response(response),
    }
}

fn upstream_error(response: &HttpResponse) -> NanoBananaError {
    let body = response.json().unwrap_or(Value::Null);
    let message = body
        .get("error")
        .and_then(|error| {
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| error.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| {
            if body.is_null() {
                String::from_utf8_lossy(&response.body).trim().to_string()
            } else {
                body.to_string()
            }
        });

    NanoBananaError::UpstreamProtocolError {
        status: Some(response.status),
        message,
    }
}
