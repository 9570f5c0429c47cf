use serde::{Deserialize, Serialize};
use std::env;

use crate::{
    error::{NanoBananaError, Result},
    models::{AspectRatio, Model, Operation, OutputEncoding, Resolution},
};

pub const OFFICIAL_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const COMPAT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Official,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub connection_type: ConnectionType,
    pub api_key: String,
    pub base_url: Option<String>,
    pub auth_code: Option<String>,
}

// Keeps the key out of debug logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("connection_type", &self.connection_type)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("auth_code", &self.auth_code.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials {
            connection_type: ConnectionType::Official,
            api_key: String::new(),
            base_url: None,
            auth_code: None,
        }
    }
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn official(api_key: impl Into<String>) -> Self {
        Self::new().with_api_key(api_key)
    }

    pub fn openai_compatible(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::new()
            .with_connection_type(ConnectionType::OpenAi)
            .with_api_key(api_key)
            .with_base_url(base_url)
    }

    pub fn from_env() -> Self {
        let connection_type = match env::var("NANOBANANA_CONNECTION_TYPE").ok().as_deref() {
            Some("openai") => ConnectionType::OpenAi,
            _ => ConnectionType::Official,
        };

        Credentials {
            connection_type,
            api_key: env::var("NANOBANANA_API_KEY").unwrap_or_default(),
            base_url: env::var("NANOBANANA_BASE_URL").ok().filter(|s| !s.is_empty()),
            auth_code: env::var("NANOBANANA_AUTH_CODE").ok(),
        }
    }

    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_auth_code(mut self, auth_code: impl Into<String>) -> Self {
        self.auth_code = Some(auth_code.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(NanoBananaError::ConfigError("API key is required".into()));
        }
        Ok(())
    }

    /// Base URL for the configured protocol. The compat base always ends with `/`.
    pub fn effective_base_url(&self) -> String {
        match self.connection_type {
            ConnectionType::Official => self
                .base_url
                .as_deref()
                .unwrap_or(OFFICIAL_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            ConnectionType::OpenAi => {
                let mut base = self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| COMPAT_BASE_URL.to_string());
                if !base.ends_with('/') {
                    base.push('/');
                }
                base
            }
        }
    }
}

/// The reference-images field as the host hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceImagesInput {
    List(Vec<String>),
    Text(String),
}

impl From<&str> for ReferenceImagesInput {
    fn from(value: &str) -> Self {
        ReferenceImagesInput::Text(value.to_string())
    }
}

impl From<Vec<String>> for ReferenceImagesInput {
    fn from(value: Vec<String>) -> Self {
        ReferenceImagesInput::List(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeParameters {
    pub operation: Operation,
    pub model: Model,
    pub prompt: String,
    pub reference_images: Option<ReferenceImagesInput>,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub output_format: OutputEncoding,
    pub output_property_name: String,
    pub throw_on_failure: bool,
    pub file_name: Option<String>,
}

impl Default for NodeParameters {
    fn default() -> Self {
        NodeParameters {
            operation: Operation::TextToImage,
            model: Model::Flash,
            prompt: String::new(),
            reference_images: None,
            aspect_ratio: AspectRatio::Square,
            resolution: Resolution::OneK,
            output_format: OutputEncoding::BinaryAttachment,
            output_property_name: "data".to_string(),
            throw_on_failure: true,
            file_name: None,
        }
    }
}

impl NodeParameters {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut params = Self::new(env::var("NANOBANANA_PROMPT").unwrap_or_default());

        if let Ok(model) = env::var("NANOBANANA_MODEL") {
            params.model = model.parse()?;
        }
        if let Ok(images) = env::var("NANOBANANA_REFERENCE_IMAGES") {
            if !images.trim().is_empty() {
                params = params.with_reference_images(images.as_str());
            }
        }
        if let Ok(ratio) = env::var("NANOBANANA_ASPECT_RATIO") {
            params.aspect_ratio = ratio.parse()?;
        }
        if let Ok(resolution) = env::var("NANOBANANA_RESOLUTION") {
            params.resolution = resolution.parse()?;
        }
        if let Ok(format) = env::var("NANOBANANA_OUTPUT_FORMAT") {
            params.output_format = format.parse()?;
        }
        if let Ok(name) = env::var("NANOBANANA_OUTPUT_PROPERTY") {
            params.output_property_name = name;
        }
        params.throw_on_failure = env::var("NANOBANANA_THROW_ON_FAILURE")
            .ok()
            .map_or(true, |val| val != "false");
        params.file_name = env::var("NANOBANANA_FILE_NAME").ok().filter(|s| !s.is_empty());

        Ok(params)
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Switches to image-to-image with the given references.
    pub fn with_reference_images(mut self, images: impl Into<ReferenceImagesInput>) -> Self {
        self.operation = Operation::ImageToImage;
        self.reference_images = Some(images.into());
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_output_format(mut self, output_format: OutputEncoding) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn with_output_property_name(mut self, name: impl Into<String>) -> Self {
        self.output_property_name = name.into();
        self
    }

    pub fn with_throw_on_failure(mut self, enabled: bool) -> Self {
        self.throw_on_failure = enabled;
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(NanoBananaError::invalid_parameter(
                "prompt",
                "a non-empty prompt is required",
            ));
        }
        if self.output_property_name.trim().is_empty() {
            return Err(NanoBananaError::invalid_parameter(
                "outputPropertyName",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

pub(crate) fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "<unset>".to_string()
    } else {
        format!("<{} chars>", secret.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compat_base_url_gets_trailing_slash() {
        let creds = Credentials::openai_compatible("k", "https://proxy.example.com/v1");
        assert_eq!(creds.effective_base_url(), "https://proxy.example.com/v1/");
        let default_compat = Credentials::official("k").with_connection_type(ConnectionType::OpenAi);
        assert_eq!(default_compat.effective_base_url(), COMPAT_BASE_URL);
        assert_eq!(Credentials::official("k").effective_base_url(), OFFICIAL_BASE_URL);
    }

    #[test]
    fn test_debug_output_hides_api_key() {
        let creds = Credentials::official("sk-very-secret-key");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("sk-v"));
        assert_eq!(redact("sk-very-secret-key"), "<18 chars>");
        assert_eq!(redact(""), "<unset>");
    }

    #[test]
    fn test_parameters_deserialize_with_defaults() {
        let params: NodeParameters = serde_json::from_value(json!({
            "prompt": "a red circle",
            "model": "gemini-3-pro-image-preview",
            "referenceImages": ["https://example.com/a.png"],
            "outputFormat": "dataUrl"
        }))
        .unwrap();
        assert_eq!(params.model, Model::Pro);
        assert_eq!(params.output_format, OutputEncoding::DataUri);
        assert_eq!(params.output_property_name, "data");
        assert!(params.throw_on_failure);
        assert!(matches!(params.reference_images, Some(ReferenceImagesInput::List(_))));
    }

    #[test]
    fn test_validate_rejects_blank_prompt() {
        assert!(NodeParameters::new("   ").validate().is_err());
        assert!(NodeParameters::new("cat").validate().is_ok());
    }
}
