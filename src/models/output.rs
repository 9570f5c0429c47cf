use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        DecodePaddingMode,
    },
    Engine as _,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{NanoBananaError, Result};

/// Upstream payloads are often unpadded or carry stray trailing bits.
pub const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputEncoding {
    #[default]
    #[serde(rename = "binary")]
    BinaryAttachment,
    #[serde(rename = "base64")]
    Base64String,
    #[serde(rename = "dataUrl")]
    DataUri,
    #[serde(rename = "url")]
    RemoteUrl,
    #[serde(rename = "raw")]
    RawResponse,
}

impl FromStr for OutputEncoding {
    type Err = NanoBananaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "binary" => Ok(OutputEncoding::BinaryAttachment),
            "base64" => Ok(OutputEncoding::Base64String),
            "dataUrl" => Ok(OutputEncoding::DataUri),
            "url" => Ok(OutputEncoding::RemoteUrl),
            "raw" => Ok(OutputEncoding::RawResponse),
            other => Err(NanoBananaError::invalid_parameter(
                "outputFormat",
                format!("unknown output format '{}'", other),
            )),
        }
    }
}

/// A binary attachment in the host's representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryData {
    pub data: String, // Base64 encoded
    pub mime_type: String,
    pub file_name: Option<String>,
    pub file_extension: Option<String>,
    pub file_size: usize,
}

impl BinaryData {
    pub fn from_bytes(bytes: &[u8], file_name: &str, mime_type: &str) -> Self {
        let file_extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .filter(|ext| !ext.is_empty());

        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.to_string(),
            file_name: Some(file_name.to_string()),
            file_extension,
            file_size: bytes.len(),
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        LENIENT_BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| NanoBananaError::SerializationError(e.to_string()))
    }
}

/// One unit of work flowing in and out of the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub json: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary: BTreeMap<String, BinaryData>,
}

impl WorkItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: Map<String, Value>) -> Self {
        Self {
            json,
            binary: BTreeMap::new(),
        }
    }

    pub fn with_binary(mut self, field: impl Into<String>, data: BinaryData) -> Self {
        self.binary.insert(field.into(), data);
        self
    }

    pub fn binary_field_names(&self) -> Vec<String> {
        self.binary.keys().cloned().collect()
    }

    /// The `{error: message}` entry emitted for a failed item under continue-on-failure.
    pub fn error(message: impl Into<String>) -> Self {
        let mut json = Map::new();
        json.insert("error".to_string(), Value::String(message.into()));
        Self::from_json(json)
    }
}
