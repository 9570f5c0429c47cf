use serde_json::Value;
use thiserror::Error;

use crate::node::ItemStage;

#[derive(Debug, Error)]
pub enum NanoBananaError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid credentials: {0}")]
    InvalidAuth(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Model {model} supports maximum {limit} reference images, but {count} were provided")]
    TooManyReferenceImages {
        model: String,
        limit: usize,
        count: usize,
    },

    #[error("Invalid reference image #{position} ({preview}): {reason}")]
    InvalidReferenceImage {
        position: usize,
        preview: String,
        reason: String,
    },

    #[error("Failed to fetch reference image #{position} from {url}: {reason}")]
    ReferenceImageFetchFailed {
        position: usize,
        url: String,
        reason: String,
    },

    #[error(
        "Reference image #{position}: binary field '{field}' not found (available: {})",
        available_list(.available)
    )]
    BinaryFieldNotFound {
        position: usize,
        field: String,
        available: Vec<String>,
    },

    #[error("{}", upstream_message(.status, .message))]
    UpstreamProtocolError { status: Option<u16>, message: String },

    #[error("No images could be extracted from the upstream response: {raw_response}")]
    NoImagesExtracted { raw_response: Value },

    #[error("Failed to download image from URL: {url}. Reason: {reason}")]
    ImageDownloadFailed { url: String, reason: String },

    #[error("Image #{index} carries undecodable base64 data: {reason}")]
    InvalidImageData { index: usize, reason: String },

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Item {item_index} failed during {stage}: {source}")]
    Item {
        item_index: usize,
        stage: ItemStage,
        #[source]
        source: Box<NanoBananaError>,
    },
}

impl NanoBananaError {
    /// Attaches the work item and stage to an error, leaving already wrapped errors alone.
    pub fn at_item(self, item_index: usize, stage: ItemStage) -> Self {
        match self {
            wrapped @ NanoBananaError::Item { .. } => wrapped,
            other => NanoBananaError::Item {
                item_index,
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn item_index(&self) -> Option<usize> {
        match self {
            NanoBananaError::Item { item_index, .. } => Some(*item_index),
            _ => None,
        }
    }

    /// The innermost error, with any item wrapper peeled off.
    pub fn root(&self) -> &NanoBananaError {
        match self {
            NanoBananaError::Item { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        NanoBananaError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

fn available_list(available: &[String]) -> String {
    if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    }
}

fn upstream_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("API Error {}: {}", code, message),
        None => format!("API Error: {}", message),
    }
}

impl From<serde_json::Error> for NanoBananaError {
    fn from(e: serde_json::Error) -> Self {
        NanoBananaError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NanoBananaError>;
