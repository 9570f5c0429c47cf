use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NanoBananaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Model {
    #[default]
    #[serde(rename = "gemini-2.5-flash-image")]
    Flash,
    #[serde(rename = "gemini-3-pro-image-preview")]
    Pro,
}

impl Model {
    pub fn id(&self) -> &'static str {
        match self {
            Model::Flash => "gemini-2.5-flash-image",
            Model::Pro => "gemini-3-pro-image-preview",
        }
    }

    pub fn max_reference_images(&self) -> usize {
        match self {
            Model::Flash => 3,
            Model::Pro => 14,
        }
    }

    /// Only the pro model honours an explicit output resolution.
    pub fn supports_resolution(&self) -> bool {
        matches!(self, Model::Pro)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Model {
    type Err = NanoBananaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gemini-2.5-flash-image" | "flash" => Ok(Model::Flash),
            "gemini-3-pro-image-preview" | "pro" => Ok(Model::Pro),
            other => Err(NanoBananaError::invalid_parameter(
                "model",
                format!("unknown model '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "21:9")]
    Ultrawide,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "4:5")]
    Portrait4x5,
    #[serde(rename = "5:4")]
    Landscape5x4,
    #[serde(rename = "9:16")]
    Vertical,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 10] = [
        AspectRatio::Square,
        AspectRatio::Widescreen,
        AspectRatio::Portrait2x3,
        AspectRatio::Ultrawide,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait4x5,
        AspectRatio::Landscape5x4,
        AspectRatio::Vertical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Ultrawide => "21:9",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait4x5 => "4:5",
            AspectRatio::Landscape5x4 => "5:4",
            AspectRatio::Vertical => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = NanoBananaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AspectRatio::ALL
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == wanted)
            .ok_or_else(|| {
                NanoBananaError::invalid_parameter(
                    "aspectRatio",
                    format!("unsupported aspect ratio '{}'", wanted),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = NanoBananaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(Resolution::OneK),
            "2K" => Ok(Resolution::TwoK),
            "4K" => Ok(Resolution::FourK),
            other => Err(NanoBananaError::invalid_parameter(
                "resolution",
                format!("unsupported resolution '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    #[default]
    TextToImage,
    ImageToImage,
}

impl FromStr for Operation {
    type Err = NanoBananaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "textToImage" => Ok(Operation::TextToImage),
            "imageToImage" => Ok(Operation::ImageToImage),
            other => Err(NanoBananaError::invalid_parameter(
                "operation",
                format!("unknown operation '{}'", other),
            )),
        }
    }
}

/// An image in the form both request builders consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalImage {
    pub mime_type: String,
    pub data: String, // Base64 encoded
}

impl CanonicalImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Base64,
    Url,
}

/// An image found in an upstream response, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedImage {
    pub kind: ImageKind,
    pub data: String,
    pub mime_type: String,
}

impl ExtractedImage {
    pub fn base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: ImageKind::Base64,
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            kind: ImageKind::Url,
            data: url.into(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
        }
    }
}

pub const DEFAULT_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Model,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub reference_images: Vec<CanonicalImage>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: Model) -> Self {
        Self {
            prompt: prompt.into(),
            model,
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            reference_images: Vec::new(),
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_reference_images(mut self, images: Vec<CanonicalImage>) -> Self {
        self.reference_images = images;
        self
    }

    /// Resolution to send upstream, if the model accepts one.
    pub fn image_size(&self) -> Option<Resolution> {
        self.model.supports_resolution().then_some(self.resolution)
    }
}
