//! Wire shapes for the two upstream protocol families.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{NanoBananaError, Result};

// --- native generateContent ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NativeRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeContent {
    pub parts: Vec<NativeRequestPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub image_config: ImageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRequest {
    pub contents: Vec<NativeContent>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub candidates: Vec<NativeCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeCandidate {
    #[serde(default)]
    pub content: Option<NativeCandidateContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeCandidateContent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts: Vec<NativeResponsePart>,
}

/// A response part may carry text, inline image data, or neither (e.g. thought signatures).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    pub inline_data: Option<InlineData>,
}

// --- OpenAI-compatible chat completions ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraBody {
    pub image_config: ImageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub extra_body: ExtraBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatResponseMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<Value>,
}

impl ChatResponseMessage {
    /// Message text; structured content arrays are flattened to their text parts.
    pub fn text(&self) -> Option<String> {
        match self.content.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => {
                let joined: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect();
                (!joined.is_empty()).then(|| joined.join("\n"))
            }
            _ => None,
        }
    }
}

// --- tagged union over both ---

#[derive(Debug, Clone)]
pub enum UpstreamResponse {
    Native(NativeResponse),
    Compat(ChatCompletionResponse),
}

/// A decoded upstream reply together with the untouched body it came from.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub raw: Value,
    pub response: UpstreamResponse,
}

impl UpstreamReply {
    pub fn native(raw: Value) -> Result<Self> {
        let response = decode_shape(&raw, "generateContent")?;
        Ok(Self {
            raw,
            response: UpstreamResponse::Native(response),
        })
    }

    pub fn compat(raw: Value) -> Result<Self> {
        let response = decode_shape(&raw, "chat completion")?;
        Ok(Self {
            raw,
            response: UpstreamResponse::Compat(response),
        })
    }
}

/// Upstreams send `null` for empty collections as often as they omit them.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn decode_shape<T: for<'de> Deserialize<'de> + Default>(raw: &Value, label: &str) -> Result<T> {
    if raw.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(raw.clone()).map_err(|e| NanoBananaError::UpstreamProtocolError {
        status: None,
        message: format!("unexpected {} response shape: {}", label, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_part_accepts_both_spellings() {
        let camel: NativeResponsePart =
            serde_json::from_value(json!({"inlineData": {"mimeType": "image/png", "data": "AA=="}}))
                .unwrap();
        assert!(camel.inline_data.is_some());
        let snake: NativeResponsePart =
            serde_json::from_value(json!({"inline_data": {"mimeType": "image/png", "data": "AA=="}}))
                .unwrap();
        assert!(snake.inline_data.is_some());
    }

    #[test]
    fn test_chat_content_array_is_flattened() {
        let message: ChatResponseMessage = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "one"}, {"type": "text", "text": "two"}]
        }))
        .unwrap();
        assert_eq!(message.text().as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn test_empty_objects_decode_to_empty_shapes() {
        let reply = UpstreamReply::compat(json!({})).unwrap();
        match reply.response {
            UpstreamResponse::Compat(chat) => assert!(chat.choices.is_empty()),
            UpstreamResponse::Native(_) => panic!("wrong variant"),
        }
        assert!(UpstreamReply::native(json!({"candidates": "nope"})).is_err());
    }

    #[test]
    fn test_null_collections_decode_to_empty_shapes() {
        let reply = UpstreamReply::compat(json!({"choices": null})).unwrap();
        match reply.response {
            UpstreamResponse::Compat(chat) => assert!(chat.choices.is_empty()),
            UpstreamResponse::Native(_) => panic!("wrong variant"),
        }

        let native = UpstreamReply::native(json!({"candidates": null})).unwrap();
        match native.response {
            UpstreamResponse::Native(response) => assert!(response.candidates.is_empty()),
            UpstreamResponse::Compat(_) => panic!("wrong variant"),
        }

        let native: NativeResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": null}}]})).unwrap();
        let content = native.candidates[0].content.as_ref().unwrap();
        assert!(content.parts.is_empty());
    }
}
