//! Projects extracted images into the caller's chosen output encoding.
//!
//! Url-kind images are fetched when bytes are needed. For binary output a
//! failed fetch fails the item; for base64 and data URI output the image is
//! skipped instead. Both outcomes go through [`Materialization`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};

use crate::{
    error::{NanoBananaError, Result},
    host::{AttachmentStore, HttpRequest, HttpTransport},
    models::{ExtractedImage, ImageKind, OutputEncoding, WorkItem, LENIENT_BASE64},
    providers::ParsedImages,
};

/// Where projected values land.
#[derive(Debug, Clone, Copy)]
pub struct NamingContext<'a> {
    pub output_property_name: &'a str,
    pub file_name: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    Base64(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedImage {
    pub index: usize,
    pub mime_type: String,
    pub payload: ImagePayload,
}

impl MaterializedImage {
    pub fn into_base64(self) -> String {
        match self.payload {
            ImagePayload::Base64(data) => data,
            ImagePayload::Bytes(bytes) => STANDARD.encode(bytes),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self.payload {
            ImagePayload::Bytes(bytes) => Ok(bytes),
            ImagePayload::Base64(data) => {
                let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
                LENIENT_BASE64
                    .decode(compact.as_bytes())
                    .map_err(|e| NanoBananaError::InvalidImageData {
                        index: self.index,
                        reason: e.to_string(),
                    })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub index: usize,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Materialization {
    Materialized(MaterializedImage),
    Skipped(SkippedImage),
}

pub struct OutputProjector<'a> {
    transport: &'a dyn HttpTransport,
    attachments: &'a dyn AttachmentStore,
}

impl<'a> OutputProjector<'a> {
    pub fn new(transport: &'a dyn HttpTransport, attachments: &'a dyn AttachmentStore) -> Self {
        Self {
            transport,
            attachments,
        }
    }

    pub async fn project(
        &self,
        parsed: &ParsedImages,
        raw_response: &Value,
        encoding: OutputEncoding,
        naming: NamingContext<'_>,
    ) -> Result<WorkItem> {
        match encoding {
            OutputEncoding::RawResponse => Ok(raw_item(raw_response, naming)),
            OutputEncoding::BinaryAttachment => self.project_binary(&parsed.images, naming).await,
            OutputEncoding::Base64String => {
                let values = self
                    .materialize_all(&parsed.images)
                    .await
                    .into_iter()
                    .map(MaterializedImage::into_base64)
                    .collect();
                Ok(packed_item(parsed.images.len(), values, naming))
            }
            OutputEncoding::DataUri => {
                let values = self
                    .materialize_all(&parsed.images)
                    .await
                    .into_iter()
                    .map(|image| {
                        let mime_type = image.mime_type.clone();
                        format!("data:{};base64,{}", mime_type, image.into_base64())
                    })
                    .collect();
                Ok(packed_item(parsed.images.len(), values, naming))
            }
            OutputEncoding::RemoteUrl => {
                let mut values = remote_urls(&parsed.images);
                if values.is_empty() && !parsed.text.is_empty() {
                    values.push(parsed.text.clone());
                }
                Ok(packed_item(parsed.images.len(), values, naming))
            }
        }
    }

    /// Fetches url-kind images; base64-kind images pass straight through.
    pub async fn materialize(&self, index: usize, image: &ExtractedImage) -> Materialization {
        match image.kind {
            ImageKind::Base64 => Materialization::Materialized(MaterializedImage {
                index,
                mime_type: image.mime_type.clone(),
                payload: ImagePayload::Base64(image.data.clone()),
            }),
            ImageKind::Url => match self.download(&image.data).await {
                Ok((bytes, content_type)) => Materialization::Materialized(MaterializedImage {
                    index,
                    mime_type: content_type.unwrap_or_else(|| image.mime_type.clone()),
                    payload: ImagePayload::Bytes(bytes),
                }),
                Err(reason) => Materialization::Skipped(SkippedImage {
                    index,
                    url: image.data.clone(),
                    reason,
                }),
            },
        }
    }

    async fn materialize_all(&self, images: &[ExtractedImage]) -> Vec<MaterializedImage> {
        let mut materialized = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            match self.materialize(index, image).await {
                Materialization::Materialized(image) => materialized.push(image),
                Materialization::Skipped(skipped) => {
                    log::warn!(
                        "Skipping image #{} ({}): {}",
                        skipped.index,
                        skipped.url,
                        skipped.reason
                    );
                }
            }
        }
        materialized
    }

    async fn project_binary(
        &self,
        images: &[ExtractedImage],
        naming: NamingContext<'_>,
    ) -> Result<WorkItem> {
        let mut item = WorkItem::new();
        for (index, image) in images.iter().enumerate() {
            let materialized = match self.materialize(index, image).await {
                Materialization::Materialized(image) => image,
                Materialization::Skipped(skipped) => {
                    return Err(NanoBananaError::ImageDownloadFailed {
                        url: skipped.url,
                        reason: skipped.reason,
                    })
                }
            };

            let mime_type = materialized.mime_type.clone();
            let bytes = materialized.into_bytes()?;
            let file_name = attachment_file_name(naming.file_name, index, images.len());
            let binary = self.attachments.prepare(bytes, &file_name, &mime_type).await?;
            item.binary
                .insert(attachment_key(naming.output_property_name, index), binary);
        }

        item.json = success_json(images.len());
        Ok(item)
    }

    async fn download(&self, url: &str) -> std::result::Result<(Vec<u8>, Option<String>), String> {
        let response = self
            .transport
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }
        let content_type = response
            .content_type()
            .filter(|mime| mime.starts_with("image/"));
        Ok((response.body, content_type))
    }
}

pub fn attachment_key(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{}_{}", base, index)
    }
}

/// `image_{index}.png` by default. A custom name is used as-is for a single
/// image and gets the index spliced in before its extension otherwise.
pub fn attachment_file_name(custom: Option<&str>, index: usize, total: usize) -> String {
    match custom.map(str::trim).filter(|name| !name.is_empty()) {
        None => format!("image_{}.png", index),
        Some(name) if total <= 1 => name.to_string(),
        Some(name) => match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, index, ext),
            _ => format!("{}_{}", name, index),
        },
    }
}

fn remote_urls(images: &[ExtractedImage]) -> Vec<String> {
    images
        .iter()
        .filter_map(|image| match image.kind {
            ImageKind::Url => Some(image.data.clone()),
            // no upload capability, so there is no URL to give
            ImageKind::Base64 => None,
        })
        .collect()
}

fn success_json(count: usize) -> Map<String, Value> {
    let mut json = Map::new();
    json.insert("success".to_string(), Value::Bool(true));
    json.insert("count".to_string(), json!(count));
    json
}

/// Zero values: field omitted. One value: bare string. More: ordered list.
fn packed_item(count: usize, values: Vec<String>, naming: NamingContext<'_>) -> WorkItem {
    let mut json = success_json(count);
    let field = naming.output_property_name.to_string();
    match values.len() {
        0 => {}
        1 => {
            json.insert(field, Value::String(values.into_iter().next().unwrap_or_default()));
        }
        _ => {
            json.insert(field, Value::Array(values.into_iter().map(Value::String).collect()));
        }
    }
    WorkItem::from_json(json)
}

fn raw_item(raw_response: &Value, naming: NamingContext<'_>) -> WorkItem {
    match raw_response {
        Value::Object(map) => WorkItem::from_json(map.clone()),
        other => {
            let mut json = Map::new();
            json.insert(naming.output_property_name.to_string(), other.clone());
            WorkItem::from_json(json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HttpResponse, InlineAttachments};
    use crate::http::testing::ScriptedTransport;

    const NAMING: NamingContext<'static> = NamingContext {
        output_property_name: "data",
        file_name: None,
    };

    fn parsed(images: Vec<ExtractedImage>) -> ParsedImages {
        ParsedImages {
            images,
            text: String::new(),
        }
    }

    #[tokio::test]
    async fn test_single_base64_value_is_bare_string() {
        let transport = ScriptedTransport::new();
        let projector = OutputProjector::new(&transport, &InlineAttachments);
        let item = projector
            .project(
                &parsed(vec![ExtractedImage::base64("image/png", "AAA=")]),
                &Value::Null,
                OutputEncoding::Base64String,
                NAMING,
            )
            .await
            .unwrap();
        assert_eq!(item.json["data"], json!("AAA="));
        assert_eq!(item.json["success"], json!(true));
        assert_eq!(item.json["count"], json!(1));
    }

    #[tokio::test]
    async fn test_two_values_are_an_ordered_list() {
        let transport = ScriptedTransport::new();
        let projector = OutputProjector::new(&transport, &InlineAttachments);
        let images = parsed(vec![
            ExtractedImage::base64("image/png", "FIRST="),
            ExtractedImage::base64("image/jpeg", "SECOND="),
        ]);

        let item = projector
            .project(&images, &Value::Null, OutputEncoding::Base64String, NAMING)
            .await
            .unwrap();
        assert_eq!(item.json["data"], json!(["FIRST=", "SECOND="]));

        let item = projector
            .project(&images, &Value::Null, OutputEncoding::DataUri, NAMING)
            .await
            .unwrap();
        assert_eq!(
            item.json["data"],
            json!(["data:image/png;base64,FIRST=", "data:image/jpeg;base64,SECOND="])
        );
    }

    #[tokio::test]
    async fn test_base64_projection_swallows_download_failures() {
        let transport = ScriptedTransport::new()
            .fail("https://cdn.test/gone.png", "connection reset")
            .route(
                "https://cdn.test/ok.jpg",
                HttpResponse::new(200, vec![1u8, 2, 3]).with_header("content-type", "image/jpeg"),
            );
        let projector = OutputProjector::new(&transport, &InlineAttachments);
        let images = parsed(vec![
            ExtractedImage::url("https://cdn.test/gone.png"),
            ExtractedImage::url("https://cdn.test/ok.jpg"),
        ]);

        let item = projector
            .project(&images, &Value::Null, OutputEncoding::DataUri, NAMING)
            .await
            .unwrap();
        assert_eq!(item.json["data"], json!("data:image/jpeg;base64,AQID"));
        assert_eq!(item.json["count"], json!(2));
    }

    #[tokio::test]
    async fn test_binary_projection_fails_on_download_error() {
        let transport = ScriptedTransport::new().route("https://cdn.test/gone.png", HttpResponse::new(404, ""));
        let projector = OutputProjector::new(&transport, &InlineAttachments);
        let err = projector
            .project(
                &parsed(vec![ExtractedImage::url("https://cdn.test/gone.png")]),
                &Value::Null,
                OutputEncoding::BinaryAttachment,
                NAMING,
            )
            .await
            .unwrap_err();
        match err {
            NanoBananaError::ImageDownloadFailed { url, reason } => {
                assert_eq!(url, "https://cdn.test/gone.png");
                assert_eq!(reason, "HTTP 404");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_binary_attachment_naming() {
        let transport = ScriptedTransport::new();
        let projector = OutputProjector::new(&transport, &InlineAttachments);
        let images = parsed(vec![
            ExtractedImage::base64("image/png", "AAAA"),
            ExtractedImage::base64("image/png", "BBBB"),
            ExtractedImage::base64("image/png", "CCCC"),
        ]);
        let item = projector
            .project(&images, &Value::Null, OutputEncoding::BinaryAttachment, NAMING)
            .await
            .unwrap();

        let keys: Vec<&str> = item.binary.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["data", "data_1", "data_2"]);
        assert_eq!(item.binary["data"].file_name.as_deref(), Some("image_0.png"));
        assert_eq!(item.binary["data_1"].file_name.as_deref(), Some("image_1.png"));
        assert_eq!(item.binary["data_2"].file_name.as_deref(), Some("image_2.png"));
        assert_eq!(item.binary["data_1"].data, "BBBB");
        assert_eq!(item.json["count"], json!(3));
    }

    #[tokio::test]
    async fn test_binary_projection_accepts_unpadded_base64() {
        let transport = ScriptedTransport::new();
        let projector = OutputProjector::new(&transport, &InlineAttachments);
        let blob = "iVBORw0KGgo".repeat(10);
        let item = projector
            .project(
                &parsed(vec![ExtractedImage::base64("image/png", blob)]),
                &Value::Null,
                OutputEncoding::BinaryAttachment,
                NAMING,
            )
            .await
            .unwrap();
        assert_eq!(item.binary["data"].file_size, 82);
        assert_eq!(item.binary["data"].bytes().unwrap().len(), 82);
    }

    #[test]
    fn test_custom_file_names() {
        assert_eq!(attachment_file_name(Some("photo.png"), 0, 1), "photo.png");
        assert_eq!(attachment_file_name(Some("photo.png"), 1, 2), "photo_1.png");
        assert_eq!(attachment_file_name(Some("photo"), 2, 3), "photo_2");
        assert_eq!(attachment_file_name(Some(" "), 1, 2), "image_1.png");
    }

    #[tokio::test]
    async fn test_remote_url_projection() {
        let transport = ScriptedTransport::new();
        let projector = OutputProjector::new(&transport, &InlineAttachments);

        let mixed = parsed(vec![
            ExtractedImage::base64("image/png", "AAAA"),
            ExtractedImage::url("https://cdn.test/a.png"),
        ]);
        let item = projector
            .project(&mixed, &Value::Null, OutputEncoding::RemoteUrl, NAMING)
            .await
            .unwrap();
        assert_eq!(item.json["data"], json!("https://cdn.test/a.png"));

        let base64_only = ParsedImages {
            images: vec![ExtractedImage::base64("image/png", "AAAA")],
            text: "Here is your picture".to_string(),
        };
        let item = projector
            .project(&base64_only, &Value::Null, OutputEncoding::RemoteUrl, NAMING)
            .await
            .unwrap();
        assert_eq!(item.json["data"], json!("Here is your picture"));

        let item = projector
            .project(&parsed(vec![ExtractedImage::base64("image/png", "AAAA")]), &Value::Null, OutputEncoding::RemoteUrl, NAMING)
            .await
            .unwrap();
        assert!(!item.json.contains_key("data"));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_raw_projection_bypasses_images() {
        let transport = ScriptedTransport::new();
        let projector = OutputProjector::new(&transport, &InlineAttachments);
        let raw = json!({"candidates": [], "modelVersion": "x"});
        let item = projector
            .project(&parsed(vec![]), &raw, OutputEncoding::RawResponse, NAMING)
            .await
            .unwrap();
        assert_eq!(Value::Object(item.json), raw);
        assert!(item.binary.is_empty());
    }
}
