//! Turns the reference-images field into canonical `{mimeType, base64}` images.
//!
//! Entries are classified in a fixed order: data URI, http(s) URL, raw base64
//! blob, and finally the name of a binary attachment on the current item.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::ReferenceImagesInput,
    error::{NanoBananaError, Result},
    host::{HttpRequest, HttpTransport},
    models::{CanonicalImage, Model, WorkItem, DEFAULT_MIME_TYPE},
};

pub const DEFAULT_DELIMITERS: &[char] = &['|', '\n'];

const PREVIEW_CHARS: usize = 50;
const RAW_BASE64_MIN_LEN: usize = 100;

// media type parameters such as `;charset=` may precede `;base64`
static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([^;,]+)(?:;[^;,]+)*?;base64,(.+)$").expect("valid data URI regex")
});
static RAW_BASE64: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/=\s]+$").expect("valid base64 regex"));

/// How a single entry was recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource<'a> {
    DataUri { mime_type: &'a str, payload: &'a str },
    RemoteUrl(&'a str),
    RawBase64(String),
    BinaryField(&'a str),
}

#[derive(Debug)]
enum EntryFailure {
    Invalid(String),
    Fetch { url: String, reason: String },
    MissingField { field: String, available: Vec<String> },
}

impl EntryFailure {
    fn at(self, position: usize, entry: &str) -> NanoBananaError {
        match self {
            EntryFailure::Invalid(reason) => NanoBananaError::InvalidReferenceImage {
                position,
                preview: preview(entry),
                reason,
            },
            EntryFailure::Fetch { url, reason } => NanoBananaError::ReferenceImageFetchFailed {
                position,
                url,
                reason,
            },
            EntryFailure::MissingField { field, available } => {
                NanoBananaError::BinaryFieldNotFound {
                    position,
                    field,
                    available,
                }
            }
        }
    }
}

/// Splits the raw field into trimmed, non-empty entries. Lists are taken as already split.
pub fn split_entries(input: &ReferenceImagesInput, delimiters: &[char]) -> Vec<String> {
    let pieces: Vec<&str> = match input {
        ReferenceImagesInput::List(items) => items.iter().map(String::as_str).collect(),
        ReferenceImagesInput::Text(text) => text.split(delimiters).collect(),
    };

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn classify(entry: &str) -> std::result::Result<ReferenceSource<'_>, String> {
    if entry.starts_with("data:") {
        let captures = DATA_URI
            .captures(entry)
            .ok_or_else(|| "malformed data URI, expected data:<mime>;base64,<payload>".to_string())?;
        let (mime_type, payload) = match (captures.get(1), captures.get(2)) {
            (Some(mime), Some(payload)) => (mime.as_str(), payload.as_str()),
            _ => return Err("malformed data URI".to_string()),
        };
        if !is_image_mime(mime_type) {
            return Err(format!("data URI mime type '{}' is not an image", mime_type));
        }
        return Ok(ReferenceSource::DataUri { mime_type, payload });
    }

    if entry.starts_with("http://") || entry.starts_with("https://") {
        return Ok(ReferenceSource::RemoteUrl(entry));
    }

    if RAW_BASE64.is_match(entry) {
        let compact: String = entry.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() > RAW_BASE64_MIN_LEN {
            return Ok(ReferenceSource::RawBase64(compact));
        }
    }

    Ok(ReferenceSource::BinaryField(entry))
}

pub fn check_limit(model: Model, count: usize) -> Result<()> {
    let limit = model.max_reference_images();
    if count > limit {
        return Err(NanoBananaError::TooManyReferenceImages {
            model: model.id().to_string(),
            limit,
            count,
        });
    }
    Ok(())
}

pub struct ReferenceResolver<'a> {
    transport: &'a dyn HttpTransport,
    delimiters: Vec<char>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(transport: &'a dyn HttpTransport) -> Self {
        Self {
            transport,
            delimiters: DEFAULT_DELIMITERS.to_vec(),
        }
    }

    pub fn with_delimiters(mut self, delimiters: &[char]) -> Self {
        self.delimiters = delimiters.to_vec();
        self
    }

    /// Resolves every entry in order. The first bad entry fails the whole field.
    pub async fn resolve(
        &self,
        input: &ReferenceImagesInput,
        item: &WorkItem,
        model: Model,
    ) -> Result<Vec<CanonicalImage>> {
        let entries = split_entries(input, &self.delimiters);
        // one entry always yields one image, so the limit can be checked before any fetch
        check_limit(model, entries.len())?;

        let mut images = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let image = self
                .resolve_entry(entry, item)
                .await
                .map_err(|failure| failure.at(index + 1, entry))?;
            log::debug!(
                "Reference image #{} resolved ({}, {} base64 chars)",
                index + 1,
                image.mime_type,
                image.data.len()
            );
            images.push(image);
        }

        Ok(images)
    }

    async fn resolve_entry(
        &self,
        entry: &str,
        item: &WorkItem,
    ) -> std::result::Result<CanonicalImage, EntryFailure> {
        match classify(entry).map_err(EntryFailure::Invalid)? {
            ReferenceSource::DataUri { mime_type, payload } => {
                Ok(CanonicalImage::new(mime_type, payload))
            }
            ReferenceSource::RemoteUrl(url) => self.fetch(url).await,
            ReferenceSource::RawBase64(data) => Ok(CanonicalImage::new(DEFAULT_MIME_TYPE, data)),
            ReferenceSource::BinaryField(field) => from_binary_field(field, item),
        }
    }

    async fn fetch(&self, url: &str) -> std::result::Result<CanonicalImage, EntryFailure> {
        let fetch_failed = |reason: String| EntryFailure::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .transport
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !response.is_success() {
            return Err(fetch_failed(format!("HTTP {}", response.status)));
        }
        if response.body.is_empty() {
            return Err(fetch_failed("empty response body".to_string()));
        }

        let mime_type = response
            .content_type()
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        if !is_image_mime(&mime_type) {
            return Err(EntryFailure::Invalid(format!(
                "URL returned content type '{}', expected an image",
                mime_type
            )));
        }

        Ok(CanonicalImage::new(mime_type, STANDARD.encode(&response.body)))
    }
}

fn from_binary_field(
    field: &str,
    item: &WorkItem,
) -> std::result::Result<CanonicalImage, EntryFailure> {
    let binary = item
        .binary
        .get(field)
        .ok_or_else(|| EntryFailure::MissingField {
            field: field.to_string(),
            available: item.binary_field_names(),
        })?;

    if !is_image_mime(&binary.mime_type) {
        return Err(EntryFailure::Invalid(format!(
            "binary field '{}' has mime type '{}', expected an image",
            field, binary.mime_type
        )));
    }

    Ok(CanonicalImage::new(binary.mime_type.clone(), binary.data.clone()))
}

fn is_image_mime(mime_type: &str) -> bool {
    mime_type.trim().to_ascii_lowercase().starts_with("image/")
}

fn preview(entry: &str) -> String {
    let mut head: String = entry.chars().take(PREVIEW_CHARS).collect();
    if entry.chars().count() > PREVIEW_CHARS {
        head.push_str("...");
    }
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HttpResponse;
    use crate::http::testing::ScriptedTransport;
    use crate::models::BinaryData;

    fn long_base64() -> String {
        "QUJD".repeat(40)
    }

    #[test]
    fn test_split_drops_blank_segments() {
        let input = ReferenceImagesInput::from(" https://a.test/1.png |\n\n| https://a.test/2.png \n ");
        assert_eq!(
            split_entries(&input, DEFAULT_DELIMITERS),
            vec!["https://a.test/1.png", "https://a.test/2.png"]
        );

        let list = ReferenceImagesInput::List(vec!["a|b".into(), "  ".into()]);
        assert_eq!(split_entries(&list, DEFAULT_DELIMITERS), vec!["a|b"]);
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(
            classify("data:image/png;base64,AAA=").unwrap(),
            ReferenceSource::DataUri {
                mime_type: "image/png",
                payload: "AAA="
            }
        );
        assert_eq!(
            classify("https://x.test/a.png").unwrap(),
            ReferenceSource::RemoteUrl("https://x.test/a.png")
        );
        assert!(matches!(
            classify(&long_base64()).unwrap(),
            ReferenceSource::RawBase64(_)
        ));
        // too short to be taken for base64
        assert_eq!(classify("photo").unwrap(), ReferenceSource::BinaryField("photo"));
        assert!(classify("data:text/plain;base64,AAA=").is_err());
        assert!(classify("data:image/png,AAA=").is_err());
        assert_eq!(
            classify("data:image/png;charset=utf-8;name=a.png;base64,AAA=").unwrap(),
            ReferenceSource::DataUri {
                mime_type: "image/png",
                payload: "AAA="
            }
        );
    }

    #[tokio::test]
    async fn test_data_uri_round_trip() {
        let transport = ScriptedTransport::new();
        let resolver = ReferenceResolver::new(&transport);
        let images = resolver
            .resolve(&"data:image/png;base64,AAA=".into(), &WorkItem::new(), Model::Flash)
            .await
            .unwrap();
        assert_eq!(images, vec![CanonicalImage::new("image/png", "AAA=")]);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_raw_base64_strips_whitespace() {
        let transport = ScriptedTransport::new();
        let raw = format!("{}\n  {}", &long_base64()[..80], &long_base64()[80..]);
        let images = ReferenceResolver::new(&transport)
            .with_delimiters(&['|'])
            .resolve(&raw.as_str().into(), &WorkItem::new(), Model::Flash)
            .await
            .unwrap();
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[0].data, long_base64());
    }

    #[tokio::test]
    async fn test_remote_url_is_fetched_and_encoded() {
        let transport = ScriptedTransport::new().route(
            "https://img.test/cat.jpg",
            HttpResponse::new(200, vec![1u8, 2, 3]).with_header("Content-Type", "image/jpeg"),
        );
        let images = ReferenceResolver::new(&transport)
            .resolve(&"https://img.test/cat.jpg".into(), &WorkItem::new(), Model::Pro)
            .await
            .unwrap();
        assert_eq!(images, vec![CanonicalImage::new("image/jpeg", "AQID")]);
    }

    #[tokio::test]
    async fn test_remote_url_failures() {
        let transport = ScriptedTransport::new()
            .fail("https://img.test/down.png", "connection refused")
            .route("https://img.test/gone.png", HttpResponse::new(404, "nope"))
            .route(
                "https://img.test/page.html",
                HttpResponse::new(200, "<html>").with_header("content-type", "text/html"),
            );
        let resolver = ReferenceResolver::new(&transport);
        let item = WorkItem::new();

        let err = resolver
            .resolve(&"https://img.test/down.png".into(), &item, Model::Flash)
            .await
            .unwrap_err();
        match err {
            NanoBananaError::ReferenceImageFetchFailed { position, url, reason } => {
                assert_eq!(position, 1);
                assert_eq!(url, "https://img.test/down.png");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = resolver
            .resolve(
                &"data:image/png;base64,AAA=|https://img.test/gone.png".into(),
                &item,
                Model::Flash,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NanoBananaError::ReferenceImageFetchFailed { position: 2, .. }
        ));
        assert!(err.to_string().contains("HTTP 404"));

        let err = resolver
            .resolve(&"https://img.test/page.html".into(), &item, Model::Flash)
            .await
            .unwrap_err();
        assert!(matches!(err, NanoBananaError::InvalidReferenceImage { .. }));
    }

    #[tokio::test]
    async fn test_binary_field_lookup() {
        let transport = ScriptedTransport::new();
        let item = WorkItem::new()
            .with_binary("photo", BinaryData::from_bytes(b"png!", "photo.png", "image/png"))
            .with_binary("doc", BinaryData::from_bytes(b"pdf", "a.pdf", "application/pdf"));
        let resolver = ReferenceResolver::new(&transport);

        let images = resolver.resolve(&"photo".into(), &item, Model::Flash).await.unwrap();
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[0].data, STANDARD.encode(b"png!"));

        let err = resolver.resolve(&"missing".into(), &item, Model::Flash).await.unwrap_err();
        match err {
            NanoBananaError::BinaryFieldNotFound { field, available, .. } => {
                assert_eq!(field, "missing");
                assert_eq!(available, vec!["doc".to_string(), "photo".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = resolver.resolve(&"doc".into(), &item, Model::Flash).await.unwrap_err();
        assert!(matches!(err, NanoBananaError::InvalidReferenceImage { .. }));
    }

    #[tokio::test]
    async fn test_invalid_entry_reports_position_and_preview() {
        let transport = ScriptedTransport::new();
        let bad = format!("data:application/pdf;base64,{}", "A".repeat(80));
        let input = format!("data:image/png;base64,AAA=|{}", bad);
        let err = ReferenceResolver::new(&transport)
            .resolve(&input.as_str().into(), &WorkItem::new(), Model::Flash)
            .await
            .unwrap_err();
        match err {
            NanoBananaError::InvalidReferenceImage { position, preview, .. } => {
                assert_eq!(position, 2);
                assert_eq!(preview, format!("{}...", &bad[..50]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_reference_limits_per_model() {
        let transport = ScriptedTransport::new();
        let resolver = ReferenceResolver::new(&transport);
        let item = WorkItem::new();
        let entries = |n: usize| {
            ReferenceImagesInput::List(vec!["data:image/png;base64,AAA=".to_string(); n])
        };

        for (model, limit) in [(Model::Flash, 3), (Model::Pro, 14)] {
            for n in 1..=limit {
                let images = resolver.resolve(&entries(n), &item, model).await.unwrap();
                assert_eq!(images.len(), n);
            }
            let err = resolver.resolve(&entries(limit + 1), &item, model).await.unwrap_err();
            match err {
                NanoBananaError::TooManyReferenceImages { model: name, limit: l, count } => {
                    assert_eq!(name, model.id());
                    assert_eq!(l, limit);
                    assert_eq!(count, limit + 1);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
