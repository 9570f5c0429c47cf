//! OpenAI-compatible chat completions: request shape and the free-text extraction cascade.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    ChatCompletionRequest, ChatCompletionResponse, ChatContent, ChatContentPart, ChatMessage,
    ExtraBody, ExtractedImage, GenerationRequest, ImageConfig, ImageUrl, DEFAULT_MIME_TYPE,
};

use super::ParsedImages;

const RAW_BASE64_MIN_LEN: usize = 100;

static MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)]*)\)").expect("valid markdown regex"));
static MARKDOWN_DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\s]+)$")
        .expect("valid data URI regex")
});
static DATA_URI_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:(image/[A-Za-z0-9.+-]+);base64,").expect("valid data URI regex")
});
static BASE64_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+=*").expect("valid base64 regex"));
static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'`)\]]+"#).expect("valid url regex"));
static RAW_BASE64: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/=]+$").expect("valid base64 regex"));

const URL_TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '*', '_', '"', '\'', ')', ']'];

pub fn endpoint(base_url: &str) -> String {
    format!("{}chat/completions", base_url)
}

pub fn build_request(request: &GenerationRequest) -> ChatCompletionRequest {
    // plain string content when there is nothing but text; some providers reject parts for that
    let content = if request.reference_images.is_empty() {
        ChatContent::Text(request.prompt.clone())
    } else {
        let mut parts = Vec::with_capacity(request.reference_images.len() + 1);
        parts.push(ChatContentPart::Text {
            text: request.prompt.clone(),
        });
        parts.extend(
            request
                .reference_images
                .iter()
                .map(|image| ChatContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.to_data_uri(),
                    },
                }),
        );
        ChatContent::Parts(parts)
    };

    ChatCompletionRequest {
        model: request.model.id().to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content,
        }],
        extra_body: ExtraBody {
            image_config: ImageConfig {
                aspect_ratio: request.aspect_ratio.to_string(),
                image_size: request.image_size().map(|size| size.to_string()),
            },
        },
    }
}

/// One step of the cascade. Stages run in order and the first non-empty result wins.
pub struct ExtractionStage {
    pub name: &'static str,
    pub extract: fn(&str) -> Vec<ExtractedImage>,
}

pub const CASCADE: [ExtractionStage; 4] = [
    ExtractionStage {
        name: "markdown image",
        extract: markdown_images,
    },
    ExtractionStage {
        name: "data URI",
        extract: bare_data_uri,
    },
    ExtractionStage {
        name: "bare URL",
        extract: bare_urls,
    },
    ExtractionStage {
        name: "raw base64",
        extract: raw_base64,
    },
];

pub fn run_cascade(content: &str) -> Vec<ExtractedImage> {
    for stage in CASCADE.iter() {
        let found = (stage.extract)(content);
        if !found.is_empty() {
            log::debug!("Extracted {} image(s) via {}", found.len(), stage.name);
            return found;
        }
    }
    Vec::new()
}

pub fn parse_response(response: &ChatCompletionResponse) -> ParsedImages {
    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.as_ref())
        .and_then(|message| message.text());

    match content {
        Some(text) if !text.is_empty() => ParsedImages {
            images: run_cascade(&text),
            text,
        },
        _ => ParsedImages::default(),
    }
}

pub fn markdown_images(content: &str) -> Vec<ExtractedImage> {
    MARKDOWN_IMAGE
        .captures_iter(content)
        .filter_map(|captures| captures.get(1))
        .filter_map(|target| classify_markdown_target(target.as_str()))
        .collect()
}

fn classify_markdown_target(target: &str) -> Option<ExtractedImage> {
    let target = target
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim();

    if target.starts_with("data:") {
        let captures = MARKDOWN_DATA_URI.captures(target)?;
        let mime_type = captures.get(1)?.as_str();
        let payload = strip_whitespace(captures.get(2)?.as_str());
        return Some(ExtractedImage::base64(mime_type, payload));
    }

    // `![alt](url "title")`: the title is not part of the target
    let url = target.split_whitespace().next()?;
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(ExtractedImage::url(url));
    }
    None
}

/// First data URI only. The payload may be broken across spaces or lines.
pub fn bare_data_uri(content: &str) -> Vec<ExtractedImage> {
    let Some(captures) = DATA_URI_PREFIX.captures(content) else {
        return Vec::new();
    };
    let (Some(prefix), Some(mime_type)) = (captures.get(0), captures.get(1)) else {
        return Vec::new();
    };

    let payload = base64_run(&content[prefix.end()..]);
    if payload.is_empty() {
        return Vec::new();
    }
    vec![ExtractedImage::base64(mime_type.as_str(), payload)]
}

/// Joins whitespace-separated base64 tokens. Stops at the first token that is
/// not pure base64 or right after padding; the first token may end in punctuation.
fn base64_run(text: &str) -> String {
    let mut payload = String::new();
    for (position, token) in text.split_whitespace().enumerate() {
        let run = BASE64_RUN.find(token).map_or("", |found| found.as_str());
        let whole = run.len() == token.len();
        if !whole && position > 0 {
            break;
        }
        payload.push_str(run);
        if !whole || run.ends_with('=') {
            break;
        }
    }
    payload
}

pub fn bare_urls(content: &str) -> Vec<ExtractedImage> {
    BARE_URL
        .find_iter(content)
        .map(|found| found.as_str().trim_end_matches(URL_TRAILING_PUNCTUATION))
        .filter(|url| !url.ends_with("://"))
        .map(|url| ExtractedImage::url(url))
        .collect()
}

pub fn raw_base64(content: &str) -> Vec<ExtractedImage> {
    let compact = strip_whitespace(content);
    if compact.len() > RAW_BASE64_MIN_LEN && RAW_BASE64.is_match(&compact) {
        vec![ExtractedImage::base64(DEFAULT_MIME_TYPE, compact)]
    } else {
        Vec::new()
    }
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
