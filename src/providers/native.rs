use crate::models::{
    ExtractedImage, GenerationConfig, GenerationRequest, ImageConfig, InlineData, Model,
    NativeContent, NativeRequest, NativeRequestPart, NativeResponse,
};

use super::ParsedImages;

pub fn endpoint(base_url: &str, model: Model) -> String {
    format!("{}/v1beta/models/{}:generateContent", base_url, model.id())
}

pub fn build_request(request: &GenerationRequest) -> NativeRequest {
    let mut parts = Vec::with_capacity(request.reference_images.len() + 1);
    parts.push(NativeRequestPart::Text {
        text: request.prompt.clone(),
    });
    parts.extend(
        request
            .reference_images
            .iter()
            .map(|image| NativeRequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            }),
    );

    NativeRequest {
        contents: vec![NativeContent { parts }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE".to_string()],
            image_config: ImageConfig {
                aspect_ratio: request.aspect_ratio.to_string(),
                image_size: request.image_size().map(|size| size.to_string()),
            },
        },
    }
}

/// Walks the first candidate's parts in order.
pub fn parse_response(response: &NativeResponse) -> ParsedImages {
    let mut parsed = ParsedImages::default();

    let parts = response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| content.parts.as_slice())
        .unwrap_or_default();

    for part in parts {
        if let Some(text) = &part.text {
            parsed.text.push_str(text);
        }
        if let Some(inline) = &part.inline_data {
            parsed
                .images
                .push(ExtractedImage::base64(inline.mime_type.clone(), inline.data.clone()));
        }
    }

    parsed
}
