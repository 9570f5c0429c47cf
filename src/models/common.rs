use serde::{Deserialize, Serialize};

use super::image::Model;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub max_reference_images: usize,
    pub supports_resolution: bool,
    pub description: String,
}

impl ModelInfo {
    pub fn for_model(model: Model) -> Self {
        let (name, description) = match model {
            Model::Flash => (
                "Nano Banana (Flash)",
                "Fast image generation and editing",
            ),
            Model::Pro => (
                "Nano Banana Pro (Pro)",
                "Higher fidelity generation with selectable 1K/2K/4K output",
            ),
        };

        Self {
            id: model.id().to_string(),
            name: name.to_string(),
            max_reference_images: model.max_reference_images(),
            supports_resolution: model.supports_resolution(),
            description: description.to_string(),
        }
    }
}

pub fn supported_models() -> Vec<ModelInfo> {
    [Model::Flash, Model::Pro]
        .into_iter()
        .map(ModelInfo::for_model)
        .collect()
}
