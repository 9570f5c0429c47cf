//! Image generation for Gemini image models behind a workflow-node surface.
//!
//! Talks either the native `generateContent` protocol or an OpenAI-compatible
//! chat completions endpoint, resolves reference images from URLs, data URIs,
//! raw base64 or binary attachments, and projects generated images into the
//! requested output shape.

pub mod config;
pub mod error;
pub mod host;
pub mod http;
pub mod logger;
pub mod models;
pub mod node;
pub mod projector;
pub mod providers;
pub mod resolver;

pub use config::{ConnectionType, Credentials, NodeParameters, ReferenceImagesInput};
pub use error::{NanoBananaError, Result};
pub use host::{
    AttachmentStore, CredentialCheck, ExpectedAuthCode, HttpRequest, HttpResponse, HttpTransport,
    InlineAttachments, ParameterSource,
};
pub use http::ReqwestTransport;
pub use models::*;
pub use node::{ExecutionMode, ItemStage, NanoBananaNode};
pub use providers::{ParsedImages, Protocol};
pub use resolver::ReferenceResolver;
