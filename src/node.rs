use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::{
    config::{Credentials, NodeParameters},
    error::{NanoBananaError, Result},
    host::{AttachmentStore, CredentialCheck, HttpTransport, InlineAttachments, ParameterSource},
    logger,
    models::{GenerationRequest, Operation, WorkItem},
    projector::{NamingContext, OutputProjector},
    providers::{self, Protocol},
    resolver::ReferenceResolver,
};

/// Where an item is in its pipeline. Failures record the stage they happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Start,
    ValidateAuth,
    ResolveReferences,
    BuildRequest,
    CallUpstream,
    ParseResponse,
    CheckZeroResult,
    ProjectOutput,
    Done,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemStage::Start => "parameter retrieval",
            ItemStage::ValidateAuth => "credential check",
            ItemStage::ResolveReferences => "reference image resolution",
            ItemStage::BuildRequest => "request building",
            ItemStage::CallUpstream => "upstream call",
            ItemStage::ParseResponse => "response parsing",
            ItemStage::CheckZeroResult => "zero-result check",
            ItemStage::ProjectOutput => "output projection",
            ItemStage::Done => "completion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// All items in flight at once; results still come back in input order.
    FanOut,
}

#[derive(Clone)]
pub struct NanoBananaNode {
    credentials: Credentials,
    transport: Arc<dyn HttpTransport>,
    attachments: Arc<dyn AttachmentStore>,
    credential_check: Option<Arc<dyn CredentialCheck>>,
    continue_on_fail: bool,
    mode: ExecutionMode,
}

impl NanoBananaNode {
    pub fn new(credentials: Credentials, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            credentials,
            transport,
            attachments: Arc::new(InlineAttachments),
            credential_check: None,
            continue_on_fail: false,
            mode: ExecutionMode::Sequential,
        }
    }

    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_credential_check(mut self, check: Arc<dyn CredentialCheck>) -> Self {
        self.credential_check = Some(check);
        self
    }

    pub fn with_continue_on_fail(mut self, enabled: bool) -> Self {
        self.continue_on_fail = enabled;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.credentials.connection_type)
    }

    /// Runs every item. Output order always matches input order.
    pub async fn execute(
        &self,
        items: &[WorkItem],
        parameters: &dyn ParameterSource,
    ) -> Result<Vec<WorkItem>> {
        log::info!(
            "Processing {} item(s) via {} protocol ({:?})",
            items.len(),
            self.protocol().name(),
            self.mode
        );

        let mut outputs = Vec::with_capacity(items.len());
        match self.mode {
            ExecutionMode::Sequential => {
                for (item_index, item) in items.iter().enumerate() {
                    let result = self.process_item(item_index, item, parameters).await;
                    outputs.push(self.settle(result)?);
                }
            }
            ExecutionMode::FanOut => {
                // siblings are never cancelled; every request settles before the first error is surfaced
                let results = join_all(
                    items
                        .iter()
                        .enumerate()
                        .map(|(item_index, item)| self.process_item(item_index, item, parameters)),
                )
                .await;
                for result in results {
                    outputs.push(self.settle(result)?);
                }
            }
        }

        Ok(outputs)
    }

    fn settle(&self, result: Result<WorkItem>) -> Result<WorkItem> {
        match result {
            Ok(output) => Ok(output),
            Err(e) if self.continue_on_fail => {
                log::error!("{}", e);
                Ok(WorkItem::error(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn process_item(
        &self,
        item_index: usize,
        item: &WorkItem,
        parameters: &dyn ParameterSource,
    ) -> Result<WorkItem> {
        let mut stage = ItemStage::Start;
        let at = move |stage: ItemStage| move |e: NanoBananaError| e.at_item(item_index, stage);

        let params = parameters.parameters(item_index, item).map_err(at(stage))?;
        params.validate().map_err(at(stage))?;

        stage = self.advance(item_index, ItemStage::ValidateAuth);
        self.credentials.validate().map_err(at(stage))?;
        if let Some(check) = &self.credential_check {
            check.check(&self.credentials).map_err(at(stage))?;
        }

        stage = self.advance(item_index, ItemStage::ResolveReferences);
        let request = self
            .generation_request(&params, item)
            .await
            .map_err(at(stage))?;

        stage = self.advance(item_index, ItemStage::BuildRequest);
        let protocol = self.protocol();
        let http_request = protocol
            .build(&self.credentials, &request)
            .map_err(at(stage))?;

        stage = self.advance(item_index, ItemStage::CallUpstream);
        let response = {
            let _timer = logger::timer(&format!("item {} {} call", item_index, protocol.name()));
            self.transport.send(http_request).await.map_err(at(stage))?
        };

        stage = self.advance(item_index, ItemStage::ParseResponse);
        let reply = protocol.decode(&response).map_err(at(stage))?;
        let parsed = providers::parse(&reply);
        log::info!(
            "Item {}: extracted {} image(s) from {} response",
            item_index,
            parsed.images.len(),
            protocol.name()
        );

        stage = self.advance(item_index, ItemStage::CheckZeroResult);
        if parsed.is_empty() {
            if params.throw_on_failure {
                return Err(NanoBananaError::NoImagesExtracted {
                    raw_response: reply.raw,
                }
                .at_item(item_index, stage));
            }
            log::warn!("Item {}: no images extracted, returning soft failure", item_index);
            self.advance(item_index, ItemStage::Done);
            return Ok(soft_failure(reply.raw));
        }

        stage = self.advance(item_index, ItemStage::ProjectOutput);
        let naming = NamingContext {
            output_property_name: &params.output_property_name,
            file_name: params.file_name.as_deref(),
        };
        let output = OutputProjector::new(self.transport.as_ref(), self.attachments.as_ref())
            .project(&parsed, &reply.raw, params.output_format, naming)
            .await
            .map_err(at(stage))?;

        self.advance(item_index, ItemStage::Done);
        Ok(output)
    }

    async fn generation_request(
        &self,
        params: &NodeParameters,
        item: &WorkItem,
    ) -> Result<GenerationRequest> {
        let mut request = GenerationRequest::new(params.prompt.clone(), params.model)
            .with_aspect_ratio(params.aspect_ratio)
            .with_resolution(params.resolution);

        if params.operation == Operation::ImageToImage {
            let images = match &params.reference_images {
                Some(input) => {
                    ReferenceResolver::new(self.transport.as_ref())
                        .resolve(input, item, params.model)
                        .await?
                }
                None => Vec::new(),
            };
            if images.is_empty() {
                return Err(NanoBananaError::invalid_parameter(
                    "referenceImages",
                    "image-to-image needs at least one reference image",
                ));
            }
            request = request.with_reference_images(images);
        }

        Ok(request)
    }

    fn advance(&self, item_index: usize, stage: ItemStage) -> ItemStage {
        log::debug!("Item {}: {}", item_index, stage);
        stage
    }
}

fn soft_failure(raw_response: Value) -> WorkItem {
    let mut json = Map::new();
    json.insert("success".to_string(), Value::Bool(false));
    json.insert("count".to_string(), json!(0));
    json.insert("originalResponse".to_string(), raw_response);
    WorkItem::from_json(json)
}
