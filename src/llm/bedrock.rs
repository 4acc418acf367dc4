use anyhow::{bail, Result};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{LanguageModel, ModelError, ModelFamily, PromptTemplate};
use crate::config::ModelConfig;
use crate::memory::Turn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

// ── Completion shape (Titan) ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    input_text: String,
    text_generation_config: TextGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextGenerationConfig {
    max_token_count: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    results: Vec<CompletionResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResult {
    output_text: String,
}

// ── Chat shape (Nova) ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    inference_config: InferenceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentBlock>,
}

impl ChatMessage {
    fn new(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: vec![ContentBlock {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct InferenceConfig {
    max_new_tokens: u32,
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    output: ChatOutput,
}

#[derive(Debug, Deserialize)]
struct ChatOutput {
    message: ChatMessage,
}

/// Build the JSON request body for `family`.
pub fn request_body(
    family: ModelFamily,
    template: &PromptTemplate,
    params: &GenerationParams,
    question: &str,
    history: &[Turn],
) -> Result<Vec<u8>, ModelError> {
    let prompt = template.render(question);

    let body = match family {
        ModelFamily::Completion => {
            let mut input_text = String::new();
            for turn in history {
                input_text.push_str(&format!("User: {}\nBot: {}\n", turn.question, turn.answer));
            }
            if !history.is_empty() {
                input_text.push('\n');
            }
            input_text.push_str(&prompt);

            serde_json::to_vec(&CompletionRequest {
                input_text,
                text_generation_config: TextGenerationConfig {
                    max_token_count: params.max_tokens,
                    temperature: params.temperature,
                    top_p: params.top_p,
                },
            })
        }
        ModelFamily::Chat => {
            let mut messages = Vec::with_capacity(history.len() * 2 + 1);
            for turn in history {
                messages.push(ChatMessage::new("user", turn.question.as_str()));
                messages.push(ChatMessage::new("assistant", turn.answer.as_str()));
            }
            messages.push(ChatMessage::new("user", prompt));

            serde_json::to_vec(&ChatRequest {
                messages,
                inference_config: InferenceConfig {
                    max_new_tokens: params.max_tokens,
                    temperature: params.temperature,
                    top_p: params.top_p,
                },
            })
        }
    };

    body.map_err(|e| ModelError::Invalid(format!("failed to encode request: {}", e)))
}

/// Pull the generated text out of a response body.
pub fn parse_reply(family: ModelFamily, body: &[u8]) -> Result<String, ModelError> {
    let malformed = |e: serde_json::Error| ModelError::MalformedResponse(e.to_string());

    let text = match family {
        ModelFamily::Completion => {
            let response: CompletionResponse = serde_json::from_slice(body).map_err(malformed)?;
            response
                .results
                .into_iter()
                .next()
                .map(|r| r.output_text)
                .ok_or_else(|| ModelError::MalformedResponse("no results".to_string()))?
        }
        ModelFamily::Chat => {
            let response: ChatResponse = serde_json::from_slice(body).map_err(malformed)?;
            response
                .output
                .message
                .content
                .into_iter()
                .find_map(|block| block.text)
                .ok_or_else(|| {
                    ModelError::MalformedResponse("no text content in message".to_string())
                })?
        }
    };

    // Titan answers usually start with a newline; Telegram refuses blank messages.
    let text = text.trim();
    if text.is_empty() {
        return Err(ModelError::MalformedResponse(
            "model returned empty text".to_string(),
        ));
    }
    Ok(text.to_string())
}

fn classify(err: SdkError<InvokeModelError>) -> ModelError {
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ModelError::Network(detail),
        SdkError::ServiceError(service) => match service.err() {
            InvokeModelError::AccessDeniedException(_) => ModelError::Unauthorized(detail),
            InvokeModelError::ValidationException(_)
            | InvokeModelError::ResourceNotFoundException(_) => ModelError::Invalid(detail),
            InvokeModelError::ThrottlingException(_)
            | InvokeModelError::ModelNotReadyException(_) => ModelError::Throttled(detail),
            _ => ModelError::Provider(detail),
        },
        _ => ModelError::Provider(detail),
    }
}

/// AWS Bedrock runtime `InvokeModel` client.
pub struct BedrockModel {
    client: Client,
    model_id: String,
    family: ModelFamily,
    template: PromptTemplate,
    params: GenerationParams,
}

impl BedrockModel {
    pub fn new(client: Client, config: &ModelConfig) -> Result<Self> {
        let model_id = config.model_id.trim();
        if model_id.is_empty() {
            bail!("No model id configured (set AWS_BEDROCK_MODEL_ID or [model].model_id)");
        }

        let family = match config.family.or_else(|| ModelFamily::infer(model_id)) {
            Some(family) => family,
            None => bail!(
                "Cannot tell the request format of model '{}'; set [model].family",
                model_id
            ),
        };

        info!("Bedrock model {} ({} format)", model_id, family);

        Ok(Self {
            client,
            model_id: model_id.to_string(),
            family,
            template: PromptTemplate::new(config.prompt_template.clone()),
            params: GenerationParams {
                temperature: config.temperature,
                top_p: config.top_p,
                max_tokens: config.max_tokens,
            },
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl LanguageModel for BedrockModel {
    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, ModelError> {
        let body = request_body(self.family, &self.template, &self.params, prompt, history)?;

        debug!("Invoking Bedrock model {}", self.model_id);

        let output = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(classify)?;

        parse_reply(self.family, output.body().as_ref())
    }
}
