use crate::{
    error::ProviderError,
    history::{Role, Turn},
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ImageUrlArgs,
    },
};
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use tracing::debug;

/// A single-shot chat completion over a conversation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Completes `history` under `system_prompt` and returns the reply text.
    ///
    /// Bounded by the provider's own request timeout.
    async fn complete(
        &self,
        history: &[Turn],
        system_prompt: &str,
    ) -> Result<String, ProviderError>;
}

/// Describes an image in answer to a prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// `mime_type` is the detected type of `image`, e.g. `image/png`.
    async fn analyze(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, ProviderError>;
}

/// An implementation of the provider traits for any OpenAI-compatible API.
///
/// The same client serves chat and vision; the vision deployment simply points
/// it at a multimodal model.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL.
    /// * `model` - The model identifier used for every completion.
    /// * `timeout` - Per-request timeout applied to the underlying HTTP client.
    pub fn new(
        config: OpenAIConfig,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            model,
            temperature: 0.7,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn create(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, ProviderError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(messages)
            .build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no choices returned".into()))?
            .message
            .content
            .ok_or_else(|| ProviderError::MalformedResponse("choice has no content".into()))?;
        debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content)
    }
}

/// Builds the request messages: the system prompt first, then every turn.
pub fn build_messages(
    history: &[Turn],
    system_prompt: &str,
) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into(),
        );
    }
    for turn in history {
        match turn.role {
            Role::User => messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.text.clone())
                    .build()?
                    .into(),
            ),
            Role::Assistant => messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.text.clone())
                    .build()?
                    .into(),
            ),
        }
    }
    Ok(messages)
}

#[async_trait]
impl ChatProvider for OpenAICompatibleClient {
    async fn complete(
        &self,
        history: &[Turn],
        system_prompt: &str,
    ) -> Result<String, ProviderError> {
        self.create(build_messages(history, system_prompt)?).await
    }
}

#[async_trait]
impl VisionProvider for OpenAICompatibleClient {
    async fn analyze(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let image_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(format!("data:{mime_type};base64,{encoded}"))
                        .build()?,
                )
                .build()?
                .into();
        let text_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(prompt)
                .build()?
                .into();

        let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(vec![image_part, text_part])
            .build()?
            .into();
        self.create(vec![message]).await
    }
}
