use async_openai::{
    config::AzureConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use clarify_shared::{ChatMessage, MessageRole};
use futures_util::stream::{BoxStream, StreamExt};
use tracing::{debug, error, info};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Text deltas of one streaming completion, in production order.
pub type DeltaStream = BoxStream<'static, Result<String, GatewayError>>;

const CHAT_TEMPERATURE: f32 = 0.7;
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// The two call shapes the request handler needs from the hosted model.
#[async_trait::async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Non-streaming call: one system instruction plus one user message.
    /// Returns the raw text of the model's reply.
    async fn classify(&self, instruction: &str, user_content: &str) -> Result<String, GatewayError>;

    /// Streaming call over an ordered message list.
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream, GatewayError>;
}

pub struct AzureGateway {
    client: Client<AzureConfig>,
    deployment: String,
}

impl AzureGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        info!(
            "Initializing completion gateway: endpoint={} deployment={} api_version={}",
            config.endpoint, config.deployment, config.api_version
        );
        let azure = AzureConfig::new()
            .with_api_base(&config.endpoint)
            .with_api_key(&config.api_key)
            .with_deployment_id(&config.deployment)
            .with_api_version(&config.api_version);
        Self {
            client: Client::with_config(azure),
            deployment: config.deployment.clone(),
        }
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }
}

#[async_trait::async_trait]
impl CompletionGateway for AzureGateway {
    async fn classify(&self, instruction: &str, user_content: &str) -> Result<String, GatewayError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(instruction)
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_content)
                    .build()?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.deployment)
            .messages(messages)
            .temperature(CLASSIFY_TEMPERATURE)
            .response_format(ResponseFormat::JsonObject)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!("Classification request failed: {:?}", e);
            GatewayError::from(e)
        })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_else(|| "{}".to_string());
        debug!("Classifier replied with {} chars", content.len());
        Ok(content)
    }

    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream, GatewayError> {
        let messages = messages
            .into_iter()
            .map(convert_to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.deployment)
            .messages(messages)
            .temperature(CHAT_TEMPERATURE)
            .stream(true)
            .build()?;

        let stream = self.client.chat().create_stream(request).await.map_err(|e| {
            error!("Failed to open completion stream: {:?}", e);
            GatewayError::from(e)
        })?;

        let deltas = stream.map(|result| match result {
            Ok(response) => Ok(response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default()),
            Err(e) => {
                error!("Completion stream error: {:?}", e);
                Err(GatewayError::Stream(e.to_string()))
            }
        });

        Ok(deltas.boxed())
    }
}

fn convert_to_openai_message(
    msg: ChatMessage,
) -> Result<ChatCompletionRequestMessage, GatewayError> {
    let message = match msg.role {
        MessageRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
    };
    Ok(message)
}
