use anyhow::Context;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{EvalError, RemoteServiceError, Result};

/// Remote text-generation service
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` as a single user message to `model` and return the text of every choice
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<Vec<String>, RemoteServiceError>;
}

/// Produces one answer per prompt from a fixed model
#[derive(Clone)]
pub struct AnswerGenerator {
    chat: Arc<dyn ChatModel>,
    model: String,
    timeout: Option<Duration>,
}

impl AnswerGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
            timeout: None,
        }
    }

    /// Bound every remote call by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate the answer for an already formatted prompt
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let call = self.chat.complete(&self.model, prompt);

        let choices = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RemoteServiceError::Timeout(limit))??,
            None => call.await?,
        };

        choices.into_iter().next().ok_or(EvalError::EmptyResponse)
    }
}

/// Chat completions against an OpenAI-compatible endpoint
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiChatModel {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            client: Client::with_config(openai_config),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Create the client from the run configuration, reading the API key from the environment
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.env_var_api_key)
            .with_context(|| format!("Environment variable {} not found", config.env_var_api_key))?;

        let mut model = Self::new(&config.api_endpoint, &api_key);
        model.temperature = config.temperature.map(|t| t as f32);
        model.max_tokens = config.max_tokens;
        Ok(model)
    }

    /// Build the single-turn chat completion request
    fn build_request(
        &self,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<CreateChatCompletionRequest, RemoteServiceError> {
        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .map_err(|e| RemoteServiceError::InvalidRequest(e.to_string()))?
                .into();

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model).messages([user_message]);
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            args.max_tokens(max_tokens);
        }

        args.build()
            .map_err(|e| RemoteServiceError::InvalidRequest(e.to_string()))
    }

    /// Text of every choice; a choice without content yields an empty string
    fn extract_choices(response: CreateChatCompletionResponse) -> Vec<String> {
        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Completion usage"
            );
        }

        response
            .choices
            .into_iter()
            .map(|choice| choice.message.content.unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<Vec<String>, RemoteServiceError> {
        let request = self.build_request(model, prompt)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        Ok(Self::extract_choices(response))
    }
}

/// Map a client error onto the remote-service taxonomy
fn classify_openai_error(err: OpenAIError) -> RemoteServiceError {
    match err {
        OpenAIError::Reqwest(e) => RemoteServiceError::Network(e.to_string()),
        OpenAIError::JSONDeserialize(e) => RemoteServiceError::MalformedResponse(e.to_string()),
        OpenAIError::InvalidArgument(msg) => RemoteServiceError::InvalidRequest(msg),
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            let message = api.message.to_lowercase();

            if kind == "insufficient_quota" || kind.contains("rate_limit") {
                RemoteServiceError::RateLimited(api.message)
            } else if kind == "authentication_error"
                || message.contains("api key")
                || message.contains("unauthorized")
            {
                RemoteServiceError::Unauthorized(api.message)
            } else if kind == "invalid_request_error" {
                RemoteServiceError::InvalidRequest(api.message)
            } else {
                RemoteServiceError::Api(api.message)
            }
        }
        other => RemoteServiceError::Api(other.to_string()),
    }
}
