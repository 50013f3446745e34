//! Blocking HTTP clients for the provider chat APIs, plus the dispatcher
//! that maps `(provider, model)` keys to them for the generation layer.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderValue};
use serde::{Deserialize, Serialize};

use snowflake_core::config::{Config, ModelKey, ProviderConfig};
use snowflake_core::generate::{InvokeError, ModelInvoker};

use crate::base_url::check_base_url;
use crate::error::AdapterError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Routes an invocation to the adapter for its provider. One entry per
/// configured provider profile.
pub struct LlmDispatcher {
    providers: HashMap<String, ProviderClient>,
}

enum ProviderClient {
    OpenAiCompatible(OpenAiCompatibleClient),
    Anthropic(AnthropicClient),
}

impl LlmDispatcher {
    /// Build an adapter for every provider profile that carries credentials.
    /// Unknown provider names are treated as OpenAI-compatible and must give
    /// an explicit base URL.
    pub fn from_config(config: &Config) -> Result<Self, AdapterError> {
        let mut providers = HashMap::new();
        for (name, profile) in &config.providers {
            if !profile.is_meaningful() {
                continue;
            }
            let client = match name.as_str() {
                "anthropic" => ProviderClient::Anthropic(AnthropicClient::new(profile)?),
                "openai" => ProviderClient::OpenAiCompatible(OpenAiCompatibleClient::new(
                    profile,
                    "https://api.openai.com/v1",
                )?),
                "openrouter" => ProviderClient::OpenAiCompatible(OpenAiCompatibleClient::new(
                    profile,
                    "https://openrouter.ai/api/v1",
                )?),
                _ => {
                    if profile.base_url.trim().is_empty() {
                        return Err(AdapterError::InvalidConfig(format!(
                            "provider `{name}` needs an explicit base_url"
                        )));
                    }
                    ProviderClient::OpenAiCompatible(OpenAiCompatibleClient::new(profile, "")?)
                }
            };
            providers.insert(name.clone(), client);
        }
        Ok(Self { providers })
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn complete(&self, key: &ModelKey, prompt: &str) -> Result<String, AdapterError> {
        let client = self
            .providers
            .get(&key.provider)
            .ok_or_else(|| AdapterError::UnknownProvider(key.provider.clone()))?;
        debug!("dispatching to {key}");
        match client {
            ProviderClient::OpenAiCompatible(c) => c.complete(&key.model, prompt),
            ProviderClient::Anthropic(c) => c.complete(&key.model, prompt),
        }
    }
}

impl ModelInvoker for LlmDispatcher {
    fn invoke(&self, key: &ModelKey, prompt: &str) -> Result<String, InvokeError> {
        self.complete(key, prompt).map_err(InvokeError::from)
    }
}

fn resolve_base_url(configured: &str, default: &str) -> String {
    if configured.trim().is_empty() {
        default.to_string()
    } else {
        check_base_url(configured)
    }
}

fn build_client(timeout: u64) -> Result<Client, AdapterError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout.max(1)))
        .build()
        .map_err(AdapterError::from)
}

pub struct OpenAiCompatibleClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleClient {
    pub fn new(profile: &ProviderConfig, default_base: &str) -> Result<Self, AdapterError> {
        let base = resolve_base_url(&profile.base_url, default_base);
        if base.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        Ok(Self {
            client: build_client(profile.timeout)?,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key: if profile.api_key.trim().is_empty() {
                None
            } else {
                Some(profile.api_key.clone())
            },
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        })
    }

    fn complete(&self, model: &str, prompt: &str) -> Result<String, AdapterError> {
        let body = ChatCompletionRequest {
            model,
            messages: vec![ChatMessageRequest {
                role: "user",
                content: prompt,
            }],
            max_tokens: if self.max_tokens == 0 {
                None
            } else {
                Some(self.max_tokens)
            },
            temperature: Some(self.temperature),
        };

        let mut request = self.client.post(&self.url).header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.json(&body).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            warn!("{} responded {status}", self.url);
            return Err(AdapterError::HttpStatus { status, body });
        }
        let parsed: ChatCompletionResponse = response.json()?;
        extract_choice_content(parsed).ok_or(AdapterError::EmptyResponse)
    }
}

pub struct AnthropicClient {
    client: Client,
    url: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(profile: &ProviderConfig) -> Result<Self, AdapterError> {
        if profile.api_key.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "anthropic api_key must not be empty".to_string(),
            ));
        }
        let base = if profile.base_url.trim().is_empty() {
            "https://api.anthropic.com".to_string()
        } else {
            profile.base_url.trim().trim_end_matches('/').to_string()
        };
        let url = if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        };
        Ok(Self {
            client: build_client(profile.timeout)?,
            url,
            api_key: profile.api_key.clone(),
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        })
    }

    fn complete(&self, model: &str, prompt: &str) -> Result<String, AdapterError> {
        let body = AnthropicRequest {
            model,
            // The messages API requires max_tokens.
            max_tokens: if self.max_tokens == 0 {
                4096
            } else {
                self.max_tokens
            },
            temperature: Some(self.temperature),
            messages: vec![ChatMessageRequest {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .header(
                "x-api-key",
                HeaderValue::from_str(&self.api_key).map_err(|err| {
                    AdapterError::InvalidConfig(format!("invalid api key header: {err}"))
                })?,
            )
            .header("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION))
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            warn!("{} responded {status}", self.url);
            return Err(AdapterError::HttpStatus { status, body });
        }
        let parsed: AnthropicResponse = response.json()?;
        anthropic_text(parsed).ok_or(AdapterError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_choice_content(response: ChatCompletionResponse) -> Option<String> {
    for choice in response.choices {
        if let Some(message) = choice.message {
            if let Some(content) = message.content {
                if !content.trim().is_empty() {
                    return Some(content);
                }
            }
        }
        if let Some(content) = choice.content {
            if !content.trim().is_empty() {
                return Some(content);
            }
        }
    }
    None
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ChatMessageRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: String,
}

fn anthropic_text(response: AnthropicResponse) -> Option<String> {
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.block_type == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
