use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BedrockSettings, OpenAiSettings, Provider, Settings};
use crate::error::{Error, Result};

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1500;
const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
}

/// One capability shared by both providers: given a prompt, return a single
/// complete text completion, or fail with a classified error. No streaming,
/// no partial results, one attempt per generation request.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String>;
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Box<T> {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String> {
        (**self).complete(request).await
    }
}

/// The single provider-selection point. Credential checks happen in the
/// client constructors, so a missing credential surfaces here, before any
/// network call is attempted.
pub fn client_from_settings(settings: &Settings) -> Result<Box<dyn CompletionClient>> {
    match settings.provider {
        Provider::OpenAi => Ok(Box::new(OpenAiClient::from_settings(
            &settings.openai,
            settings.request_timeout,
        )?)),
        Provider::Bedrock => Ok(Box::new(BedrockClient::from_settings(
            &settings.bedrock,
            settings.request_timeout,
        )?)),
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn from_settings(settings: &OpenAiSettings, request_timeout: Duration) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or(Error::Authentication {
            provider: "openai",
            env_var: "OPENAI_API_KEY",
        })?;

        Ok(Self {
            http: build_http_client(request_timeout)?,
            api_key,
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error("openai", &err))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Service {
                message: format!(
                    "openai returned HTTP {status}: {}; check that OPENAI_API_KEY and OPENAI_MODEL are valid",
                    summarize(&detail)
                ),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|err| Error::Service {
            message: format!("openai response could not be decoded: {err}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Service {
                message: "openai returned no completion choices".to_string(),
            })
    }
}

pub struct BedrockClient {
    http: reqwest::Client,
    bearer_token: String,
    model_id: String,
    region: String,
    endpoint: Option<String>,
}

impl BedrockClient {
    pub fn from_settings(settings: &BedrockSettings, request_timeout: Duration) -> Result<Self> {
        let bearer_token = settings.bearer_token.clone().ok_or(Error::Authentication {
            provider: "bedrock",
            env_var: "AWS_BEARER_TOKEN_BEDROCK",
        })?;

        Ok(Self {
            http: build_http_client(request_timeout)?,
            bearer_token,
            model_id: settings.model_id.clone(),
            region: settings.region.clone(),
            endpoint: settings
                .endpoint
                .as_ref()
                .map(|endpoint| endpoint.trim_end_matches('/').to_string()),
        })
    }

    fn invoke_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{endpoint}/model/{}/invoke", self.model_id),
            None => format!(
                "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
                self.region, self.model_id
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    anthropic_version: &'static str,
    system: &'a str,
    messages: [InvokeMessage<'a>; 1],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct InvokeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    content: Vec<InvokeContent>,
}

#[derive(Debug, Deserialize)]
struct InvokeContent {
    text: String,
}

#[async_trait]
impl CompletionClient for BedrockClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String> {
        let body = InvokeRequest {
            anthropic_version: ANTHROPIC_VERSION,
            system: request.system_prompt,
            messages: [InvokeMessage {
                role: "user",
                content: request.user_prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .http
            .post(self.invoke_url())
            .bearer_auth(&self.bearer_token)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error("bedrock", &err))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Service {
                message: format!(
                    "bedrock returned HTTP {status}: {}; check AWS_BEARER_TOKEN_BEDROCK, AWS_DEFAULT_REGION and BEDROCK_MODEL_ID",
                    summarize(&detail)
                ),
            });
        }

        let parsed: InvokeResponse = response.json().await.map_err(|err| Error::Service {
            message: format!("bedrock response could not be decoded: {err}"),
        })?;

        parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| Error::Service {
                message: "bedrock returned no content blocks".to_string(),
            })
    }
}

fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|err| Error::Service {
            message: format!("failed to initialize the HTTP client: {err}"),
        })
}

fn transport_error(provider: &str, err: &reqwest::Error) -> Error {
    let message = if err.is_timeout() {
        format!("{provider} request timed out; the request is attempted exactly once, re-run to try again")
    } else if err.is_connect() {
        format!("{provider} endpoint is unreachable: {err}")
    } else {
        format!("{provider} request failed: {err}")
    };
    Error::Service { message }
}

fn summarize(body: &str) -> String {
    let single_line = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.is_empty() {
        return "(empty body)".to_string();
    }
    match single_line.char_indices().nth(200) {
        Some((index, _)) => format!("{}…", &single_line[..index]),
        None => single_line,
    }
}
