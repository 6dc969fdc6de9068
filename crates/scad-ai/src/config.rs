use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
pub const DEFAULT_BEDROCK_MODEL: &str = "us.anthropic.claude-sonnet-4-20250514-v1:0";
pub const DEFAULT_BEDROCK_REGION: &str = "us-east-1";
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Which completion service backs the pipeline. The default is OpenAI;
/// selection is always an explicit configuration choice (`SCAD_PROVIDER` or
/// `--provider`), never inferred from which credentials happen to be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    OpenAi,
    Bedrock,
}

impl Provider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "bedrock" => Some(Self::Bedrock),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Bedrock => "bedrock",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct BedrockSettings {
    pub bearer_token: Option<String>,
    pub region: String,
    pub model_id: String,
    /// Endpoint override (`AWS_ENDPOINT_URL`); the regional endpoint is
    /// derived from `region` when unset.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub binary: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub openai: OpenAiSettings,
    pub bedrock: BedrockSettings,
    pub compiler: CompilerSettings,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key-lookup function so tests never
    /// have to mutate the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let provider = match lookup("SCAD_PROVIDER") {
            Some(raw) => Provider::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown SCAD_PROVIDER value, using openai");
                Provider::default()
            }),
            None => Provider::default(),
        };

        Self {
            provider,
            openai: OpenAiSettings {
                api_key: non_empty(lookup("OPENAI_API_KEY")),
                model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                base_url: lookup("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            },
            bedrock: BedrockSettings {
                bearer_token: non_empty(lookup("AWS_BEARER_TOKEN_BEDROCK")),
                region: lookup("AWS_DEFAULT_REGION")
                    .unwrap_or_else(|| DEFAULT_BEDROCK_REGION.to_string()),
                model_id: lookup("BEDROCK_MODEL_ID")
                    .unwrap_or_else(|| DEFAULT_BEDROCK_MODEL.to_string()),
                endpoint: non_empty(lookup("AWS_ENDPOINT_URL")),
            },
            compiler: CompilerSettings {
                binary: lookup("OPENSCAD_BINARY")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("openscad")),
                timeout: seconds_or(lookup("OPENSCAD_TIMEOUT_SECS"), DEFAULT_COMPILE_TIMEOUT),
            },
            request_timeout: seconds_or(
                lookup("SCAD_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT,
            ),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.trim().is_empty())
}

fn seconds_or(value: Option<String>, default: Duration) -> Duration {
    match value.as_deref().map(str::parse::<u64>) {
        Some(Ok(secs)) => Duration::from_secs(secs),
        Some(Err(_)) => {
            warn!(value = %value.unwrap_or_default(), "invalid timeout value, using default");
            default
        }
        None => default,
    }
}
