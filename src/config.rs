use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::PlannerError;

const HOST: &str = "0.0.0.0";
const PORT: u16 = 8080;
const DATABASE: &str = "TravelPlanner";
pub const LLM_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const LLM_MODEL: &str = "qwen3-max";
const LLM_TEMPERATURE: f32 = 0.7;
const LLM_MAX_TOKENS: u32 = 2000;
const LLM_TIMEOUT_SECS: u64 = 60;
const CACHE_DIR: &str = ".cache";
const FETCH_MIN_INTERVAL_MS: u64 = 5000;
const FETCH_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Default model settings against `base_url`, without an API key.
    pub fn new(base_url: &str) -> Result<Self, PlannerError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PlannerError::Config(format!("LLM_BASE_URL is not a URL: {}", e)))?;

        Ok(Self {
            api_key: None,
            base_url,
            model: LLM_MODEL.to_string(),
            temperature: LLM_TEMPERATURE,
            max_tokens: LLM_MAX_TOKENS,
            timeout: Duration::from_secs(LLM_TIMEOUT_SECS),
        })
    }
}

/// Tunables of the list-refresh guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchGuardConfig {
    pub min_interval: Duration,
    pub timeout: Duration,
}

impl Default for FetchGuardConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(FETCH_MIN_INTERVAL_MS),
            timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub database: String,
    pub llm: LlmConfig,
    pub cache_dir: PathBuf,
    pub fetch: FetchGuardConfig,
    pub jwt_secret: String,
    pub auto_confirm_email: bool,
    pub bcrypt_cost: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PlannerError> {
        let mongodb_uri = env::var("MONGODB_URI")
            .map_err(|_| PlannerError::Config("MONGODB_URI must be set".to_string()))?;

        let base_url = env::var("LLM_BASE_URL").unwrap_or_else(|_| LLM_BASE_URL.to_string());
        let llm = LlmConfig {
            api_key: env::var("LLM_API_KEY").ok().filter(|key| !key.trim().is_empty()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| LLM_MODEL.to_string()),
            temperature: parse_var("LLM_TEMPERATURE", LLM_TEMPERATURE)?,
            max_tokens: parse_var("LLM_MAX_TOKENS", LLM_MAX_TOKENS)?,
            timeout: Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", LLM_TIMEOUT_SECS)?),
            ..LlmConfig::new(&base_url)?
        };

        let fetch = FetchGuardConfig {
            min_interval: Duration::from_millis(parse_var(
                "FETCH_MIN_INTERVAL_MS",
                FETCH_MIN_INTERVAL_MS,
            )?),
            timeout: Duration::from_millis(parse_var("FETCH_TIMEOUT_MS", FETCH_TIMEOUT_MS)?),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| HOST.to_string()),
            port: parse_var("PORT", PORT)?,
            mongodb_uri,
            database: env::var("MONGODB_DATABASE").unwrap_or_else(|_| DATABASE.to_string()),
            llm,
            cache_dir: env::var("PLAN_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(CACHE_DIR)),
            fetch,
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "default_secret".to_string()),
            auto_confirm_email: parse_var("AUTO_CONFIRM_EMAIL", true)?,
            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, PlannerError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PlannerError::Config(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}
