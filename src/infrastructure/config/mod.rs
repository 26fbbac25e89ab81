use crate::domain::audio::{BatchAudioConfig, VoiceMap};
use crate::domain::job::TrackerConfig;
use crate::domain::podcast::OrchestratorConfig;
use crate::domain::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryPolicy};
use crate::domain::script::Speakers;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    /// In-memory job store when absent
    pub database_url: Option<String>,
    // Completion
    pub openai_api_key: String,
    pub completion_model: String,
    pub completion_max_tokens: u32,
    pub completion_timeout_secs: u64,
    // Synthesis
    pub tts_provider: TtsProvider,
    pub tts_model: String,
    pub aws_region: String,
    pub host_voice: String,
    pub cohost_voice: String,
    pub tts_cache_enabled: bool,
    // Speakers
    pub host_name: String,
    pub cohost_name: String,
    pub host_aliases: Vec<String>,
    pub cohost_aliases: Vec<String>,
    // Storage
    pub storage_url: String,
    pub storage_service_key: String,
    pub storage_bucket: String,
    pub storage_timeout_secs: u64,
    // Governance
    pub rate_limit_requests_per_minute: u32,
    pub rate_limit_tokens_per_minute: u32,
    pub audio_failure_threshold: u32,
    pub audio_reset_timeout_secs: u64,
    pub audio_success_threshold: u32,
    // Pipeline
    pub audio_batch_size: usize,
    pub synthesis_timeout_secs: u64,
    pub synthesis_retries: u32,
    pub upload_retries: u32,
    pub heartbeat_interval_secs: u64,
    pub watchdog_interval_secs: u64,
    pub stuck_threshold_secs: u64,
    pub master_timeout_secs: u64,
    pub terminate_on_master_timeout: bool,
    /// How long shutdown waits for running jobs to record their final state
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    OpenAi,
    Polly,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let tts_provider = match var_or("TTS_PROVIDER", "openai").to_lowercase().as_str() {
            "polly" => TtsProvider::Polly,
            _ => TtsProvider::OpenAi,
        };
        let (default_host_voice, default_cohost_voice) = match tts_provider {
            TtsProvider::OpenAi => ("alloy", "nova"),
            TtsProvider::Polly => ("Matthew", "Joanna"),
        };

        let config = Config {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_or("PORT", 8080)?,
            environment: match var_or("ENVIRONMENT", "development").as_str() {
                "production" => Environment::Production,
                _ => Environment::Development,
            },
            log_format: match var_or("LOG_FORMAT", "pretty").as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            openai_api_key: env::var("OPENAI_API_KEY")?,
            completion_model: var_or("COMPLETION_MODEL", "gpt-4o-mini"),
            completion_max_tokens: parse_or("COMPLETION_MAX_TOKENS", 1500)?,
            completion_timeout_secs: parse_or("COMPLETION_TIMEOUT_SECS", 90)?,
            tts_provider,
            tts_model: var_or("TTS_MODEL", "tts-1"),
            aws_region: var_or("AWS_REGION", "eu-west-1"),
            host_voice: var_or("HOST_VOICE", default_host_voice),
            cohost_voice: var_or("COHOST_VOICE", default_cohost_voice),
            tts_cache_enabled: var_or("TTS_CACHE_ENABLED", "false").to_lowercase() == "true",
            host_name: var_or("HOST_NAME", "Alex"),
            cohost_name: var_or("COHOST_NAME", "Jordan"),
            host_aliases: list_var("HOST_ALIASES"),
            cohost_aliases: list_var("COHOST_ALIASES"),
            storage_url: env::var("STORAGE_URL")?,
            storage_service_key: env::var("STORAGE_SERVICE_KEY")?,
            storage_bucket: var_or("STORAGE_BUCKET", "podcasts"),
            storage_timeout_secs: parse_or("STORAGE_TIMEOUT_SECS", 120)?,
            rate_limit_requests_per_minute: parse_or("RATE_LIMIT_REQUESTS_PER_MINUTE", 50)?,
            rate_limit_tokens_per_minute: parse_or("RATE_LIMIT_TOKENS_PER_MINUTE", 40_000)?,
            audio_failure_threshold: parse_or("AUDIO_FAILURE_THRESHOLD", 5)?,
            audio_reset_timeout_secs: parse_or("AUDIO_RESET_TIMEOUT_SECS", 30)?,
            audio_success_threshold: parse_or("AUDIO_SUCCESS_THRESHOLD", 2)?,
            audio_batch_size: parse_or("AUDIO_BATCH_SIZE", 5)?,
            synthesis_timeout_secs: parse_or("SYNTHESIS_TIMEOUT_SECS", 60)?,
            synthesis_retries: parse_or("SYNTHESIS_RETRIES", 2)?,
            upload_retries: parse_or("UPLOAD_RETRIES", 3)?,
            heartbeat_interval_secs: parse_or("HEARTBEAT_INTERVAL_SECS", 30)?,
            watchdog_interval_secs: parse_or("WATCHDOG_INTERVAL_SECS", 30)?,
            stuck_threshold_secs: parse_or("STUCK_THRESHOLD_SECS", 120)?,
            master_timeout_secs: parse_or("MASTER_TIMEOUT_SECS", 1800)?,
            terminate_on_master_timeout: var_or("TERMINATE_ON_MASTER_TIMEOUT", "false")
                .to_lowercase()
                == "true",
            shutdown_grace_secs: parse_or("SHUTDOWN_GRACE_SECS", 30)?,
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_requests_per_minute: self.rate_limit_requests_per_minute,
            max_tokens_per_minute: self.rate_limit_tokens_per_minute,
            ..RateLimiterConfig::default()
        }
    }

    pub fn audio_circuit(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.audio_failure_threshold,
            reset_timeout: Duration::from_secs(self.audio_reset_timeout_secs),
            success_threshold: self.audio_success_threshold,
        }
    }

    pub fn batch_audio(&self) -> BatchAudioConfig {
        let defaults = BatchAudioConfig::default();
        BatchAudioConfig {
            batch_size: self.audio_batch_size,
            call_timeout: Duration::from_secs(self.synthesis_timeout_secs),
            retry: RetryPolicy::new(
                defaults.retry.name(),
                self.synthesis_retries,
                defaults.retry.backoff().clone(),
            ),
        }
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            watchdog_interval: Duration::from_secs(self.watchdog_interval_secs),
            stuck_threshold: Duration::from_secs(self.stuck_threshold_secs),
            master_timeout: Duration::from_secs(self.master_timeout_secs),
            terminate_on_timeout: self.terminate_on_master_timeout,
            ..TrackerConfig::default()
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        let defaults = OrchestratorConfig::default();
        OrchestratorConfig {
            speakers: Speakers {
                host: self.host_name.clone(),
                cohost: self.cohost_name.clone(),
            },
            host_aliases: self.host_aliases.clone(),
            cohost_aliases: self.cohost_aliases.clone(),
            voices: VoiceMap::new(self.host_voice.clone(), self.cohost_voice.clone()),
            max_output_tokens: self.completion_max_tokens,
            completion_timeout: Duration::from_secs(self.completion_timeout_secs),
            bucket: self.storage_bucket.clone(),
            upload_retry: RetryPolicy::new(
                defaults.upload_retry.name(),
                self.upload_retries,
                defaults.upload_retry.backoff().clone(),
            ),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(name: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::error::Error + 'static,
{
    match env::var(name) {
        Ok(value) => Ok(value.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .map(|value| parse_list(&value))
        .unwrap_or_default()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
