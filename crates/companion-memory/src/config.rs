use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::memory_engine::EngineConfig;

/// Thirty days.
pub const MAX_SESSION_IDLE_SECONDS: i64 = 30 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_path: String,
    pub generation_url: Option<String>,
    pub generation_model: String,
    pub generation_api_key: Option<String>,
    pub generation_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub session_idle_seconds: i64,
    pub context_window: usize,
    pub compaction_probability: f64,
    pub compaction_batch_limit: usize,
    pub bot_name: String,
}

impl Config {
    /// Reads the process environment. A `.env` file, if any, must already be
    /// loaded.
    pub fn from_env() -> Result<Self> {
        let compaction_probability: f64 = env::var("COMPACTION_PROBABILITY")
            .unwrap_or_else(|_| "0.1".into())
            .parse()
            .context("COMPACTION_PROBABILITY must be a number")?;

        let config = Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "5000".into()).parse()?,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/companion.db".into()),
            generation_url: non_empty_var("GENERATION_URL"),
            generation_model: env::var("GENERATION_MODEL").unwrap_or_else(|_| "local-llm".into()),
            generation_api_key: non_empty_var("GENERATION_API_KEY"),
            generation_timeout_seconds: env::var("GENERATION_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".into())
                .parse()?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "120".into())
                .parse()?,
            session_idle_seconds: env::var("SESSION_IDLE_SECONDS")
                .unwrap_or_else(|_| "3600".into())
                .parse()
                .context("SESSION_IDLE_SECONDS must be a whole number of seconds")?,
            context_window: env::var("CONTEXT_WINDOW")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            compaction_probability,
            compaction_batch_limit: env::var("COMPACTION_BATCH_LIMIT")
                .unwrap_or_else(|_| "20".into())
                .parse()?,
            bot_name: env::var("BOT_NAME").unwrap_or_else(|_| "Alex".into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Range checks for values that parse but would misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.compaction_probability) {
            return Err(anyhow::anyhow!(
                "COMPACTION_PROBABILITY must be between 0 and 1, got {}",
                self.compaction_probability
            ));
        }
        if !(1..=MAX_SESSION_IDLE_SECONDS).contains(&self.session_idle_seconds) {
            return Err(anyhow::anyhow!(
                "SESSION_IDLE_SECONDS must be between 1 and {}, got {}",
                MAX_SESSION_IDLE_SECONDS,
                self.session_idle_seconds
            ));
        }
        Ok(())
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Database: {}", self.database_path);
        info!(
            "- Generation: {} (model {}, key {})",
            self.generation_url.as_deref().unwrap_or("<not configured>"),
            self.generation_model,
            if self.generation_api_key.is_some() { "set" } else { "unset" }
        );
        info!("- Generation Timeout: {}s", self.generation_timeout_seconds);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Session Idle: {}s", self.session_idle_seconds);
        info!("- Context Window: {} messages", self.context_window);
        info!(
            "- Compaction: p={} batch={}",
            self.compaction_probability, self.compaction_batch_limit
        );
        info!("- Bot Name: {}", self.bot_name);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.api_host, self.api_port))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            session_idle: chrono::Duration::seconds(self.session_idle_seconds),
            context_window: self.context_window,
            compaction_probability: self.compaction_probability,
            compaction_batch_limit: self.compaction_batch_limit,
            generation_timeout: Duration::from_secs(self.generation_timeout_seconds),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
