use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::interview::controller::PhaseTimings;
use crate::interview::registry::RetentionPolicy;
use crate::interview::session::InterviewSettings;
use crate::llm_client::{GenerationOptions, ModelId, DEFAULT_MODEL};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or out of range.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub model: String,
    pub temperature: f32,
    pub session_seconds: u32,
    pub phase_two_threshold_seconds: u32,
    pub tick_millis: u64,
    pub session_retention_seconds: u64,
    pub session_idle_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            model: std::env::var("INTERVIEW_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: parse_env("INTERVIEW_TEMPERATURE", 0.7)?,
            session_seconds: parse_env("SESSION_SECONDS", 2700)?,
            phase_two_threshold_seconds: parse_env("PHASE_TWO_THRESHOLD_SECONDS", 900)?,
            tick_millis: parse_env("TICK_MILLIS", 1000)?,
            session_retention_seconds: parse_env("SESSION_RETENTION_SECONDS", 600)?,
            session_idle_timeout_seconds: parse_env("SESSION_IDLE_TIMEOUT_SECONDS", 7200)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.phase_two_threshold_seconds < self.session_seconds,
            "PHASE_TWO_THRESHOLD_SECONDS ({}) must be less than SESSION_SECONDS ({})",
            self.phase_two_threshold_seconds,
            self.session_seconds
        );
        ensure!(
            (0.0..=1.0).contains(&self.temperature),
            "INTERVIEW_TEMPERATURE must be between 0.0 and 1.0, got {}",
            self.temperature
        );
        ensure!(self.tick_millis > 0, "TICK_MILLIS must be greater than zero");
        ensure!(
            self.session_idle_timeout_seconds > u64::from(self.session_seconds),
            "SESSION_IDLE_TIMEOUT_SECONDS ({}) must be greater than SESSION_SECONDS ({})",
            self.session_idle_timeout_seconds,
            self.session_seconds
        );
        Ok(())
    }

    pub fn interview_settings(&self) -> InterviewSettings {
        InterviewSettings {
            model: ModelId::new(self.model.clone()),
            options: GenerationOptions {
                temperature: self.temperature,
            },
            timings: PhaseTimings {
                session_seconds: self.session_seconds,
                phase_two_threshold_seconds: self.phase_two_threshold_seconds,
            },
            tick: Duration::from_millis(self.tick_millis),
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            completed: Duration::from_secs(self.session_retention_seconds),
            abandoned: Duration::from_secs(self.session_idle_timeout_seconds),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            anthropic_api_key: "test-key".to_string(),
            port: 8080,
            rust_log: "info".to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            session_seconds: 2700,
            phase_two_threshold_seconds: 900,
            tick_millis: 1000,
            session_retention_seconds: 600,
            session_idle_timeout_seconds: 7200,
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_threshold_must_be_below_session_length() {
        let mut c = config();
        c.phase_two_threshold_seconds = 2700;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_temperature_range() {
        let mut c = config();
        c.temperature = 1.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let mut c = config();
        c.tick_millis = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_idle_timeout_must_outlast_a_session() {
        let mut c = config();
        c.session_idle_timeout_seconds = 2700;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_retention_policy() {
        let policy = config().retention_policy();
        assert_eq!(policy.completed, Duration::from_secs(600));
        assert_eq!(policy.abandoned, Duration::from_secs(7200));
    }

    #[test]
    fn test_interview_settings() {
        let settings = config().interview_settings();
        assert_eq!(settings.model.as_str(), DEFAULT_MODEL);
        assert_eq!(settings.timings.phase_two_threshold_seconds, 900);
        assert_eq!(settings.tick, Duration::from_secs(1));
    }
}
