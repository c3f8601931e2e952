//! Process configuration from environment variables

use crate::llm::DEFAULT_BASE_URL;
use crate::moderation::{DEFAULT_MODERATION_MODEL, DEFAULT_MODERATION_TIMEOUT};
use crate::reply::{DirectChatSettings, PollPolicy, ProtocolKind};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub protocol: ProtocolKind,
    /// Remote persona id; set whenever `protocol` is `ThreadedJob`
    pub assistant_id: Option<String>,
    pub direct: DirectChatSettings,
    pub request_timeout: Duration,
    pub moderation_model: String,
    pub moderation_timeout: Duration,
    pub poll: PollPolicy,
    /// Sessions untouched this long are dropped
    pub session_idle: Duration,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let protocol = match get("HEARTBUDDY_PROTOCOL").as_deref().map(str::trim) {
            None | Some("threaded") => ProtocolKind::ThreadedJob,
            Some("direct") => ProtocolKind::DirectChat,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "HEARTBUDDY_PROTOCOL",
                    value: other.to_string(),
                })
            }
        };

        let assistant_id = match protocol {
            ProtocolKind::ThreadedJob => {
                Some(get("ASSISTANT_ID").ok_or(ConfigError::Missing("ASSISTANT_ID"))?)
            }
            ProtocolKind::DirectChat => None,
        };

        let request_timeout =
            Duration::from_secs(parse(&get, "HEARTBUDDY_REQUEST_TIMEOUT_SECS", 60)?);
        let defaults = DirectChatSettings::default();
        let direct = DirectChatSettings {
            model: get("HEARTBUDDY_MODEL").unwrap_or(defaults.model),
            temperature: parse(&get, "HEARTBUDDY_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse(&get, "HEARTBUDDY_MAX_TOKENS", defaults.max_tokens)?,
            timeout: request_timeout,
        };
        if !(0.0..=2.0).contains(&direct.temperature) {
            return Err(ConfigError::Invalid {
                var: "HEARTBUDDY_TEMPERATURE",
                value: direct.temperature.to_string(),
            });
        }

        let poll = PollPolicy {
            deadline: Duration::from_secs(parse(&get, "HEARTBUDDY_POLL_DEADLINE_SECS", 60)?),
            max_attempts: parse(&get, "HEARTBUDDY_POLL_MAX_ATTEMPTS", 40)?,
            ..PollPolicy::default()
        };

        let session_idle = parse(&get, "HEARTBUDDY_SESSION_IDLE_SECS", 3600)?;
        if session_idle == 0 {
            return Err(ConfigError::Invalid {
                var: "HEARTBUDDY_SESSION_IDLE_SECS",
                value: session_idle.to_string(),
            });
        }

        Ok(Self {
            api_key,
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            protocol,
            assistant_id,
            direct,
            request_timeout,
            moderation_model: get("HEARTBUDDY_MODERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_MODERATION_MODEL.to_string()),
            moderation_timeout: Duration::from_secs(parse(
                &get,
                "HEARTBUDDY_MODERATION_TIMEOUT_SECS",
                DEFAULT_MODERATION_TIMEOUT.as_secs(),
            )?),
            poll,
            session_idle: Duration::from_secs(session_idle),
            port: parse(&get, "HEARTBUDDY_PORT", 8000)?,
        })
    }
}

fn parse<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }),
    }
}
