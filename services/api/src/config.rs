use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Connection settings for one OpenAI-compatible endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionEndpoint {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Transcription service settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptionEndpoint {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Speech synthesis settings; present only when synthesis is enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtsSettings {
    pub api_url: String,
    pub audio_url: String,
    pub voice: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub chat: CompletionEndpoint,
    pub vision: Option<CompletionEndpoint>,
    pub transcription: Option<TranscriptionEndpoint>,
    pub tts: Option<TtsSettings>,
    pub provider_timeout: Duration,
    /// `0` keeps every turn.
    pub history_max_turns: usize,
    pub livestream_prefix: String,
    pub persona_name: String,
    pub audio_archive_dir: Option<PathBuf>,
    pub prompts_path: Option<PathBuf>,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(name, default);
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn parse_flag(name: &str) -> Result<bool, ConfigError> {
    let raw = var_or(name, "false");
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", "0.0.0.0:8000")?;

        let chat = CompletionEndpoint {
            api_key: std::env::var("OPENAI_API_KEY")
                .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?,
            base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: var_or("CHAT_MODEL", "gpt-3.5-turbo"),
        };

        let vision = std::env::var("VISION_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(|api_key| CompletionEndpoint {
                api_key,
                base_url: var_or("VISION_BASE_URL", "https://open.bigmodel.cn/api/paas/v4"),
                model: var_or("VISION_MODEL", "glm-4v-flash"),
            });

        let transcription = std::env::var("STT_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(|api_key| TranscriptionEndpoint {
                api_key,
                base_url: var_or("STT_BASE_URL", "https://api.siliconflow.cn/v1"),
                model: var_or("STT_MODEL", "FunAudioLLM/SenseVoiceSmall"),
            });

        let tts = if parse_flag("TTS_ENABLED")? {
            Some(TtsSettings {
                api_url: var_or("TTS_API_URL", "http://localhost:3000"),
                audio_url: var_or("AUDIO_URL", "http://localhost:3000"),
                voice: var_or("TTS_VOICE", "zh-CN-XiaoxiaoNeural"),
            })
        } else {
            None
        };

        let timeout_secs = parse_var::<u64>("PROVIDER_TIMEOUT_SECS", "30")?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PROVIDER_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let history_max_turns = parse_var::<usize>("HISTORY_MAX_TURNS", "40")?;
        let livestream_prefix = var_or("LIVESTREAM_PREFIX", "livestream_user_");
        let persona_name = var_or("PERSONA_NAME", "Xiaofan");
        let audio_archive_dir = std::env::var("AUDIO_ARCHIVE_DIR").ok().map(PathBuf::from);
        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            chat,
            vision,
            transcription,
            tts,
            provider_timeout: Duration::from_secs(timeout_secs),
            history_max_turns,
            livestream_prefix,
            persona_name,
            audio_archive_dir,
            prompts_path,
            log_level,
        })
    }

    /// A configuration for tests and local tooling: no optional providers.
    pub fn local(chat_api_key: &str) -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            chat: CompletionEndpoint {
                api_key: chat_api_key.to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-3.5-turbo".to_string(),
            },
            vision: None,
            transcription: None,
            tts: None,
            provider_timeout: Duration::from_secs(30),
            history_max_turns: 40,
            livestream_prefix: "livestream_user_".to_string(),
            persona_name: "Xiaofan".to_string(),
            audio_archive_dir: None,
            prompts_path: None,
            log_level: Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const VARS: [&str; 20] = [
        "BIND_ADDRESS",
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "CHAT_MODEL",
        "VISION_API_KEY",
        "VISION_BASE_URL",
        "VISION_MODEL",
        "STT_API_KEY",
        "STT_BASE_URL",
        "STT_MODEL",
        "TTS_ENABLED",
        "TTS_API_URL",
        "AUDIO_URL",
        "TTS_VOICE",
        "PROVIDER_TIMEOUT_SECS",
        "HISTORY_MAX_TURNS",
        "LIVESTREAM_PREFIX",
        "PERSONA_NAME",
        "AUDIO_ARCHIVE_DIR",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
            env::remove_var("PROMPTS_PATH");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.chat.api_key, "test-openai-key");
        assert_eq!(config.chat.base_url, "https://api.openai.com/v1");
        assert_eq!(config.chat.model, "gpt-3.5-turbo");
        assert_eq!(config.vision, None);
        assert_eq!(config.transcription, None);
        assert_eq!(config.tts, None);
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
        assert_eq!(config.history_max_turns, 40);
        assert_eq!(config.livestream_prefix, "livestream_user_");
        assert_eq!(config.persona_name, "Xiaofan");
        assert_eq!(config.audio_archive_dir, None);
        assert_eq!(config.prompts_path, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
            env::set_var("CHAT_MODEL", "gpt-4o-mini");
            env::set_var("VISION_API_KEY", "vision-key");
            env::set_var("STT_API_KEY", "stt-key");
            env::set_var("STT_MODEL", "whisper-1");
            env::set_var("TTS_ENABLED", "true");
            env::set_var("TTS_VOICE", "en-US-AriaNeural");
            env::set_var("PROVIDER_TIMEOUT_SECS", "12");
            env::set_var("HISTORY_MAX_TURNS", "0");
            env::set_var("LIVESTREAM_PREFIX", "viewer_");
            env::set_var("AUDIO_ARCHIVE_DIR", "/tmp/recordings");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.chat.model, "gpt-4o-mini");
        let vision = config.vision.expect("vision should be configured");
        assert_eq!(vision.api_key, "vision-key");
        assert_eq!(vision.model, "glm-4v-flash");
        let transcription = config.transcription.expect("stt should be configured");
        assert_eq!(transcription.model, "whisper-1");
        assert_eq!(transcription.base_url, "https://api.siliconflow.cn/v1");
        let tts = config.tts.expect("tts should be enabled");
        assert_eq!(tts.voice, "en-US-AriaNeural");
        assert_eq!(tts.api_url, "http://localhost:3000");
        assert_eq!(config.provider_timeout, Duration::from_secs(12));
        assert_eq!(config.history_max_turns, 0);
        assert_eq!(config.livestream_prefix, "viewer_");
        assert_eq!(
            config.audio_archive_dir,
            Some(PathBuf::from("/tmp/recordings"))
        );
        assert_eq!(config.prompts_path, Some(PathBuf::from("/custom/prompts")));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_numbers_and_flags() {
        for (var, value) in [
            ("HISTORY_MAX_TURNS", "many"),
            ("PROVIDER_TIMEOUT_SECS", "0"),
            ("TTS_ENABLED", "maybe"),
            ("RUST_LOG", "not-a-level"),
        ] {
            clear_env_vars();
            set_minimal_env();
            unsafe {
                env::set_var(var, value);
            }

            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {var}, got {other:?}"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_empty_optional_keys_disable_providers() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("VISION_API_KEY", "");
            env::set_var("STT_API_KEY", "");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert!(config.vision.is_none());
        assert!(config.transcription.is_none());
    }
}
