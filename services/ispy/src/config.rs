use ispy_core::{GameSettings, ScanMode};
use std::path::PathBuf;
use std::str::FromStr;
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

/// How the game reaches the robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum GatewayKind {
    /// Text in a terminal: speech is printed, answers are typed.
    Console,
    /// The robot's control plane, over the WebSocket bridge.
    Bridge,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub chat_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub scan_mode: ScanMode,
    pub gateway: GatewayKind,
    pub robot_bridge_url: String,
    pub robot_realm: Option<String>,
    /// Play with the built-in reasoner instead of a chat model.
    pub offline: bool,
    pub settings: GameSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Cross-field requirements are checked separately by [`Config::validate`]
    /// so command line flags can be applied in between.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let openai_api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let scan_mode = match std::env::var("ISPY_SCAN_MODE") {
            Ok(value) => value
                .parse::<ScanMode>()
                .map_err(|e| ConfigError::InvalidValue("ISPY_SCAN_MODE".to_string(), e))?,
            Err(_) => ScanMode::default(),
        };

        let gateway = match std::env::var("ISPY_GATEWAY") {
            Ok(value) => <GatewayKind as clap::ValueEnum>::from_str(&value, true)
                .map_err(|e| ConfigError::InvalidValue("ISPY_GATEWAY".to_string(), e))?,
            Err(_) => GatewayKind::Console,
        };

        let robot_bridge_url = std::env::var("ROBOT_BRIDGE_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:8765".to_string());
        let robot_realm = std::env::var("ROBOT_REALM").ok();
        let offline = env_or("ISPY_OFFLINE", false)?;

        let defaults = GameSettings::default();
        let settings = GameSettings {
            listen_timeout: env_secs("ISPY_LISTEN_TIMEOUT_SECS", defaults.listen_timeout)?,
            scan_timeout: env_secs("ISPY_SCAN_TIMEOUT_SECS", defaults.scan_timeout)?,
            reasoning_timeout: env_secs("ISPY_REASONING_TIMEOUT_SECS", defaults.reasoning_timeout)?,
            reasoning_backoff: env_millis("ISPY_REASONING_BACKOFF_MS", defaults.reasoning_backoff)?,
            max_unrecognized: env_or("ISPY_MAX_REPROMPTS", defaults.max_unrecognized)?,
            max_name_attempts: env_or("ISPY_MAX_NAME_ATTEMPTS", defaults.max_name_attempts)?,
            io_retries: env_or("ISPY_IO_RETRIES", defaults.io_retries)?,
            max_robot_guesses: env_or("ISPY_MAX_ROBOT_GUESSES", defaults.max_robot_guesses)?,
            max_human_turns: env_or("ISPY_MAX_HUMAN_TURNS", defaults.max_human_turns)?,
            max_reasoning_failures: env_or(
                "ISPY_MAX_REASONING_FAILURES",
                defaults.max_reasoning_failures,
            )?,
            think_pause: env_secs("ISPY_THINK_PAUSE_SECS", defaults.think_pause)?,
            scan_when_guessing: env_or("ISPY_SCAN_WHEN_GUESSING", defaults.scan_when_guessing)?,
        };

        Ok(Self {
            openai_api_key,
            openai_api_base,
            chat_model,
            log_level,
            prompts_path,
            scan_mode,
            gateway,
            robot_bridge_url,
            robot_realm,
            offline,
            settings,
        })
    }

    /// Checks that every setting the chosen mode needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.offline && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set unless playing offline".to_string(),
            ));
        }
        if self.gateway == GatewayKind::Bridge && self.robot_realm.is_none() {
            return Err(ConfigError::MissingVar(
                "ROBOT_REALM must be set for the 'bridge' gateway".to_string(),
            ));
        }
        if self.settings.max_unrecognized == 0 {
            return Err(ConfigError::InvalidValue(
                "ISPY_MAX_REPROMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

fn env_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_or(key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "OPENAI_API_KEY",
        "OPENAI_API_BASE",
        "CHAT_MODEL",
        "RUST_LOG",
        "PROMPTS_PATH",
        "ISPY_SCAN_MODE",
        "ISPY_GATEWAY",
        "ROBOT_BRIDGE_URL",
        "ROBOT_REALM",
        "ISPY_OFFLINE",
        "ISPY_LISTEN_TIMEOUT_SECS",
        "ISPY_SCAN_TIMEOUT_SECS",
        "ISPY_REASONING_TIMEOUT_SECS",
        "ISPY_MAX_REPROMPTS",
        "ISPY_IO_RETRIES",
        "ISPY_MAX_ROBOT_GUESSES",
        "ISPY_MAX_HUMAN_TURNS",
        "ISPY_THINK_PAUSE_SECS",
        "ISPY_REASONING_BACKOFF_MS",
        "ISPY_MAX_NAME_ATTEMPTS",
        "ISPY_MAX_REASONING_FAILURES",
        "ISPY_SCAN_WHEN_GUESSING",
    ];

    fn clear_env_vars() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
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
    fn test_config_from_env_defaults() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }

        let config = Config::from_env().expect("Config should load successfully");
        config.validate().expect("Config should be valid");

        assert_eq!(config.openai_api_key, Some("test-openai-key".to_string()));
        assert_eq!(config.openai_api_base, "https://api.openai.com/v1");
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.prompts_path, PathBuf::from("./prompts"));
        assert_eq!(config.scan_mode, ScanMode::Static);
        assert_eq!(config.gateway, GatewayKind::Console);
        assert!(!config.offline);
        assert_eq!(config.settings, GameSettings::default());
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "custom-key");
            env::set_var("OPENAI_API_BASE", "http://localhost:11434/v1");
            env::set_var("CHAT_MODEL", "llama3");
            env::set_var("RUST_LOG", "debug");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
            env::set_var("ISPY_SCAN_MODE", "360");
            env::set_var("ISPY_GATEWAY", "bridge");
            env::set_var("ROBOT_BRIDGE_URL", "ws://robot.local:9000");
            env::set_var("ROBOT_REALM", "rie.lab");
            env::set_var("ISPY_LISTEN_TIMEOUT_SECS", "30");
            env::set_var("ISPY_MAX_ROBOT_GUESSES", "3");
        }

        let config = Config::from_env().expect("Config should load successfully");
        config.validate().expect("Config should be valid");

        assert_eq!(config.openai_api_base, "http://localhost:11434/v1");
        assert_eq!(config.chat_model, "llama3");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.prompts_path, PathBuf::from("/custom/prompts"));
        assert_eq!(config.scan_mode, ScanMode::Rotate360);
        assert_eq!(config.gateway, GatewayKind::Bridge);
        assert_eq!(config.robot_bridge_url, "ws://robot.local:9000");
        assert_eq!(config.robot_realm, Some("rie.lab".to_string()));
        assert_eq!(config.settings.listen_timeout, Duration::from_secs(30));
        assert_eq!(config.settings.max_robot_guesses, 3);
    }

    #[test]
    #[serial]
    fn test_config_every_game_setting_from_env() {
        clear_env_vars();
        unsafe {
            env::set_var("ISPY_OFFLINE", "true");
            env::set_var("ISPY_LISTEN_TIMEOUT_SECS", "10");
            env::set_var("ISPY_SCAN_TIMEOUT_SECS", "90");
            env::set_var("ISPY_REASONING_TIMEOUT_SECS", "5");
            env::set_var("ISPY_REASONING_BACKOFF_MS", "250");
            env::set_var("ISPY_MAX_REPROMPTS", "4");
            env::set_var("ISPY_MAX_NAME_ATTEMPTS", "1");
            env::set_var("ISPY_IO_RETRIES", "0");
            env::set_var("ISPY_MAX_ROBOT_GUESSES", "7");
            env::set_var("ISPY_MAX_HUMAN_TURNS", "12");
            env::set_var("ISPY_MAX_REASONING_FAILURES", "3");
            env::set_var("ISPY_THINK_PAUSE_SECS", "2");
            env::set_var("ISPY_SCAN_WHEN_GUESSING", "false");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(
            config.settings,
            GameSettings {
                listen_timeout: Duration::from_secs(10),
                scan_timeout: Duration::from_secs(90),
                reasoning_timeout: Duration::from_secs(5),
                reasoning_backoff: Duration::from_millis(250),
                max_unrecognized: 4,
                max_name_attempts: 1,
                io_retries: 0,
                max_robot_guesses: 7,
                max_human_turns: 12,
                max_reasoning_failures: 3,
                think_pause: Duration::from_secs(2),
                scan_when_guessing: false,
            }
        );
    }

    #[test]
    #[serial]
    fn test_config_invalid_scan_mode() {
        clear_env_vars();
        unsafe {
            env::set_var("ISPY_SCAN_MODE", "sideways");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "ISPY_SCAN_MODE"),
            _ => panic!("Expected InvalidValue for ISPY_SCAN_MODE"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bound() {
        clear_env_vars();
        unsafe {
            env::set_var("ISPY_MAX_HUMAN_TURNS", "lots");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "ISPY_MAX_HUMAN_TURNS"),
            _ => panic!("Expected InvalidValue for ISPY_MAX_HUMAN_TURNS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");
        match config.validate().unwrap_err() {
            ConfigError::MissingVar(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_offline_needs_no_key() {
        clear_env_vars();
        unsafe {
            env::set_var("ISPY_OFFLINE", "true");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert!(config.offline);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_bridge_needs_realm() {
        clear_env_vars();
        unsafe {
            env::set_var("ISPY_OFFLINE", "true");
            env::set_var("ISPY_GATEWAY", "bridge");
        }

        let config = Config::from_env().expect("Config should load successfully");
        match config.validate().unwrap_err() {
            ConfigError::MissingVar(msg) => assert!(msg.contains("ROBOT_REALM")),
            _ => panic!("Expected MissingVar for ROBOT_REALM"),
        }
    }
}
