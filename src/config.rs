use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_url: String,
    pub user_id: String,
    pub token_command: String,
}

/// Settings the rule engine needs, passed explicitly into the applier and
/// the batch processor.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub default_move_label: String,
    pub stop_after_first_match: bool,
}

#[derive(Debug)]
pub struct Config {
    pub gmail: GmailConfig,
    pub store_path: PathBuf,
    pub rules_path: Option<PathBuf>,
    pub processing: ProcessingConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {}", e),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    gmail: Option<RawGmailConfig>,
    #[serde(default)]
    store: RawStoreConfig,
    #[serde(default)]
    rules: RawRulesConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGmailConfig {
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default = "default_user_id")]
    user_id: String,
    token_command: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStoreConfig {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRulesConfig {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default = "default_move_label")]
    default_move_label: String,
    #[serde(default)]
    stop_after_first_match: bool,
}

impl Default for RawRulesConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_move_label: default_move_label(),
            stop_after_first_match: false,
        }
    }
}

fn default_api_url() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_move_label() -> String {
    "Processed".to_string()
}

pub fn default_store_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join("mailsift").join("mail.redb")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("mailsift")
            .join("mail.redb")
    } else {
        PathBuf::from("mail.redb")
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let gmail = raw
            .gmail
            .ok_or_else(|| ConfigError::Parse("missing [gmail] section".to_string()))?;
        let token_command = gmail
            .token_command
            .ok_or_else(|| ConfigError::Parse("missing token_command in [gmail]".to_string()))?;
        if gmail.user_id.trim().is_empty() {
            return Err(ConfigError::Parse(
                "user_id in [gmail] must not be empty".to_string(),
            ));
        }

        let default_move_label = raw.rules.default_move_label.trim().to_string();
        if default_move_label.is_empty() {
            return Err(ConfigError::Parse(
                "default_move_label in [rules] must not be empty".to_string(),
            ));
        }

        Ok(Config {
            gmail: GmailConfig {
                api_url: gmail.api_url,
                user_id: gmail.user_id,
                token_command,
            },
            store_path: raw.store.path.unwrap_or_else(default_store_path),
            rules_path: raw.rules.path,
            processing: ProcessingConfig {
                default_move_label,
                stop_after_first_match: raw.rules.stop_after_first_match,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
[gmail]
token_command = "gcloud auth print-access-token"
"#,
        )
        .unwrap();

        assert_eq!(config.gmail.api_url, "https://gmail.googleapis.com/gmail/v1");
        assert_eq!(config.gmail.user_id, "me");
        assert_eq!(config.processing.default_move_label, "Processed");
        assert!(!config.processing.stop_after_first_match);
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
[gmail]
api_url = "http://127.0.0.1:9999/gmail/v1"
user_id = "someone@example.com"
token_command = "echo token"

[store]
path = "/tmp/mailsift-test.redb"

[rules]
path = "/tmp/rules.json"
default_move_label = "Sorted"
stop_after_first_match = true
"#,
        )
        .unwrap();

        assert_eq!(config.gmail.api_url, "http://127.0.0.1:9999/gmail/v1");
        assert_eq!(config.gmail.user_id, "someone@example.com");
        assert_eq!(config.store_path, PathBuf::from("/tmp/mailsift-test.redb"));
        assert_eq!(config.rules_path, Some(PathBuf::from("/tmp/rules.json")));
        assert_eq!(config.processing.default_move_label, "Sorted");
        assert!(config.processing.stop_after_first_match);
    }

    #[test]
    fn test_missing_token_command() {
        let err = Config::parse("[gmail]\nuser_id = \"me\"\n").unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("token_command"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_missing_gmail_section() {
        let err = Config::parse("[rules]\nstop_after_first_match = true\n").unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("[gmail]"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_unknown_key_errors() {
        let err = Config::parse(
            r#"
[gmail]
token_command = "echo token"
password = "hunter2"
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("unknown field"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_blank_default_move_label_rejected() {
        let err = Config::parse(
            r#"
[gmail]
token_command = "echo token"

[rules]
default_move_label = "  "
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
