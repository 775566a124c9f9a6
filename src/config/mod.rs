use serde::Deserialize;
use std::path::Path;

/// Run configuration for a load run. Defaults reproduce the built-in
/// tunables; a TOML file can override any subset of them.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub clients: usize,
    pub messages: Vec<String>,
    pub ping_interval_seconds: u64,
    pub ping_timeout_seconds: u64,
    pub send_interval_seconds: u64,
    /// Round limit for sustained clients. `None` means loop until the
    /// connection dies or the process is interrupted.
    pub max_rounds: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080/ws".to_string(),
            clients: 100,
            messages: vec![
                "What is your name?".to_string(),
                "How are you?".to_string(),
                "Hi".to_string(),
                "Unknown question".to_string(),
            ],
            ping_interval_seconds: 10,
            ping_timeout_seconds: 5,
            send_interval_seconds: 5,
            max_rounds: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file is not an error: the defaults apply. A file that
    /// exists but fails to parse is.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.messages.is_empty(), "message set must not be empty");
        Ok(())
    }
}
