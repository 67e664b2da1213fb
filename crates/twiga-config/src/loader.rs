use std::path::{Path, PathBuf};

use tracing::{debug, info};
use twiga_common::{Error, Result};

use crate::model::AppConfig;

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Ok(Self { config_dir })
    }

    pub fn default_config_dir() -> PathBuf {
        let home_config = dirs::home_dir().map(|h| h.join(".twiga"));
        let xdg_config = dirs::config_dir().map(|c| c.join("twiga"));

        match (xdg_config, home_config) {
            (Some(xdg), Some(home)) => {
                if xdg.exists() {
                    xdg
                } else if home.exists() {
                    home
                } else {
                    xdg
                }
            }
            (Some(xdg), None) => xdg,
            (None, Some(home)) => home,
            (None, None) => PathBuf::from(".twiga"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns true if a config file (YAML or TOML) exists on disk.
    pub fn config_file_exists(&self) -> bool {
        self.config_dir.join("config.yml").exists() || self.config_dir.join("config.toml").exists()
    }

    /// Load a `.env` file from the working directory into the process
    /// environment, if one exists. Existing variables are not overwritten.
    pub fn load_dotenv() {
        match dotenvy::dotenv() {
            Ok(path) => info!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => debug!("no .env file found"),
            Err(e) => tracing::warn!("failed to read .env file: {e}"),
        }
    }

    /// Read the config file (YAML preferred over TOML), then apply `TWIGA_*`
    /// environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        if config.data_dir.is_none() {
            config.data_dir = Some(self.config_dir.join("data"));
        }
        Ok(config)
    }

    fn load_file(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join("config.yml");
        let toml_path = self.config_dir.join("config.toml");

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [self.config_dir.clone(), self.config_dir.join("data")];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}

/// Overlay secrets and deployment settings from the environment.
/// Non-empty environment values win over the config file.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("TWIGA_WHATSAPP_ACCESS_TOKEN") {
        config.whatsapp.access_token = Some(v);
    }
    if let Some(v) = get("TWIGA_WHATSAPP_PHONE_NUMBER_ID") {
        config.whatsapp.phone_number_id = Some(v);
    }
    if let Some(v) = get("TWIGA_WHATSAPP_VERIFY_TOKEN") {
        config.whatsapp.verify_token = Some(v);
    }
    if let Some(v) = get("TWIGA_META_APP_SECRET") {
        config.whatsapp.app_secret = Some(v);
    }
    if let Some(v) = get("TWIGA_LLM_API_KEY") {
        config.llm.api_key = Some(v);
    }
    if let Some(v) = get("TWIGA_EMBEDDINGS_API_KEY") {
        config.embeddings.api_key = Some(v);
    }
    if let Some(v) = get("TWIGA_DATABASE_PATH") {
        config.database.path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("TWIGA_GATEWAY_API_KEY") {
        config.gateway.api_key = Some(v);
    }
    if let Some(v) = get("TWIGA_DAILY_MESSAGE_LIMIT") {
        match v.parse() {
            Ok(limit) => config.bot.daily_message_limit = Some(limit),
            Err(_) => tracing::warn!("ignoring invalid TWIGA_DAILY_MESSAGE_LIMIT: {v}"),
        }
    }
}
