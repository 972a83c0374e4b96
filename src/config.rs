use log::info;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::disk::config::BuildConfig;

pub const CONFIG_FILE: &str = ".gptimg.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
}

impl AppConfig {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn generate_config_file(force: bool) -> anyhow::Result<()> {
        use std::io::Write;

        if std::path::Path::new(CONFIG_FILE).exists() && !force {
            anyhow::bail!(
                "Configuration file {} already exists. Use --force to overwrite.",
                CONFIG_FILE
            );
        }

        let config_content = Self::generate_full_config()?;

        let mut file = fs::File::create(CONFIG_FILE)?;
        file.write_all(config_content.as_bytes())?;

        info!("Configuration file generated: {}", CONFIG_FILE);
        info!("Please edit this file to customize configuration");
        Ok(())
    }

    pub fn generate_full_config() -> anyhow::Result<String> {
        let config = AppConfig {
            build: Some(BuildConfig::with_defaults()),
        };
        let toml_content = toml::to_string_pretty(&config)?;
        Ok(format!(
            "# gptimg configuration file\n# All fields are optional, command line arguments override config file values\n\n{}",
            toml_content
        ))
    }
}
