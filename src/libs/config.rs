//! Update configuration.
//!
//! Settings live in `config.json` inside the application data directory
//! (see [`DataStorage`]). Every field is optional on disk: missing values fall
//! back to what was baked in at build time (`APP_METADATA_*`) or to folders
//! under the data directory.
//!
//! ```rust,no_run
//! use upkit::libs::config::Config;
//!
//! let config = Config::read()?;
//! let settings = config.settings()?;
//! println!("checking {} endpoint(s)", settings.endpoints.len());
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::data_storage::DataStorage;
use crate::libs::messages::Message;
use crate::libs::orchestrator::UpdateSettings;
use crate::libs::platform;
use crate::libs::release::Channel;
use crate::{msg_print, msg_warning};
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{self, File};
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/app_metadata.rs"));

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub resource_id: String,
    /// Overrides the build version; mainly useful for testing.
    pub current_version: Option<String>,
    pub channel: Channel,
    pub cdk: Option<String>,
    pub endpoints: Vec<String>,
    pub repository_url: Option<String>,
    pub project_name: Option<String>,
    pub short_name: Option<String>,
    pub proxy: Option<String>,
    pub install_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub retention_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub relaunch: bool,
}

impl Default for Config {
    fn default() -> Self {
        let repository = APP_METADATA_REPOSITORY.trim();
        Self {
            resource_id: APP_METADATA_RESOURCE_ID.to_string(),
            current_version: None,
            channel: Channel::Stable,
            cdk: None,
            endpoints: APP_METADATA_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            repository_url: (!repository.is_empty()).then(|| repository.to_string()),
            project_name: Some(APP_METADATA_PROJECT.to_string()),
            short_name: Some(APP_METADATA_SHORT_NAME.to_string()),
            proxy: None,
            install_dir: None,
            download_dir: None,
            retention_dir: None,
            state_dir: None,
            relaunch: false,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl Config {
    pub fn read() -> Result<Config> {
        let config_file_path = DataStorage::new().get_path(CONFIG_FILE_NAME)?;
        if !config_file_path.exists() {
            return Ok(Config::default());
        }

        let config_str = fs::read_to_string(&config_file_path)
            .with_context(|| format!("failed to read {}", config_file_path.display()))?;
        let config: Config = serde_json::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", config_file_path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_file_path = DataStorage::new().get_path(CONFIG_FILE_NAME)?;
        let config_file = File::create(config_file_path)?;
        serde_json::to_writer_pretty(&config_file, &self)?;
        Ok(())
    }

    /// Interactive setup, starting from the current values.
    pub fn init() -> Result<Self> {
        let mut config = Self::read().unwrap_or_default();
        let theme = ColorfulTheme::default();
        msg_print!(Message::ConfigHeader, true);

        config.resource_id = Input::with_theme(&theme)
            .with_prompt(Message::PromptResourceId.to_string())
            .default(config.resource_id.clone())
            .interact_text()?;

        loop {
            let channel: String = Input::with_theme(&theme)
                .with_prompt(Message::PromptChannel.to_string())
                .default(config.channel.to_string())
                .interact_text()?;
            match channel.parse() {
                Ok(channel) => {
                    config.channel = channel;
                    break;
                }
                Err(_) => msg_warning!(Message::InvalidChannel(channel)),
            }
        }

        let cdk: String = Input::with_theme(&theme)
            .with_prompt(Message::PromptCdk.to_string())
            .default(config.cdk.clone().unwrap_or_default())
            .allow_empty(true)
            .interact_text()?;
        config.cdk = non_empty(cdk);

        let endpoints: String = Input::with_theme(&theme)
            .with_prompt(Message::PromptEndpoints.to_string())
            .default(config.endpoints.join(","))
            .interact_text()?;
        config.endpoints = endpoints
            .split(',')
            .filter_map(|e| non_empty(e.to_string()))
            .collect();

        let repository: String = Input::with_theme(&theme)
            .with_prompt(Message::PromptRepositoryUrl.to_string())
            .default(config.repository_url.clone().unwrap_or_default())
            .allow_empty(true)
            .interact_text()?;
        config.repository_url = non_empty(repository);

        let project: String = Input::with_theme(&theme)
            .with_prompt(Message::PromptProjectName.to_string())
            .default(config.project_name.clone().unwrap_or_default())
            .allow_empty(true)
            .interact_text()?;
        config.project_name = non_empty(project);

        let short_name: String = Input::with_theme(&theme)
            .with_prompt(Message::PromptShortName.to_string())
            .default(config.short_name.clone().unwrap_or_default())
            .allow_empty(true)
            .interact_text()?;
        config.short_name = non_empty(short_name);

        let proxy: String = Input::with_theme(&theme)
            .with_prompt(Message::PromptProxy.to_string())
            .default(config.proxy.clone().unwrap_or_default())
            .allow_empty(true)
            .interact_text()?;
        config.proxy = non_empty(proxy);

        let install_dir: String = Input::with_theme(&theme)
            .with_prompt(Message::PromptInstallDir.to_string())
            .default(Self::default_install_dir()?.display().to_string())
            .interact_text()?;
        config.install_dir = non_empty(install_dir).map(PathBuf::from);

        config.relaunch = Confirm::with_theme(&theme)
            .with_prompt(Message::PromptRelaunch.to_string())
            .default(config.relaunch)
            .interact()?;

        Ok(config)
    }

    fn default_install_dir() -> Result<PathBuf> {
        let exe = env::current_exe()?;
        exe.parent()
            .map(|dir| dir.to_path_buf())
            .context("executable has no parent directory")
    }

    pub fn current_version(&self) -> String {
        self.current_version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| APP_METADATA_VERSION.to_string())
    }

    /// Resolves defaults into the settings the orchestrator runs with.
    pub fn settings(&self) -> Result<UpdateSettings> {
        let storage = DataStorage::new();
        let install_dir = match &self.install_dir {
            Some(dir) => dir.clone(),
            None => Self::default_install_dir()?,
        };
        let current_version = self.current_version();

        Ok(UpdateSettings {
            resource_id: self.resource_id.clone(),
            user_agent: platform::build_user_agent(APP_METADATA_NAME, &current_version),
            current_version,
            channel: self.channel,
            credential: self.cdk.clone().filter(|c| !c.is_empty()),
            endpoints: self.endpoints.clone(),
            repository_url: self.repository_url.clone().filter(|r| !r.is_empty()),
            project_name: self.project_name.clone().filter(|p| !p.is_empty()),
            short_name: self.short_name.clone().filter(|s| !s.is_empty()),
            proxy: self.proxy.clone().filter(|p| !p.is_empty()),
            install_dir,
            download_dir: self.download_dir.clone().unwrap_or_else(|| storage.dir("downloads")),
            retention_dir: self.retention_dir.clone().unwrap_or_else(|| storage.dir("retained")),
            state_dir: self.state_dir.clone().unwrap_or_else(|| storage.dir("state")),
            relaunch: self.relaunch,
        })
    }
}
