//! Configuration for the relaychat server.
//!
//! Loaded once at startup from a TOML file; a missing or corrupt file is fatal.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::chat::DEFAULT_SESSION_QUEUE;
use crate::error::ConfigError;
use crate::voice::DEFAULT_VOICE_QUEUE;

/// Default port for the text (chat) server.
pub const DEFAULT_TEXT_PORT: u16 = 7065;

/// Default port for the voice relay server.
pub const DEFAULT_VOICE_PORT: u16 = 7066;

/// Config file used when neither a CLI argument nor `RELAYCHAT_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "./relaychat.toml";

/// Avatar images live in this subdirectory of `storage_path`.
pub const IMAGES_DIR: &str = "images";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_text_port")]
    pub port_text: u16,
    #[serde(default = "default_voice_port")]
    pub port_voice: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Relay frames back to the member that sent them.
    #[serde(default)]
    pub voice_echo: bool,
    /// Replies a chat session may have queued before it is disconnected.
    #[serde(default = "default_session_queue")]
    pub session_queue: usize,
    /// Frames queued per voice member before further frames are dropped.
    #[serde(default = "default_voice_queue")]
    pub voice_queue_frames: usize,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChannelEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub is_voice: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    pub id: u32,
    pub name: String,
    /// `salt_hex$sha256_hex`, see [`crate::credentials`].
    pub credential: String,
}

fn default_text_port() -> u16 {
    DEFAULT_TEXT_PORT
}

fn default_voice_port() -> u16 {
    DEFAULT_VOICE_PORT
}

fn default_session_queue() -> usize {
    DEFAULT_SESSION_QUEUE
}

fn default_voice_queue() -> usize {
    DEFAULT_VOICE_QUEUE
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./relaychat-data/")
}

impl ServerConfig {
    /// Reads and parses the file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(port) = env_port("RELAYCHAT_TEXT_PORT") {
            self.port_text = port;
        }
        if let Some(port) = env_port("RELAYCHAT_VOICE_PORT") {
            self.port_voice = port;
        }
    }

    #[must_use]
    pub fn text_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port_text)
    }

    #[must_use]
    pub fn voice_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port_voice)
    }

    #[must_use]
    pub fn images_path(&self) -> PathBuf {
        self.storage_path.join(IMAGES_DIR)
    }
}

fn env_port(name: &str) -> Option<u16> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Resolves the config path: first CLI argument, then `RELAYCHAT_CONFIG`, then the default.
#[must_use]
pub fn config_path(cli_arg: Option<String>) -> PathBuf {
    cli_arg
        .or_else(|| env::var("RELAYCHAT_CONFIG").ok())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}
