mod defaults;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::WhizError;
use defaults::*;

/// Top-level whiz configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub linker: LinkerConfig,
}

/// Bot identity, owner, command prefixes and behaviour switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_owner_name")]
    pub owner_name: String,
    /// Owner phone number (digits only, e.g. `254700000000`). Empty = no owner.
    #[serde(default)]
    pub owner_number: String,
    /// Where `save` forwards content. Empty = fall back to the owner.
    #[serde(default)]
    pub status_save_jid: String,
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
    #[serde(default = "default_group_url")]
    pub group_url: String,
    #[serde(default = "default_footer_text")]
    pub footer_text: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub owner_image_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// React to contacts' status updates.
    #[serde(default = "default_true")]
    pub auto_like_status: bool,
    /// Buffer messages per chat while one is being handled.
    #[serde(default)]
    pub serialize_per_chat: bool,
    /// Also require the sender to be a group admin for admin-only commands.
    #[serde(default)]
    pub require_sender_admin: bool,
    #[serde(default = "default_broadcast_delay_ms")]
    pub broadcast_delay_ms: u64,
    /// Session blob (`WHIZBOT_...`) produced by the session generator.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub youtube_api_key: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            owner_name: default_owner_name(),
            owner_number: String::new(),
            status_save_jid: String::new(),
            prefixes: default_prefixes(),
            repo_url: default_repo_url(),
            group_url: default_group_url(),
            footer_text: default_footer_text(),
            logo_url: None,
            owner_image_url: None,
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            auto_like_status: true,
            serialize_per_chat: false,
            require_sender_admin: false,
            broadcast_delay_ms: default_broadcast_delay_ms(),
            session_id: None,
            youtube_api_key: None,
        }
    }
}

impl BotConfig {
    /// Owner JID derived from `owner_number`, if configured.
    pub fn owner_jid(&self) -> Option<String> {
        if self.owner_number.is_empty() {
            None
        } else {
            Some(format!("{}@s.whatsapp.net", self.owner_number))
        }
    }

    /// Target for `save`: the explicit status-save JID, else the owner.
    pub fn save_target(&self) -> Option<String> {
        if self.status_save_jid.is_empty() {
            self.owner_jid()
        } else {
            Some(self.status_save_jid.clone())
        }
    }

    /// Primary prefix, used in usage hints.
    pub fn primary_prefix(&self) -> &str {
        self.prefixes.first().map(String::as_str).unwrap_or("!")
    }
}

/// Bot status web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Session generator web server and linking flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_link_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_link_timeout_secs(),
            device_name: default_device_name(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Keep only ASCII digits (phone numbers typed with `+`, spaces or dashes).
pub fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Apply environment overrides on top of a parsed config.
///
/// `lookup` is injected so tests don't have to mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(owner) = non_empty("OWNER_JID") {
        // Accept either a bare number or a full JID.
        let number = owner.split('@').next().unwrap_or_default();
        config.bot.owner_number = digits_only(number);
    }
    if let Some(target) = non_empty("OWNER_JID_FOR_STATUS_SAVES") {
        config.bot.status_save_jid = target;
    }
    if let Some(dir) = non_empty("DATA_DIR") {
        config.bot.data_dir = dir;
    }
    if let Some(port) = non_empty("PORT") {
        match port.trim().parse::<u16>() {
            Ok(p) => {
                config.web.port = p;
                config.linker.port = p;
            }
            Err(e) => tracing::warn!("ignoring invalid PORT '{port}': {e}"),
        }
    }
    if let Some(session) = non_empty("WHATSAPP_SESSION_ID") {
        config.bot.session_id = Some(session);
    }
    if let Some(key) = non_empty("YOUTUBE_API_KEY") {
        config.bot.youtube_api_key = Some(key);
    }
}

/// Load configuration from a TOML file, then apply environment overrides.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, WhizError> {
    let mut config = parse_file(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &str) -> Result<Config, WhizError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| WhizError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    toml::from_str(&content).map_err(|e| WhizError::Config(format!("failed to parse config: {e}")))
}

/// Reject configs the router cannot work with.
pub fn validate(config: &Config) -> Result<(), WhizError> {
    if config.bot.prefixes.is_empty() {
        return Err(WhizError::Config("bot.prefixes must not be empty".into()));
    }
    if config.bot.prefixes.iter().any(|p| p.trim().is_empty()) {
        return Err(WhizError::Config(
            "bot.prefixes must not contain blank entries".into(),
        ));
    }
    Ok(())
}
