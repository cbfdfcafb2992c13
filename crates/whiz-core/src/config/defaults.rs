//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "𝐖𝐇𝐈𝐙-𝐌𝐃".to_string()
}

pub fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub fn default_owner_name() -> String {
    "Whiz".to_string()
}

pub fn default_prefixes() -> Vec<String> {
    ["!", ".", "#", "/"].iter().map(|p| p.to_string()).collect()
}

pub fn default_repo_url() -> String {
    "https://github.com/twoem/whizbotpro".to_string()
}

pub fn default_group_url() -> String {
    "https://chat.whatsapp.com/JLmSbTfqf4I2Kh4SNJcWgM".to_string()
}

pub fn default_footer_text() -> String {
    "Made with love by Whiz".to_string()
}

pub fn default_data_dir() -> String {
    "~/.whiz".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_broadcast_delay_ms() -> u64 {
    1500
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_port() -> u16 {
    3000
}

pub fn default_link_timeout_secs() -> u64 {
    90
}

pub fn default_device_name() -> String {
    "WHIZ PRO".to_string()
}
