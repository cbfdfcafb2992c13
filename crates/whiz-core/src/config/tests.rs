use super::*;
use std::collections::HashMap;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.bot.prefixes, vec!["!", ".", "#", "/"]);
    assert_eq!(cfg.bot.owner_name, "Whiz");
    assert!(cfg.bot.auto_like_status);
    assert!(!cfg.bot.serialize_per_chat);
    assert_eq!(cfg.web.port, 3000);
    assert_eq!(cfg.linker.timeout_secs, 90);
    assert!(cfg.bot.owner_jid().is_none());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let toml_str = r#"
        [bot]
        owner_number = "254700000001"
        prefixes = ["."]

        [web]
        port = 8080
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.bot.prefixes, vec!["."]);
    assert_eq!(cfg.bot.footer_text, "Made with love by Whiz");
    assert_eq!(cfg.web.port, 8080);
    assert!(cfg.web.enabled);
    assert_eq!(
        cfg.bot.owner_jid().as_deref(),
        Some("254700000001@s.whatsapp.net")
    );
}

#[test]
fn test_missing_file_uses_defaults() {
    let cfg = parse_file("/nonexistent/__whiz_config__.toml").unwrap();
    assert_eq!(cfg.bot.data_dir, "~/.whiz");
}

#[test]
fn test_env_overrides() {
    let vars = env(&[
        ("OWNER_JID", "254711111111@s.whatsapp.net"),
        ("OWNER_JID_FOR_STATUS_SAVES", "254722222222@s.whatsapp.net"),
        ("DATA_DIR", "/srv/whiz"),
        ("PORT", "9090"),
        ("WHATSAPP_SESSION_ID", "WHIZBOT_abc"),
    ]);
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg, |k| vars.get(k).cloned());

    assert_eq!(cfg.bot.owner_number, "254711111111");
    assert_eq!(cfg.bot.save_target().as_deref(), Some("254722222222@s.whatsapp.net"));
    assert_eq!(cfg.bot.data_dir, "/srv/whiz");
    assert_eq!(cfg.web.port, 9090);
    assert_eq!(cfg.linker.port, 9090);
    assert_eq!(cfg.bot.session_id.as_deref(), Some("WHIZBOT_abc"));
}

#[test]
fn test_env_override_ignores_bad_port_and_blank_values() {
    let vars = env(&[("PORT", "not-a-port"), ("OWNER_JID", "  ")]);
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg, |k| vars.get(k).cloned());
    assert_eq!(cfg.web.port, 3000);
    assert!(cfg.bot.owner_number.is_empty());
}

#[test]
fn test_save_target_falls_back_to_owner() {
    let mut cfg = Config::default();
    assert!(cfg.bot.save_target().is_none());
    cfg.bot.owner_number = "15551234567".into();
    assert_eq!(
        cfg.bot.save_target().as_deref(),
        Some("15551234567@s.whatsapp.net")
    );
}

#[test]
fn test_validate_rejects_empty_prefixes() {
    let mut cfg = Config::default();
    cfg.bot.prefixes.clear();
    assert!(validate(&cfg).is_err());
    cfg.bot.prefixes = vec![" ".into()];
    assert!(validate(&cfg).is_err());
}

#[test]
fn test_digits_only() {
    assert_eq!(digits_only("+254 (700) 000-001"), "254700000001");
    assert_eq!(digits_only("abc"), "");
}

#[test]
fn test_shellexpand_passthrough() {
    assert_eq!(shellexpand("/abs/path"), "/abs/path");
}
