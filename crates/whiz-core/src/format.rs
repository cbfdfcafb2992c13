//! Footer and uptime text helpers shared by every reply.

use std::time::Duration;

const ZERO_WIDTH_SPACE: char = '\u{200B}';

/// Insert a zero-width space between every character so WhatsApp does not
/// render a link preview.
pub fn obfuscate_link(url: &str) -> String {
    let mut out = String::with_capacity(url.len() * 4);
    for (i, c) in url.chars().enumerate() {
        if i > 0 {
            out.push(ZERO_WIDTH_SPACE);
        }
        out.push(c);
    }
    out
}

/// Remove zero-width spaces inserted by [`obfuscate_link`].
pub fn strip_zws(text: &str) -> String {
    text.chars().filter(|c| *c != ZERO_WIDTH_SPACE).collect()
}

/// Standard footer appended to bot replies.
pub fn footer(footer_text: &str, group_url: &str) -> String {
    format!(
        "\n\n---\n{footer_text}\nGroup: {}",
        obfuscate_link(group_url)
    )
}

/// Human uptime: `1h 2m 3s`, zero components skipped, `just now` under a second.
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m "));
    }
    out.push_str(&format!("{seconds}s"));

    if out == "0s" {
        "just now".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obfuscate_roundtrip() {
        for url in [
            "https://chat.whatsapp.com/JLmSbTfqf4I2Kh4SNJcWgM",
            "",
            "a",
            "https://例え.jp/パス",
        ] {
            assert_eq!(strip_zws(&obfuscate_link(url)), url);
        }
    }

    #[test]
    fn test_obfuscate_interleaves() {
        assert_eq!(obfuscate_link("abc"), "a\u{200B}b\u{200B}c");
    }

    #[test]
    fn test_footer_layout() {
        let f = footer("Made with love by Whiz", "https://x.y");
        assert!(f.starts_with("\n\n---\nMade with love by Whiz\nGroup: "));
        assert!(f.ends_with(&obfuscate_link("https://x.y")));
        assert!(strip_zws(&f).ends_with("Group: https://x.y"));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_millis(400)), "just now");
        assert_eq!(format_uptime(Duration::from_secs(5)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(60)), "1m 0s");
        assert_eq!(format_uptime(Duration::from_secs(3600)), "1h 0s");
        assert_eq!(format_uptime(Duration::from_secs(3723)), "1h 2m 3s");
    }
}
