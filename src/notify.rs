//! Telegram notifications
//!
//! One-way, best effort. Callers send after their writes have committed
//! and only log a failed send.

use reqwest::Client;
use serde::Serialize;

use crate::config::TelegramConfig;
use crate::error::{BotError, Result};

/// Telegram rejects messages above 4096 characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Clone)]
pub struct Notifier {
    http: Client,
    bot_token: String,
    chat_id: String,
    enabled: bool,
    notify_runs: bool,
    notify_errors: bool,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: Client::new(),
            bot_token,
            chat_id,
            enabled: true,
            notify_runs: true,
            notify_errors: true,
        }
    }

    /// A notifier that drops every message
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            bot_token: String::new(),
            chat_id: String::new(),
            enabled: false,
            notify_runs: false,
            notify_errors: false,
        }
    }

    pub fn from_config(config: Option<&TelegramConfig>) -> Self {
        match config {
            Some(tg) if !tg.bot_token.is_empty() && !tg.chat_id.is_empty() => {
                let mut notifier = Self::new(tg.bot_token.clone(), tg.chat_id.clone());
                notifier.notify_runs = tg.notify_runs;
                notifier.notify_errors = tg.notify_errors;
                notifier
            }
            _ => {
                tracing::info!("Telegram not configured, notifications disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send an HTML message, split into chunks when long
    pub async fn send(&self, text: &str) -> Result<()> {
        if !self.enabled {
            tracing::debug!("Notification dropped (disabled): {} chars", text.len());
            return Ok(());
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let request = SendMessageRequest {
                chat_id: &self.chat_id,
                text: &chunk,
                parse_mode: "HTML",
            };
            let response = self.http.post(&url).json(&request).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(BotError::Notify(format!("Telegram {}: {}", status, body)));
            }
        }
        Ok(())
    }

    /// Run summary message, if run notifications are on
    pub async fn run_report(&self, text: &str) -> Result<()> {
        if !self.notify_runs {
            return Ok(());
        }
        self.send(text).await
    }

    pub async fn error(&self, context: &str, message: &str) -> Result<()> {
        if !self.notify_errors {
            return Ok(());
        }
        let text = format!(
            "🚨 <b>{}</b>\n\n<code>{}</code>",
            escape_html(context),
            escape_html(message)
        );
        self.send(&text).await
    }

    /// Send and log failure; never propagates
    pub async fn send_best_effort(&self, text: &str) {
        if let Err(e) = self.run_report(text).await {
            tracing::warn!("⚠️ Notification failed: {}", e);
        }
    }
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Split on line boundaries into chunks of at most `limit` characters.
/// A single line longer than `limit` is cut at character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_message_is_single_chunk() {
        assert_eq!(split_message("hello\nworld", 4000), vec!["hello\nworld"]);
        assert!(split_message("", 4000).is_empty());
    }

    #[test]
    fn test_split_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_message(text, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_long_line_by_chars() {
        let text = "ééééééé";
        let chunks = split_message(text, 3);
        assert_eq!(chunks, vec!["ééé", "ééé", "é"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_silent() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        assert!(notifier.send("x").await.is_ok());
        assert!(notifier.error("ctx", "boom").await.is_ok());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = TelegramConfig {
            bot_token: String::new(),
            chat_id: "1".into(),
            notify_runs: true,
            notify_errors: true,
        };
        assert!(!Notifier::from_config(Some(&config)).is_enabled());
        assert!(!Notifier::from_config(None).is_enabled());

        let config = TelegramConfig {
            bot_token: "123:abc".into(),
            ..config
        };
        assert!(Notifier::from_config(Some(&config)).is_enabled());
    }
}
