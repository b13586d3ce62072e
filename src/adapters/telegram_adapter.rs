//! Chat notification adapters.

use crate::domain::error::ScanError;
use crate::ports::notify_port::NotifyPort;
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Longest message the Bot API accepts, in characters.
pub const MESSAGE_LIMIT: usize = 4096;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Splits `text` into chunks of at most `limit` characters, breaking on line
/// boundaries. A single line longer than `limit` is cut mid-line.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let mut line: Vec<char> = line.chars().collect();
        while line.len() > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = line.split_off(limit);
            chunks.push(line.into_iter().collect());
            line = rest;
        }
        let extra = line.len() + usize::from(!current.is_empty());
        if current_len + extra > limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current_len += line.len();
        current.extend(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: Client,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(std::io::Error::other)?;
        Ok(Self {
            bot_token,
            chat_id,
            client,
            base_url: "https://api.telegram.org".to_string(),
        })
    }

    fn send_chunk(&self, text: &str) -> Result<(), ScanError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            disable_web_page_preview: true,
        };
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|e| ScanError::Notify {
                // The URL carries the bot token; keep it out of logs.
                reason: e.without_url().to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ScanError::Notify {
                reason: format!("Telegram API error {}: {}", status, body),
            });
        }
        Ok(())
    }
}

impl NotifyPort for TelegramNotifier {
    fn send(&self, text: &str) -> Result<(), ScanError> {
        for chunk in split_message(text, MESSAGE_LIMIT) {
            self.send_chunk(&chunk)?;
        }
        Ok(())
    }
}

/// Writes alerts to the log instead of a chat. Used when no chat
/// credentials are configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotifyPort for LogNotifier {
    fn send(&self, text: &str) -> Result<(), ScanError> {
        info!(target: "alert", "\n{}", text);
        Ok(())
    }
}
