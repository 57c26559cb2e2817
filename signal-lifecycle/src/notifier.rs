use anyhow::{Context, Result};
use chrono::DateTime;
use common::{SignalHistoryRecord, TelegramConfig};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outbound push channel.
///
/// `Ok(false)` means the channel rejected the message.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str, image: Option<&[u8]>) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API notifier
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }

    async fn send_message(&self, text: &str) -> Result<TelegramResponse> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        self.client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&body)
            .send()
            .await
            .context("Telegram sendMessage request failed")?
            .json()
            .await
            .context("Invalid Telegram sendMessage response")
    }

    async fn send_photo(&self, caption: &str, image: &[u8]) -> Result<TelegramResponse> {
        let photo = Part::bytes(image.to_vec())
            .file_name("signal.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("photo", photo);
        self.client
            .post(format!("{}/sendPhoto", self.api_url))
            .multipart(form)
            .send()
            .await
            .context("Telegram sendPhoto request failed")?
            .json()
            .await
            .context("Invalid Telegram sendPhoto response")
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str, image: Option<&[u8]>) -> Result<bool> {
        let response = match image {
            Some(image) => self.send_photo(text, image).await?,
            None => self.send_message(text).await?,
        };
        if !response.ok {
            warn!(
                "Telegram rejected message: {}",
                response.description.unwrap_or_default()
            );
        }
        Ok(response.ok)
    }
}

/// Writes notifications to the log instead of a channel
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str, image: Option<&[u8]>) -> Result<bool> {
        info!("Notification{}:\n{}", if image.is_some() { " (with image)" } else { "" }, text);
        Ok(true)
    }
}

/// Keeps sent messages in memory (for testing and dry runs)
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    reject: AtomicBool,
    error: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
            error: AtomicBool::new(false),
        }
    }

    /// Answer `Ok(false)` to every send.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Answer `Err` to every send.
    pub fn set_error(&self, error: bool) {
        self.error.store(error, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str, _image: Option<&[u8]>) -> Result<bool> {
        if self.error.load(Ordering::SeqCst) {
            anyhow::bail!("notification channel unavailable");
        }
        if self.reject.load(Ordering::SeqCst) {
            return Ok(false);
        }
        debug!("Recorded notification ({} chars)", text.len());
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
        Ok(true)
    }
}

fn format_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// HTML message for a finalized signal.
pub fn format_signal_message(record: &SignalHistoryRecord) -> String {
    let mut lines = vec![
        format!(
            "<b>{} {}</b> {}",
            record.signal_type, record.symbol, record.timeframe
        ),
        format!("Indicator: {}", record.indicator),
        format!("Entry: {}", format_price(record.entry_price)),
    ];
    for (rank, target) in record.targets.iter().enumerate() {
        lines.push(format!("TP{}: {}", rank + 1, format_price(*target)));
    }
    lines.push(format!("SL: {}", format_price(record.stop_loss)));
    if record.volume_confirmed {
        lines.push("Volume confirmed".to_string());
    }
    lines.push(format!("Signal time: {}", format_time(record.entry_time)));
    lines.join("\n")
}

/// Enough decimals for both BTC and sub-cent pairs.
fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 100.0 {
        format!("{:.2}", price)
    } else if abs >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.8}", price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::history;

    #[test]
    fn test_signal_message() {
        let mut record = history("BTCUSDT", 1_704_103_200_000);
        record.volume_confirmed = true;
        let text = format_signal_message(&record);

        assert!(text.starts_with("<b>BUY BTCUSDT</b> 15m"));
        assert!(text.contains("Entry: 100.00"));
        assert!(text.contains("TP2: 103.00\n"));
        assert!(text.contains("SL: 95.0000"));
        assert!(text.contains("Volume confirmed"));
        assert!(text.contains("2024-01-01 10:00 UTC"));
    }

    #[test]
    fn test_price_precision() {
        assert_eq!(format_price(43_250.5), "43250.50");
        assert_eq!(format_price(2.5), "2.5000");
        assert_eq!(format_price(0.000123), "0.00012300");
    }

    #[tokio::test]
    async fn test_recording_notifier_modes() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.send("a", None).await.unwrap());
        notifier.set_reject(true);
        assert!(!notifier.send("b", None).await.unwrap());
        notifier.set_error(true);
        assert!(notifier.send("c", None).await.is_err());
        assert_eq!(notifier.sent(), vec!["a".to_string()]);
    }
}
