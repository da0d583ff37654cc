//! Telegram delivery for scheduled reports
//!
//! Messages use HTML parse mode, so every user-provided value is escaped.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{TelegramConfig, mask_secret};
use crate::constants;
use crate::error::ReportError;
use crate::pipeline::ReportOutcome;
use crate::reports::{format_money, report_currency};

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ReportError>;

    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), ReportError>;
}

// =============================================================================
// Telegram Bot API
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub first_name: String,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.bot_token.clone(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", constants::TELEGRAM_API_BASE, self.token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, ReportError> {
        // reqwest errors embed the URL, which carries the token
        let response = request.send().await.map_err(|e| {
            ReportError::Notify(format!("{} request failed: {}", method, e.without_url()))
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let parsed: Option<ApiResponse<T>> = serde_json::from_str(&text).ok();

        match parsed {
            Some(body) if status.is_success() && body.ok => Ok(body.result),
            Some(body) => Err(ReportError::Notify(format!(
                "Telegram API error {} on {}: {}",
                status,
                method,
                body.description.unwrap_or_default()
            ))),
            None => Err(ReportError::Notify(format!(
                "Telegram API error {} on {}: {}",
                status, method, text
            ))),
        }
    }

    /// Verify the bot token
    pub async fn get_me(&self) -> Result<BotUser, ReportError> {
        let request = self.client.get(self.method_url("getMe"));
        self.call::<BotUser>("getMe", request)
            .await?
            .ok_or_else(|| ReportError::Notify("getMe returned no bot".to_string()))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ReportError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": truncate_chars(text, constants::TELEGRAM_MESSAGE_LIMIT),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let request = self.client.post(self.method_url("sendMessage")).json(&body);
        self.call::<serde_json::Value>("sendMessage", request).await?;

        info!(chat_id, "sent telegram message");
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), ReportError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ReportError::Notify(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        debug!(file = %file_name, bytes = bytes.len(), "uploading document");

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text(
                "caption",
                truncate_chars(caption, constants::TELEGRAM_CAPTION_LIMIT),
            )
            .text("parse_mode", "HTML")
            .part("document", Part::bytes(bytes).file_name(file_name.clone()));

        let request = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form);
        self.call::<serde_json::Value>("sendDocument", request).await?;

        info!(chat_id, file = %file_name, "sent telegram document");
        Ok(())
    }
}

// =============================================================================
// Message Formatting
// =============================================================================

/// Escape the three characters Telegram's HTML mode reserves
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let head: String = s.chars().take(limit.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Join lines, dropping whole trailing lines that would exceed `limit`
fn fit_lines(lines: &[String], limit: usize) -> String {
    let mut out = String::new();
    for line in lines {
        let extra = if out.is_empty() { 0 } else { 1 } + line.chars().count();
        if out.chars().count() + extra > limit {
            break;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

fn describe_groups(outcome: &ReportOutcome) -> String {
    match &outcome.config.criteria.groups {
        None => "all".to_string(),
        Some(groups) if groups.len() <= constants::CAPTION_MAX_GROUPS => groups
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(groups) => {
            let shown: Vec<&str> = groups
                .iter()
                .take(constants::CAPTION_MAX_GROUPS)
                .map(String::as_str)
                .collect();
            format!(
                "{} (+{} more)",
                shown.join(", "),
                groups.len() - constants::CAPTION_MAX_GROUPS
            )
        }
    }
}

/// Caption attached to a delivered report
pub fn format_caption(outcome: &ReportOutcome) -> String {
    let currency = report_currency(&outcome.rows);
    let summary = &outcome.summary;
    let name = truncate_chars(outcome.config.display_name(), 120);

    let lines = vec![
        format!("<b>Daily Report: {}</b>", escape_html(&name)),
        format!("Generated: {}", outcome.generated_label()),
        format!("Database: {}", escape_html(&outcome.database)),
        format!("Period: {}", outcome.window),
        format!("Groups: {}", escape_html(&describe_groups(outcome))),
        format!("Accounts: {}", summary.accounts),
        format!("Deposits: {}", escape_html(&format_money(summary.deposits, &currency))),
        format!(
            "Withdrawals: {}",
            escape_html(&format_money(summary.withdrawals, &currency))
        ),
        format!(
            "<b>Net P/L: {}</b>",
            escape_html(&format_money(summary.net_pl, &currency))
        ),
    ];
    fit_lines(&lines, constants::TELEGRAM_CAPTION_LIMIT)
}

/// Text sent instead of a report when a scheduled run fails
pub fn format_failure(task_name: &str, config_name: &str, error: &str) -> String {
    let lines = vec![
        format!("<b>Report failed: {}</b>", escape_html(task_name)),
        format!("Configuration: {}", escape_html(config_name)),
        format!(
            "Error: {}",
            escape_html(&truncate_chars(error, constants::TELEGRAM_MESSAGE_LIMIT / 2))
        ),
    ];
    fit_lines(&lines, constants::TELEGRAM_MESSAGE_LIMIT)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::assembler::ReportRow;
    use crate::assembler::tests::snapshot;
    use crate::categorizer::CategoryTotals;
    use crate::reports::tests::outcome_with;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Records what would have been sent
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub messages: Mutex<Vec<(String, String)>>,
        pub documents: Mutex<Vec<(String, String, String)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ReportError> {
            if self.fail {
                return Err(ReportError::Notify("chat not found".to_string()));
            }
            self.messages
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_document(
            &self,
            chat_id: &str,
            path: &Path,
            caption: &str,
        ) -> Result<(), ReportError> {
            if self.fail {
                return Err(ReportError::Notify("chat not found".to_string()));
            }
            self.documents.lock().unwrap().push((
                chat_id.to_string(),
                path.display().to_string(),
                caption.to_string(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("P&L <vip>"), "P&amp;L &lt;vip&gt;");
    }

    #[test]
    fn test_caption_lists_groups_and_totals() {
        let rows = vec![ReportRow::new(
            snapshot(10_001, dec!(1000), dec!(1500)),
            CategoryTotals::default(),
        )];
        let mut outcome = outcome_with(rows, vec![]);
        outcome.config.criteria.groups = Some(BTreeSet::from(["real\\vip".to_string()]));

        let caption = format_caption(&outcome);
        assert!(caption.starts_with("<b>Daily Report: vip daily</b>"));
        assert!(caption.contains("Groups: real\\vip"));
        assert!(caption.contains("Net P/L: $500.00"));
    }

    #[test]
    fn test_caption_collapses_many_groups() {
        let mut outcome = outcome_with(vec![], vec![]);
        outcome.config.criteria.groups =
            Some((0..8).map(|i| format!("real\\g{}", i)).collect());

        let caption = format_caption(&outcome);
        assert!(caption.contains("(+3 more)"));
        assert!(!caption.contains("real\\g7"));
    }

    #[test]
    fn test_caption_respects_limit() {
        let mut outcome = outcome_with(vec![], vec![]);
        outcome.database = "x".repeat(2000);

        let caption = format_caption(&outcome);
        assert!(caption.chars().count() <= constants::TELEGRAM_CAPTION_LIMIT);
        assert!(caption.starts_with("<b>Daily Report"));
    }

    #[test]
    fn test_failure_text_is_escaped() {
        let text = format_failure("eod", "vip", "query failed: <timeout>");
        assert!(text.contains("&lt;timeout&gt;"));
        assert!(text.starts_with("<b>Report failed: eod</b>"));
    }

    #[test]
    fn test_debug_masks_token() {
        let notifier = TelegramNotifier::new(&TelegramConfig {
            bot_token: "123456789:AAE-example-token".to_string(),
            default_chat_id: None,
        });
        let debug = format!("{:?}", notifier);
        assert!(debug.contains("1234****"));
        assert!(!debug.contains("example-token"));
    }
}
