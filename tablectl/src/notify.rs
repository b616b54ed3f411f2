//! Outbound reminder delivery.
//!
//! The scheduler only knows the [`Notifier`] trait; delivery mechanics live
//! behind it. Two implementations ship with the crate: [`BotApiNotifier`]
//! posts to a chat-bot HTTP API, and [`LogNotifier`] records the reminder in
//! the log when no endpoint is configured. Delivery is fire-and-forget from
//! the scheduler's perspective - an error is logged, never retried into
//! reservation state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Url;
use thiserror::Error;

use crate::config::NotifierConfig;
use crate::types::{ChatId, ReservationId};

#[derive(Error, Debug)]
pub enum NotifyError {
    /// The delivery endpoint rejected or failed the request
    #[error("reminder delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("reminder delivery rejected with status {status}")]
    Rejected { status: u16 },
}

/// What a reminder message is rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationSummary {
    pub reservation_id: ReservationId,
    pub venue_name: String,
    pub starts_at: DateTime<Utc>,
    pub table_name: Option<String>,
    pub party_size: i64,
}

impl ReservationSummary {
    /// Render the outbound text. Instants are formatted as UTC; localized
    /// display is a front-end concern.
    pub fn message(&self) -> String {
        let mut text = format!(
            "Reminder: reservation #{} at {} starts {} (party of {})",
            self.reservation_id,
            self.venue_name,
            self.starts_at.format("%Y-%m-%d %H:%M UTC"),
            self.party_size,
        );
        if let Some(table) = &self.table_name {
            text.push_str(&format!(", table {table}"));
        }
        text.push('.');
        text
    }
}

/// Delivers a reminder to the guest identified by `chat_id`.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn send_reminder(&self, chat_id: ChatId, summary: &ReservationSummary) -> Result<(), NotifyError>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Posts reminders to a chat-bot `sendMessage` endpoint.
#[derive(Debug, Clone)]
pub struct BotApiNotifier {
    http: reqwest::Client,
    endpoint: Url,
}

impl BotApiNotifier {
    pub fn new(config: &NotifierConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let endpoint = config
            .api_base
            .join(&format!("bot{}/sendMessage", config.bot_token))?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait::async_trait]
impl Notifier for BotApiNotifier {
    async fn send_reminder(&self, chat_id: ChatId, summary: &ReservationSummary) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": summary.message(),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected { status: status.as_u16() });
        }
        Ok(())
    }
}

/// Fallback when no delivery endpoint is configured: the reminder is
/// observable in the log and nowhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send_reminder(&self, chat_id: ChatId, summary: &ReservationSummary) -> Result<(), NotifyError> {
        tracing::info!(
            chat_id,
            reservation_id = summary.reservation_id,
            "reminder (no notifier configured): {}",
            summary.message()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn summary() -> ReservationSummary {
        ReservationSummary {
            reservation_id: 17,
            venue_name: "Corner Bistro".to_string(),
            starts_at: Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap(),
            table_name: Some("T3".to_string()),
            party_size: 4,
        }
    }

    #[test]
    fn message_mentions_table_when_assigned() {
        let text = summary().message();
        assert!(text.contains("#17"));
        assert!(text.contains("table T3"));
        assert!(text.contains("2026-09-01 18:00 UTC"));

        let mut unassigned = summary();
        unassigned.table_name = None;
        assert!(!unassigned.message().contains("table"));
    }

    #[tokio::test]
    async fn bot_api_posts_chat_id_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botsecret-token/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": 99 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = NotifierConfig {
            api_base: server.uri().parse().unwrap(),
            bot_token: "secret-token".to_string(),
            timeout: std::time::Duration::from_secs(5),
        };
        let notifier = BotApiNotifier::new(&config).unwrap();
        notifier.send_reminder(99, &summary()).await.unwrap();
    }

    #[tokio::test]
    async fn bot_api_surfaces_rejection_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let config = NotifierConfig {
            api_base: server.uri().parse().unwrap(),
            bot_token: "secret-token".to_string(),
            timeout: std::time::Duration::from_secs(5),
        };
        let notifier = BotApiNotifier::new(&config).unwrap();
        let err = notifier.send_reminder(99, &summary()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 403 }));
    }
}
