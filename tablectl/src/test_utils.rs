//! Shared helpers for tests: a manual clock and a recording notifier.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

use crate::clock::Clock;
use crate::notify::{Notifier, NotifyError, ReservationSummary};
use crate::types::ChatId;

/// A clock whose "now" only moves when a test says so.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: std::sync::Mutex::new(Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        ManualClock::now(self)
    }
}

/// Captures every reminder the scheduler hands to it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: tokio::sync::Mutex<Vec<(ChatId, ReservationSummary)>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<(ChatId, ReservationSummary)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send_reminder(&self, chat_id: ChatId, summary: &ReservationSummary) -> Result<(), NotifyError> {
        self.sent.lock().await.push((chat_id, summary.clone()));
        Ok(())
    }
}
