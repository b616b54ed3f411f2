//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but can
//! be specified via `-f` flag or `TABLECTL_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file** - base configuration (default: `config.yaml`)
//! 2. **Environment variables** - variables prefixed with `TABLECTL_`
//!
//! For nested config values, use double underscores in environment
//! variables. For example, `TABLECTL_BOOKING__MIN_ADVANCE=48h` sets the
//! `booking.min_advance` field.
//!
//! ## Configuration Structure
//!
//! - **Venue**: `venue.name` - shown in reminder messages
//! - **Database**: `database.type` (`file`/`memory`), `database.path`
//! - **Tables**: `tables` - the seed layout, applied once to an empty store
//! - **Booking policy**: `booking.duration`, `booking.slot_step`,
//!   `booking.min_advance`, `booking.allow_same_day`,
//!   `booking.blocked_dates`, `booking.daily_limit`,
//!   `booking.auto_confirm_max_party`
//! - **Reminders**: `reminders.lead_time`, `reminders.short_notice`,
//!   `reminders.resync_interval`
//! - **Notifier**: `notifier.api_base`, `notifier.bot_token` - optional;
//!   without it reminders are logged instead of delivered
//!
//! Durations use humantime notation (`2h`, `30m`, `90s`).

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::db::models::tables::TableSeedDBRequest;

/// Simple CLI args - just for specifying the config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TABLECTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the daemon.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment
/// variables. All fields have sensible defaults defined in the `Default`
/// implementation.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Venue metadata used in outbound messages
    pub venue: VenueConfig,
    /// SQLite storage configuration
    pub database: DatabaseConfig,
    /// Table layout seeded into an empty database on startup
    pub tables: Vec<TableSeed>,
    /// Booking-window policy applied to every create request
    pub booking: BookingConfig,
    /// Reminder scheduling configuration
    pub reminders: ReminderConfig,
    /// Chat-bot HTTP endpoint reminders are delivered through.
    /// When absent, reminders are logged instead of sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifier: Option<NotifierConfig>,
}

/// Venue metadata shown to guests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VenueConfig {
    /// Venue name used in reminder texts
    pub name: String,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            name: "Your Venue".to_string(),
        }
    }
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// On-disk database file, created if missing
    File {
        path: PathBuf,
        #[serde(default)]
        pool: PoolSettings,
    },
    /// In-memory database; data is lost on shutdown. Intended for
    /// development and smoke tests.
    Memory,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::File {
            path: PathBuf::from("tablectl.db"),
            pool: PoolSettings::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        match self {
            DatabaseConfig::File { pool, .. } => pool.clone(),
            // A shared in-memory SQLite database exists per connection, so
            // the pool is pinned to a single connection in this mode.
            DatabaseConfig::Memory => PoolSettings {
                max_connections: 1,
                ..PoolSettings::default()
            },
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Maximum time to wait for a connection
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// How long a statement waits on SQLite's write lock before reporting
    /// the store unavailable
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// One venue table in the seed layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TableSeed {
    pub name: String,
    pub capacity: i64,
}

impl From<&TableSeed> for TableSeedDBRequest {
    fn from(seed: &TableSeed) -> Self {
        Self {
            name: seed.name.clone(),
            capacity: seed.capacity,
        }
    }
}

/// Booking-window policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookingConfig {
    /// Fixed reservation duration; `ends_at` is always `starts_at + duration`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Granularity of the booking grid; requested starts must align to it
    #[serde(with = "humantime_serde")]
    pub slot_step: Duration,
    /// Minimum notice between "now" and the requested start
    #[serde(with = "humantime_serde")]
    pub min_advance: Duration,
    /// Accept requests starting on the current UTC calendar day
    pub allow_same_day: bool,
    /// Dates the venue does not take bookings for
    pub blocked_dates: Vec<NaiveDate>,
    /// Cap on reservation requests per UTC day, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<DailyLimit>,
    /// Parties up to this size skip the pending stage and are confirmed at
    /// creation. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_confirm_max_party: Option<i64>,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(2 * 60 * 60),
            slot_step: Duration::from_secs(30 * 60),
            min_advance: Duration::from_secs(24 * 60 * 60),
            allow_same_day: false,
            blocked_dates: Vec::new(),
            daily_limit: None,
            auto_confirm_max_party: None,
        }
    }
}

impl BookingConfig {
    pub fn duration_chrono(&self) -> ChronoDuration {
        to_chrono(self.duration)
    }

    pub fn min_advance_chrono(&self) -> ChronoDuration {
        to_chrono(self.min_advance)
    }
}

/// Daily reservation quota.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DailyLimit {
    /// Maximum reservation requests counted per UTC day
    pub count: u32,
    /// Whether the quota applies venue-wide or per guest
    #[serde(default)]
    pub scope: LimitScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    #[default]
    Global,
    PerUser,
}

/// Reminder scheduling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReminderConfig {
    /// How long before a reservation's start its reminder fires
    #[serde(with = "humantime_serde")]
    pub lead_time: Duration,
    /// What to do when a confirmation arrives inside the lead window
    pub short_notice: ShortNoticePolicy,
    /// Fallback interval at which the scheduler re-reads persisted state
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lead_time: Duration::from_secs(2 * 60 * 60),
            short_notice: ShortNoticePolicy::FireImmediately,
            resync_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl ReminderConfig {
    pub fn lead_time_chrono(&self) -> ChronoDuration {
        to_chrono(self.lead_time)
    }
}

/// Policy for confirmations that arrive after the reminder instant has
/// already passed but before the reservation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortNoticePolicy {
    /// Deliver the reminder right away
    FireImmediately,
    /// Log and deliver nothing
    Skip,
}

/// Chat-bot delivery endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// Base URL of the bot API (e.g. `https://api.telegram.org`)
    pub api_base: Url,
    /// Bot credential appended to the API path
    pub bot_token: String,
    /// Per-request timeout
    #[serde(default = "NotifierConfig::default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl NotifierConfig {
    fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }
}

/// Config-validated durations always fit chrono's range; the clamp is a
/// non-panicking fallback, not an expected path.
fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("TABLECTL_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), String> {
        if self.booking.duration.is_zero() {
            return Err("booking.duration must be positive".to_string());
        }
        if self.booking.slot_step.is_zero() {
            return Err("booking.slot_step must be positive".to_string());
        }
        for d in [
            self.booking.duration,
            self.booking.slot_step,
            self.booking.min_advance,
            self.reminders.lead_time,
        ] {
            if ChronoDuration::from_std(d).is_err() {
                return Err(format!("duration {} is out of range", humantime::format_duration(d)));
            }
        }
        if self.reminders.resync_interval.is_zero() {
            return Err("reminders.resync_interval must be positive".to_string());
        }
        if let Some(limit) = &self.booking.daily_limit
            && limit.count == 0
        {
            return Err("booking.daily_limit.count must be positive".to_string());
        }
        for table in &self.tables {
            if table.capacity <= 0 {
                return Err(format!("table {} must have positive capacity", table.name));
            }
        }
        Ok(())
    }
}
