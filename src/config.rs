//! Configuration loading, validation and defaults for nudged.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use chrono::Datelike;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Weekday;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::domain::ActivityId;
use crate::domain::Kind;
use crate::domain::Pattern;

/// Shortest interval an activity may be configured with.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Format of schedule window bounds.
const TIME_FORMAT: &str = "%H:%M";

/// Commented configuration written by `nudged config create`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# nudged configuration

# Enable debug logging.
debug = false

[behavior]
# Seconds of continuous inactivity before a paused scheduler resumes.
idle_timeout_seconds = 30
# Resume automatically once the idle timeout has elapsed.
resume_after_inactivity = true
# Pause as soon as real user input is detected.
pause_when_user_is_active = true
# Informational; autostart is left to the service manager.
start_on_boot = false

[[activities]]
# Unique name of this activity.
id = "nudge"
# mouse or keyboard
kind = "mouse"
# square, triangle, up_and_down or left_and_right (mouse only)
pattern = "square"
enabled = true
# Seconds between two runs (at least 5).
interval_seconds = 60

# Optional advisory window, local time.
# [activities.schedule]
# enabled = true
# from = "09:00"
# to = "18:00"
# days = ["monday", "tuesday", "wednesday", "thursday", "friday"]
"#;

/// Errors found while validating configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Activity id must not be empty")]
    EmptyId,

    #[error("Duplicate activity id: {0}")]
    DuplicateId(ActivityId),

    #[error("Activity '{0}' is a mouse activity but has no pattern")]
    MissingPattern(ActivityId),

    #[error("Activity '{0}' is a keyboard activity and must not set a pattern")]
    UnexpectedPattern(ActivityId),

    #[error("Activity '{id}' interval {interval:?} is below the minimum of {minimum:?}")]
    IntervalTooShort {
        id: ActivityId,
        interval: Duration,
        minimum: Duration,
    },

    #[error(
        "Activity '{id}' takes about {estimated:?} which does not fit in its interval of {interval:?}"
    )]
    DurationExceedsInterval {
        id: ActivityId,
        estimated: Duration,
        interval: Duration,
    },

    #[error("Activity '{id}' schedule has an invalid time '{value}' (expected HH:MM)")]
    InvalidScheduleTime { id: ActivityId, value: String },
}

/// Main configuration for nudged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging (default: false).
    pub debug: bool,

    /// How the scheduler reacts to real user input.
    pub behavior: Behavior,

    /// Recurring actions to perform.
    pub activities: Vec<Activity>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            behavior: Behavior::default(),
            activities: vec![Activity {
                id: "nudge".to_string(),
                kind: Kind::Mouse,
                pattern: Some(Pattern::Square),
                enabled: true,
                interval_seconds: 60,
                schedule: None,
            }],
        }
    }
}

/// Behavior policy shared read-only by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behavior {
    /// Seconds of continuous inactivity required to resume (default: 30).
    pub idle_timeout_seconds: u64,

    /// Resume automatically after the idle timeout (default: true).
    pub resume_after_inactivity: bool,

    /// Pause when real user input is detected (default: true).
    pub pause_when_user_is_active: bool,

    /// Informational; the daemon does not install itself (default: false).
    pub start_on_boot: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 30,
            resume_after_inactivity: true,
            pause_when_user_is_active: true,
            start_on_boot: false,
        }
    }
}

impl Behavior {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

/// One configured recurring action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identity, distinct from the kind.
    pub id: String,

    pub kind: Kind,

    /// Shape to trace; required for mouse activities only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between two runs (default: 60, minimum: 5).
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Optional advisory time window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    60
}

impl Activity {
    pub fn id(&self) -> ActivityId {
        ActivityId::new(self.id.clone())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Check the fields of this activity in isolation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }

        match (self.kind, self.pattern) {
            (Kind::Mouse, None) => return Err(ConfigError::MissingPattern(self.id())),
            (Kind::Keyboard, Some(_)) => return Err(ConfigError::UnexpectedPattern(self.id())),
            _ => {}
        }

        if self.interval() < MIN_INTERVAL {
            return Err(ConfigError::IntervalTooShort {
                id: self.id(),
                interval: self.interval(),
                minimum: MIN_INTERVAL,
            });
        }

        if let Some(ref schedule) = self.schedule {
            for value in [&schedule.from, &schedule.to] {
                if parse_time(value).is_none() {
                    return Err(ConfigError::InvalidScheduleTime {
                        id: self.id(),
                        value: value.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Day of the week as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub fn weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Tuesday => Weekday::Tue,
            Self::Wednesday => Weekday::Wed,
            Self::Thursday => Weekday::Thu,
            Self::Friday => Weekday::Fri,
            Self::Saturday => Weekday::Sat,
            Self::Sunday => Weekday::Sun,
        }
    }
}

/// Time-of-day and day-of-week window for an activity.
///
/// Advisory only: the scheduler reports ticks outside the window but does not
/// suppress them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub enabled: bool,

    /// Window start, "HH:MM" local time.
    pub from: String,

    /// Window end (exclusive), "HH:MM" local time. Earlier than `from` wraps
    /// past midnight.
    pub to: String,

    /// Days the window applies to; empty means every day.
    pub days: Vec<Day>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: false,
            from: "09:00".to_string(),
            to: "18:00".to_string(),
            days: vec![
                Day::Monday,
                Day::Tuesday,
                Day::Wednesday,
                Day::Thursday,
                Day::Friday,
            ],
        }
    }
}

impl Schedule {
    /// Whether `at` falls inside the window. A disabled or malformed schedule
    /// contains every instant.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        if !self.enabled {
            return true;
        }

        let (Some(from), Some(to)) = (parse_time(&self.from), parse_time(&self.to)) else {
            return true;
        };

        let time = at.time();
        // An overnight window belongs to the day it started on.
        let (in_window, day) = if from <= to {
            (from <= time && time < to, at.weekday())
        } else if time >= from {
            (true, at.weekday())
        } else {
            (time < to, at.weekday().pred())
        };

        in_window && (self.days.is_empty() || self.days.iter().any(|d| d.weekday() == day))
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, TIME_FORMAT).ok()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(default_path) = Self::default_path()
            && default_path.exists()
        {
            return Self::load(&default_path);
        }

        Ok(Self::default())
    }

    /// Default config file location: `<config dir>/nudged/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nudged").join("config.toml"))
    }

    /// Write the commented default configuration to `path`.
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Check every activity and reject duplicate ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for activity in &self.activities {
            activity.validate()?;
            if !seen.insert(activity.id.as_str()) {
                return Err(ConfigError::DuplicateId(activity.id()));
            }
        }
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Look up a value by dotted path, e.g. `behavior.idle_timeout_seconds` or
    /// `activities.0.kind`.
    pub fn get(&self, key: &str) -> Result<Option<toml::Value>> {
        let root = toml::Value::try_from(self).context("Failed to serialize configuration")?;

        let mut current = &root;
        for segment in key.split('.') {
            let next = match current {
                toml::Value::Table(table) => table.get(segment),
                toml::Value::Array(items) => {
                    segment.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            };
            let Some(next) = next else {
                return Ok(None);
            };
            current = next;
        }

        Ok(Some(current.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn mouse(id: &str, interval_seconds: u64) -> Activity {
        Activity {
            id: id.to_string(),
            kind: Kind::Mouse,
            pattern: Some(Pattern::Square),
            enabled: true,
            interval_seconds,
            schedule: None,
        }
    }

    fn at(date: (i32, u32, u32), hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.behavior.idle_timeout(), Duration::from_secs(30));
        assert!(config.behavior.resume_after_inactivity);
        assert!(config.behavior.pause_when_user_is_active);
        assert!(!config.behavior.start_on_boot);
        assert_eq!(config.activities.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_template_matches_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            debug = true

            [behavior]
            idle_timeout_seconds = 10
            pause_when_user_is_active = false

            [[activities]]
            id = "wiggle"
            kind = "mouse"
            pattern = "up_and_down"
            interval_seconds = 30

            [[activities]]
            id = "shift"
            kind = "keyboard"
            enabled = false

            [activities.schedule]
            enabled = true
            from = "22:00"
            to = "06:00"
            days = ["friday"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.debug);
        assert_eq!(config.behavior.idle_timeout_seconds, 10);
        assert!(config.behavior.resume_after_inactivity);
        assert!(!config.behavior.pause_when_user_is_active);

        let wiggle = &config.activities[0];
        assert_eq!(wiggle.pattern, Some(Pattern::UpAndDown));
        assert!(wiggle.enabled);
        assert_eq!(wiggle.interval(), Duration::from_secs(30));

        let shift = &config.activities[1];
        assert_eq!(shift.kind, Kind::Keyboard);
        assert!(!shift.enabled);
        assert_eq!(shift.interval_seconds, 60);
        assert_eq!(shift.schedule.as_ref().unwrap().days, vec![Day::Friday]);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_pattern_rejected() {
        let toml_str = r#"
            [[activities]]
            id = "a"
            kind = "mouse"
            pattern = "circle"
        "#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_missing_id_rejected() {
        let toml_str = r#"
            [[activities]]
            kind = "keyboard"
        "#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_validate_interval_minimum() {
        let config = Config {
            activities: vec![mouse("fast", 4)],
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::IntervalTooShort {
                id: ActivityId::from("fast"),
                interval: Duration::from_secs(4),
                minimum: MIN_INTERVAL,
            })
        );

        let config = Config {
            activities: vec![mouse("ok", 5)],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_pattern_presence() {
        let mut no_pattern = mouse("m", 60);
        no_pattern.pattern = None;
        assert_eq!(
            no_pattern.validate(),
            Err(ConfigError::MissingPattern(ActivityId::from("m")))
        );

        let mut keyboard = mouse("k", 60);
        keyboard.kind = Kind::Keyboard;
        assert_eq!(
            keyboard.validate(),
            Err(ConfigError::UnexpectedPattern(ActivityId::from("k")))
        );

        keyboard.pattern = None;
        assert!(keyboard.validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let config = Config {
            activities: vec![mouse("same", 60), mouse("other", 60), mouse("same", 90)],
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateId(ActivityId::from("same")))
        );
    }

    #[test]
    fn test_same_kind_different_ids_allowed() {
        let config = Config {
            activities: vec![mouse("a", 60), mouse("b", 60)],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_id() {
        assert_eq!(mouse("  ", 60).validate(), Err(ConfigError::EmptyId));
    }

    #[test]
    fn test_validate_schedule_times() {
        let mut activity = mouse("s", 60);
        activity.schedule = Some(Schedule {
            to: "25:00".to_string(),
            ..Default::default()
        });
        assert_eq!(
            activity.validate(),
            Err(ConfigError::InvalidScheduleTime {
                id: ActivityId::from("s"),
                value: "25:00".to_string(),
            })
        );
    }

    #[test]
    fn test_schedule_daytime_window() {
        let schedule = Schedule {
            enabled: true,
            ..Default::default()
        };

        // 2026-10-14 is a Wednesday, 2026-10-17 a Saturday.
        assert!(schedule.contains(at((2026, 10, 14), 9, 0)));
        assert!(schedule.contains(at((2026, 10, 14), 17, 59)));
        assert!(!schedule.contains(at((2026, 10, 14), 18, 0)));
        assert!(!schedule.contains(at((2026, 10, 14), 8, 59)));
        assert!(!schedule.contains(at((2026, 10, 17), 12, 0)));
    }

    #[test]
    fn test_schedule_overnight_window() {
        let schedule = Schedule {
            enabled: true,
            from: "22:00".to_string(),
            to: "06:00".to_string(),
            days: vec![Day::Friday],
        };

        // Friday 2026-10-16 night into Saturday morning.
        assert!(schedule.contains(at((2026, 10, 16), 23, 0)));
        assert!(schedule.contains(at((2026, 10, 17), 5, 0)));
        assert!(!schedule.contains(at((2026, 10, 17), 23, 0)));
        assert!(!schedule.contains(at((2026, 10, 16), 5, 0)));
    }

    #[test]
    fn test_disabled_schedule_contains_everything() {
        let schedule = Schedule::default();
        assert!(schedule.contains(at((2026, 10, 17), 3, 0)));
    }

    #[test]
    fn test_get_dotted_keys() {
        let config = Config::default();

        assert_eq!(
            config.get("behavior.idle_timeout_seconds").unwrap(),
            Some(toml::Value::Integer(30))
        );
        assert_eq!(
            config.get("activities.0.kind").unwrap(),
            Some(toml::Value::String("mouse".to_string()))
        );
        assert_eq!(config.get("activities.1.kind").unwrap(), None);
        assert_eq!(config.get("behavior.nope").unwrap(), None);
        assert_eq!(config.get("debug.deeper").unwrap(), None);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let rendered = config.to_toml_string().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::write_default(&path, false).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        assert!(Config::write_default(&path, false).is_err());
        Config::write_default(&path, true).unwrap();
    }

    #[test]
    fn test_load_or_default_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[behavior]\nidle_timeout_seconds = 5\n").unwrap();

        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.behavior.idle_timeout_seconds, 5);
        // Omitted activities fall back to the defaults.
        assert_eq!(config.activities, Config::default().activities);
    }
}
