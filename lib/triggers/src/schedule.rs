//! Cadences and periodic task definitions handed to the scheduler.

use crate::error::TriggerConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;

/// A five-field cron schedule evaluated in an explicit timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    /// Minute field.
    pub minute: String,
    /// Hour field.
    pub hour: String,
    /// Day-of-month field.
    pub day_of_month: String,
    /// Month field.
    pub month_of_year: String,
    /// Day-of-week field.
    pub day_of_week: String,
    /// IANA timezone name.
    pub timezone: String,
}

impl CronSchedule {
    /// Splits a cron expression into its five fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not have exactly five
    /// whitespace-separated fields.
    pub fn parse(expression: &str, timezone: impl Into<String>) -> Result<Self, TriggerConfigError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day_of_month, month_of_year, day_of_week] = fields.as_slice() else {
            return Err(TriggerConfigError::InvalidCronExpression {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        };

        Ok(Self {
            minute: (*minute).to_string(),
            hour: (*hour).to_string(),
            day_of_month: (*day_of_month).to_string(),
            month_of_year: (*month_of_year).to_string(),
            day_of_week: (*day_of_week).to_string(),
            timezone: timezone.into(),
        })
    }

    /// Reassembles the expression.
    #[must_use]
    pub fn expression(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month_of_year, self.day_of_week
        )
    }
}

/// Unit of a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    fn seconds(self) -> u64 {
        match self {
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
        }
    }

    /// Parses a unit name, accepting singular forms.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => Some(Self::Minutes),
            "hour" | "hours" => Some(Self::Hours),
            "day" | "days" => Some(Self::Days),
            _ => None,
        }
    }
}

/// A fixed repeat interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSchedule {
    /// Number of units between runs; never zero.
    pub every: u32,
    /// The unit.
    pub unit: IntervalUnit,
}

impl IntervalSchedule {
    /// An interval of `every` minutes.
    #[must_use]
    pub fn minutes(every: u32) -> Self {
        Self {
            every,
            unit: IntervalUnit::Minutes,
        }
    }

    /// The interval as a duration.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.every) * self.unit.seconds())
    }
}

/// When a periodic task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    Cron(CronSchedule),
    Interval(IntervalSchedule),
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(cron) => write!(f, "cron '{}' ({})", cron.expression(), cron.timezone),
            Self::Interval(interval) => {
                write!(f, "every {} {:?}", interval.every, interval.unit)
            }
        }
    }
}

/// A named, durable schedule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicTask {
    /// Unique task name; re-upserting the same name replaces the definition.
    pub name: String,
    /// Handler the scheduler invokes.
    pub handler: String,
    /// Positional arguments passed to the handler.
    pub args: Vec<JsonValue>,
    /// Cadence.
    pub schedule: ScheduleSpec,
    /// Whether the task fires.
    pub enabled: bool,
    /// When the definition was last written.
    pub updated_at: DateTime<Utc>,
}

impl PeriodicTask {
    /// Creates an enabled task.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        handler: impl Into<String>,
        args: Vec<JsonValue>,
        schedule: ScheduleSpec,
    ) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            args,
            schedule,
            enabled: true,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_parse_splits_fields() {
        let cron = CronSchedule::parse("0 7 * * 1-5", "America/New_York").expect("valid");
        assert_eq!(cron.minute, "0");
        assert_eq!(cron.hour, "7");
        assert_eq!(cron.day_of_week, "1-5");
        assert_eq!(cron.timezone, "America/New_York");
        assert_eq!(cron.expression(), "0 7 * * 1-5");
    }

    #[test]
    fn cron_parse_rejects_wrong_field_count() {
        assert!(CronSchedule::parse("invalid", "UTC").is_err());
        assert!(CronSchedule::parse("0 0 * * * *", "UTC").is_err());
        assert!(CronSchedule::parse("", "UTC").is_err());
    }

    #[test]
    fn interval_duration() {
        assert_eq!(IntervalSchedule::minutes(15).as_duration(), Duration::from_secs(900));
        let daily = IntervalSchedule {
            every: 2,
            unit: IntervalUnit::Days,
        };
        assert_eq!(daily.as_duration(), Duration::from_secs(172_800));
    }

    #[test]
    fn interval_unit_names() {
        assert_eq!(IntervalUnit::from_name("Hour"), Some(IntervalUnit::Hours));
        assert_eq!(IntervalUnit::from_name("days"), Some(IntervalUnit::Days));
        assert_eq!(IntervalUnit::from_name("weeks"), None);
    }

    #[test]
    fn schedule_spec_is_tagged() {
        let spec = ScheduleSpec::Interval(IntervalSchedule::minutes(5));
        let json = serde_json::to_value(&spec).expect("serialize");
        assert_eq!(json["type"], "interval");
        assert_eq!(json["every"], 5);
        assert_eq!(json["unit"], "minutes");
    }
}
