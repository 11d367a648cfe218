//! Trigger values realized on the live scheduler (§4.5 Trigger types).
//!
//! Modeled as a tagged union per the named-registry / tagged-union guidance,
//! rather than a class hierarchy of trigger objects.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronTrigger {
    pub minute: String,
    pub hour: String,
    pub day: String,
    pub month: String,
    pub day_of_week: String,
    #[serde(default = "default_second")]
    pub second: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub jitter: Option<f64>,
}

fn default_second() -> String {
    "0".to_string()
}

impl CronTrigger {
    /// Renders a `tokio-cron-scheduler`/`cron`-crate 7-field expression:
    /// `second minute hour day month day_of_week year`. Year is left `*`.
    pub fn to_cron_expression(&self) -> String {
        format!(
            "{} {} {} {} {} {} *",
            self.second, self.minute, self.hour, self.day, self.month, self.day_of_week
        )
    }

    pub fn tz(&self) -> Tz {
        self.timezone
            .as_deref()
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(chrono_tz::UTC)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    pub fn to_seconds(self, amount: u64) -> u64 {
        let multiplier = match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3_600,
            IntervalUnit::Days => 86_400,
            IntervalUnit::Weeks => 604_800,
        };
        amount * multiplier
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalTrigger {
    pub amount: u64,
    pub unit: IntervalUnit,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub jitter: Option<f64>,
}

impl IntervalTrigger {
    pub fn period_seconds(&self) -> u64 {
        self.unit.to_seconds(self.amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateTrigger {
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    Cron(CronTrigger),
    Interval(IntervalTrigger),
    Date(DateTrigger),
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("invalid trigger_config for trigger_type {0:?}: {1}")]
    Malformed(super::job::TriggerType, String),
}

impl Trigger {
    pub fn from_config(
        trigger_type: super::job::TriggerType,
        config: &Value,
    ) -> Result<Self, TriggerError> {
        use super::job::TriggerType::*;
        let parsed = match trigger_type {
            Cron => serde_json::from_value::<CronTrigger>(config.clone()).map(Trigger::Cron),
            Interval => serde_json::from_value::<IntervalTrigger>(config.clone()).map(Trigger::Interval),
            Date => serde_json::from_value::<DateTrigger>(config.clone()).map(Trigger::Date),
        };
        parsed.map_err(|e| TriggerError::Malformed(trigger_type, e.to_string()))
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron(c) => c.start_date,
            Trigger::Interval(i) => i.start_date,
            Trigger::Date(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_trigger_renders_seven_field_expression() {
        let cron = CronTrigger {
            minute: "0".to_string(),
            hour: "8".to_string(),
            day: "*".to_string(),
            month: "*".to_string(),
            day_of_week: "*".to_string(),
            second: "0".to_string(),
            start_date: None,
            end_date: None,
            timezone: None,
            jitter: None,
        };
        assert_eq!(cron.to_cron_expression(), "0 0 8 * * * *");
    }

    #[test]
    fn interval_unit_converts_to_seconds() {
        assert_eq!(IntervalUnit::Minutes.to_seconds(5), 300);
        assert_eq!(IntervalUnit::Weeks.to_seconds(1), 604_800);
    }

    #[test]
    fn from_config_rejects_mismatched_shape() {
        let result = Trigger::from_config(
            super::super::job::TriggerType::Cron,
            &serde_json::json!({"not": "a cron shape"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn from_config_parses_valid_interval() {
        let result = Trigger::from_config(
            super::super::job::TriggerType::Interval,
            &serde_json::json!({"amount": 30, "unit": "seconds"}),
        )
        .unwrap();
        match result {
            Trigger::Interval(i) => assert_eq!(i.period_seconds(), 30),
            _ => panic!("expected interval trigger"),
        }
    }
}
