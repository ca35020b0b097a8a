//! Per-item progress records as persisted in the course ledger.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Viewing/completion state of a single item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Whether the learner marked the item as done
    #[serde(default)]
    pub completed: bool,

    /// Playback position in seconds
    #[serde(default, alias = "progress_seconds")]
    pub elapsed_seconds: f64,

    /// Last time the item was opened; absent until first access
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_accessed: Option<DateTime<Utc>>,

    /// Keys this version does not know about, kept for the next save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressRecord {
    /// Check the invariants a loaded record must satisfy
    pub fn is_valid(&self) -> bool {
        self.elapsed_seconds.is_finite() && self.elapsed_seconds >= 0.0
    }

    /// Apply a partial update, leaving unspecified fields untouched
    pub fn apply(&mut self, update: &ProgressUpdate, now: DateTime<Utc>) {
        if let Some(completed) = update.completed {
            self.completed = completed;
        }
        if let Some(elapsed) = update.elapsed_seconds {
            self.elapsed_seconds = elapsed;
        }
        if update.touch_last_accessed {
            self.last_accessed = Some(now);
        }
    }
}

/// Partial update for a progress record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub completed: Option<bool>,
    pub elapsed_seconds: Option<f64>,
    pub touch_last_accessed: bool,
}

impl ProgressUpdate {
    /// An update that only stamps the access time
    pub fn touch() -> Self {
        Self {
            touch_last_accessed: true,
            ..Default::default()
        }
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn with_elapsed(mut self, seconds: f64) -> Self {
        self.elapsed_seconds = Some(seconds);
        self
    }

    pub fn touching(mut self) -> Self {
        self.touch_last_accessed = true;
        self
    }
}

/// Accepts RFC 3339, naive ISO-8601 (taken as UTC) or epoch seconds
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(epoch_to_datetime)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid epoch timestamp: {}", n))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid timestamp: {}",
            other
        ))),
    }
}

/// Parse the timestamp formats found in progress stores
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_default() {
        let record: ProgressRecord = serde_json::from_str("{}").unwrap();
        assert!(!record.completed);
        assert_eq!(record.elapsed_seconds, 0.0);
        assert!(record.last_accessed.is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("last_accessed").is_none());
    }

    #[test]
    fn test_legacy_field_names_and_naive_timestamp() {
        let record: ProgressRecord = serde_json::from_str(
            r#"{"completed": true, "progress_seconds": 42, "last_accessed": "2024-03-01T10:15:30.123456"}"#,
        )
        .unwrap();

        assert!(record.completed);
        assert_eq!(record.elapsed_seconds, 42.0);
        let ts = record.last_accessed.unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:15:30.123456+00:00");
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_epoch_timestamp() {
        let record: ProgressRecord =
            serde_json::from_str(r#"{"last_accessed": 1700000000}"#).unwrap();
        assert_eq!(record.last_accessed.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let record: ProgressRecord =
            serde_json::from_str(r#"{"completed": false, "notes": "rewatch", "rating": 4}"#)
                .unwrap();
        assert_eq!(record.extra.get("notes"), Some(&Value::from("rewatch")));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["rating"], 4);
        assert_eq!(json["notes"], "rewatch");
    }

    #[test]
    fn test_apply_partial_update() {
        let now = Utc::now();
        let mut record = ProgressRecord::default();

        record.apply(&ProgressUpdate::default().with_completed(true), now);
        record.apply(&ProgressUpdate::default().with_elapsed(120.0), now);

        assert!(record.completed);
        assert_eq!(record.elapsed_seconds, 120.0);
        assert!(record.last_accessed.is_none());

        record.apply(&ProgressUpdate::touch(), now);
        assert_eq!(record.last_accessed, Some(now));
        assert!(record.completed);
    }

    #[test]
    fn test_validity() {
        let mut record = ProgressRecord::default();
        assert!(record.is_valid());
        record.elapsed_seconds = -1.0;
        assert!(!record.is_valid());
    }
}
