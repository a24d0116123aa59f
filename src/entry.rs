//! Canonical entry record shared by the normalizer, the stores and the
//! presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub title: String,
    #[serde(with = "time_tuple")]
    pub date: DateTime<Utc>,
    /// Identity key inside one source's store.
    pub link: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
}

/// Stable sort, most recent first.
pub fn sort_entries<T, F>(entries: &mut [T], date_of: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    entries.sort_by(|a, b| date_of(b).cmp(&date_of(a)));
}

/// Serializes timestamps as 9-field calendar tuples:
/// `[year, month, day, hour, minute, second, weekday, yearday, dst]`,
/// with Monday as weekday 0 and yearday starting at 1.
pub mod time_tuple {
    use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn to_tuple(date: &DateTime<Utc>) -> [i64; 9] {
        [
            i64::from(date.year()),
            i64::from(date.month()),
            i64::from(date.day()),
            i64::from(date.hour()),
            i64::from(date.minute()),
            i64::from(date.second()),
            i64::from(date.weekday().num_days_from_monday()),
            i64::from(date.ordinal()),
            0,
        ]
    }

    pub fn from_tuple(fields: &[i64]) -> Result<DateTime<Utc>, String> {
        if fields.len() < 6 {
            return Err(format!(
                "expected at least 6 calendar fields, got {}",
                fields.len()
            ));
        }
        let field = |i: usize| u32::try_from(fields[i]).map_err(|_| format!("negative field {i}"));
        let year = i32::try_from(fields[0]).map_err(|_| "year out of range".to_string())?;
        // Leap seconds are not representable.
        let second = field(5)?.min(59);

        Utc.with_ymd_and_hms(year, field(1)?, field(2)?, field(3)?, field(4)?, second)
            .single()
            .ok_or_else(|| format!("invalid calendar date {:?}", &fields[..6]))
    }

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        to_tuple(date).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let fields = Vec::<i64>::deserialize(deserializer)?;
        from_tuple(&fields).map_err(D::Error::custom)
    }
}
