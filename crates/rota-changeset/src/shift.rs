// shift.rs — Shifts, time slots and the diff key.
//
// A day has three fixed 8-hour windows. A Shift is one employee working one
// window on one date. For diffing, a shift is identified by
// (employee_id, date, start_time) even before the store assigns it an id.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Employee identifier as issued by the roster.
pub type EmployeeId = i64;

/// Persistent shift identifier assigned by the shift store.
pub type ShiftId = u64;

/// One of the three fixed shift windows of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeSlot {
    /// 08:00–16:00.
    #[serde(rename = "08-16", alias = "early")]
    Early,
    /// 16:00–24:00.
    #[serde(rename = "16-24", alias = "late")]
    Late,
    /// 00:00–08:00.
    #[serde(rename = "00-08", alias = "night")]
    Night,
}

impl TimeSlot {
    /// All slots in the order they occur within a day.
    pub const ALL: [TimeSlot; 3] = [TimeSlot::Night, TimeSlot::Early, TimeSlot::Late];

    pub fn start_time(self) -> NaiveTime {
        match self {
            TimeSlot::Early => hm(8),
            TimeSlot::Late => hm(16),
            TimeSlot::Night => hm(0),
        }
    }

    /// End of the window. The late slot ends at midnight, stored as 00:00.
    pub fn end_time(self) -> NaiveTime {
        match self {
            TimeSlot::Early => hm(16),
            TimeSlot::Late => hm(0),
            TimeSlot::Night => hm(8),
        }
    }

    /// The slot starting at `start`, if it is one of the fixed windows.
    pub fn from_start_time(start: NaiveTime) -> Option<TimeSlot> {
        TimeSlot::ALL.into_iter().find(|s| s.start_time() == start)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSlot::Early => write!(f, "08-16"),
            TimeSlot::Late => write!(f, "16-24"),
            TimeSlot::Night => write!(f, "00-08"),
        }
    }
}

fn hm(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// A single assignment of an employee to a time window on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    /// Persistent id; `None` until the shift store accepts the shift.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ShiftId>,
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u32,
}

fn default_break_minutes() -> u32 {
    60
}

impl Shift {
    /// Create an id-less shift covering `slot`.
    pub fn new(employee_id: EmployeeId, date: NaiveDate, slot: TimeSlot) -> Self {
        Self {
            id: None,
            employee_id,
            date,
            start_time: slot.start_time(),
            end_time: slot.end_time(),
            break_minutes: default_break_minutes(),
        }
    }

    pub fn with_id(mut self, id: ShiftId) -> Self {
        self.id = Some(id);
        self
    }

    /// The diff key for this shift.
    pub fn key(&self) -> ShiftKey {
        ShiftKey {
            employee_id: self.employee_id,
            date: self.date,
            start_time: self.start_time,
        }
    }

    pub fn slot(&self) -> Option<TimeSlot> {
        TimeSlot::from_start_time(self.start_time)
    }

    /// Move this shift to another window, keeping employee and date.
    pub fn move_to(&mut self, slot: TimeSlot) {
        self.start_time = slot.start_time();
        self.end_time = slot.end_time();
    }

    pub fn is_on(&self, employee_id: EmployeeId, date: NaiveDate) -> bool {
        self.employee_id == employee_id && self.date == date
    }
}

/// Identity of a shift for diffing: `(employee_id, date, start_time)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShiftKey {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
}

impl fmt::Display for ShiftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "employee {} on {} at {}",
            self.employee_id,
            self.date,
            self.start_time.format("%H:%M")
        )
    }
}

/// A shift that exists on both sides of a diff with different fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftUpdate {
    pub before: Shift,
    pub after: Shift,
}

/// Monday..Sunday week containing `date`.
pub fn week_range_containing(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    (start, start + Duration::days(6))
}

/// Serde adapter for `HH:MM` times. Also accepts `HH:MM:SS` on input.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn slot_windows_match_fixed_hours() {
        assert_eq!(TimeSlot::Early.start_time(), hm(8));
        assert_eq!(TimeSlot::Late.end_time(), hm(0));
        assert_eq!(TimeSlot::from_start_time(hm(16)), Some(TimeSlot::Late));
        assert_eq!(TimeSlot::from_start_time(hm(12)), None);
    }

    #[test]
    fn slot_accepts_named_aliases() {
        let late: TimeSlot = serde_json::from_str("\"late\"").unwrap();
        assert_eq!(late, TimeSlot::Late);
        let early: TimeSlot = serde_json::from_str("\"08-16\"").unwrap();
        assert_eq!(early, TimeSlot::Early);
        assert_eq!(serde_json::to_string(&TimeSlot::Night).unwrap(), "\"00-08\"");
    }

    #[test]
    fn shift_times_serialize_as_hours_and_minutes() {
        let shift = Shift::new(7, day("2024-06-03"), TimeSlot::Early);
        let json = serde_json::to_value(&shift).unwrap();
        assert_eq!(json["start_time"], "08:00");
        assert_eq!(json["end_time"], "16:00");
        assert!(json.get("id").is_none());

        let parsed: Shift = serde_json::from_str(
            r#"{"employee_id":7,"date":"2024-06-03","start_time":"08:00:00","end_time":"16:00"}"#,
        )
        .unwrap();
        assert_eq!(parsed.key(), shift.key());
        assert_eq!(parsed.break_minutes, 60);
    }

    #[test]
    fn week_range_is_monday_to_sunday() {
        let (start, end) = week_range_containing(day("2024-06-05"));
        assert_eq!(start, day("2024-06-03"));
        assert_eq!(end, day("2024-06-09"));

        let (start, _) = week_range_containing(day("2024-06-03"));
        assert_eq!(start, day("2024-06-03"));
    }
}
